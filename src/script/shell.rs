// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! POSIX shell quoting and word splitting.

use std::{borrow::Cow, fmt};

use itertools::Itertools;
use regex::Regex;

use super::ScriptParseError;

lazy_static::lazy_static! {
    static ref SAFE_WORD: Regex = Regex::new(r"^[A-Za-z0-9_@%+=:,./-]+$").unwrap();
}

/// Quote a word for `sh`, if it needs it. Safe words are left alone.
pub fn quote(s: &str) -> Cow<'_, str> {
    if SAFE_WORD.is_match(s) {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(format!("'{}'", s.replace('\'', r#"'"'"'"#)))
    }
}

/// Split a command line into words the way `sh` would (without expansions).
pub fn split_shell_words(line: &str) -> Result<Vec<String>, ScriptParseError> {
    let unterminated = || ScriptParseError::UnterminatedQuote(line.to_string());

    let mut words = vec![];
    let mut word = String::new();
    let mut in_word = false;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' | '\n' => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }

            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => word.push(c),
                        None => return Err(unterminated()),
                    }
                }
            }

            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => word.push(c),
                            Some('\n') => (),
                            Some(c) => {
                                word.push('\\');
                                word.push(c);
                            }
                            None => return Err(unterminated()),
                        },
                        Some(c) => word.push(c),
                        None => return Err(unterminated()),
                    }
                }
            }

            '\\' => {
                in_word = true;
                match chars.next() {
                    Some('\n') => (),
                    Some(c) => word.push(c),
                    None => return Err(ScriptParseError::TrailingEscape(line.to_string())),
                }
            }

            c => {
                in_word = true;
                word.push(c);
            }
        }
    }
    if in_word {
        words.push(word);
    }
    Ok(words)
}

/// The values following `option` on a command line, up to the next option,
/// e.g. `["field=BIAS", "arm=b"]` for `--id` in `task --id field=BIAS arm=b -j1`.
pub fn option_values<'a>(argv: &'a [String], option: &str) -> Vec<&'a str> {
    argv.iter()
        .skip_while(|a| a.as_str() != option)
        .skip(1)
        .take_while(|a| !a.starts_with('-'))
        .map(|a| a.as_str())
        .collect()
}

/// A glob appended to a command line, left unquoted so the shell expands it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobTail {
    pub dir: String,
    pub pattern: String,
}

impl GlobTail {
    pub fn new<D: Into<String>, P: Into<String>>(dir: D, pattern: P) -> GlobTail {
        GlobTail {
            dir: dir.into(),
            pattern: pattern.into(),
        }
    }

    /// The form understood by `sh`: the directory is quoted, the pattern
    /// isn't.
    pub fn shell_form(&self) -> String {
        format!("{}/{}", quote(&self.dir), self.pattern)
    }

    /// The same glob for the `glob` crate, with the directory escaped.
    pub fn glob_form(&self) -> String {
        format!("{}/{}", glob::Pattern::escape(&self.dir), self.pattern)
    }
}

/// One command line of a generated script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    argv: Vec<String>,
    tail: Option<GlobTail>,
}

impl ShellCommand {
    pub fn new<S: Into<String>>(program: S) -> ShellCommand {
        ShellCommand {
            argv: vec![program.into()],
            tail: None,
        }
    }

    pub fn arg<S: Into<String>>(&mut self, arg: S) -> &mut ShellCommand {
        self.argv.push(arg.into());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut ShellCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    /// `--option v1 v2 ...`, or nothing if there are no values.
    pub fn option_list<I, S>(&mut self, option: &str, values: I) -> &mut ShellCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if !values.is_empty() {
            self.argv.push(option.to_string());
            self.argv.extend(values);
        }
        self
    }

    pub fn glob_tail(&mut self, tail: GlobTail) -> &mut ShellCommand {
        self.tail = Some(tail);
        self
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn tail(&self) -> Option<&GlobTail> {
        self.tail.as_ref()
    }

    pub fn render(&self) -> String {
        let mut line = self.argv.iter().map(|a| quote(a)).join(" ");
        if let Some(tail) = &self.tail {
            line.push(' ');
            line.push_str(&tail.shell_form());
        }
        line
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
