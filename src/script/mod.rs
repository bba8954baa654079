// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Generated command scripts.
//!
//! A script is a plain `sh` file. Each command line is preceded by a marker
//! comment, e.g.
//!
//! ```text
//! # pipe2d: ordinal=2 block=calib_1 stage=bias step=certify
//! ```
//!
//! which lets the executor read a script back and report progress against the
//! same step labels it was generated with.

mod error;
mod shell;

pub use error::ScriptParseError;
pub use shell::{option_values, quote, split_shell_words, GlobTail, ShellCommand};

use std::{fmt, path::Path, str::FromStr};

use itertools::Itertools;
use log::trace;

const SHEBANG: &str = "#!/bin/sh";
const MARKER_PREFIX: &str = "# pipe2d:";

/// What a script step does.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum StepKind {
    Ingest,
    Construct,
    Combine,
    Certify,
    Cleanup,
    Science,
}

/// Where a step sits in the plan, e.g. "calib_1/fiberProfiles/group1" or
/// "calib_1/fiberProfiles/b1".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepLabel {
    /// `None` for the init ingest.
    pub block: Option<String>,
    pub stage: String,
    pub group: Option<usize>,
    pub detector: Option<String>,
}

impl StepLabel {
    pub fn new<S: Into<String>>(block: Option<&str>, stage: S) -> StepLabel {
        StepLabel {
            block: block.map(|b| b.to_string()),
            stage: stage.into(),
            group: None,
            detector: None,
        }
    }

    pub fn with_group(mut self, group: usize) -> StepLabel {
        self.group = Some(group);
        self
    }

    pub fn with_detector<S: Into<String>>(mut self, detector: S) -> StepLabel {
        self.detector = Some(detector.into());
        self
    }
}

impl fmt::Display for StepLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(block) = &self.block {
            write!(f, "{block}/")?;
        }
        write!(f, "{}", self.stage)?;
        if let Some(group) = self.group {
            write!(f, "/group{group}")?;
        }
        if let Some(detector) = &self.detector {
            write!(f, "/{detector}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptStep {
    /// 1-based position in the script.
    pub ordinal: usize,
    pub label: StepLabel,
    pub kind: StepKind,
    /// A glob (for the `glob` crate) that must match at least one file for
    /// the step to be worth running.
    pub requires: Option<String>,
    /// The command line exactly as written in the script.
    pub command: String,
}

impl ScriptStep {
    fn marker(&self) -> String {
        let mut tokens = vec![
            format!("ordinal={}", self.ordinal),
            format!("block={}", self.label.block.as_deref().unwrap_or("")),
            format!("stage={}", self.label.stage),
            format!("step={}", self.kind),
        ];
        if let Some(group) = self.label.group {
            tokens.push(format!("group={group}"));
        }
        if let Some(detector) = &self.label.detector {
            tokens.push(format!("detector={detector}"));
        }
        if let Some(requires) = &self.requires {
            tokens.push(format!("requires={requires}"));
        }
        format!(
            "{MARKER_PREFIX} {}",
            tokens.iter().map(|t| quote(t)).join(" ")
        )
    }

    fn from_marker(line_no: usize, marker: &str, command: String) -> Result<Self, ScriptParseError> {
        let bad = |reason: String| ScriptParseError::BadMarker { line_no, reason };

        let mut ordinal = None;
        let mut label = StepLabel::default();
        let mut kind = None;
        let mut requires = None;
        for token in split_shell_words(marker)? {
            let (key, value) = token
                .split_once('=')
                .ok_or_else(|| bad(format!("'{token}' is not key=value")))?;
            match key {
                "ordinal" => {
                    ordinal = Some(
                        value
                            .parse::<usize>()
                            .map_err(|_| bad(format!("bad ordinal '{value}'")))?,
                    )
                }
                "block" => label.block = Some(value.to_string()).filter(|b| !b.is_empty()),
                "stage" => label.stage = value.to_string(),
                "step" => {
                    kind = Some(
                        StepKind::from_str(value)
                            .map_err(|_| bad(format!("unknown step kind '{value}'")))?,
                    )
                }
                "group" => {
                    label.group = Some(
                        value
                            .parse()
                            .map_err(|_| bad(format!("bad group '{value}'")))?,
                    )
                }
                "detector" => label.detector = Some(value.to_string()),
                "requires" => requires = Some(value.to_string()),
                _ => return Err(bad(format!("unknown key '{key}'"))),
            }
        }

        Ok(ScriptStep {
            ordinal: ordinal.ok_or_else(|| bad("no ordinal".to_string()))?,
            kind: kind.ok_or_else(|| bad("no step kind".to_string()))?,
            label,
            requires,
            command,
        })
    }

    /// The words of the command, as the shell would split them.
    pub fn argv(&self) -> Result<Vec<String>, ScriptParseError> {
        split_shell_words(&self.command)
    }
}

/// An ordered list of labelled shell commands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandScript {
    /// Without `set -e` the shell carries on past failures.
    pub allow_errors: bool,
    pub steps: Vec<ScriptStep>,
}

impl CommandScript {
    pub fn new(allow_errors: bool) -> CommandScript {
        CommandScript {
            allow_errors,
            steps: vec![],
        }
    }

    /// Append a command. If `requires` is given, the command only runs when
    /// the glob matches something; a grouped product that produced nothing
    /// for a detector is skipped rather than failing the whole script.
    pub fn push(
        &mut self,
        label: StepLabel,
        kind: StepKind,
        command: &ShellCommand,
        requires: Option<&GlobTail>,
    ) {
        let ordinal = self.steps.len() + 1;
        let line = match requires {
            None => command.render(),
            Some(glob) => format!(
                "if ls {} >/dev/null 2>&1; then {}; else echo {} >&2; fi",
                glob.shell_form(),
                command.render(),
                quote(&format!("pipe2d: skipping {label}: no inputs")),
            ),
        };
        trace!("Step {ordinal} ({label}): {line}");
        self.steps.push(ScriptStep {
            ordinal,
            label,
            kind,
            requires: requires.map(|g| g.glob_form()),
            command: line,
        });
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(SHEBANG);
        out.push('\n');
        out.push_str(if self.allow_errors {
            "set -ux\n"
        } else {
            "set -uxe\n"
        });
        for step in &self.steps {
            out.push('\n');
            out.push_str(&step.marker());
            out.push('\n');
            out.push_str(&step.command);
            out.push('\n');
        }
        out
    }

    /// Read back a script produced by [`CommandScript::render`].
    pub fn parse(text: &str) -> Result<CommandScript, ScriptParseError> {
        let mut script = CommandScript::new(true);
        let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l));
        while let Some((line_no, line)) = lines.next() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(marker) = line.strip_prefix(MARKER_PREFIX) {
                let command = lines
                    .by_ref()
                    .map(|(_, l)| l.trim())
                    .find(|l| !l.is_empty())
                    .filter(|l| !l.starts_with('#'))
                    .ok_or(ScriptParseError::MissingCommand { line_no })?;
                let step = ScriptStep::from_marker(line_no, marker, command.to_string())?;
                let expected = script.steps.len() + 1;
                if step.ordinal != expected {
                    return Err(ScriptParseError::BadOrdinal {
                        line_no,
                        expected,
                        found: step.ordinal,
                    });
                }
                script.steps.push(step);
            } else if let Some(flags) = line.strip_prefix("set -") {
                script.allow_errors = !flags.contains('e');
            } else if line.starts_with('#') {
                continue;
            } else {
                return Err(ScriptParseError::UnlabelledCommand {
                    line_no,
                    line: line.to_string(),
                });
            }
        }
        Ok(script)
    }

    pub fn read(path: &Path) -> Result<CommandScript, ScriptReadError> {
        let text = std::fs::read_to_string(path).map_err(|source| ScriptReadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(CommandScript::parse(&text)?)
    }

    /// Write the script and make it executable by the user and group.
    pub fn write(&self, path: &Path) -> Result<(), std::io::Error> {
        std::fs::write(path, self.render())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(path)?.permissions();
            perms.set_mode(perms.mode() | 0o110);
            std::fs::set_permissions(path, perms)?;
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ScriptReadError {
    #[error("Couldn't read script '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ScriptParseError),
}
