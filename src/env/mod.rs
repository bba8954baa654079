// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Environment-variable lookup and expansion.
//!
//! Paths in specification files may refer to environment variables (e.g.
//! `$DRP_STELLA_DATA_DIR/raw`). Rather than reading the process environment
//! directly, everything that expands paths takes an [`EnvLookup`], so that
//! tests can supply their own variables.


use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use regex::{Captures, Regex};
use thiserror::Error;

lazy_static::lazy_static! {
    static ref VAR_REGEX: Regex =
        Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))").unwrap();
}

/// Something that can provide the values of environment variables.
pub trait EnvLookup {
    fn var(&self, name: &str) -> Option<String>;
}

/// The environment of the running process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvLookup for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl<T: EnvLookup + ?Sized> EnvLookup for &T {
    fn var(&self, name: &str) -> Option<String> {
        (**self).var(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvError {
    #[error("Environment variable '{name}' (used in '{template}') is not set")]
    Unset { name: String, template: String },
}

/// Replace `$VAR` and `${VAR}` with their values. Unlike a shell, an unset
/// variable is an error rather than an empty string.
pub fn expand_vars(template: &str, env: &dyn EnvLookup) -> Result<String, EnvError> {
    let mut unset = None;
    let expanded = VAR_REGEX.replace_all(template, |caps: &Captures| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        match env.var(name) {
            Some(v) => v,
            None => {
                unset.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match unset {
        Some(name) => Err(EnvError::Unset {
            name,
            template: template.to_string(),
        }),
        None => Ok(expanded.into_owned()),
    }
}

/// Expand variables in `template`; if the result is relative, it is taken to
/// be relative to `root`.
pub fn resolve_path(template: &str, root: &Path, env: &dyn EnvLookup) -> Result<PathBuf, EnvError> {
    let expanded = PathBuf::from(expand_vars(template, env)?);
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(root.join(expanded))
    }
}
