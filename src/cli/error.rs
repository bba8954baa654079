// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all pipe2d-related errors. This should be the *only* error
//! enum that is publicly visible from the CLI.

use thiserror::Error;

use super::generate_commands::GenerateCommandsArgsError;
use crate::{
    dialect::DialectError,
    execute::ExecuteError,
    generate::GenerateError,
    idset::IdSetError,
    params::GenerateCommandsError,
    resolve::ResolveError,
    script::ScriptReadError,
    spec::SpecError,
};

const SPEC_HINT: &str = "Running 'pipe2d spec-verify' on the specification file may help.";

/// The *only* publicly visible error from the pipe2d CLI.
#[derive(Error, Debug)]
pub enum Pipe2dError {
    /// The specification file couldn't be read or has the wrong structure.
    #[error("{0}\n\n{SPEC_HINT}")]
    Spec(String),

    /// An identifier-set expression is malformed or can't be translated.
    #[error("{0}\n\n{SPEC_HINT}")]
    Expression(String),

    /// Commands couldn't be generated from otherwise-valid inputs.
    #[error("{0}")]
    Generate(String),

    /// A step of a script failed (or never started).
    #[error("{message}")]
    Execute { message: String, code: i32 },

    /// An error related to argument files.
    #[error("{0}")]
    ArgFile(String),

    /// A generic error that can't be clarified further, e.g. IO errors.
    #[error("{0}")]
    Generic(String),
}

impl Pipe2dError {
    /// The failing subprocess's exit code, or 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Pipe2dError::Execute { code, .. } => *code,
            _ => 1,
        }
    }
}

// When changing the error propagation below, ensure `Self::from(e)` uses the
// correct `e`!

impl From<SpecError> for Pipe2dError {
    fn from(e: SpecError) -> Self {
        let s = e.to_string();
        match e {
            SpecError::Expression { .. } => Self::Expression(s),
            SpecError::Io { .. } => Self::Generic(s),
            _ => Self::Spec(s),
        }
    }
}

impl From<IdSetError> for Pipe2dError {
    fn from(e: IdSetError) -> Self {
        Self::Expression(e.to_string())
    }
}

impl From<ResolveError> for Pipe2dError {
    fn from(e: ResolveError) -> Self {
        Self::Generate(e.to_string())
    }
}

impl From<DialectError> for Pipe2dError {
    fn from(e: DialectError) -> Self {
        let s = e.to_string();
        match e {
            DialectError::Expression { .. } => Self::Expression(s),
            DialectError::Unsupported { .. } | DialectError::DateOutOfRange { .. } => {
                Self::Generate(s)
            }
        }
    }
}

impl From<GenerateError> for Pipe2dError {
    fn from(e: GenerateError) -> Self {
        let s = e.to_string();
        match e {
            GenerateError::Dialect {
                source: DialectError::Expression { .. },
                ..
            } => Self::Expression(s),
            _ => Self::Generate(s),
        }
    }
}

impl From<GenerateCommandsError> for Pipe2dError {
    fn from(e: GenerateCommandsError) -> Self {
        match e {
            GenerateCommandsError::Generate(e) => Self::from(e),
            GenerateCommandsError::Write { .. } => Self::Generic(e.to_string()),
        }
    }
}

impl From<GenerateCommandsArgsError> for Pipe2dError {
    fn from(e: GenerateCommandsArgsError) -> Self {
        Self::Generate(e.to_string())
    }
}

impl From<ScriptReadError> for Pipe2dError {
    fn from(e: ScriptReadError) -> Self {
        let s = e.to_string();
        match e {
            ScriptReadError::Io { .. } => Self::Generic(s),
            ScriptReadError::Parse(_) => Self::Execute {
                message: format!("{s}\n\nWas this script written by 'pipe2d generate-commands'?"),
                code: 1,
            },
        }
    }
}

impl From<ExecuteError> for Pipe2dError {
    fn from(e: ExecuteError) -> Self {
        Self::Execute {
            message: e.to_string(),
            code: e.exit_code(),
        }
    }
}

impl From<std::io::Error> for Pipe2dError {
    fn from(e: std::io::Error) -> Self {
        Self::Generic(e.to_string())
    }
}
