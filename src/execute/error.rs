// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecuteError {
    #[error("Step {ordinal} ({label}): couldn't start '{command}': {source}")]
    Spawn {
        ordinal: usize,
        label: String,
        command: String,
        source: std::io::Error,
    },

    #[error("Step {ordinal} ({label}) failed with exit code {code}: {command}")]
    SubprocessFailure {
        ordinal: usize,
        label: String,
        command: String,
        code: i32,
    },

    #[error("Step {ordinal}: '{pattern}' is not a valid file pattern: {message}")]
    BadPattern {
        ordinal: usize,
        pattern: String,
        message: String,
    },

    #[error("This execution has already been started (state {0})")]
    NotPending(String),
}

impl ExecuteError {
    /// The exit code the driver should exit with.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecuteError::SubprocessFailure { code, .. } => *code,
            _ => 1,
        }
    }
}
