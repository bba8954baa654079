// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Errors from reading back a generated command script.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptParseError {
    #[error("Unterminated quote in '{0}'")]
    UnterminatedQuote(String),

    #[error("Trailing backslash in '{0}'")]
    TrailingEscape(String),

    #[error("Line {line_no}: malformed step marker ({reason})")]
    BadMarker { line_no: usize, reason: String },

    #[error("Line {line_no}: step marker isn't followed by a command")]
    MissingCommand { line_no: usize },

    #[error("Line {line_no}: command '{line}' has no step marker; was this script generated by pipe2d?")]
    UnlabelledCommand { line_no: usize, line: String },

    #[error("Line {line_no}: expected step {expected}, but the marker says {found}")]
    BadOrdinal {
        line_no: usize,
        expected: usize,
        found: usize,
    },
}
