// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Errors from parsing identifier-set expressions or rendering them into a
/// query dialect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdSetError {
    #[error("Identifier expression '{0}' must look like 'key=value' (and the key cannot start with '-')")]
    NotKeyValue(String),

    #[error("Identifier expression '{0}' has nothing after '='")]
    EmptyValue(String),

    #[error("Identifier expression '{expr}' has an empty set term at position {position}; is there a stray '^'?")]
    EmptyTerm { expr: String, position: usize },

    #[error("Identifier expression '{expr}' has a malformed range '{term}'; expected 'start..stop' or 'start..stop:step'")]
    MalformedRange { expr: String, term: String },

    #[error("Identifier expression '{expr}' has an invalid step in '{term}'; steps must be non-zero integers with integer bounds")]
    BadStep { expr: String, term: String },

    #[error("Dimension '{dimension}' (from '{expr}') is not known to the query dialect; known dimensions are: {known}")]
    UnknownDimension {
        dimension: String,
        expr: String,
        known: String,
    },

    #[error("'{value}' in '{expr}' is not a valid {kind} for dimension '{dimension}'")]
    WrongValueType {
        value: String,
        expr: String,
        dimension: String,
        kind: &'static str,
    },

    #[error("The stepped range '{term}' in '{expr}' selects more than {max} values")]
    TooManyValues {
        expr: String,
        term: String,
        max: usize,
    },

    #[error("The stepped range '{term}' in '{expr}' selects nothing")]
    EmptyRange { expr: String, term: String },
}
