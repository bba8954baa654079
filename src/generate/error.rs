// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::{dialect::DialectError, resolve::ResolveError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerateError {
    #[error("Initial calibs were requested, but the specification has no 'init' block")]
    NoInitBlock,

    #[error("Unknown block(s) {unknown}; known blocks are: {known}. Use --force to skip them")]
    UnknownBlocks { unknown: String, known: String },

    #[error("Cleaning up after linking calibs would remove the linked files; use another copy mode")]
    CleanWithLink,

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Block '{block}': {source}")]
    Dialect { block: String, source: DialectError },
}
