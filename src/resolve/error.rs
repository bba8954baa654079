// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::env::EnvError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("'{0}' is not a detector; detectors look like 'b1', 'r3', 'n2' or 'm4'")]
    BadDetector(String),

    #[error("No detectors to process")]
    NoDetectors,

    #[error(transparent)]
    Env(#[from] EnvError),
}
