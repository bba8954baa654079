// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::idset::IdSetError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DialectError {
    #[error("The {dialect} dialect doesn't support {feature}")]
    Unsupported {
        dialect: &'static str,
        feature: String,
    },

    #[error("{context}: {source}")]
    Expression {
        context: String,
        source: IdSetError,
    },

    #[error("The validity range of {validity} days around {date} can't be represented")]
    DateOutOfRange { date: String, validity: u32 },
}
