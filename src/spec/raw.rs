// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The shapes of stage-level YAML, before validation. Blocks themselves are
//! dispatched by hand so that unknown keys can be reported with the block's
//! name.

use serde::Deserialize;

/// A string or a list of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub(super) fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawStage {
    pub(super) id: Option<OneOrMany>,
    pub(super) config: Option<OneOrMany>,
    pub(super) configfile: Option<String>,
    pub(super) validity: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawFiberProfiles {
    pub(super) id: Option<OneOrMany>,
    #[serde(rename = "normId")]
    pub(super) norm_id: Option<OneOrMany>,
    pub(super) group: Option<Vec<RawProfileGroup>>,
    pub(super) config: Option<OneOrMany>,
    pub(super) configfile: Option<String>,
    pub(super) validity: Option<u32>,
}

/// A fiber-profiles group is either just identifiers, or identifiers with
/// their own configuration.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum RawProfileGroup {
    Ids(OneOrMany),
    Full(RawProfileGroupFull),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawProfileGroupFull {
    pub(super) id: Option<OneOrMany>,
    pub(super) config: Option<OneOrMany>,
    pub(super) configfile: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawBootstrap {
    pub(super) group: Option<Vec<RawBootstrapGroup>>,
    pub(super) config: Option<OneOrMany>,
    pub(super) configfile: Option<String>,
    pub(super) validity: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawBootstrapGroup {
    #[serde(rename = "flatId")]
    pub(super) flat_id: Option<OneOrMany>,
    #[serde(rename = "arcId")]
    pub(super) arc_id: Option<OneOrMany>,
    pub(super) config: Option<OneOrMany>,
    pub(super) configfile: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawPolicy {
    pub(super) config: Option<OneOrMany>,
    pub(super) configfile: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct RawInit {
    #[serde(rename = "dirName")]
    pub(super) dir_name: String,
    pub(super) arms: OneOrMany,
    #[serde(rename = "detectorMapFmt")]
    pub(super) detector_map_fmt: String,
}
