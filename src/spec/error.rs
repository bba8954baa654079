// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use thiserror::Error;

use crate::idset::IdSetError;

/// Errors from reading a specification file. `context` fields name the block
/// and stage, e.g. "calibBlock 'weekly', stage 'bias'".
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("Couldn't read specification file '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't decode the YAML of {context}: {source}")]
    Yaml {
        context: String,
        source: serde_yaml::Error,
    },

    #[error("{context} must be {expected}")]
    WrongType {
        context: String,
        expected: &'static str,
    },

    #[error("Unknown top-level key '{0}'; valid keys are 'init', 'calibBlock' and 'scienceBlock'")]
    UnknownTopLevelKey(String),

    #[error("{kind} #{index} has no 'name'")]
    MissingName { kind: &'static str, index: usize },

    #[error("There is more than one {kind} named '{name}'")]
    DuplicateBlock { kind: &'static str, name: String },

    #[error("calibBlock '{block}' has an unknown stage '{key}'; valid stages are: {valid}")]
    UnknownStage {
        block: String,
        key: String,
        valid: String,
    },

    #[error("scienceBlock '{block}' has an unknown key '{key}'; valid keys are 'name', 'id' and 'policy'")]
    UnknownBlockKey { block: String, key: String },

    #[error("scienceBlock '{block}' has a policy for unknown step '{key}'; valid steps are: {valid}")]
    UnknownPolicyStep {
        block: String,
        key: String,
        valid: String,
    },

    #[error("{context} has no input: {expected}")]
    MissingStageInput {
        context: String,
        expected: &'static str,
    },

    #[error("{context} uses both 'group' and 'id'/'normId'; only one form may be given")]
    ConflictingStageInput { context: String },

    #[error("{context}: '{value}' must look like 'key=value' (and the key cannot start with '-')")]
    NotKeyValue { context: String, value: String },

    #[error("{context}: {source}")]
    Expression { context: String, source: IdSetError },

    #[error("The init block's arms contain '{0}' more than once")]
    DuplicateArm(String),

    #[error("The init block's detectorMapFmt '{0}' has no '{{arm}}' placeholder")]
    NoArmPlaceholder(String),
}
