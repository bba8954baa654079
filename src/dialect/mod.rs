// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Code to abstract over command-line dialects.
//!
//! [`Dialect`] is a trait detailing how resolved stages become concrete
//! command lines. Two dialects exist: [`Gen2`], for the flag-style
//! `--id`/`--rerun` tasks of the legacy data butler, and [`Gen3`], for
//! `pipetask run` and `butler` against a Butler repository. The generator
//! only talks to the trait, so neither the resolver nor the generator knows
//! how a command is spelled.

mod error;
mod gen2;
mod gen3;

pub use error::DialectError;
pub use gen2::Gen2;
pub use gen3::{Gen3, Gen3Settings};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    resolve::{Detector, ResolvedInit, ResolvedPipeline, ResolvedStage, ResolvedStep},
    script::{GlobTail, ShellCommand},
    spec::{CalibType, CommandConfig},
};

/// Supported dialects.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DialectType {
    /// Legacy flag-style tasks.
    #[default]
    Gen2,

    /// `pipetask` and `butler`.
    Gen3,
}

/// How calib products get into the calib repository.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CopyMode {
    Move,
    #[default]
    Copy,
    Link,
    Skip,
}

/// Settings shared by every command of a generation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOptions {
    /// Root of the data repository, as it should appear in commands.
    pub data_dir: String,

    /// The calib repository.
    pub calib: String,

    /// Passed through to the tasks as their number of workers.
    pub processes: usize,

    /// Run without versioning checks (and clobber configs/outputs).
    pub devel: bool,

    /// Let tasks carry on past errors.
    pub allow_errors: bool,

    pub copy_mode: CopyMode,

    /// Replace existing calibs on ingestion.
    pub overwrite_calib: bool,

    /// The reference date for validity ranges on certification.
    pub calib_date: Option<NaiveDate>,
}

impl Default for CommandOptions {
    fn default() -> Self {
        CommandOptions {
            data_dir: ".".to_string(),
            calib: crate::constants::DEFAULT_CALIB_DIR.to_string(),
            processes: crate::constants::DEFAULT_PROCESSES,
            devel: false,
            allow_errors: false,
            copy_mode: CopyMode::default(),
            overwrite_calib: false,
            calib_date: None,
        }
    }
}

/// A trait abstracting how commands are spelled.
pub trait Dialect: Sync + Send {
    /// Get the type of dialect.
    fn get_dialect_type(&self) -> DialectType;

    /// The output namespace of a calib stage.
    fn calib_rerun(&self, rerun: &str, block: &str, kind: CalibType) -> String {
        format!("{rerun}/{block}/{kind}")
    }

    /// The output namespace of a science block.
    fn science_rerun(&self, rerun: &str, block: &str) -> String;

    /// The output namespace of group `index` of a grouped stage.
    fn group_rerun(&self, stage_rerun: &str, index: usize) -> String {
        format!("{stage_rerun}/{}{index}", crate::constants::GROUP_PREFIX)
    }

    /// Ingest the initial detector maps into a new calib repository.
    fn init_ingest(
        &self,
        init: &ResolvedInit,
        opts: &CommandOptions,
    ) -> Result<ShellCommand, DialectError>;

    /// The construction commands of a stage; one per group for grouped
    /// stages.
    fn construct(
        &self,
        stage: &ResolvedStage,
        rerun: &str,
        opts: &CommandOptions,
    ) -> Result<Vec<ShellCommand>, DialectError>;

    /// Merge the per-group outputs of a grouped stage for one detector. The
    /// returned glob selects those outputs; the command is only worth running
    /// if it matches something.
    fn combine(
        &self,
        stage: &ResolvedStage,
        rerun: &str,
        detector: Detector,
        opts: &CommandOptions,
    ) -> Result<(ShellCommand, GlobTail), DialectError>;

    /// Register the products of a stage in the calib repository.
    fn certify(
        &self,
        stage: &ResolvedStage,
        rerun: &str,
        opts: &CommandOptions,
    ) -> Result<ShellCommand, DialectError>;

    /// Remove the scratch outputs of a stage, if the dialect can.
    fn cleanup(
        &self,
        stage: &ResolvedStage,
        rerun: &str,
        opts: &CommandOptions,
    ) -> Option<ShellCommand>;

    /// One step of a science pipeline.
    fn science_step(
        &self,
        pipeline: &ResolvedPipeline,
        step: &ResolvedStep,
        rerun: &str,
        opts: &CommandOptions,
    ) -> Result<ShellCommand, DialectError>;
}

/// Create a dialect object. `gen3` is only used by [`DialectType::Gen3`].
pub fn create_dialect(dialect_type: DialectType, gen3: Gen3Settings) -> Box<dyn Dialect> {
    match dialect_type {
        DialectType::Gen2 => Box::new(Gen2),
        DialectType::Gen3 => Box::new(Gen3::new(gen3)),
    }
}

/// `--configfile=<file> --config k=v ...` in legacy style.
fn legacy_config_args(config: &CommandConfig) -> Vec<String> {
    let mut args = vec![];
    if let Some(configfile) = &config.configfile {
        args.push(format!("--configfile={configfile}"));
    }
    if !config.overrides.is_empty() {
        args.push("--config".to_string());
        args.extend(config.overrides.iter().cloned());
    }
    args
}
