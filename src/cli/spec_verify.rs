// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Code to verify specification files.

use std::path::{Path, PathBuf};

use clap::Parser;
use itertools::Itertools;
use log::info;

use crate::{
    resolve::{resolve_calib_block, resolve_science_block, GroupInput, ResolvedInputs},
    spec::{CommandConfig, SpecFile},
    Pipe2dError,
};

/// Verify that specification files can be read, and summarise them.
#[derive(Parser, Debug)]
pub(super) struct SpecVerifyArgs {
    /// Path to the specification file(s) to be verified.
    #[clap(name = "SPEC_FILES", parse(from_os_str), required = true)]
    pub(super) spec_files: Vec<PathBuf>,
}

impl SpecVerifyArgs {
    /// Every file is checked, even after one fails.
    pub(super) fn run(&self) -> Result<(), Pipe2dError> {
        let num_failed = self
            .spec_files
            .iter()
            .filter(|f| !verify(f.as_path()))
            .count();
        if num_failed > 0 {
            return Err(Pipe2dError::Spec(format!(
                "{num_failed} of {} specification file(s) couldn't be verified",
                self.spec_files.len()
            )));
        }
        Ok(())
    }
}

fn overrides(config: &CommandConfig) -> String {
    let mut s = format!("{} override(s)", config.overrides.len());
    if let Some(f) = &config.configfile {
        s.push_str(&format!(", configfile {f}"));
    }
    s
}

/// Print a summary of one specification file. Errors are printed rather than
/// returned.
fn verify(path: &Path) -> bool {
    info!("{}:", path.display());
    let spec = match SpecFile::read(path) {
        Ok(s) => s,
        Err(e) => {
            info!("    {e}");
            info!("");
            return false;
        }
    };

    if let Some(init) = &spec.init {
        info!(
            "    init: {} detector map(s) from {}",
            init.arms.len(),
            init.dir_name
        );
    }

    for block in &spec.calib_blocks {
        info!("    calibBlock '{}'", block.name);
        for stage in resolve_calib_block(block, None).stages {
            match &stage.inputs {
                ResolvedInputs::Single { id, norm_id, config } => {
                    info!("        {}: {id} ({})", stage.kind, overrides(config));
                    if let Some(norm_id) = norm_id {
                        info!("            normalised by {norm_id}");
                    }
                }
                ResolvedInputs::Groups(groups) => {
                    info!("        {}: {} group(s)", stage.kind, groups.len());
                    for (i, group) in groups.iter().enumerate() {
                        let ids = match &group.input {
                            GroupInput::Profiles { id } => id.to_string(),
                            GroupInput::Bootstrap { flat_id, arc_id } => {
                                format!("flat {flat_id}, arc {arc_id}")
                            }
                        };
                        info!("            {i}: {ids} ({})", overrides(&group.config));
                    }
                }
            }
            info!("            valid for {} day(s)", stage.validity);
        }
    }

    for block in &spec.science_blocks {
        let pipeline = resolve_science_block(block, None);
        info!("    scienceBlock '{}': {}", block.name, pipeline.id);
        info!(
            "        {}",
            pipeline.steps.iter().map(|s| s.step).join(" -> ")
        );
        for step in pipeline.steps.iter().filter(|s| !s.config.is_empty()) {
            info!("        {}: {}", step.step, overrides(&step.config));
        }
    }

    if spec.is_empty() {
        info!("    (nothing to do)");
    }
    info!("");
    true
}
