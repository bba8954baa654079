// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Turn a specification into a command script.
//!
//! Everything is resolved and every command is built before anything is
//! returned; a specification problem never yields a partial script.

mod error;
#[cfg(test)]
mod tests;

pub use error::GenerateError;

use std::path::Path;

use itertools::Itertools;
use log::{debug, info, warn};
use vec1::Vec1;

use crate::{
    dialect::{CommandOptions, CopyMode, Dialect},
    env::EnvLookup,
    resolve::{
        resolve_calib_block, resolve_init, resolve_science_block, Detector, ResolvedInputs,
    },
    script::{CommandScript, StepKind, StepLabel},
    spec::{CalibBlock, CalibType, ScienceBlock, ScienceStep, SpecFile},
};

/// Everything that controls a generation run, apart from the specification
/// itself and the dialect.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub command: CommandOptions,

    /// Output namespace; calib stages and science blocks get their own
    /// namespaces under it.
    pub rerun: String,

    /// Blocks to process, in order. All blocks if `None`.
    pub blocks: Option<Vec<String>>,

    /// Restrict calib blocks to these types.
    pub calib_types: Option<Vec<CalibType>>,

    /// Restrict science blocks to these steps.
    pub science_steps: Option<Vec<ScienceStep>>,

    /// Ingest the initial detector maps first.
    pub init: bool,

    /// Remove scratch outputs once products are certified.
    pub clean: bool,

    /// Skip unknown blocks rather than failing.
    pub force: bool,

    /// Grouped stages are combined once per detector.
    pub detectors: Vec1<Detector>,
}

/// The blocks selected for processing, calib blocks first.
fn select_blocks<'a>(
    spec: &'a SpecFile,
    opts: &GenerateOptions,
) -> Result<(Vec<&'a CalibBlock>, Vec<&'a ScienceBlock>), GenerateError> {
    let names = match &opts.blocks {
        None => {
            return Ok((
                spec.calib_blocks.iter().collect(),
                spec.science_blocks.iter().collect(),
            ))
        }
        Some(names) => names.iter().unique().collect::<Vec<_>>(),
    };

    let known = spec.block_names();
    let unknown = names
        .iter()
        .filter(|n| !known.contains(&n.as_str()))
        .collect::<Vec<_>>();
    if !unknown.is_empty() {
        if opts.force {
            for name in &unknown {
                warn!("Ignoring unknown block '{name}'");
            }
        } else {
            return Err(GenerateError::UnknownBlocks {
                unknown: unknown.iter().join(", "),
                known: known.join(", "),
            });
        }
    }

    let calib = names.iter().filter_map(|n| spec.calib_block(n)).collect();
    let science = names.iter().filter_map(|n| spec.science_block(n)).collect();
    Ok((calib, science))
}

/// Generate the command script for `spec`.
pub fn generate_script(
    spec: &SpecFile,
    opts: &GenerateOptions,
    dialect: &dyn Dialect,
    env: &dyn EnvLookup,
) -> Result<CommandScript, GenerateError> {
    let cmd_opts = &opts.command;
    if opts.clean && cmd_opts.copy_mode == CopyMode::Link {
        return Err(GenerateError::CleanWithLink);
    }

    let mut script = CommandScript::new(cmd_opts.allow_errors);

    if opts.init {
        let init = spec.init.as_ref().ok_or(GenerateError::NoInitBlock)?;
        let resolved = resolve_init(init, Path::new(&cmd_opts.data_dir), env)?;
        info!("Reading init files from '{}'", resolved.dir.display());
        let cmd = dialect
            .init_ingest(&resolved, cmd_opts)
            .map_err(|source| GenerateError::Dialect {
                block: "init".to_string(),
                source,
            })?;
        script.push(StepLabel::new(None, "init"), StepKind::Ingest, &cmd, None);
    }

    let (calib_blocks, science_blocks) = select_blocks(spec, opts)?;

    for block in calib_blocks {
        info!("Processing calib block '{}'", block.name);
        let dialect_err = |source| GenerateError::Dialect {
            block: block.name.clone(),
            source,
        };

        let resolved = resolve_calib_block(block, opts.calib_types.as_deref());
        for stage in &resolved.stages {
            let rerun = dialect.calib_rerun(&opts.rerun, &block.name, stage.kind);
            let label = StepLabel::new(Some(&block.name), stage.kind.to_string());
            let grouped = matches!(stage.inputs, ResolvedInputs::Groups(_));

            let constructs = dialect
                .construct(stage, &rerun, cmd_opts)
                .map_err(dialect_err)?;
            for (i, cmd) in constructs.iter().enumerate() {
                let label = if grouped {
                    label.clone().with_group(i)
                } else {
                    label.clone()
                };
                script.push(label, StepKind::Construct, cmd, None);
            }

            if stage.needs_combine() {
                for &detector in opts.detectors.iter() {
                    let (cmd, requires) = dialect
                        .combine(stage, &rerun, detector, cmd_opts)
                        .map_err(dialect_err)?;
                    script.push(
                        label.clone().with_detector(detector.to_string()),
                        StepKind::Combine,
                        &cmd,
                        Some(&requires),
                    );
                }
            }

            let cmd = dialect
                .certify(stage, &rerun, cmd_opts)
                .map_err(dialect_err)?;
            script.push(label.clone(), StepKind::Certify, &cmd, None);

            if opts.clean {
                match dialect.cleanup(stage, &rerun, cmd_opts) {
                    Some(cmd) => script.push(label, StepKind::Cleanup, &cmd, None),
                    None => debug!("Nothing to clean up for {label}"),
                }
            }
        }
    }

    for block in science_blocks {
        info!("Processing science block '{}'", block.name);
        let pipeline = resolve_science_block(block, opts.science_steps.as_deref());
        let rerun = dialect.science_rerun(&opts.rerun, &block.name);
        for step in &pipeline.steps {
            let cmd = dialect
                .science_step(&pipeline, step, &rerun, cmd_opts)
                .map_err(|source| GenerateError::Dialect {
                    block: block.name.clone(),
                    source,
                })?;
            script.push(
                StepLabel::new(Some(&block.name), step.step.to_string()),
                StepKind::Science,
                &cmd,
                None,
            );
        }
    }

    debug!("Generated {} command(s)", script.len());
    Ok(script)
}
