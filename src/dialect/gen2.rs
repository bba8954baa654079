// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Flag-style commands for the legacy data butler.

use std::path::Path;

use super::{legacy_config_args, CommandOptions, Dialect, DialectError, DialectType};
use crate::{
    constants::{
        COMBINE_PROFILES_TASK, DEFAULT_CALIB_VALIDITY, DEVEL_OPTIONS, GROUP_PREFIX,
        INGEST_CALIBS_TASK,
    },
    resolve::{
        Detector, GroupInput, ResolvedInit, ResolvedInputs, ResolvedPipeline, ResolvedStage,
        ResolvedStep,
    },
    script::{GlobTail, ShellCommand},
    spec::CalibType,
};

/// Commands for tasks taking `--calib`, `--rerun` and `--id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gen2;

impl Gen2 {
    /// The common start of every task command line.
    fn task(&self, program: &str, rerun: &str, opts: &CommandOptions) -> ShellCommand {
        let mut cmd = ShellCommand::new(program);
        cmd.arg(opts.data_dir.as_str())
            .arg(format!("--calib={}", opts.calib))
            .arg(format!("--rerun={rerun}"))
            .arg("--longlog=1");
        cmd
    }

    /// Batch-pool tasks are told how to parallelise with `--batch-type`; the
    /// rest take `-j`.
    fn parallelism(&self, kind: Option<CalibType>, processes: usize) -> Vec<String> {
        match kind {
            Some(kind) if kind.is_batch_pool_task() => {
                if processes > 1 {
                    vec!["--batch-type=smp".to_string(), format!("--cores={processes}")]
                } else {
                    vec!["--batch-type=none".to_string()]
                }
            }
            _ => vec![format!("-j{processes}")],
        }
    }

    fn mode_args(&self, opts: &CommandOptions) -> Vec<String> {
        let mut args = vec![];
        if !opts.allow_errors {
            args.push("--doraise".to_string());
        }
        if opts.devel {
            args.extend(DEVEL_OPTIONS.iter().map(|o| o.to_string()));
        }
        args
    }

    fn rerun_dir(&self, rerun: &str, opts: &CommandOptions) -> String {
        Path::new(&opts.data_dir)
            .join("rerun")
            .join(rerun)
            .display()
            .to_string()
    }
}

impl Dialect for Gen2 {
    fn get_dialect_type(&self) -> DialectType {
        DialectType::Gen2
    }

    fn science_rerun(&self, rerun: &str, _block: &str) -> String {
        format!("{rerun}/pipeline")
    }

    fn init_ingest(
        &self,
        init: &ResolvedInit,
        opts: &CommandOptions,
    ) -> Result<ShellCommand, DialectError> {
        let mut cmd = ShellCommand::new(INGEST_CALIBS_TASK);
        cmd.arg(opts.data_dir.as_str())
            .arg(format!("--output={}", opts.calib))
            .arg(format!("--validity={DEFAULT_CALIB_VALIDITY}"))
            .arg("--create")
            .arg("--longlog=1")
            .arg("--mode=copy");
        if !opts.allow_errors {
            cmd.arg("--doraise");
        }
        cmd.arg("--")
            .args(init.detector_maps.iter().map(|p| p.display().to_string()));
        Ok(cmd)
    }

    fn construct(
        &self,
        stage: &ResolvedStage,
        rerun: &str,
        opts: &CommandOptions,
    ) -> Result<Vec<ShellCommand>, DialectError> {
        let program = stage.kind.command_name();
        let parallelism = self.parallelism(Some(stage.kind), opts.processes);

        let commands = match &stage.inputs {
            ResolvedInputs::Single {
                id,
                norm_id,
                config,
            } => {
                let mut cmd = self.task(program, rerun, opts);
                cmd.args(parallelism)
                    .args(self.mode_args(opts))
                    .option_list("--id", id.legacy_args())
                    .args(legacy_config_args(config));
                if let Some(norm_id) = norm_id {
                    cmd.option_list("--normId", norm_id.legacy_args());
                }
                vec![cmd]
            }

            ResolvedInputs::Groups(groups) => groups
                .iter()
                .enumerate()
                .map(|(i, group)| {
                    let mut cmd = match &group.input {
                        GroupInput::Profiles { id } => {
                            let mut cmd = self.task(program, &self.group_rerun(rerun, i), opts);
                            cmd.args(parallelism.iter().cloned())
                                .args(self.mode_args(opts))
                                .option_list("--id", id.legacy_args());
                            cmd
                        }
                        // Bootstrap groups each write complete detector maps,
                        // so they share the stage's rerun.
                        GroupInput::Bootstrap { flat_id, arc_id } => {
                            let mut cmd = self.task(program, rerun, opts);
                            cmd.args(parallelism.iter().cloned())
                                .args(self.mode_args(opts))
                                .option_list("--flatId", flat_id.legacy_args())
                                .option_list("--arcId", arc_id.legacy_args());
                            cmd
                        }
                    };
                    cmd.args(legacy_config_args(&group.config));
                    cmd
                })
                .collect(),
        };
        Ok(commands)
    }

    fn combine(
        &self,
        stage: &ResolvedStage,
        rerun: &str,
        detector: Detector,
        opts: &CommandOptions,
    ) -> Result<(ShellCommand, GlobTail), DialectError> {
        let stage_dir = self.rerun_dir(rerun, opts);
        let subdir = stage.kind.output_subdir();
        let inputs = GlobTail::new(
            stage_dir.as_str(),
            format!("{GROUP_PREFIX}*/{subdir}/*-{detector}.fits"),
        );

        let mut cmd = ShellCommand::new(COMBINE_PROFILES_TASK);
        cmd.arg(format!(
            "--output={stage_dir}/{subdir}/pfsFiberProfiles-{detector}.fits"
        ))
        .arg("--")
        .glob_tail(inputs.clone());
        Ok((cmd, inputs))
    }

    fn certify(
        &self,
        stage: &ResolvedStage,
        rerun: &str,
        opts: &CommandOptions,
    ) -> Result<ShellCommand, DialectError> {
        let mut cmd = ShellCommand::new(INGEST_CALIBS_TASK);
        cmd.arg(opts.data_dir.as_str())
            .arg(format!("--output={}", opts.calib))
            .arg(format!("--validity={}", stage.validity))
            .arg("--longlog=1")
            .arg(format!("--mode={}", opts.copy_mode));
        // Ingestion follows --allow-errors like the tasks that built the products.
        if !opts.allow_errors {
            cmd.arg("--doraise");
        }
        if opts.overwrite_calib || stage.kind.always_overwrite() {
            cmd.arg("--config").arg("clobber=True");
        }
        cmd.arg("--").glob_tail(GlobTail::new(
            format!("{}/{}", self.rerun_dir(rerun, opts), stage.kind.output_subdir()),
            "*.fits",
        ));
        Ok(cmd)
    }

    fn cleanup(
        &self,
        _stage: &ResolvedStage,
        rerun: &str,
        opts: &CommandOptions,
    ) -> Option<ShellCommand> {
        let mut cmd = ShellCommand::new("rm");
        cmd.arg("-r").arg("-f").arg(self.rerun_dir(rerun, opts));
        Some(cmd)
    }

    fn science_step(
        &self,
        pipeline: &ResolvedPipeline,
        step: &ResolvedStep,
        rerun: &str,
        opts: &CommandOptions,
    ) -> Result<ShellCommand, DialectError> {
        let mut cmd = self.task(step.step.command_name(), rerun, opts);
        cmd.args(self.parallelism(None, opts.processes))
            .args(self.mode_args(opts))
            .option_list("--id", pipeline.id.legacy_args())
            .args(legacy_config_args(&step.config));
        Ok(cmd)
    }
}
