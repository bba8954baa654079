// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! `pipetask run` and `butler` commands against a Butler repository.
//!
//! Identifier expressions are translated into `-d` queries with the
//! dimension table in [`Gen3Settings`]; config overrides are labelled with
//! the pipeline task they apply to unless they already carry a label.

use std::path::Path;

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::{CommandOptions, Dialect, DialectError, DialectType};
use crate::{
    constants::{
        BUTLER, CERTIFY_DATE_FORMAT, DEFAULT_CALIB_COLLECTION, DEFAULT_INPUTS,
        DEFAULT_INSTRUMENT, DEFAULT_PIPELINE_DIR, GROUP_PREFIX, PIPETASK,
    },
    idset::{default_dimension_table, sql_all, sql_any, sql_quote_literal, DimensionTable, IdFilter},
    resolve::{
        Detector, GroupInput, ResolvedInit, ResolvedInputs, ResolvedPipeline, ResolvedStage,
        ResolvedStep,
    },
    script::{GlobTail, ShellCommand},
    spec::{override_key, CommandConfig},
};

/// Where the Butler repository is and what to read from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gen3Settings {
    /// The Butler repository; the data directory if not given.
    pub butler_config: Option<String>,

    pub instrument: String,

    /// Input collections of every `pipetask run`.
    pub inputs: Vec<String>,

    /// The calibration collection products are certified into.
    pub calib_collection: String,

    /// Directory holding `<stage>.yaml` pipeline definitions. Environment
    /// variables are left for `pipetask` to expand.
    pub pipeline_dir: String,

    /// How legacy identifier keys map onto query dimensions.
    pub dimensions: DimensionTable,
}

impl Default for Gen3Settings {
    fn default() -> Self {
        Gen3Settings {
            butler_config: None,
            instrument: DEFAULT_INSTRUMENT.to_string(),
            inputs: DEFAULT_INPUTS.iter().map(|s| s.to_string()).collect(),
            calib_collection: DEFAULT_CALIB_COLLECTION.to_string(),
            pipeline_dir: DEFAULT_PIPELINE_DIR.to_string(),
            dimensions: default_dimension_table(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Gen3 {
    settings: Gen3Settings,
}

/// The parts of a `pipetask run` that differ between commands.
struct PipetaskRun<'a> {
    label: &'a str,
    run: &'a str,
    inputs: Vec<String>,
    query: String,
    config: &'a CommandConfig,
}

impl Gen3 {
    pub fn new(settings: Gen3Settings) -> Gen3 {
        Gen3 { settings }
    }

    pub fn settings(&self) -> &Gen3Settings {
        &self.settings
    }

    fn repo(&self, opts: &CommandOptions) -> String {
        self.settings
            .butler_config
            .clone()
            .unwrap_or_else(|| opts.data_dir.clone())
    }

    /// The directory holding the repository's runs.
    fn repo_root(&self, opts: &CommandOptions) -> String {
        let repo = self.repo(opts);
        let path = Path::new(&repo);
        match (path.extension(), path.parent()) {
            (Some(ext), Some(parent)) if ext == "yaml" => parent.display().to_string(),
            _ => repo,
        }
    }

    /// The query for a set of identifiers, restricted to our instrument.
    fn query(&self, filters: &[&IdFilter], context: &str) -> Result<String, DialectError> {
        let mut alternatives = Vec::with_capacity(filters.len());
        for filter in filters {
            let query = filter
                .to_where(&self.settings.dimensions)
                .map_err(|source| DialectError::Expression {
                    context: context.to_string(),
                    source,
                })?;
            alternatives.push(query);
        }
        Ok(sql_all(&[
            format!(
                "instrument = {}",
                sql_quote_literal(&self.settings.instrument)
            ),
            sql_any(&alternatives),
        ]))
    }

    fn pipetask(&self, run: PipetaskRun, opts: &CommandOptions) -> ShellCommand {
        let mut cmd = ShellCommand::new(PIPETASK);
        cmd.arg("run")
            .arg("-b")
            .arg(self.repo(opts))
            .arg("-i")
            .arg(run.inputs.join(","))
            .arg("-o")
            .arg(run.run)
            .arg("-p")
            .arg(format!("{}/{}.yaml", self.settings.pipeline_dir, run.label))
            .arg("-d")
            .arg(run.query);
        if let Some(configfile) = &run.config.configfile {
            cmd.arg("-C").arg(format!("{}:{configfile}", run.label));
        }
        for o in &run.config.overrides {
            cmd.arg("-c").arg(labelled(run.label, o));
        }
        cmd.arg("-j")
            .arg(opts.processes.to_string())
            .arg("--register-dataset-types");
        if !opts.allow_errors {
            cmd.arg("--fail-fast");
        }
        if opts.devel {
            cmd.arg("--clobber-outputs");
        }
        cmd
    }

    fn unsupported(&self, feature: &str) -> DialectError {
        DialectError::Unsupported {
            dialect: DialectType::Gen3.into(),
            feature: feature.to_string(),
        }
    }
}

/// Overrides apply to the task named by `label` unless they name one.
fn labelled(label: &str, o: &str) -> String {
    if override_key(o).contains(':') {
        o.to_string()
    } else {
        format!("{label}:{o}")
    }
}

fn certify_range(date: NaiveDate, validity: u32) -> Result<(String, String), DialectError> {
    let out_of_range = || DialectError::DateOutOfRange {
        date: date.to_string(),
        validity,
    };
    let reference = date.and_time(NaiveTime::MIN);
    let days = Duration::days(i64::from(validity));
    let begin = reference
        .checked_sub_signed(days)
        .ok_or_else(out_of_range)?;
    let end = reference
        .checked_add_signed(days)
        .ok_or_else(out_of_range)?;
    Ok((
        begin.format(CERTIFY_DATE_FORMAT).to_string(),
        end.format(CERTIFY_DATE_FORMAT).to_string(),
    ))
}

impl Dialect for Gen3 {
    fn get_dialect_type(&self) -> DialectType {
        DialectType::Gen3
    }

    fn science_rerun(&self, rerun: &str, block: &str) -> String {
        format!("{rerun}/{block}")
    }

    fn init_ingest(
        &self,
        _init: &ResolvedInit,
        _opts: &CommandOptions,
    ) -> Result<ShellCommand, DialectError> {
        Err(self.unsupported("ingesting initial detector maps (use 'butler ingest-files')"))
    }

    fn construct(
        &self,
        stage: &ResolvedStage,
        rerun: &str,
        opts: &CommandOptions,
    ) -> Result<Vec<ShellCommand>, DialectError> {
        let label = stage.kind.to_string();
        let context = format!("stage '{label}'");

        match &stage.inputs {
            ResolvedInputs::Single {
                id,
                norm_id,
                config,
            } => {
                if norm_id.is_some() {
                    return Err(self.unsupported("normId"));
                }
                let run = PipetaskRun {
                    label: &label,
                    run: rerun,
                    inputs: self.settings.inputs.clone(),
                    query: self.query(&[id], &context)?,
                    config,
                };
                Ok(vec![self.pipetask(run, opts)])
            }

            ResolvedInputs::Groups(groups) => {
                let mut commands = Vec::with_capacity(groups.len());
                for (i, group) in groups.iter().enumerate() {
                    let context = format!("{context}, {GROUP_PREFIX} {i}");
                    let (run_name, query) = match &group.input {
                        GroupInput::Profiles { id } => {
                            (self.group_rerun(rerun, i), self.query(&[id], &context)?)
                        }
                        GroupInput::Bootstrap { flat_id, arc_id } => (
                            rerun.to_string(),
                            self.query(&[flat_id, arc_id], &context)?,
                        ),
                    };
                    let run = PipetaskRun {
                        label: &label,
                        run: &run_name,
                        inputs: self.settings.inputs.clone(),
                        query,
                        config: &group.config,
                    };
                    commands.push(self.pipetask(run, opts));
                }
                Ok(commands)
            }
        }
    }

    fn combine(
        &self,
        stage: &ResolvedStage,
        rerun: &str,
        detector: Detector,
        opts: &CommandOptions,
    ) -> Result<(ShellCommand, GlobTail), DialectError> {
        let inputs = (0..stage.num_groups())
            .map(|i| self.group_rerun(rerun, i))
            .collect();
        let context = format!("{} combine for {detector}", stage.kind);
        let detector_filter = IdFilter::parse(&[
            format!("arm={}", detector.arm),
            format!("spectrograph={}", detector.spectrograph),
        ])
        .map_err(|source| DialectError::Expression {
            context: context.clone(),
            source,
        })?;
        let query = self.query(&[&detector_filter], &context)?;
        let label = format!("combine{}", capitalise(&stage.kind.to_string()));
        let config = CommandConfig::default();
        let cmd = self.pipetask(
            PipetaskRun {
                label: &label,
                run: rerun,
                inputs,
                query,
                config: &config,
            },
            opts,
        );

        let requires = GlobTail::new(
            format!("{}/{rerun}", self.repo_root(opts)),
            format!(
                "{GROUP_PREFIX}*/{}/*/*_{detector}_*.fits",
                stage.kind.dataset_type()
            ),
        );
        Ok((cmd, requires))
    }

    fn certify(
        &self,
        stage: &ResolvedStage,
        rerun: &str,
        opts: &CommandOptions,
    ) -> Result<ShellCommand, DialectError> {
        let mut cmd = ShellCommand::new(BUTLER);
        cmd.arg("certify-calibrations")
            .arg(self.repo(opts))
            .arg(rerun)
            .arg(self.settings.calib_collection.as_str())
            .arg(stage.kind.dataset_type());
        if let Some(date) = opts.calib_date {
            let (begin, end) = certify_range(date, stage.validity)?;
            cmd.arg("--begin-date").arg(begin).arg("--end-date").arg(end);
        }
        Ok(cmd)
    }

    /// Only the per-group scratch runs can go; the stage's own run holds the
    /// certified products.
    fn cleanup(
        &self,
        stage: &ResolvedStage,
        rerun: &str,
        opts: &CommandOptions,
    ) -> Option<ShellCommand> {
        if !stage.needs_combine() {
            return None;
        }
        let mut cmd = ShellCommand::new(BUTLER);
        cmd.arg("remove-runs")
            .arg(self.repo(opts))
            .arg(format!("{rerun}/{GROUP_PREFIX}*"))
            .arg("--no-confirm")
            .arg("--force");
        Some(cmd)
    }

    fn science_step(
        &self,
        pipeline: &ResolvedPipeline,
        step: &ResolvedStep,
        rerun: &str,
        opts: &CommandOptions,
    ) -> Result<ShellCommand, DialectError> {
        let label = step.step.to_string();
        let context = format!("scienceBlock '{}', step '{label}'", pipeline.name);
        let run = PipetaskRun {
            label: &label,
            run: rerun,
            inputs: self.settings.inputs.clone(),
            query: self.query(&[&pipeline.id], &context)?,
            config: &step.config,
        };
        Ok(self.pipetask(run, opts))
    }
}

fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
