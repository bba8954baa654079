// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::Parser;
use itertools::Itertools;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use thiserror::Error;

use super::common::{display_warnings, parse_each, InfoPrinter, Warn, ARG_FILE_HELP};
use crate::{
    constants::{DEFAULT_CALIB_DIR, DEFAULT_PROCESSES, DEFAULT_RERUN},
    dialect::{create_dialect, CommandOptions, CopyMode, DialectType, Gen3Settings},
    env::ProcessEnv,
    generate::GenerateOptions,
    idset::DimensionTable,
    params::GenerateParams,
    resolve::{resolve_detectors, resolve_science_block},
    spec::{CalibType, ScienceStep, SpecFile, CALIB_ORDER, SCIENCE_ORDER},
    Pipe2dError,
};

lazy_static::lazy_static! {
    static ref CALIB_TYPES_HELP: String =
        format!("Only process these calibration types. Always processed in the order: {}", CALIB_ORDER.iter().join(", "));

    static ref SCIENCE_STEPS_HELP: String =
        format!("Only run these science steps. Always run in the order: {}", SCIENCE_ORDER.iter().join(", "));

    static ref COPY_MODE_HELP: String =
        format!("How calibs get into the calib repository. Supported modes: {}. Default: {}", CopyMode::iter().join(", "), CopyMode::default());

    static ref DIALECT_HELP: String =
        format!("The command dialect to generate. Supported dialects: {}. Default: {}", DialectType::iter().join(", "), DialectType::default());

    static ref CALIB_HELP: String =
        format!("The calib repository. Default: <DATA_DIR>/{DEFAULT_CALIB_DIR}");

    static ref PROCESSES_HELP: String =
        format!("The number of processes each task may use. Default: {DEFAULT_PROCESSES}");

    static ref RERUN_HELP: String =
        format!("The output rerun. Calib products go into <RERUN>/<block>/<calibType>. Default: {DEFAULT_RERUN}");
}

#[derive(Parser, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(super) struct GenerateCommandsArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    /// The data repository.
    #[clap(short = 'd', long, parse(from_os_str), help_heading = "INPUT AND OUTPUT")]
    pub(super) data_dir: Option<PathBuf>,

    /// The YAML specification of what to reduce.
    #[clap(short = 's', long, parse(from_os_str), help_heading = "INPUT AND OUTPUT")]
    pub(super) spec_file: Option<PathBuf>,

    /// Where to write the command script.
    #[clap(short = 'o', long, parse(from_os_str), help_heading = "INPUT AND OUTPUT")]
    pub(super) output: Option<PathBuf>,

    #[clap(long, help = CALIB_HELP.as_str(), help_heading = "INPUT AND OUTPUT")]
    pub(super) calib: Option<String>,

    #[clap(long, help = RERUN_HELP.as_str(), help_heading = "INPUT AND OUTPUT")]
    pub(super) rerun: Option<String>,

    /// Only process these blocks, in this order. All calib blocks are always
    /// processed before any science block.
    #[clap(long, multiple_values(true), help_heading = "SELECTION")]
    pub(super) blocks: Option<Vec<String>>,

    #[clap(long, multiple_values(true), help = CALIB_TYPES_HELP.as_str(), help_heading = "SELECTION")]
    pub(super) calib_types: Option<Vec<String>>,

    #[clap(long, multiple_values(true), help = SCIENCE_STEPS_HELP.as_str(), help_heading = "SELECTION")]
    pub(super) science_steps: Option<Vec<String>>,

    /// Detectors that grouped products are combined for, e.g. b1 r1. Default:
    /// the arms of the specification's init block, otherwise every detector.
    #[clap(long, multiple_values(true), help_heading = "SELECTION")]
    pub(super) detectors: Option<Vec<String>>,

    /// Ingest the initial detector maps named by the specification's init
    /// block before anything else.
    #[clap(long, help_heading = "PROCESSING")]
    #[serde(default)]
    pub(super) init: bool,

    /// Remove the working outputs of calib stages once they are ingested.
    #[clap(long, help_heading = "PROCESSING")]
    #[serde(default)]
    pub(super) clean: bool,

    #[clap(long, help = COPY_MODE_HELP.as_str(), help_heading = "PROCESSING")]
    pub(super) copy_mode: Option<String>,

    /// Development mode: don't check versions and clobber configs.
    #[clap(long, help_heading = "PROCESSING")]
    #[serde(default)]
    pub(super) devel: bool,

    /// Carry on despite unknown blocks and a missing calib repository.
    #[clap(long, help_heading = "PROCESSING")]
    #[serde(default)]
    pub(super) force: bool,

    #[clap(short = 'j', long, help = PROCESSES_HELP.as_str(), help_heading = "PROCESSING")]
    pub(super) processes: Option<usize>,

    /// Replace existing calibs when ingesting.
    #[clap(long, help_heading = "PROCESSING")]
    #[serde(default)]
    pub(super) overwrite_calib: bool,

    /// Let tasks and the script carry on after errors.
    #[clap(long, help_heading = "PROCESSING")]
    #[serde(default)]
    pub(super) allow_errors: bool,

    #[clap(long, help = DIALECT_HELP.as_str(), help_heading = "DIALECT")]
    pub(super) dialect: Option<String>,

    /// The reference date (YYYY-MM-DD) of calib validity ranges when
    /// certifying. Without it, certified calibs are valid for all time.
    #[clap(long, help_heading = "DIALECT")]
    pub(super) calib_date: Option<String>,

    /// The Butler repository. Default: the data directory.
    #[clap(long, help_heading = "DIALECT")]
    pub(super) butler_config: Option<String>,

    /// The instrument that every query is restricted to.
    #[clap(long, help_heading = "DIALECT")]
    pub(super) instrument: Option<String>,

    /// The input collections of every pipeline.
    #[clap(long, multiple_values(true), help_heading = "DIALECT")]
    pub(super) inputs: Option<Vec<String>>,

    /// The collection that calibs are certified into.
    #[clap(long, help_heading = "DIALECT")]
    pub(super) calib_collection: Option<String>,

    /// The directory holding pipeline definitions.
    #[clap(long, help_heading = "DIALECT")]
    pub(super) pipeline_dir: Option<String>,

    /// How identifier keys map onto query dimensions. Only settable in an
    /// arguments file.
    #[clap(skip)]
    pub(super) dimensions: Option<DimensionTable>,
}

impl GenerateCommandsArgs {
    /// Both command-line and file arguments overlap in terms of what is
    /// available; this function consolidates everything that was specified into
    /// a single struct. Where applicable, it will prefer CLI parameters over
    /// those in the file.
    ///
    /// This function should only ever merge arguments, and not try to make
    /// sense of them.
    pub(super) fn merge(self) -> Result<GenerateCommandsArgs, Pipe2dError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            // Read in the file arguments. Ensure all of the file args are
            // accounted for by pattern matching.
            let GenerateCommandsArgs {
                args_file: _,
                data_dir,
                spec_file,
                output,
                calib,
                rerun,
                blocks,
                calib_types,
                science_steps,
                detectors,
                init,
                clean,
                copy_mode,
                devel,
                force,
                processes,
                overwrite_calib,
                allow_errors,
                dialect,
                calib_date,
                butler_config,
                instrument,
                inputs,
                calib_collection,
                pipeline_dir,
                dimensions,
            } = unpack_arg_file!(arg_file);

            // Merge all the arguments, preferring the CLI args when available.
            Ok(GenerateCommandsArgs {
                args_file: None,
                data_dir: cli_args.data_dir.or(data_dir),
                spec_file: cli_args.spec_file.or(spec_file),
                output: cli_args.output.or(output),
                calib: cli_args.calib.or(calib),
                rerun: cli_args.rerun.or(rerun),
                blocks: cli_args.blocks.or(blocks),
                calib_types: cli_args.calib_types.or(calib_types),
                science_steps: cli_args.science_steps.or(science_steps),
                detectors: cli_args.detectors.or(detectors),
                init: cli_args.init || init,
                clean: cli_args.clean || clean,
                copy_mode: cli_args.copy_mode.or(copy_mode),
                devel: cli_args.devel || devel,
                force: cli_args.force || force,
                processes: cli_args.processes.or(processes),
                overwrite_calib: cli_args.overwrite_calib || overwrite_calib,
                allow_errors: cli_args.allow_errors || allow_errors,
                dialect: cli_args.dialect.or(dialect),
                calib_date: cli_args.calib_date.or(calib_date),
                butler_config: cli_args.butler_config.or(butler_config),
                instrument: cli_args.instrument.or(instrument),
                inputs: cli_args.inputs.or(inputs),
                calib_collection: cli_args.calib_collection.or(calib_collection),
                pipeline_dir: cli_args.pipeline_dir.or(pipeline_dir),
                dimensions: cli_args.dimensions.or(dimensions),
            })
        } else {
            Ok(cli_args)
        }
    }

    pub(super) fn parse(self) -> Result<GenerateParams, Pipe2dError> {
        trace!("{:#?}", self);

        let GenerateCommandsArgs {
            args_file: _,
            data_dir,
            spec_file,
            output,
            calib,
            rerun,
            blocks,
            calib_types,
            science_steps,
            detectors,
            init,
            clean,
            copy_mode,
            devel,
            force,
            processes,
            overwrite_calib,
            allow_errors,
            dialect,
            calib_date,
            butler_config,
            instrument,
            inputs,
            calib_collection,
            pipeline_dir,
            dimensions,
        } = self;

        let data_dir = data_dir.ok_or(GenerateCommandsArgsError::NoDataDir)?;
        let spec_file = spec_file.ok_or(GenerateCommandsArgsError::NoSpecFile)?;
        let output = output.ok_or(GenerateCommandsArgsError::NoOutput)?;

        let dialect_type = match dialect {
            None => DialectType::default(),
            Some(d) => d.to_lowercase().parse().map_err(|_| {
                GenerateCommandsArgsError::UnknownDialect {
                    got: d,
                    valid: DialectType::iter().join(", "),
                }
            })?,
        };
        let copy_mode = match copy_mode {
            None => CopyMode::default(),
            Some(m) => m.to_lowercase().parse().map_err(|_| {
                GenerateCommandsArgsError::UnknownCopyMode {
                    got: m,
                    valid: CopyMode::iter().join(", "),
                }
            })?,
        };
        let calib_types = calib_types
            .map(|t| parse_each::<CalibType>(&t))
            .transpose()
            .map_err(|got| GenerateCommandsArgsError::UnknownCalibType {
                got,
                valid: CALIB_ORDER.iter().join(", "),
            })?;
        let science_steps = science_steps
            .map(|s| parse_each::<ScienceStep>(&s))
            .transpose()
            .map_err(|got| GenerateCommandsArgsError::UnknownScienceStep {
                got,
                valid: SCIENCE_ORDER.iter().join(", "),
            })?;
        let calib_date = calib_date
            .map(|d| {
                NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                    .map_err(|source| GenerateCommandsArgsError::BadCalibDate { got: d, source })
            })
            .transpose()?;
        let processes = match processes {
            Some(0) => return Err(GenerateCommandsArgsError::ZeroProcesses.into()),
            Some(n) => n,
            None => DEFAULT_PROCESSES,
        };

        if !data_dir.is_dir() {
            format!(
                "The data directory '{}' doesn't exist (yet?)",
                data_dir.display()
            )
            .warn();
        }
        let calib = calib.unwrap_or_else(|| data_dir.join(DEFAULT_CALIB_DIR).display().to_string());
        if dialect_type == DialectType::Gen2 && !Path::new(&calib).exists() {
            if init || force {
                format!("The calib repository '{calib}' doesn't exist (yet?)").warn();
            } else {
                return Err(GenerateCommandsArgsError::NoCalib(calib).into());
            }
        }

        let spec = SpecFile::read(&spec_file)?;
        if spec.is_empty() {
            format!("'{}' doesn't specify anything to do", spec_file.display()).warn();
        }
        let detectors = resolve_detectors(&detectors.unwrap_or_default(), spec.init.as_ref())?;

        let mut gen3 = Gen3Settings::default();
        let gen3_given = butler_config.is_some()
            || instrument.is_some()
            || inputs.is_some()
            || calib_collection.is_some()
            || pipeline_dir.is_some()
            || dimensions.is_some()
            || calib_date.is_some();
        if let Some(b) = butler_config {
            gen3.butler_config = Some(b);
        }
        if let Some(i) = instrument {
            gen3.instrument = i;
        }
        if let Some(i) = inputs {
            gen3.inputs = i;
        }
        if let Some(c) = calib_collection {
            gen3.calib_collection = c;
        }
        if let Some(p) = pipeline_dir {
            gen3.pipeline_dir = p;
        }
        if let Some(d) = dimensions {
            gen3.dimensions = d;
        }
        if gen3_given && dialect_type == DialectType::Gen2 {
            "Butler settings (and --calib-date) are ignored by the gen2 dialect".warn();
        }

        let mut printer = InfoPrinter::new("Generating commands".into());
        printer.push_block(vec![
            format!("Specification: {}", spec_file.display()).into(),
            format!("Data directory: {}", data_dir.display()).into(),
            format!("Calib repository: {calib}").into(),
        ]);
        let mut block = vec![format!("Dialect: {dialect_type}").into()];
        if dialect_type == DialectType::Gen3 {
            block.push(
                format!(
                    "Butler repository: {}",
                    gen3.butler_config
                        .as_deref()
                        .unwrap_or(&data_dir.display().to_string())
                )
                .into(),
            );
            block.push(format!("Inputs: {}", gen3.inputs.join(", ")).into());
        }
        printer.push_block(block);
        let mut block = vec![match &blocks {
            Some(b) => format!("Blocks: {}", b.join(", ")).into(),
            None => format!("Blocks: {}", spec.block_names().join(", ")).into(),
        }];
        if let Some(t) = &calib_types {
            block.push(format!("Calib types: {}", t.iter().join(", ")).into());
        }
        if let Some(s) = &science_steps {
            block.push(format!("Science steps: {}", s.iter().join(", ")).into());
        }
        block.push(format!("Detectors: {}", detectors.iter().join(" ")).into());
        printer.push_block(block);
        let rerun = rerun.unwrap_or_else(|| DEFAULT_RERUN.to_string());
        printer.push_block(vec![
            format!("Rerun: {rerun}").into(),
            format!("Output: {}", output.display()).into(),
        ]);
        printer.display();

        for block in &spec.science_blocks {
            let pipeline = resolve_science_block(block, science_steps.as_deref());
            if pipeline.steps.is_empty() {
                format!("Science block '{}' has no steps to run", block.name).warn();
            }
        }

        Ok(GenerateParams {
            spec,
            options: GenerateOptions {
                command: CommandOptions {
                    data_dir: data_dir.display().to_string(),
                    calib,
                    processes,
                    devel,
                    allow_errors,
                    copy_mode,
                    overwrite_calib,
                    calib_date,
                },
                rerun,
                blocks,
                calib_types,
                science_steps,
                init,
                clean,
                force,
                detectors,
            },
            dialect: create_dialect(dialect_type, gen3),
            output,
        })
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), Pipe2dError> {
        debug!("Converting arguments into parameters");
        let params = self.parse()?;
        display_warnings();

        if dry_run {
            let script = params.generate(&ProcessEnv)?;
            for step in &script.steps {
                info!("{:>4} {} ({})", step.ordinal, step.label, step.kind);
            }
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        params.run(&ProcessEnv)?;
        Ok(())
    }
}

#[derive(Error, Debug)]
pub(super) enum GenerateCommandsArgsError {
    #[error("No data directory was supplied (--data-dir)")]
    NoDataDir,

    #[error("No specification file was supplied (--spec-file)")]
    NoSpecFile,

    #[error("No output file was supplied (--output)")]
    NoOutput,

    #[error("The calib repository '{0}' doesn't exist; use --init to create it, or --force to carry on anyway")]
    NoCalib(String),

    #[error("Unknown dialect '{got}'; supported dialects are: {valid}")]
    UnknownDialect { got: String, valid: String },

    #[error("Unknown copy mode '{got}'; supported modes are: {valid}")]
    UnknownCopyMode { got: String, valid: String },

    #[error("Unknown calib type '{got}'; valid types are: {valid}")]
    UnknownCalibType { got: String, valid: String },

    #[error("Unknown science step '{got}'; valid steps are: {valid}")]
    UnknownScienceStep { got: String, valid: String },

    #[error("Couldn't parse calib date '{got}' (expected YYYY-MM-DD): {source}")]
    BadCalibDate {
        got: String,
        source: chrono::ParseError,
    },

    #[error("The number of processes cannot be 0")]
    ZeroProcesses,
}
