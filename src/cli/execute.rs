// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Run a script written by `generate-commands`.

use std::path::PathBuf;

use clap::Parser;
use itertools::Itertools;
use log::{debug, info, warn};

use super::common::{display_warnings, InfoPrinter, Warn};
use crate::{execute::ShellRunner, params::ExecuteParams, script::CommandScript, Pipe2dError};

#[derive(Parser, Debug, Clone)]
pub(super) struct ExecuteArgs {
    /// The command script to run.
    #[clap(name = "SCRIPT", parse(from_os_str))]
    pub(super) script: PathBuf,
}

impl ExecuteArgs {
    pub(super) fn run(self, dry_run: bool) -> Result<(), Pipe2dError> {
        debug!("Reading script '{}'", self.script.display());
        let script = CommandScript::read(&self.script)?;

        let mut printer = InfoPrinter::new(format!("Executing '{}'", self.script.display()).into());
        let num_blocks = script
            .steps
            .iter()
            .filter_map(|s| s.label.block.as_deref())
            .unique()
            .count();
        printer.push_line(format!("{} step(s) from {num_blocks} block(s)", script.len()).into());
        let num_guarded = script.steps.iter().filter(|s| s.requires.is_some()).count();
        if num_guarded > 0 {
            printer.push_line(
                format!("{num_guarded} step(s) are skipped if they have no inputs").into(),
            );
        }
        printer.display();
        if script.is_empty() {
            "The script has no steps".warn();
        }
        display_warnings();

        if dry_run {
            for step in &script.steps {
                info!("{:>4} {} ({})", step.ordinal, step.label, step.kind);
            }
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        let params = ExecuteParams {
            script,
            path: self.script,
        };
        let skipped = params.run(&mut ShellRunner)?;
        if !skipped.is_empty() {
            warn!(
                "Skipped step(s) with no inputs: {}",
                skipped.iter().join(", ")
            );
        }
        Ok(())
    }
}
