// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use log::info;

use crate::{
    execute::{CommandRunner, ExecuteError, Execution},
    script::CommandScript,
};

pub(crate) struct ExecuteParams {
    pub(crate) script: CommandScript,
    pub(crate) path: PathBuf,
}

impl ExecuteParams {
    /// Run the script's steps in order, stopping at the first failure.
    /// Returns the ordinals of steps skipped for lack of inputs.
    pub(crate) fn run(&self, runner: &mut dyn CommandRunner) -> Result<Vec<usize>, ExecuteError> {
        info!(
            "Executing {} step(s) from '{}'",
            self.script.len(),
            self.path.display()
        );
        let mut execution = Execution::new(&self.script);
        let result = execution.run(runner);
        info!("Execution state: {}", execution.state());
        result?;
        Ok(execution.skipped().to_vec())
    }
}
