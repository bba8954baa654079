// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use log::{debug, info};
use thiserror::Error;

use crate::{
    dialect::Dialect,
    env::EnvLookup,
    generate::{generate_script, GenerateError, GenerateOptions},
    script::CommandScript,
    spec::SpecFile,
};

pub(crate) struct GenerateParams {
    pub(crate) spec: SpecFile,
    pub(crate) options: GenerateOptions,
    pub(crate) dialect: Box<dyn Dialect>,

    /// Where the script is written.
    pub(crate) output: PathBuf,
}

impl GenerateParams {
    /// Build the whole script in memory. Nothing touches the disk.
    pub(crate) fn generate(&self, env: &dyn EnvLookup) -> Result<CommandScript, GenerateError> {
        generate_script(&self.spec, &self.options, self.dialect.as_ref(), env)
    }

    /// Generate the script and write it out. The output file is only
    /// created once every command has been built.
    pub(crate) fn run(&self, env: &dyn EnvLookup) -> Result<CommandScript, GenerateCommandsError> {
        let script = self.generate(env)?;
        debug!("Writing script to '{}'", self.output.display());
        script
            .write(&self.output)
            .map_err(|source| GenerateCommandsError::Write {
                path: self.output.clone(),
                source,
            })?;
        info!(
            "Wrote {} command(s) to '{}'",
            script.len(),
            self.output.display()
        );
        Ok(script)
    }
}

#[derive(Error, Debug)]
pub(crate) enum GenerateCommandsError {
    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error("Couldn't write the script to '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}
