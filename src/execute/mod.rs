// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Run a generated command script, one step at a time.
//!
//! Steps run strictly in order. The first step to exit non-zero stops the
//! run; outputs of earlier steps are left in place, and nothing is retried.

mod error;

pub use error::ExecuteError;

use std::{fmt, process::ExitStatus};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, warn};

use crate::{
    script::{CommandScript, ScriptStep},
    PROGRESS_BARS,
};

/// Something that can run a command line and report its exit code.
pub trait CommandRunner {
    fn run(&mut self, command: &str) -> Result<i32, std::io::Error>;
}

/// Runs commands with `sh -c`.
#[derive(Debug, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&mut self, command: &str) -> Result<i32, std::io::Error> {
        let status = std::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .status()?;
        Ok(exit_code(status))
    }
}

/// A process killed by a signal reports `128 + signal`, as shells do.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionState {
    Pending,
    Running {
        ordinal: usize,
    },
    Completed,
    Failed {
        ordinal: usize,
        label: String,
        code: i32,
    },
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionState::Pending => write!(f, "Pending"),
            ExecutionState::Running { ordinal } => write!(f, "Running({ordinal})"),
            ExecutionState::Completed => write!(f, "Completed"),
            ExecutionState::Failed {
                ordinal,
                label,
                code,
            } => write!(f, "Failed({ordinal}, {label}, {code})"),
        }
    }
}

/// One run of a script.
pub struct Execution<'a> {
    script: &'a CommandScript,
    state: ExecutionState,
    skipped: Vec<usize>,
}

impl<'a> Execution<'a> {
    pub fn new(script: &'a CommandScript) -> Execution<'a> {
        Execution {
            script,
            state: ExecutionState::Pending,
            skipped: vec![],
        }
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    /// Ordinals of steps that were skipped because they had no inputs.
    pub fn skipped(&self) -> &[usize] {
        &self.skipped
    }

    /// Run every step. There's no going back from `Failed`; a new
    /// [`Execution`] is needed to try again.
    pub fn run(&mut self, runner: &mut dyn CommandRunner) -> Result<(), ExecuteError> {
        if self.state != ExecutionState::Pending {
            return Err(ExecuteError::NotPending(self.state.to_string()));
        }
        let script = self.script;
        if script.allow_errors {
            warn!("This script was generated to allow errors, but execution still stops at the first failing step");
        }

        let num_steps = script.steps.len();
        let pb = ProgressBar::new(num_steps as _)
            .with_style(
                ProgressStyle::default_bar()
                    .template("{msg:30}: [{wide_bar:.blue}] {pos:3}/{len:3} steps ({elapsed_precise})")
                    .unwrap()
                    .progress_chars("=> "),
            )
            .with_position(0);
        pb.set_draw_target(if PROGRESS_BARS.load() {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        });

        for step in &script.steps {
            self.state = ExecutionState::Running {
                ordinal: step.ordinal,
            };
            pb.set_message(step.label.to_string());

            let found = match has_inputs(step) {
                Ok(found) => found,
                Err(e) => {
                    pb.abandon();
                    self.fail(step, 1);
                    return Err(e);
                }
            };
            if !found {
                pb.suspend(|| {
                    warn!(
                        "Skipping step {} ({}): nothing matches {}",
                        step.ordinal,
                        step.label,
                        step.requires.as_deref().unwrap_or_default()
                    )
                });
                self.skipped.push(step.ordinal);
                pb.inc(1);
                continue;
            }

            pb.suspend(|| {
                info!("[{}/{num_steps}] {} ({})", step.ordinal, step.label, step.kind);
                debug!("{}", step.command);
            });
            let result = runner.run(&step.command);
            let code = match result {
                Ok(code) => code,
                Err(source) => {
                    pb.abandon();
                    self.fail(step, 1);
                    return Err(ExecuteError::Spawn {
                        ordinal: step.ordinal,
                        label: step.label.to_string(),
                        command: step.command.clone(),
                        source,
                    });
                }
            };
            if code != 0 {
                pb.abandon();
                self.fail(step, code);
                return Err(ExecuteError::SubprocessFailure {
                    ordinal: step.ordinal,
                    label: step.label.to_string(),
                    command: step.command.clone(),
                    code,
                });
            }
            pb.inc(1);
        }

        pb.finish_with_message("Done");
        self.state = ExecutionState::Completed;
        Ok(())
    }

    fn fail(&mut self, step: &ScriptStep, code: i32) {
        self.state = ExecutionState::Failed {
            ordinal: step.ordinal,
            label: step.label.to_string(),
            code,
        };
    }
}

/// Does a guarded step's glob match anything?
fn has_inputs(step: &ScriptStep) -> Result<bool, ExecuteError> {
    let pattern = match &step.requires {
        None => return Ok(true),
        Some(p) => p,
    };
    let mut paths = glob::glob(pattern).map_err(|e| ExecuteError::BadPattern {
        ordinal: step.ordinal,
        pattern: pattern.clone(),
        message: e.msg.to_string(),
    })?;
    Ok(paths.any(|p| p.is_ok()))
}
