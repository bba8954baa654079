// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Build and orchestration tooling for the PFS 2D data-reduction pipeline.

A YAML specification of calibration and science blocks is resolved into an
ordered script of pipeline commands ([`generate::generate_script`]), which
can be written out, re-read and run step by step ([`execute::Execution`]).
 */

mod cli;
pub mod constants;
pub mod dialect;
pub mod env;
pub mod execute;
pub mod generate;
pub mod idset;
mod params;
pub mod resolve;
pub mod script;
pub mod spec;

// Re-exports.
pub use cli::{Pipe2d, Pipe2dError};

use crossbeam_utils::atomic::AtomicCell;

/// Should progress bars be drawn? Only the CLI turns these on.
static PROGRESS_BARS: AtomicCell<bool> = AtomicCell::new(false);
