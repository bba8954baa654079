// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

Names of external tasks are collected here so that the dialects and their
tests agree on them.
 */

/// Calibs are valid for this many days either side of their date, unless a
/// stage says otherwise.
pub const DEFAULT_CALIB_VALIDITY: u32 = 1800;

pub const DEFAULT_RERUN: &str = "noname";

pub const DEFAULT_PROCESSES: usize = 1;

/// The calibration repository is `<data-dir>/CALIB` unless specified.
pub const DEFAULT_CALIB_DIR: &str = "CALIB";

/// Arms and spectrographs used to enumerate detectors when neither
/// `--detectors` nor an `init` block supplies them.
pub const DEFAULT_ARMS: [char; 4] = ['b', 'r', 'n', 'm'];
pub const DEFAULT_SPECTROGRAPHS: [u8; 4] = [1, 2, 3, 4];

/// Options given to legacy tasks in development mode (no versioning).
pub const DEVEL_OPTIONS: [&str; 2] = ["--no-versions", "--clobber-config"];

pub const INGEST_CALIBS_TASK: &str = "ingestPfsCalibs.py";
pub const COMBINE_PROFILES_TASK: &str = "combineFiberProfiles.py";

/// Per-group partial products of a calib stage live under
/// `<stage-rerun>/<GROUP_PREFIX><index>`.
pub const GROUP_PREFIX: &str = "group";

// Butler-style dialect defaults.
pub const DEFAULT_INSTRUMENT: &str = "PFS";
pub const DEFAULT_INPUTS: [&str; 2] = ["PFS/raw/all", "PFS/calib"];
pub const DEFAULT_CALIB_COLLECTION: &str = "PFS/calib";
pub const DEFAULT_PIPELINE_DIR: &str = "$DRP_STELLA_DIR/pipelines";
pub const PIPETASK: &str = "pipetask";
pub const BUTLER: &str = "butler";

/// Timestamp format of certification dates.
pub const CERTIFY_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
