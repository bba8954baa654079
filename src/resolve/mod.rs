// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Turn specification blocks into ordered stages.
//!
//! Calib stages are always resolved in [`CALIB_ORDER`] and science steps in
//! [`SCIENCE_ORDER`], whatever order they were written in. Configuration is
//! layered here (block defaults, then stage, then group), so that dialects
//! only ever see the final list of overrides.

mod error;

pub use error::ResolveError;

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use itertools::Itertools;
use log::{debug, warn};
use regex::Regex;
use vec1::Vec1;

use crate::{
    constants::{DEFAULT_ARMS, DEFAULT_SPECTROGRAPHS},
    env::{resolve_path, EnvLookup},
    idset::IdFilter,
    spec::{
        CalibBlock, CalibStage, CalibType, CommandConfig, FiberProfilesSpec, InitSpec,
        ScienceBlock, ScienceStep, CALIB_ORDER, SCIENCE_ORDER,
    },
};

lazy_static::lazy_static! {
    static ref DETECTOR_REGEX: Regex = Regex::new(r"^([brnm])([1-9][0-9]*)$").unwrap();
}

/// A single camera, e.g. "r1" is the red arm of spectrograph 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Detector {
    pub arm: char,
    pub spectrograph: u8,
}

impl FromStr for Detector {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ResolveError::BadDetector(s.to_string());
        let caps = DETECTOR_REGEX.captures(s.trim()).ok_or_else(bad)?;
        let arm = caps[1].chars().next().ok_or_else(bad)?;
        let spectrograph = caps[2].parse().map_err(|_| bad())?;
        Ok(Detector { arm, spectrograph })
    }
}

impl fmt::Display for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.arm, self.spectrograph)
    }
}

/// The detectors that per-detector steps iterate over. Explicitly-given
/// detectors win, then those arms of the `init` block that name a detector
/// (e.g. "b1"); otherwise every arm of every spectrograph.
///
/// Only explicit detectors are checked. `init` arms are detector-map
/// identifiers first, and any that aren't detectors are skipped.
pub fn resolve_detectors(
    explicit: &[String],
    init: Option<&InitSpec>,
) -> Result<Vec1<Detector>, ResolveError> {
    let mut detectors = if !explicit.is_empty() {
        explicit
            .iter()
            .map(|n| n.parse())
            .collect::<Result<Vec<Detector>, _>>()?
    } else if let Some(init) = init {
        let (detectors, others): (Vec<_>, Vec<_>) = init
            .arms
            .iter()
            .map(|arm| arm.parse::<Detector>().map_err(|_| arm.as_str()))
            .partition_result();
        if !others.is_empty() {
            warn!(
                "Init arm(s) {} aren't detectors; not using them for per-detector steps",
                others.iter().join(", ")
            );
        }
        detectors
    } else {
        vec![]
    };
    detectors = detectors.into_iter().unique().collect();

    if detectors.is_empty() {
        debug!("Using the default detectors");
        for spectrograph in DEFAULT_SPECTROGRAPHS {
            for arm in DEFAULT_ARMS {
                detectors.push(Detector { arm, spectrograph });
            }
        }
    }
    Vec1::try_from_vec(detectors).map_err(|_| ResolveError::NoDetectors)
}

/// Identifiers of one independently-built group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupInput {
    Profiles { id: IdFilter },
    Bootstrap { flat_id: IdFilter, arc_id: IdFilter },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGroup {
    pub input: GroupInput,
    pub config: CommandConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedInputs {
    Single {
        id: IdFilter,
        norm_id: Option<IdFilter>,
        config: CommandConfig,
    },
    Groups(Vec1<ResolvedGroup>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStage {
    pub kind: CalibType,
    pub validity: u32,
    pub inputs: ResolvedInputs,
}

impl ResolvedStage {
    /// Grouped fiber profiles are built as partial products, one per group,
    /// that must be combined per detector before they can be certified.
    /// Bootstrap groups each write a complete product and need no combining.
    pub fn needs_combine(&self) -> bool {
        self.kind == CalibType::FiberProfiles && matches!(self.inputs, ResolvedInputs::Groups(_))
    }

    pub fn num_groups(&self) -> usize {
        match &self.inputs {
            ResolvedInputs::Single { .. } => 1,
            ResolvedInputs::Groups(g) => g.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCalibBlock {
    pub name: String,
    pub stages: Vec<ResolvedStage>,
}

/// Resolve the stages of a calib block. If `selected` is given, only those
/// calib types are kept. The result is always in [`CALIB_ORDER`].
pub fn resolve_calib_block(
    block: &CalibBlock,
    selected: Option<&[CalibType]>,
) -> ResolvedCalibBlock {
    let mut stages = vec![];
    for kind in CALIB_ORDER {
        if let Some(selected) = selected {
            if !selected.contains(&kind) {
                continue;
            }
        }
        let stage = match block.stages.get(&kind) {
            Some(s) => s,
            None => continue,
        };

        let inputs = match stage {
            CalibStage::Simple(s) => ResolvedInputs::Single {
                id: s.id.clone(),
                norm_id: None,
                config: s.config.layered_over(&block.defaults),
            },

            CalibStage::FiberProfiles(s) => {
                let config = s.config.layered_over(&block.defaults);
                match &s.input {
                    FiberProfilesSpec::ByIdentifier { id, norm_id } => ResolvedInputs::Single {
                        id: id.clone(),
                        norm_id: norm_id.clone(),
                        config,
                    },
                    FiberProfilesSpec::ByGroup { groups } => {
                        ResolvedInputs::Groups(groups.mapped_ref(|g| ResolvedGroup {
                            input: GroupInput::Profiles { id: g.id.clone() },
                            config: g.config.layered_over(&config),
                        }))
                    }
                }
            }

            CalibStage::Bootstrap(s) => {
                let config = s.config.layered_over(&block.defaults);
                ResolvedInputs::Groups(s.groups.mapped_ref(|g| ResolvedGroup {
                    input: GroupInput::Bootstrap {
                        flat_id: g.flat_id.clone(),
                        arc_id: g.arc_id.clone(),
                    },
                    config: g.config.layered_over(&config),
                }))
            }
        };

        stages.push(ResolvedStage {
            kind,
            validity: stage.validity(),
            inputs,
        });
    }

    debug!(
        "calibBlock '{}' resolves to {} stage(s)",
        block.name,
        stages.len()
    );
    ResolvedCalibBlock {
        name: block.name.clone(),
        stages,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStep {
    pub step: ScienceStep,
    pub config: CommandConfig,
}

/// The linear science pipeline of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPipeline {
    pub name: String,
    pub id: IdFilter,
    pub steps: Vec<ResolvedStep>,
}

/// Resolve a science block. Steps without a policy run with no overrides.
pub fn resolve_science_block(
    block: &ScienceBlock,
    selected: Option<&[ScienceStep]>,
) -> ResolvedPipeline {
    let steps = SCIENCE_ORDER
        .iter()
        .filter(|s| selected.map(|sel| sel.contains(*s)).unwrap_or(true))
        .map(|&step| ResolvedStep {
            step,
            config: block.policy.get(&step).cloned().unwrap_or_default(),
        })
        .collect();

    ResolvedPipeline {
        name: block.name.clone(),
        id: block.id.clone(),
        steps,
    }
}

/// The initial detector maps to ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInit {
    pub dir: PathBuf,
    pub detector_maps: Vec<PathBuf>,
}

pub fn resolve_init(
    init: &InitSpec,
    data_dir: &Path,
    env: &dyn EnvLookup,
) -> Result<ResolvedInit, ResolveError> {
    let dir = resolve_path(&init.dir_name, data_dir, env)?;
    debug!("Reading init files from '{}'", dir.display());
    let detector_maps = init
        .arms
        .iter()
        .map(|arm| dir.join(init.detector_map_file(arm)))
        .collect();
    Ok(ResolvedInit { dir, detector_maps })
}
