// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Specification files.
//!
//! A specification file is YAML with three optional top-level keys:
//!
//! ```yaml
//! init:
//!   dirName: $DRP_PFS_DATA_DIR/detectorMap
//!   arms: [b1, r1]
//!   detectorMapFmt: detectorMap-sim-{arm}.fits
//! calibBlock:
//!   - name: weekly
//!     bias:
//!       id: field=BIAS
//!     fiberProfiles:
//!       group:
//!         - id: [field=FLAT_ODD, arm=m]
//!         - id: [field=FLAT_EVEN, arm=m]
//! scienceBlock:
//!   - name: objects
//!     id: field=OBJECT
//!     policy:
//!       mergeArms:
//!         config: doApplyFiberNorms=False
//! ```
//!
//! Everything is validated here, so that no script is ever generated from a
//! malformed specification.

mod error;
mod raw;

pub use error::SpecError;

use std::{collections::HashSet, path::Path, str::FromStr};

use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, trace};
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};
use vec1::Vec1;

use crate::{constants::DEFAULT_CALIB_VALIDITY, idset::IdFilter};
use raw::*;

lazy_static::lazy_static! {
    static ref KEY_EQ_VALUE: Regex = Regex::new(r"^[^=\-][^=]*=").unwrap();
}

/// Types of calibration product, in the order they must be built.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum CalibType {
    Bias,
    Dark,
    Flat,
    Bootstrap,
    FiberProfiles,
    DetectorMap,
}

/// Flats need a bias and dark for image correction, fiber profiles need flats,
/// and detector maps need fiber profiles to find traces.
pub const CALIB_ORDER: [CalibType; 6] = [
    CalibType::Bias,
    CalibType::Dark,
    CalibType::Flat,
    CalibType::Bootstrap,
    CalibType::FiberProfiles,
    CalibType::DetectorMap,
];

impl CalibType {
    /// The legacy task that constructs this calib.
    pub fn command_name(self) -> &'static str {
        match self {
            CalibType::Bias => "constructPfsBias.py",
            CalibType::Dark => "constructPfsDark.py",
            CalibType::Flat => "constructFiberFlat.py",
            CalibType::Bootstrap => "bootstrapDetectorMap.py",
            CalibType::FiberProfiles => "reduceProfiles.py",
            CalibType::DetectorMap => "reduceArc.py",
        }
    }

    /// Legacy tasks write their products to `rerun/<name>/<subdir>`.
    pub fn output_subdir(self) -> &'static str {
        match self {
            CalibType::Bias => "BIAS",
            CalibType::Dark => "DARK",
            CalibType::Flat => "FLAT",
            CalibType::Bootstrap | CalibType::DetectorMap => "DETECTORMAP",
            CalibType::FiberProfiles => "FIBERPROFILES",
        }
    }

    /// Batch-pool tasks take `--batch-type`/`--cores` rather than `-j`.
    pub fn is_batch_pool_task(self) -> bool {
        matches!(self, CalibType::Bias | CalibType::Dark | CalibType::Flat)
    }

    /// Products that replace older versions on ingestion regardless of
    /// `--overwrite-calib`.
    pub fn always_overwrite(self) -> bool {
        matches!(self, CalibType::Bootstrap | CalibType::DetectorMap)
    }

    /// The Butler dataset type of the product.
    pub fn dataset_type(self) -> &'static str {
        match self {
            CalibType::Bias => "bias",
            CalibType::Dark => "dark",
            CalibType::Flat => "fiberFlat",
            CalibType::Bootstrap | CalibType::DetectorMap => "detectorMap",
            CalibType::FiberProfiles => "fiberProfiles",
        }
    }

    pub fn position(self) -> usize {
        CALIB_ORDER
            .iter()
            .position(|&t| t == self)
            .unwrap_or(CALIB_ORDER.len())
    }
}

/// Steps of the science pipeline.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum ScienceStep {
    ReduceExposure,
    MergeArms,
    CalculateReferenceFlux,
    FluxCalibrate,
    CoaddSpectra,
}

/// Each step's output is a required input of the next.
pub const SCIENCE_ORDER: [ScienceStep; 5] = [
    ScienceStep::ReduceExposure,
    ScienceStep::MergeArms,
    ScienceStep::CalculateReferenceFlux,
    ScienceStep::FluxCalibrate,
    ScienceStep::CoaddSpectra,
];

impl ScienceStep {
    pub fn command_name(self) -> &'static str {
        match self {
            ScienceStep::ReduceExposure => "reduceExposure.py",
            ScienceStep::MergeArms => "mergeArms.py",
            ScienceStep::CalculateReferenceFlux => "calculateReferenceFlux.py",
            ScienceStep::FluxCalibrate => "fluxCalibrate.py",
            ScienceStep::CoaddSpectra => "coaddSpectra.py",
        }
    }

    pub fn position(self) -> usize {
        SCIENCE_ORDER
            .iter()
            .position(|&s| s == self)
            .unwrap_or(SCIENCE_ORDER.len())
    }
}

/// `config` overrides (`key=value`, passed through verbatim) and an optional
/// config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandConfig {
    pub overrides: Vec<String>,
    pub configfile: Option<String>,
}

impl CommandConfig {
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty() && self.configfile.is_none()
    }

    /// Layer `self` on top of `defaults`. Defaults whose key is overridden by
    /// `self` are dropped; the rest come first, in their original order,
    /// followed by all of `self`'s overrides. `self`'s config file wins.
    pub fn layered_over(&self, defaults: &CommandConfig) -> CommandConfig {
        let own_keys: HashSet<&str> = self.overrides.iter().map(|o| override_key(o)).collect();
        let overrides = defaults
            .overrides
            .iter()
            .filter(|o| !own_keys.contains(override_key(o)))
            .chain(self.overrides.iter())
            .cloned()
            .collect();
        CommandConfig {
            overrides,
            configfile: self
                .configfile
                .clone()
                .or_else(|| defaults.configfile.clone()),
        }
    }
}

/// The key of a `key=value` override.
pub fn override_key(s: &str) -> &str {
    s.split_once('=').map(|(k, _)| k.trim()).unwrap_or(s)
}

/// A stage that is built from a single set of identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub id: IdFilter,
    pub config: CommandConfig,
    pub validity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileGroup {
    pub id: IdFilter,
    pub config: CommandConfig,
}

/// The two forms of fiber-profiles input. Older specifications use `id` and
/// `normId`; newer ones enumerate groups that are built independently and
/// combined afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FiberProfilesSpec {
    ByIdentifier {
        id: IdFilter,
        norm_id: Option<IdFilter>,
    },
    ByGroup {
        groups: Vec1<ProfileGroup>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiberProfilesStage {
    pub input: FiberProfilesSpec,
    pub config: CommandConfig,
    pub validity: u32,
}

/// One flat at zero dither and one arc; the bootstrap task runs once per group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapGroup {
    pub flat_id: IdFilter,
    pub arc_id: IdFilter,
    pub config: CommandConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapStage {
    pub groups: Vec1<BootstrapGroup>,
    pub config: CommandConfig,
    pub validity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalibStage {
    Simple(StageSpec),
    Bootstrap(BootstrapStage),
    FiberProfiles(FiberProfilesStage),
}

impl CalibStage {
    pub fn validity(&self) -> u32 {
        match self {
            CalibStage::Simple(s) => s.validity,
            CalibStage::Bootstrap(s) => s.validity,
            CalibStage::FiberProfiles(s) => s.validity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibBlock {
    pub name: String,
    /// Block-level `config`/`configfile`, applied to every stage.
    pub defaults: CommandConfig,
    /// Stages in the order they appear in the file; this is *not* the order
    /// in which they are built.
    pub stages: IndexMap<CalibType, CalibStage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScienceBlock {
    pub name: String,
    pub id: IdFilter,
    pub policy: IndexMap<ScienceStep, CommandConfig>,
}

/// Initial detector maps, needed before any calib can be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitSpec {
    /// May contain environment variables; relative to the data directory if
    /// not absolute.
    pub dir_name: String,
    pub arms: Vec<String>,
    pub detector_map_fmt: String,
}

impl InitSpec {
    pub fn detector_map_file(&self, arm: &str) -> String {
        self.detector_map_fmt.replace("{arm}", arm)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecFile {
    pub init: Option<InitSpec>,
    pub calib_blocks: Vec<CalibBlock>,
    pub science_blocks: Vec<ScienceBlock>,
}

impl SpecFile {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<SpecFile, SpecError> {
        let path = path.as_ref();
        debug!("Reading specification file {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|source| SpecError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        SpecFile::parse(&text)
    }

    pub fn parse(text: &str) -> Result<SpecFile, SpecError> {
        let doc: Value = decode(
            serde_yaml::from_str(text),
            "the specification file".to_string(),
        )?;
        let top = match doc {
            Value::Null => Mapping::new(),
            Value::Mapping(m) => m,
            _ => {
                return Err(SpecError::WrongType {
                    context: "The specification file".to_string(),
                    expected: "a mapping",
                })
            }
        };

        let mut spec = SpecFile::default();
        for (key, value) in top {
            match key_name(&key).as_str() {
                "init" => {
                    if !value.is_null() {
                        spec.init = Some(parse_init(value)?);
                    }
                }
                "calibBlock" => {
                    for (i, block) in sequence(value, "calibBlock")?.into_iter().enumerate() {
                        spec.calib_blocks.push(parse_calib_block(i, block)?);
                    }
                }
                "scienceBlock" => {
                    for (i, block) in sequence(value, "scienceBlock")?.into_iter().enumerate() {
                        spec.science_blocks.push(parse_science_block(i, block)?);
                    }
                }
                other => return Err(SpecError::UnknownTopLevelKey(other.to_string())),
            }
        }

        ensure_unique(spec.calib_blocks.iter().map(|b| b.name.as_str()), "calibBlock")?;
        ensure_unique(
            spec.science_blocks.iter().map(|b| b.name.as_str()),
            "scienceBlock",
        )?;
        trace!("{spec:#?}");
        Ok(spec)
    }

    pub fn calib_block(&self, name: &str) -> Option<&CalibBlock> {
        self.calib_blocks.iter().find(|b| b.name == name)
    }

    pub fn science_block(&self, name: &str) -> Option<&ScienceBlock> {
        self.science_blocks.iter().find(|b| b.name == name)
    }

    /// Names of all blocks, calib blocks first, without duplicates.
    pub fn block_names(&self) -> Vec<&str> {
        self.calib_blocks
            .iter()
            .map(|b| b.name.as_str())
            .chain(self.science_blocks.iter().map(|b| b.name.as_str()))
            .unique()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.init.is_none() && self.calib_blocks.is_empty() && self.science_blocks.is_empty()
    }
}

fn decode<T>(result: Result<T, serde_yaml::Error>, context: String) -> Result<T, SpecError> {
    result.map_err(|source| SpecError::Yaml { context, source })
}

fn decode_value<T: DeserializeOwned>(value: Value, context: &str) -> Result<T, SpecError> {
    decode(serde_yaml::from_value(value), context.to_string())
}

fn key_name(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "~".to_string(),
        other => format!("{other:?}"),
    }
}

fn sequence(value: Value, kind: &'static str) -> Result<Vec<Value>, SpecError> {
    match value {
        Value::Null => Ok(vec![]),
        Value::Sequence(s) => Ok(s),
        _ => Err(SpecError::WrongType {
            context: format!("'{kind}'"),
            expected: "a list of blocks",
        }),
    }
}

fn mapping(value: Value, context: &str) -> Result<Mapping, SpecError> {
    match value {
        Value::Mapping(m) => Ok(m),
        _ => Err(SpecError::WrongType {
            context: context.to_string(),
            expected: "a mapping",
        }),
    }
}

fn block_name(map: &Mapping, kind: &'static str, index: usize) -> Result<String, SpecError> {
    match map.get("name") {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Null) | None => Err(SpecError::MissingName { kind, index }),
        Some(_) => Err(SpecError::WrongType {
            context: format!("The name of {kind} #{index}"),
            expected: "a string",
        }),
    }
}

fn ensure_unique<'a, I: Iterator<Item = &'a str>>(
    names: I,
    kind: &'static str,
) -> Result<(), SpecError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(SpecError::DuplicateBlock {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

fn parse_ids(ids: Option<OneOrMany>, context: &str) -> Result<IdFilter, SpecError> {
    let ids = ids.map(OneOrMany::into_vec).unwrap_or_default();
    IdFilter::parse(&ids).map_err(|source| SpecError::Expression {
        context: context.to_string(),
        source,
    })
}

fn parse_required_ids(
    ids: Option<OneOrMany>,
    context: &str,
    expected: &'static str,
) -> Result<IdFilter, SpecError> {
    let ids = parse_ids(ids, context)?;
    if ids.is_empty() {
        return Err(SpecError::MissingStageInput {
            context: context.to_string(),
            expected,
        });
    }
    Ok(ids)
}

fn parse_config(
    config: Option<OneOrMany>,
    configfile: Option<String>,
    context: &str,
) -> Result<CommandConfig, SpecError> {
    let overrides = config.map(OneOrMany::into_vec).unwrap_or_default();
    if let Some(bad) = overrides.iter().find(|o| !KEY_EQ_VALUE.is_match(o)) {
        return Err(SpecError::NotKeyValue {
            context: context.to_string(),
            value: bad.clone(),
        });
    }
    Ok(CommandConfig {
        overrides,
        configfile,
    })
}

fn parse_init(value: Value) -> Result<InitSpec, SpecError> {
    let RawInit {
        dir_name,
        arms,
        detector_map_fmt,
    } = decode_value(value, "the init block")?;

    let arms = arms.into_vec();
    let mut seen = HashSet::new();
    if let Some(dup) = arms.iter().find(|a| !seen.insert(a.as_str())) {
        return Err(SpecError::DuplicateArm(dup.clone()));
    }
    if !detector_map_fmt.contains("{arm}") {
        return Err(SpecError::NoArmPlaceholder(detector_map_fmt));
    }

    Ok(InitSpec {
        dir_name,
        arms,
        detector_map_fmt,
    })
}

fn parse_calib_block(index: usize, value: Value) -> Result<CalibBlock, SpecError> {
    let map = mapping(value, &format!("calibBlock #{index}"))?;
    let name = block_name(&map, "calibBlock", index)?;
    let block_context = format!("calibBlock '{name}'");

    let mut config = None;
    let mut configfile = None;
    let mut stages = IndexMap::new();
    for (key, value) in map {
        let key = key_name(&key);
        match key.as_str() {
            "name" => (),
            "config" => config = Some(decode_value(value, &block_context)?),
            "configfile" => configfile = Some(decode_value(value, &block_context)?),
            other => {
                let kind = CalibType::from_str(other).map_err(|_| SpecError::UnknownStage {
                    block: name.clone(),
                    key: other.to_string(),
                    valid: CalibType::iter().join(", "),
                })?;
                let context = format!("calibBlock '{name}', stage '{kind}'");
                let stage = match kind {
                    CalibType::Bootstrap => CalibStage::Bootstrap(parse_bootstrap(value, &context)?),
                    CalibType::FiberProfiles => {
                        CalibStage::FiberProfiles(parse_fiber_profiles(value, &context)?)
                    }
                    _ => CalibStage::Simple(parse_simple_stage(value, &context)?),
                };
                stages.insert(kind, stage);
            }
        }
    }

    Ok(CalibBlock {
        defaults: parse_config(config, configfile, &block_context)?,
        name,
        stages,
    })
}

fn parse_simple_stage(value: Value, context: &str) -> Result<StageSpec, SpecError> {
    let RawStage {
        id,
        config,
        configfile,
        validity,
    } = decode_value(value, context)?;
    Ok(StageSpec {
        id: parse_required_ids(id, context, "'id' is required")?,
        config: parse_config(config, configfile, context)?,
        validity: validity.unwrap_or(DEFAULT_CALIB_VALIDITY),
    })
}

fn parse_fiber_profiles(value: Value, context: &str) -> Result<FiberProfilesStage, SpecError> {
    let RawFiberProfiles {
        id,
        norm_id,
        group,
        config,
        configfile,
        validity,
    } = decode_value(value, context)?;

    let input = match (group, id.is_some() || norm_id.is_some()) {
        (Some(_), true) => {
            return Err(SpecError::ConflictingStageInput {
                context: context.to_string(),
            })
        }

        (Some(groups), false) => {
            let groups = groups
                .into_iter()
                .enumerate()
                .map(|(i, g)| parse_profile_group(g, &format!("{context}, group #{i}")))
                .collect::<Result<Vec<_>, _>>()?;
            let groups =
                Vec1::try_from_vec(groups).map_err(|_| SpecError::MissingStageInput {
                    context: context.to_string(),
                    expected: "'group' must list at least one group",
                })?;
            FiberProfilesSpec::ByGroup { groups }
        }

        (None, true) => {
            let id = parse_required_ids(id, context, "'id' is required alongside 'normId'")?;
            let norm_id = parse_ids(norm_id, context)?;
            FiberProfilesSpec::ByIdentifier {
                id,
                norm_id: (!norm_id.is_empty()).then_some(norm_id),
            }
        }

        (None, false) => {
            return Err(SpecError::MissingStageInput {
                context: context.to_string(),
                expected: "either 'id' (with an optional 'normId') or 'group' is required",
            })
        }
    };

    Ok(FiberProfilesStage {
        input,
        config: parse_config(config, configfile, context)?,
        validity: validity.unwrap_or(DEFAULT_CALIB_VALIDITY),
    })
}

fn parse_profile_group(group: RawProfileGroup, context: &str) -> Result<ProfileGroup, SpecError> {
    let (id, config) = match group {
        RawProfileGroup::Ids(ids) => (Some(ids), CommandConfig::default()),
        RawProfileGroup::Full(RawProfileGroupFull {
            id,
            config,
            configfile,
        }) => (id, parse_config(config, configfile, context)?),
    };
    Ok(ProfileGroup {
        id: parse_required_ids(id, context, "'id' is required")?,
        config,
    })
}

fn parse_bootstrap(value: Value, context: &str) -> Result<BootstrapStage, SpecError> {
    let RawBootstrap {
        group,
        config,
        configfile,
        validity,
    } = decode_value(value, context)?;

    let mut groups = vec![];
    for (i, g) in group.unwrap_or_default().into_iter().enumerate() {
        let context = format!("{context}, group #{i}");
        groups.push(BootstrapGroup {
            flat_id: parse_required_ids(g.flat_id, &context, "'flatId' is required")?,
            arc_id: parse_required_ids(g.arc_id, &context, "'arcId' is required")?,
            config: parse_config(g.config, g.configfile, &context)?,
        });
    }
    let groups = Vec1::try_from_vec(groups).map_err(|_| SpecError::MissingStageInput {
        context: context.to_string(),
        expected: "'group' must list at least one group of 'flatId' and 'arcId'",
    })?;

    Ok(BootstrapStage {
        groups,
        config: parse_config(config, configfile, context)?,
        validity: validity.unwrap_or(DEFAULT_CALIB_VALIDITY),
    })
}

fn parse_science_block(index: usize, value: Value) -> Result<ScienceBlock, SpecError> {
    let map = mapping(value, &format!("scienceBlock #{index}"))?;
    let name = block_name(&map, "scienceBlock", index)?;
    let context = format!("scienceBlock '{name}'");

    let mut id = None;
    let mut policy = IndexMap::new();
    for (key, value) in map {
        let key = key_name(&key);
        match key.as_str() {
            "name" => (),
            "id" => id = Some(decode_value::<OneOrMany>(value, &context)?),
            "policy" => {
                let steps = match value {
                    Value::Null => Mapping::new(),
                    v => mapping(v, &format!("The policy of {context}"))?,
                };
                for (step, config) in steps {
                    let step_name = key_name(&step);
                    let step = ScienceStep::from_str(&step_name).map_err(|_| {
                        SpecError::UnknownPolicyStep {
                            block: name.clone(),
                            key: step_name.clone(),
                            valid: ScienceStep::iter().join(", "),
                        }
                    })?;
                    let step_context = format!("{context}, policy '{step}'");
                    let config = match config {
                        Value::Null => CommandConfig::default(),
                        v => {
                            let RawPolicy { config, configfile } = decode_value(v, &step_context)?;
                            parse_config(config, configfile, &step_context)?
                        }
                    };
                    policy.insert(step, config);
                }
            }
            other => {
                return Err(SpecError::UnknownBlockKey {
                    block: name.clone(),
                    key: other.to_string(),
                })
            }
        }
    }

    Ok(ScienceBlock {
        id: parse_required_ids(id, &context, "'id' is required")?,
        name,
        policy,
    })
}
