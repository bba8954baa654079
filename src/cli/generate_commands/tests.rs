// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{fs::File, io::Write};

use indoc::indoc;
use serial_test::serial;
use tempfile::TempDir;

use super::*;
use crate::cli::common::take_warnings;

const SPEC: &str = indoc! {r#"
    calibBlock:
      - name: cal
        bias:
          id: "visit=1..5"
        flat:
          id: "visit=6..9"
    scienceBlock:
      - name: sci
        id: "visit=100"
"#};

/// A data directory with a calib repository and a specification file.
struct Fixture {
    tmp: TempDir,
}

impl Fixture {
    fn new() -> Fixture {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("CALIB")).unwrap();
        std::fs::write(tmp.path().join("spec.yaml"), SPEC).unwrap();
        Fixture { tmp }
    }

    fn args(&self) -> GenerateCommandsArgs {
        GenerateCommandsArgs {
            data_dir: Some(self.tmp.path().to_path_buf()),
            spec_file: Some(self.tmp.path().join("spec.yaml")),
            output: Some(self.tmp.path().join("commands.sh")),
            ..Default::default()
        }
    }
}

#[test]
fn test_merge_prefers_cli() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("args.toml");
    let mut fh = File::create(&file).unwrap();
    write!(
        fh,
        indoc! {r#"
            rerun = "from_file"
            processes = 4
            blocks = ["a", "b"]
            clean = true

            [dimensions.visit]
            type = "int"

            [dimensions.field]
            name = "target"
            type = "str"
        "#}
    )
    .unwrap();
    drop(fh);

    let merged = GenerateCommandsArgs {
        args_file: Some(file),
        rerun: Some("from_cli".to_string()),
        devel: true,
        ..Default::default()
    }
    .merge()
    .unwrap();

    assert_eq!(merged.args_file, None);
    assert_eq!(merged.rerun.as_deref(), Some("from_cli"));
    assert_eq!(merged.processes, Some(4));
    assert_eq!(
        merged.blocks,
        Some(vec!["a".to_string(), "b".to_string()])
    );
    assert!(merged.clean);
    assert!(merged.devel);
    let dimensions = merged.dimensions.unwrap();
    assert_eq!(dimensions.len(), 2);
    assert_eq!(dimensions["field"].name.as_deref(), Some("target"));
}

#[test]
fn test_merge_yaml_and_json() {
    let tmp = TempDir::new().unwrap();
    let yaml = tmp.path().join("args.yaml");
    std::fs::write(&yaml, "dialect: gen3\ninputs: [PFS/raw/sps]\n").unwrap();
    let merged = GenerateCommandsArgs {
        args_file: Some(yaml),
        ..Default::default()
    }
    .merge()
    .unwrap();
    assert_eq!(merged.dialect.as_deref(), Some("gen3"));
    assert_eq!(merged.inputs, Some(vec!["PFS/raw/sps".to_string()]));

    let json = tmp.path().join("args.json");
    std::fs::write(&json, r#"{"init": true, "copy_mode": "link"}"#).unwrap();
    let merged = GenerateCommandsArgs {
        args_file: Some(json),
        ..Default::default()
    }
    .merge()
    .unwrap();
    assert!(merged.init);
    assert_eq!(merged.copy_mode.as_deref(), Some("link"));
}

#[test]
fn test_merge_bad_arg_files() {
    let tmp = TempDir::new().unwrap();
    let ini = tmp.path().join("args.ini");
    std::fs::write(&ini, "").unwrap();
    let result = GenerateCommandsArgs {
        args_file: Some(ini),
        ..Default::default()
    }
    .merge();
    assert!(matches!(result, Err(Pipe2dError::ArgFile(_))));

    let toml = tmp.path().join("args.toml");
    std::fs::write(&toml, "processes = \"many\"\n").unwrap();
    let result = GenerateCommandsArgs {
        args_file: Some(toml),
        ..Default::default()
    }
    .merge();
    assert!(matches!(result, Err(Pipe2dError::ArgFile(_))));
}

#[test]
#[serial]
fn test_parse_defaults() {
    let fixture = Fixture::new();
    let params = fixture.args().parse().unwrap();
    let opts = &params.options;
    assert_eq!(opts.rerun, DEFAULT_RERUN);
    assert_eq!(opts.command.processes, DEFAULT_PROCESSES);
    assert_eq!(opts.command.copy_mode, CopyMode::Copy);
    assert_eq!(
        opts.command.calib,
        fixture.tmp.path().join("CALIB").display().to_string()
    );
    assert_eq!(opts.detectors.len(), 16);
    assert_eq!(params.dialect.get_dialect_type(), DialectType::Gen2);
    assert!(take_warnings().is_empty());
}

#[test]
#[serial]
fn test_parse_options() {
    let fixture = Fixture::new();
    let params = GenerateCommandsArgs {
        calib_types: Some(vec!["flat".to_string(), "bias".to_string()]),
        science_steps: Some(vec!["mergeArms".to_string()]),
        copy_mode: Some("MOVE".to_string()),
        detectors: Some(vec!["r2".to_string(), "b1".to_string()]),
        processes: Some(8),
        dialect: Some("gen3".to_string()),
        calib_date: Some("2024-03-01".to_string()),
        ..fixture.args()
    }
    .parse()
    .unwrap();
    let opts = &params.options;
    assert_eq!(
        opts.calib_types,
        Some(vec![CalibType::Flat, CalibType::Bias])
    );
    assert_eq!(opts.science_steps, Some(vec![ScienceStep::MergeArms]));
    assert_eq!(opts.command.copy_mode, CopyMode::Move);
    assert_eq!(opts.command.processes, 8);
    assert_eq!(
        opts.detectors.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
        vec!["r2", "b1"]
    );
    assert_eq!(
        opts.command.calib_date,
        NaiveDate::from_ymd_opt(2024, 3, 1)
    );
    assert_eq!(params.dialect.get_dialect_type(), DialectType::Gen3);
    take_warnings();
}

#[test]
#[serial]
fn test_parse_missing_required() {
    let fixture = Fixture::new();
    for args in [
        GenerateCommandsArgs {
            data_dir: None,
            ..fixture.args()
        },
        GenerateCommandsArgs {
            spec_file: None,
            ..fixture.args()
        },
        GenerateCommandsArgs {
            output: None,
            ..fixture.args()
        },
    ] {
        assert!(matches!(args.parse(), Err(Pipe2dError::Generate(_))));
    }
}

#[test]
#[serial]
fn test_parse_bad_values() {
    let fixture = Fixture::new();
    let err = GenerateCommandsArgs {
        calib_types: Some(vec!["fibreProfiles".to_string()]),
        ..fixture.args()
    }
    .parse()
    .err()
    .unwrap();
    assert!(err.to_string().contains("'fibreProfiles'"), "{err}");
    assert!(err.to_string().contains("fiberProfiles"), "{err}");

    for args in [
        GenerateCommandsArgs {
            science_steps: Some(vec!["reduce".to_string()]),
            ..fixture.args()
        },
        GenerateCommandsArgs {
            copy_mode: Some("hardlink".to_string()),
            ..fixture.args()
        },
        GenerateCommandsArgs {
            dialect: Some("gen4".to_string()),
            ..fixture.args()
        },
        GenerateCommandsArgs {
            calib_date: Some("01/03/2024".to_string()),
            ..fixture.args()
        },
        GenerateCommandsArgs {
            processes: Some(0),
            ..fixture.args()
        },
        GenerateCommandsArgs {
            detectors: Some(vec!["x9".to_string()]),
            ..fixture.args()
        },
    ] {
        assert!(
            matches!(args.parse(), Err(Pipe2dError::Generate(_))),
            "expected a generation error"
        );
    }
    take_warnings();
}

#[test]
#[serial]
fn test_missing_calib_repository() {
    let fixture = Fixture::new();
    std::fs::remove_dir(fixture.tmp.path().join("CALIB")).unwrap();

    let err = fixture.args().parse().err().unwrap();
    assert!(err.to_string().contains("--init"), "{err}");

    // --force or --init turn this into a warning.
    take_warnings();
    GenerateCommandsArgs {
        force: true,
        ..fixture.args()
    }
    .parse()
    .unwrap();
    let warnings = take_warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0][0].contains("CALIB"));

    // The butler dialect has no calib directory to check.
    GenerateCommandsArgs {
        dialect: Some("gen3".to_string()),
        ..fixture.args()
    }
    .parse()
    .unwrap();
    assert!(take_warnings().is_empty());
}

#[test]
#[serial]
fn test_gen3_settings_warn_with_gen2() {
    let fixture = Fixture::new();
    take_warnings();
    GenerateCommandsArgs {
        butler_config: Some("/repo".to_string()),
        ..fixture.args()
    }
    .parse()
    .unwrap();
    let warnings = take_warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0][0].contains("gen2"));
}

#[test]
#[serial]
fn test_spec_errors_are_reported() {
    let fixture = Fixture::new();
    std::fs::write(
        fixture.tmp.path().join("spec.yaml"),
        "calibBlock:\n  - name: cal\n    bias:\n      id: \"visit=1..\"\n",
    )
    .unwrap();
    let err = fixture.args().parse().err().unwrap();
    assert!(matches!(err, Pipe2dError::Expression(_)), "{err}");
    assert!(err.to_string().contains("visit=1.."), "{err}");
}

#[test]
#[serial]
fn test_init_arms_need_not_be_detectors() {
    let fixture = Fixture::new();
    std::fs::write(
        fixture.tmp.path().join("spec.yaml"),
        indoc! {r#"
            init:
              dirName: "raw"
              arms: [b, r]
              detectorMapFmt: "detectorMap-{arm}.fits"
            calibBlock:
              - name: cal
                bias:
                  id: "visit=1..5"
        "#},
    )
    .unwrap();
    let params = fixture.args().parse().unwrap();
    assert_eq!(params.options.detectors.len(), 16);
    take_warnings();
}

#[test]
#[serial]
fn test_run_writes_script() {
    let fixture = Fixture::new();
    let output = fixture.tmp.path().join("commands.sh");
    fixture.args().run(true).unwrap();
    assert!(!output.exists());

    fixture.args().run(false).unwrap();
    let text = std::fs::read_to_string(&output).unwrap();
    assert!(text.starts_with("#!/bin/sh\nset -uxe\n"));
    assert!(text.contains("constructPfsBias.py"));
    assert!(text.contains("reduceExposure.py"));
}
