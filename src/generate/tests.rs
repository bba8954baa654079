// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::collections::HashMap;

use indoc::indoc;
use vec1::vec1;

use super::*;
use crate::{
    dialect::{create_dialect, DialectError, DialectType, Gen2, Gen3Settings},
    script::option_values,
};

fn options() -> GenerateOptions {
    GenerateOptions {
        command: CommandOptions {
            data_dir: "/data".to_string(),
            calib: "/data/CALIB".to_string(),
            ..Default::default()
        },
        rerun: "weekly".to_string(),
        blocks: None,
        calib_types: None,
        science_steps: None,
        init: false,
        clean: false,
        force: false,
        detectors: vec1!["b1".parse().unwrap(), "r1".parse().unwrap()],
    }
}

fn no_env() -> HashMap<String, String> {
    HashMap::new()
}

fn generate(spec: &str, opts: &GenerateOptions) -> Result<CommandScript, GenerateError> {
    let spec = SpecFile::parse(spec).unwrap();
    generate_script(&spec, opts, &Gen2, &no_env())
}

/// (stage, step kind) of every step.
fn outline(script: &CommandScript) -> Vec<(String, StepKind)> {
    script
        .steps
        .iter()
        .map(|s| (s.label.stage.clone(), s.kind))
        .collect()
}

const BIAS_FLAT: &str = indoc! {r#"
    calibBlock:
      - name: test_calib
        flat:
          id: "field=FLAT"
        bias:
          id: "field=BIAS"
"#};

#[test]
fn test_bias_then_flat() {
    let script = generate(BIAS_FLAT, &options()).unwrap();
    assert_eq!(
        outline(&script),
        vec![
            ("bias".to_string(), StepKind::Construct),
            ("bias".to_string(), StepKind::Certify),
            ("flat".to_string(), StepKind::Construct),
            ("flat".to_string(), StepKind::Certify),
        ]
    );
    assert!(script
        .steps
        .iter()
        .all(|s| s.label.block.as_deref() == Some("test_calib")));
    assert!(script.steps[0]
        .command
        .contains("--rerun=weekly/test_calib/bias"));

    let opts = GenerateOptions {
        clean: true,
        ..options()
    };
    let script = generate(BIAS_FLAT, &opts).unwrap();
    let kinds = script.steps.iter().map(|s| s.kind).collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![
            StepKind::Construct,
            StepKind::Certify,
            StepKind::Cleanup,
            StepKind::Construct,
            StepKind::Certify,
            StepKind::Cleanup,
        ]
    );
    assert_eq!(
        script.steps[2].command,
        "rm -r -f /data/rerun/weekly/test_calib/bias"
    );
}

#[test]
fn test_certify_follows_construct() {
    let spec = indoc! {"
        calibBlock:
          - name: a
            detectorMap:
              id: field=ARC
            dark:
              id: field=DARK
            fiberProfiles:
              group:
                - visit=1
                - visit=2
          - name: b
            bootstrap:
              group:
                - flatId: visit=3
                  arcId: visit=4
            bias:
              id: field=BIAS
    "};
    let script = generate(spec, &options()).unwrap();
    let mut constructed = vec![];
    for step in &script.steps {
        let key = (step.label.block.clone(), step.label.stage.clone());
        match step.kind {
            StepKind::Construct => constructed.push(key),
            StepKind::Certify | StepKind::Combine => {
                assert!(constructed.contains(&key), "{} before construction", step.label)
            }
            _ => (),
        }
    }
    let stages = script
        .steps
        .iter()
        .filter(|s| s.kind == StepKind::Certify)
        .map(|s| s.label.to_string())
        .collect::<Vec<_>>();
    assert_eq!(
        stages,
        vec![
            "a/dark",
            "a/fiberProfiles",
            "a/detectorMap",
            "b/bias",
            "b/bootstrap"
        ]
    );
}

#[test]
fn test_ids_survive_the_script() {
    let spec = indoc! {r#"
        calibBlock:
          - name: test_calib
            fiberProfiles:
              id: ["field=FLAT_ODD^FLAT_EVEN", "arm=m"]
            dark:
              id:
                - "visit=20..22^26..37:3"
                - "target=O'Brien field"
    "#};
    let script = generate(spec, &options()).unwrap();
    let reparsed = CommandScript::parse(&script.render()).unwrap();

    let argv = reparsed.steps[0].argv().unwrap();
    assert_eq!(
        option_values(&argv, "--id"),
        vec!["visit=20..22^26..37:3", "target=O'Brien field"]
    );
    let argv = reparsed.steps[2].argv().unwrap();
    assert_eq!(
        option_values(&argv, "--id"),
        vec!["field=FLAT_ODD^FLAT_EVEN", "arm=m"]
    );
}

#[test]
fn test_generation_is_deterministic() {
    let spec = indoc! {"
        init:
          dirName: $SIM_DIR/detectorMap
          arms: [b1, r1]
          detectorMapFmt: detectorMap-{arm}.fits
        calibBlock:
          - name: calib
            fiberProfiles:
              group:
                - visit=1
                - visit=2
            bias:
              id: field=BIAS
        scienceBlock:
          - name: sci
            id: field=OBJECT
    "};
    let mut env = HashMap::new();
    env.insert("SIM_DIR".to_string(), "/sim".to_string());
    let opts = GenerateOptions {
        init: true,
        clean: true,
        ..options()
    };
    let spec = SpecFile::parse(spec).unwrap();
    let first = generate_script(&spec, &opts, &Gen2, &env).unwrap().render();
    let second = generate_script(&spec, &opts, &Gen2, &env).unwrap().render();
    assert_eq!(first, second);
    assert!(first.contains("/sim/detectorMap/detectorMap-b1.fits"));
}

#[test]
fn test_empty_spec() {
    for spec in ["", "calibBlock: []\nscienceBlock: []\n"] {
        let script = generate(spec, &options()).unwrap();
        assert!(script.is_empty());
        assert_eq!(script.render(), "#!/bin/sh\nset -uxe\n");
    }
}

#[test]
fn test_merge_arms_policy() {
    let spec = indoc! {r#"
        scienceBlock:
          - name: sci
            id: field=OBJECT
            policy:
              mergeArms:
                config: ["doApplyFiberNorms=False"]
    "#};
    let script = generate(spec, &options()).unwrap();
    assert_eq!(script.len(), 5);
    assert!(script.steps.iter().all(|s| s.kind == StepKind::Science));

    let merge = script
        .steps
        .iter()
        .find(|s| s.label.stage == "mergeArms")
        .unwrap();
    assert_eq!(
        option_values(&merge.argv().unwrap(), "--config"),
        vec!["doApplyFiberNorms=False"]
    );
    assert!(merge.command.contains("--rerun=weekly/pipeline"));

    let flux = script
        .steps
        .iter()
        .find(|s| s.label.stage == "fluxCalibrate")
        .unwrap();
    assert!(!flux.argv().unwrap().contains(&"--config".to_string()));

    let opts = GenerateOptions {
        science_steps: Some(vec![ScienceStep::CoaddSpectra, ScienceStep::MergeArms]),
        ..options()
    };
    let script = generate(spec, &opts).unwrap();
    assert_eq!(
        outline(&script)
            .into_iter()
            .map(|(s, _)| s)
            .collect::<Vec<_>>(),
        vec!["mergeArms", "coaddSpectra"]
    );
}

#[test]
fn test_groups_are_combined_per_detector() {
    let spec = indoc! {"
        calibBlock:
          - name: calib
            fiberProfiles:
              group:
                - visit=1
                - visit=2
                - visit=3
    "};
    let script = generate(spec, &options()).unwrap();
    let kinds = script.steps.iter().map(|s| s.kind).collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![
            StepKind::Construct,
            StepKind::Construct,
            StepKind::Construct,
            StepKind::Combine,
            StepKind::Combine,
            StepKind::Certify,
        ]
    );
    assert_eq!(
        script
            .steps
            .iter()
            .map(|s| s.label.to_string())
            .collect::<Vec<_>>(),
        vec![
            "calib/fiberProfiles/group0",
            "calib/fiberProfiles/group1",
            "calib/fiberProfiles/group2",
            "calib/fiberProfiles/b1",
            "calib/fiberProfiles/r1",
            "calib/fiberProfiles",
        ]
    );
    let combine = &script.steps[3];
    assert_eq!(
        combine.requires.as_deref(),
        Some("/data/rerun/weekly/calib/fiberProfiles/group*/FIBERPROFILES/*-b1.fits")
    );
    assert!(combine.command.starts_with("if ls "));
}

#[test]
fn test_block_selection() {
    let spec = indoc! {"
        scienceBlock:
          - name: sci
            id: field=OBJECT
        calibBlock:
          - name: one
            bias:
              id: field=BIAS
          - name: two
            dark:
              id: field=DARK
    "};
    // Calib blocks come first, in the requested order.
    let opts = GenerateOptions {
        blocks: Some(vec!["sci".into(), "two".into(), "one".into(), "two".into()]),
        ..options()
    };
    let script = generate(spec, &opts).unwrap();
    let blocks = script
        .steps
        .iter()
        .map(|s| s.label.block.clone().unwrap())
        .dedup()
        .collect::<Vec<_>>();
    assert_eq!(blocks, vec!["two", "one", "sci"]);

    let opts = GenerateOptions {
        blocks: Some(vec!["one".into(), "three".into()]),
        ..options()
    };
    match generate(spec, &opts) {
        Err(GenerateError::UnknownBlocks { unknown, known }) => {
            assert_eq!(unknown, "three");
            assert_eq!(known, "one, two, sci");
        }
        other => panic!("unexpected result {other:?}"),
    }

    let opts = GenerateOptions {
        force: true,
        ..opts
    };
    let script = generate(spec, &opts).unwrap();
    assert_eq!(script.len(), 2);

    let opts = GenerateOptions {
        calib_types: Some(vec![CalibType::Dark]),
        ..options()
    };
    let script = generate(spec, &opts).unwrap();
    assert_eq!(
        script
            .steps
            .iter()
            .filter(|s| s.kind != StepKind::Science)
            .map(|s| s.label.to_string())
            .collect::<Vec<_>>(),
        vec!["two/dark", "two/dark"]
    );
}

#[test]
fn test_init() {
    let spec = indoc! {"
        init:
          dirName: detectorMap
          arms: [b1]
          detectorMapFmt: detectorMap-{arm}.fits
    "};
    let opts = GenerateOptions {
        init: true,
        ..options()
    };
    let script = generate(spec, &opts).unwrap();
    assert_eq!(script.len(), 1);
    assert_eq!(script.steps[0].kind, StepKind::Ingest);
    assert_eq!(script.steps[0].label.to_string(), "init");
    assert!(script.steps[0]
        .command
        .ends_with("-- /data/detectorMap/detectorMap-b1.fits"));

    // Without --init, the init block is ignored.
    assert!(generate(spec, &options()).unwrap().is_empty());

    assert_eq!(generate(BIAS_FLAT, &opts), Err(GenerateError::NoInitBlock));

    let spec = SpecFile::parse(spec).unwrap();
    let gen3 = create_dialect(DialectType::Gen3, Gen3Settings::default());
    let result = generate_script(&spec, &opts, gen3.as_ref(), &no_env());
    assert!(matches!(
        result,
        Err(GenerateError::Dialect {
            source: DialectError::Unsupported { .. },
            ..
        })
    ));
}

#[test]
fn test_clean_with_link_is_rejected() {
    let mut opts = options();
    opts.clean = true;
    opts.command.copy_mode = CopyMode::Link;
    assert_eq!(generate(BIAS_FLAT, &opts), Err(GenerateError::CleanWithLink));

    opts.clean = false;
    let script = generate(BIAS_FLAT, &opts).unwrap();
    assert!(script.steps[1].command.contains("--mode=link"));
}

#[test]
fn test_allow_errors() {
    let mut opts = options();
    opts.command.allow_errors = true;
    let script = generate(BIAS_FLAT, &opts).unwrap();
    assert!(script.allow_errors);
    assert!(script.render().starts_with("#!/bin/sh\nset -ux\n"));
    assert!(!script.render().contains("--doraise"));
}

#[test]
fn test_gen3_generation() {
    let spec = SpecFile::parse(indoc! {"
        calibBlock:
          - name: calib
            fiberProfiles:
              group:
                - visit=1
                - visit=2
        scienceBlock:
          - name: sci
            id: visit=100
    "})
    .unwrap();
    let opts = GenerateOptions {
        clean: true,
        ..options()
    };
    let gen3 = create_dialect(DialectType::Gen3, Gen3Settings::default());
    let script = generate_script(&spec, &opts, gen3.as_ref(), &no_env()).unwrap();
    let kinds = script.steps.iter().map(|s| s.kind).collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![
            StepKind::Construct,
            StepKind::Construct,
            StepKind::Combine,
            StepKind::Combine,
            StepKind::Certify,
            StepKind::Cleanup,
            StepKind::Science,
            StepKind::Science,
            StepKind::Science,
            StepKind::Science,
            StepKind::Science,
        ]
    );
    let argv = script.steps[6].argv().unwrap();
    assert!(argv.contains(&"weekly/sci".to_string()));
}
