// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use indoc::formatdoc;

use crate::{get_cmd_output, pipe2d, Repo};

/// The `# pipe2d:` marker lines of a script, one per step.
fn markers(script: &str) -> Vec<&str> {
    script
        .lines()
        .filter(|l| l.starts_with("# pipe2d:"))
        .collect()
}

#[test]
fn test_generate_writes_executable_script() {
    let repo = Repo::new();
    let output = repo.path("commands.sh");
    let cmd = repo.generate(&output).args(["--rerun", "weekly"]).ok();
    assert!(cmd.is_ok(), "generate-commands failed: {}", cmd.err().unwrap());
    let (stdout, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
    assert!(stdout.contains("pipe2d generate-commands"), "{stdout}");

    let script = std::fs::read_to_string(&output).unwrap();
    assert!(script.starts_with("#!/bin/sh\nset -uxe\n"), "{script}");

    // bias, flat, 2 profile groups, a combine per detector, certify x3, then
    // the 5 science steps.
    assert_eq!(markers(&script).len(), 2 + 2 + 2 + 2 + 1 + 5);
    let bias = script.find("constructPfsBias.py").unwrap();
    let flat = script.find("constructPfsFlat.py").unwrap();
    let reduce = script.find("reduceExposure.py").unwrap();
    assert!(bias < flat && flat < reduce);
    assert!(script.contains("--rerun=weekly/weekly/bias"), "{script}");
    assert!(script.contains("--id visit=1..5"), "{script}");
    assert!(script.contains("--config isr.doDark=False"), "{script}");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&output).unwrap().permissions().mode();
        assert_eq!(mode & 0o110, 0o110);
    }
}

#[test]
fn test_generate_selection() {
    let repo = Repo::new();
    let output = repo.path("commands.sh");
    #[rustfmt::skip]
    let cmd = repo
        .generate(&output)
        .args([
            "--blocks", "objects", "weekly",
            "--calib-types", "flat",
            "--science-steps", "reduceExposure",
            "-j", "4",
        ])
        .ok();
    assert!(cmd.is_ok(), "generate-commands failed: {}", cmd.err().unwrap());

    let script = std::fs::read_to_string(&output).unwrap();
    assert!(!script.contains("constructPfsBias.py"));
    assert!(!script.contains("mergeArms.py"));
    // Calib blocks first regardless of --blocks order.
    assert!(script.find("constructPfsFlat.py").unwrap() < script.find("reduceExposure.py").unwrap());
    assert!(script.contains("--batch-type=smp --cores=4"), "{script}");
    assert!(script.contains("-j4"), "{script}");
}

#[test]
fn test_generate_unknown_block() {
    let repo = Repo::new();
    let output = repo.path("commands.sh");
    let cmd = repo.generate(&output).args(["--blocks", "nope"]).ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.starts_with("Error: "), "{stderr}");
    assert!(stderr.contains("nope"), "{stderr}");
    assert!(!output.exists());

    let cmd = repo
        .generate(&output)
        .args(["--blocks", "nope", "weekly", "--force"])
        .ok();
    assert!(cmd.is_ok(), "generate-commands failed: {}", cmd.err().unwrap());
    assert!(output.exists());
}

#[test]
fn test_generate_init() {
    let repo = Repo::new();
    let output = repo.path("commands.sh");
    let cmd = repo
        .generate(&output)
        .args(["--init", "--blocks", "weekly"])
        .env("PFS_INSTDATA_DIR", "/opt/instdata")
        .ok();
    assert!(cmd.is_ok(), "generate-commands failed: {}", cmd.err().unwrap());
    let script = std::fs::read_to_string(&output).unwrap();
    let first = script.lines().find(|l| l.contains("ingestPfsCalibs.py")).unwrap();
    assert!(first.contains("--create"), "{first}");
    assert!(
        first.contains("/opt/instdata/data/drp/detectorMap-sim-r1.fits"),
        "{first}"
    );

    // The init directory's variable must be set.
    let cmd = repo
        .generate(&output)
        .args(["--init"])
        .env_remove("PFS_INSTDATA_DIR")
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("PFS_INSTDATA_DIR"), "{stderr}");
}

#[test]
fn test_generate_gen3() {
    let repo = Repo::new();
    let output = repo.path("commands.sh");
    #[rustfmt::skip]
    let cmd = repo
        .generate(&output)
        .args([
            "--dialect", "gen3",
            "--butler-config", "/repo/butler.yaml",
            "--calib-date", "2024-03-01",
            "--blocks", "weekly",
            "--calib-types", "bias",
        ])
        .ok();
    assert!(cmd.is_ok(), "generate-commands failed: {}", cmd.err().unwrap());
    let script = std::fs::read_to_string(&output).unwrap();
    assert!(script.contains("pipetask run -b /repo/butler.yaml"), "{script}");
    assert!(script.contains("visit >= 1") || script.contains("1 <= visit"), "{script}");
    assert!(script.contains("butler certify-calibrations"), "{script}");
}

#[test]
fn test_arguments_file_and_save_toml() {
    let repo = Repo::new();
    let output = repo.path("commands.sh");
    let args_file = repo.path("args.toml");
    std::fs::write(
        &args_file,
        formatdoc! {r#"
            data_dir = "{}"
            spec_file = "{}"
            output = "{}"
            rerun = "from_file"
            blocks = ["weekly"]
        "#,
            repo.data_dir.display(),
            repo.spec_file.display(),
            output.display(),
        },
    )
    .unwrap();

    let saved = repo.path("saved.toml");
    let cmd = pipe2d()
        .args([
            "generate-commands",
            &args_file.display().to_string(),
            "--rerun",
            "from_cli",
            "--save-toml",
            &saved.display().to_string(),
        ])
        .ok();
    assert!(cmd.is_ok(), "generate-commands failed: {}", cmd.err().unwrap());
    let script = std::fs::read_to_string(&output).unwrap();
    assert!(script.contains("--rerun=from_cli/weekly/bias"), "{script}");
    assert!(!script.contains("reduceExposure.py"));

    // The saved arguments reproduce the run.
    let saved_args = std::fs::read_to_string(&saved).unwrap();
    assert!(saved_args.contains("rerun = \"from_cli\""), "{saved_args}");
    std::fs::remove_file(&output).unwrap();
    let cmd = pipe2d()
        .args(["generate-commands", &saved.display().to_string()])
        .ok();
    assert!(cmd.is_ok(), "generate-commands failed: {}", cmd.err().unwrap());
    assert_eq!(std::fs::read_to_string(&output).unwrap(), script);
}

#[test]
fn test_generate_dry_run() {
    let repo = Repo::new();
    let output = repo.path("commands.sh");
    let cmd = repo.generate(&output).arg("--dry-run").ok();
    assert!(cmd.is_ok(), "generate-commands failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("weekly/bias (construct)"), "{stdout}");
    assert!(stdout.contains("Dry run"), "{stdout}");
    assert!(!output.exists());
}
