// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Scripts are run against stand-in tasks that record their arguments.

#![cfg(unix)]

use std::{os::unix::fs::PermissionsExt, path::Path};

use crate::{get_cmd_output, pipe2d, Repo};

/// Put an executable `name` in `bin` that logs its invocation to `$TASK_LOG`
/// and exits with `code`.
fn fake_task(bin: &Path, name: &str, code: i32) {
    let path = bin.join(name);
    std::fs::write(
        &path,
        format!("#!/bin/sh\necho \"{name} $*\" >> \"$TASK_LOG\"\nexit {code}\n"),
    )
    .unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
}

/// A PATH with `bin` in front.
fn path_with(bin: &Path) -> String {
    match std::env::var("PATH") {
        Ok(p) => format!("{}:{p}", bin.display()),
        Err(_) => bin.display().to_string(),
    }
}

#[test]
fn test_execute_stops_at_first_failure() {
    let repo = Repo::new();
    let script = repo.path("commands.sh");
    let cmd = repo
        .generate(&script)
        .args(["--blocks", "weekly", "--calib-types", "bias", "flat"])
        .ok();
    assert!(cmd.is_ok(), "generate-commands failed: {}", cmd.err().unwrap());

    let bin = repo.path("bin");
    std::fs::create_dir(&bin).unwrap();
    fake_task(&bin, "constructPfsBias.py", 0);
    fake_task(&bin, "constructPfsFlat.py", 0);
    // Certifying the bias fails, so the flat is never built.
    fake_task(&bin, "ingestPfsCalibs.py", 3);
    let log = repo.path("tasks.log");

    let cmd = pipe2d()
        .args(["execute", "--no-progress-bars", &script.display().to_string()])
        .env("PATH", path_with(&bin))
        .env("TASK_LOG", &log)
        .ok();
    assert!(cmd.is_err());
    let exit_code = match &cmd {
        Err(e) => e.as_output().and_then(|o| o.status.code()),
        Ok(_) => None,
    };
    assert_eq!(exit_code, Some(3));
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("Step 2 (weekly/bias)"), "{stderr}");
    assert!(stderr.contains("exit code 3"), "{stderr}");

    let ran = std::fs::read_to_string(&log).unwrap();
    let ran = ran.lines().map(|l| l.split(' ').next().unwrap()).collect::<Vec<_>>();
    assert_eq!(ran, vec!["constructPfsBias.py", "ingestPfsCalibs.py"]);
}

#[test]
fn test_execute_completes() {
    let repo = Repo::new();
    let script = repo.path("commands.sh");
    let cmd = repo
        .generate(&script)
        .args(["--blocks", "weekly", "--calib-types", "bias"])
        .ok();
    assert!(cmd.is_ok(), "generate-commands failed: {}", cmd.err().unwrap());

    let bin = repo.path("bin");
    std::fs::create_dir(&bin).unwrap();
    fake_task(&bin, "constructPfsBias.py", 0);
    fake_task(&bin, "ingestPfsCalibs.py", 0);
    let log = repo.path("tasks.log");

    let cmd = pipe2d()
        .args(["execute", "--no-progress-bars", &script.display().to_string()])
        .env("PATH", path_with(&bin))
        .env("TASK_LOG", &log)
        .ok();
    assert!(cmd.is_ok(), "execute failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("Completed"), "{stdout}");

    let ran = std::fs::read_to_string(&log).unwrap();
    assert_eq!(ran.lines().count(), 2);
    assert!(ran.contains("--id visit=1..5"), "{ran}");
}

#[test]
fn test_execute_skips_combine_without_inputs() {
    let repo = Repo::new();
    let script = repo.path("commands.sh");
    let cmd = repo
        .generate(&script)
        .args(["--blocks", "weekly", "--calib-types", "fiberProfiles"])
        .ok();
    assert!(cmd.is_ok(), "generate-commands failed: {}", cmd.err().unwrap());

    let bin = repo.path("bin");
    std::fs::create_dir(&bin).unwrap();
    // Profiles are "built" but nothing is written, so there is nothing to
    // combine for either detector.
    fake_task(&bin, "reduceProfiles.py", 0);
    fake_task(&bin, "combineFiberProfiles.py", 1);
    fake_task(&bin, "ingestPfsCalibs.py", 0);
    let log = repo.path("tasks.log");

    let cmd = pipe2d()
        .args(["execute", "--no-progress-bars", &script.display().to_string()])
        .env("PATH", path_with(&bin))
        .env("TASK_LOG", &log)
        .ok();
    assert!(cmd.is_ok(), "execute failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("Skipped step(s) with no inputs: 3, 4"), "{stdout}");

    let ran = std::fs::read_to_string(&log).unwrap();
    assert!(!ran.contains("combineFiberProfiles.py"), "{ran}");
}

#[test]
fn test_execute_dry_run() {
    let repo = Repo::new();
    let script = repo.path("commands.sh");
    let cmd = repo.generate(&script).args(["--blocks", "weekly"]).ok();
    assert!(cmd.is_ok(), "generate-commands failed: {}", cmd.err().unwrap());

    let cmd = pipe2d()
        .args(["execute", "--dry-run", &script.display().to_string()])
        .env("PATH", "/nonexistent")
        .ok();
    assert!(cmd.is_ok(), "execute failed: {}", cmd.err().unwrap());
    let (stdout, _) = get_cmd_output(cmd);
    assert!(stdout.contains("weekly/fiberProfiles/b1 (combine)"), "{stdout}");
    assert!(stdout.contains("Dry run"), "{stdout}");
}

#[test]
fn test_execute_rejects_other_scripts() {
    let repo = Repo::new();
    let script = repo.path("other.sh");
    std::fs::write(&script, "#!/bin/sh\n# pipe2d: ordinal=1\nrm -rf /\n").unwrap();
    let cmd = pipe2d()
        .args(["execute", &script.display().to_string()])
        .ok();
    assert!(cmd.is_err());
    let (_, stderr) = get_cmd_output(cmd);
    assert!(stderr.contains("generate-commands"), "{stderr}");
}
