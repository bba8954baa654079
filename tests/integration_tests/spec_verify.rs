// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::{get_cmd_output, pipe2d, Repo};

#[test]
fn test_spec_verify_summarises() {
    let repo = Repo::new();
    let cmd = pipe2d()
        .args(["spec-verify", &repo.spec_file.display().to_string()])
        .ok();
    assert!(cmd.is_ok(), "spec-verify failed: {}", cmd.err().unwrap());
    let (stdout, stderr) = get_cmd_output(cmd);
    assert!(stderr.is_empty(), "stderr wasn't empty: {stderr}");
    assert!(stdout.contains("calibBlock 'weekly'"), "{stdout}");
    assert!(stdout.contains("fiberProfiles: 2 group(s)"), "{stdout}");
    assert!(stdout.contains("scienceBlock 'objects'"), "{stdout}");
}

#[test]
fn test_spec_verify_continues_past_failures() {
    let repo = Repo::new();
    let bad = repo.path("bad.yaml");
    std::fs::write(&bad, "calibBlock:\n  - name: x\n    bias:\n      id: \"visit=1..5:0\"\n").unwrap();

    let cmd = pipe2d()
        .args([
            "spec-verify",
            &bad.display().to_string(),
            &repo.spec_file.display().to_string(),
        ])
        .ok();
    assert!(cmd.is_err());
    let (stdout, stderr) = get_cmd_output(cmd);
    // The good file is still summarised.
    assert!(stdout.contains("calibBlock 'weekly'"), "{stdout}");
    assert!(stdout.contains("visit=1..5:0"), "{stdout}");
    assert!(stderr.contains("1 of 2"), "{stderr}");
}

#[test]
fn test_spec_verify_needs_files() {
    let cmd = pipe2d().arg("spec-verify").ok();
    assert!(cmd.is_err());
}
