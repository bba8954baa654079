// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests.
//!
//! Some help for laying out these tests was taken from:
//! https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod execute;
mod generate_commands;
mod spec_verify;

use std::{
    path::{Path, PathBuf},
    process::Output,
    str::from_utf8,
};

use assert_cmd::{output::OutputError, Command};
use indoc::indoc;
use tempfile::TempDir;

fn pipe2d() -> Command {
    Command::cargo_bin("pipe2d").unwrap()
}

fn get_cmd_output(result: Result<Output, OutputError>) -> (String, String) {
    let output = match result {
        Ok(o) => o,
        Err(o) => o.as_output().unwrap().clone(),
    };
    (
        from_utf8(&output.stdout).unwrap().to_string(),
        from_utf8(&output.stderr).unwrap().to_string(),
    )
}

const SPEC: &str = indoc! {r#"
    init:
      dirName: "$PFS_INSTDATA_DIR/data/drp"
      arms: [b1, r1]
      detectorMapFmt: "detectorMap-sim-{arm}.fits"

    calibBlock:
      - name: weekly
        bias:
          id: "visit=1..5"
        flat:
          id: ["visit=6..10:2", "arm=b^r"]
          config: "isr.doDark=False"
        fiberProfiles:
          group:
            - id: "visit=20"
            - id: "visit=21"

    scienceBlock:
      - name: objects
        id: "visit=100..102"
        policy:
          mergeArms:
            config: "doApplyFiberNorms=False"
"#};

/// A data directory holding a calib repository and a specification file.
struct Repo {
    tmp: TempDir,
    data_dir: PathBuf,
    spec_file: PathBuf,
}

impl Repo {
    fn new() -> Repo {
        let tmp = TempDir::new().expect("couldn't make tmp dir");
        let data_dir = tmp.path().join("data");
        std::fs::create_dir_all(data_dir.join("CALIB")).unwrap();
        let spec_file = tmp.path().join("spec.yaml");
        std::fs::write(&spec_file, SPEC).unwrap();
        Repo {
            tmp,
            data_dir,
            spec_file,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.tmp.path().join(name)
    }

    /// `generate-commands` with the data directory and spec file filled in.
    fn generate(&self, output: &Path) -> Command {
        let mut cmd = pipe2d();
        cmd.args([
            "generate-commands",
            "--no-progress-bars",
            "-d",
            &self.data_dir.display().to_string(),
            "-s",
            &self.spec_file.display().to_string(),
            "-o",
            &output.display().to_string(),
        ]);
        cmd
    }
}
