// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The main pipe2d binary.

use clap::Parser;

use pipe2d::Pipe2d;

fn main() {
    // Run pipe2d, only performing extra steps if it returned an error.
    if let Err(e) = Pipe2d::parse().run() {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}
