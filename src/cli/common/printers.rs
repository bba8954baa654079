// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Pretty printers for reporting information. Lines are drawn as a tree under
//! a bold title, e.g.
//!
//! ```text
//! Generating commands
//! ├ Specification: weekly.yaml
//! │ blocks: bias_1, flat_1
//! └ Output: commands.sh
//! ```

use std::{borrow::Cow, sync::Mutex};

use log::Level;

const VERTICAL: char = '│';
const UP_AND_RIGHT: char = '└';
const VERTICAL_AND_RIGHT: char = '├';

lazy_static::lazy_static! {
    static ref WARNING_PRINTER: Mutex<Vec<Block>> = Mutex::new(vec![]);
}

type Block = Vec<Cow<'static, str>>;

/// The symbol at the start of a line. Only the first line of a block gets a
/// branch; the last block's branch closes the tree.
fn branch(i_line: usize, is_last_line: bool, is_last_block: bool) -> char {
    match (i_line, is_last_line, is_last_block) {
        (0, true, true) => UP_AND_RIGHT,
        (0, _, _) => VERTICAL_AND_RIGHT,
        _ => VERTICAL,
    }
}

fn draw(level: Level, title: &str, blocks: &[Block]) {
    log::log!(level, "{}", console::style(title).bold());
    for (i_block, block) in blocks.iter().enumerate() {
        for (i_line, line) in block.iter().enumerate() {
            let symbol = branch(
                i_line,
                i_line + 1 == block.len(),
                i_block + 1 == blocks.len(),
            );
            log::log!(level, "{symbol} {line}");
        }
    }
    log::log!(level, "");
}

pub(crate) struct InfoPrinter {
    title: Cow<'static, str>,
    blocks: Vec<Block>,
}

impl InfoPrinter {
    pub(crate) fn new(title: Cow<'static, str>) -> Self {
        Self {
            title,
            blocks: vec![],
        }
    }

    pub(crate) fn push_line(&mut self, line: Cow<'static, str>) {
        self.blocks.push(vec![line]);
    }

    pub(crate) fn push_block(&mut self, block: Block) {
        if !block.is_empty() {
            self.blocks.push(block);
        }
    }

    pub(crate) fn display(self) {
        draw(Level::Info, &self.title, &self.blocks);
    }
}

pub(crate) trait Warn {
    fn warn(self);
}

fn push_warning(block: Block) {
    WARNING_PRINTER.lock().unwrap().push(block);
}

impl Warn for &'static str {
    fn warn(self) {
        push_warning(vec![self.into()]);
    }
}

impl Warn for String {
    fn warn(self) {
        push_warning(vec![self.into()]);
    }
}

impl Warn for Cow<'static, str> {
    fn warn(self) {
        push_warning(vec![self]);
    }
}

impl Warn for Vec<Cow<'static, str>> {
    fn warn(self) {
        push_warning(self);
    }
}

/// Print out any warnings that have been collected while arguments were
/// parsed, then forget them. Called once, after parameters are ready and
/// before any work is done.
pub(crate) fn display_warnings() {
    log::debug!("Displaying warnings");
    let blocks = std::mem::take(&mut *WARNING_PRINTER.lock().unwrap());
    if !blocks.is_empty() {
        draw(Level::Warn, "Warnings", &blocks);
    }
}

#[cfg(test)]
pub(crate) fn take_warnings() -> Vec<Block> {
    std::mem::take(&mut *WARNING_PRINTER.lock().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branches() {
        // One block of two lines, then a final single-line block.
        assert_eq!(branch(0, false, false), VERTICAL_AND_RIGHT);
        assert_eq!(branch(1, true, false), VERTICAL);
        assert_eq!(branch(0, true, true), UP_AND_RIGHT);
        // A multi-line last block keeps its continuation bar.
        assert_eq!(branch(0, false, true), VERTICAL_AND_RIGHT);
        assert_eq!(branch(1, true, true), VERTICAL);
    }
}
