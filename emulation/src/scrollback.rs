//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

use crate::cell::Cell;
use bitflags::bitflags;
use std::collections::VecDeque;

/// Default scrollback depth in lines.
pub const DEFAULT_SCROLLBACK_MAX: usize = 20_000;

/// Widest line the display model supports.
pub const MAX_LINE_WIDTH: usize = 250;

bitflags! {
    /// Per-line flags.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct LineFlags: u8 {
        /// DECDWL double-width line.
        const DOUBLE_WIDTH = 0x01;
        /// DECDHL top half.
        const DOUBLE_HEIGHT_TOP = 0x02;
        /// DECDHL bottom half.
        const DOUBLE_HEIGHT_BOTTOM = 0x04;
        /// Line changed since the last render.
        const DIRTY = 0x08;
    }
}

/// One row of cells plus its line-level flags.
#[derive(Clone, Debug, PartialEq)]
pub struct Line {
    cells: Vec<Cell>,
    /// Line-level rendering flags.
    pub flags: LineFlags,
}

impl Line {
    /// Creates a blank line of the given width.
    #[must_use]
    pub fn blank(width: usize) -> Line {
        let width = width.min(MAX_LINE_WIDTH);
        Line {
            cells: vec![Cell::blank(); width],
            flags: LineFlags::DIRTY,
        }
    }

    /// Line width in cells.
    #[must_use]
    pub fn width(&self) -> usize {
        self.cells.len()
    }

    /// Immutable cell access.
    #[must_use]
    pub fn cell(&self, column: usize) -> &Cell {
        &self.cells[column]
    }

    /// Replaces a cell and marks the line dirty.
    pub fn set_cell(&mut self, column: usize, cell: Cell) {
        self.cells[column] = cell;
        self.flags.insert(LineFlags::DIRTY);
    }

    /// All cells in order.
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Mutable access for splice operations; marks the line dirty.
    pub fn cells_mut(&mut self) -> &mut Vec<Cell> {
        self.flags.insert(LineFlags::DIRTY);
        &mut self.cells
    }

    /// The line's text with trailing blanks trimmed, for capture and
    /// scrollback save in `normal` format.
    #[must_use]
    pub fn text(&self) -> String {
        let mut text: String = self.cells.iter().map(|cell| cell.glyph).collect();
        while text.ends_with(' ') {
            text.pop();
        }
        text
    }

    /// Changes the line width, truncating or padding with blanks.
    pub fn resize(&mut self, width: usize) {
        let width = width.min(MAX_LINE_WIDTH);
        self.cells.resize(width, Cell::blank());
        self.flags.insert(LineFlags::DIRTY);
    }
}

///
/// The append-only history of retired screen lines. Oldest lines retire
/// first once the cap is reached; a cap of zero means unlimited.
///
#[derive(Debug, Default)]
pub struct Scrollback {
    lines: VecDeque<Line>,
    max_lines: usize,
}

impl Scrollback {
    /// Creates a scrollback bounded at `max_lines` (0 = unlimited).
    #[must_use]
    pub fn new(max_lines: usize) -> Scrollback {
        Scrollback {
            lines: VecDeque::new(),
            max_lines,
        }
    }

    /// Appends a retired line, dropping the oldest past the cap.
    pub fn push(&mut self, line: Line) {
        self.lines.push_back(line);
        if self.max_lines > 0 {
            while self.lines.len() > self.max_lines {
                self.lines.pop_front();
            }
        }
    }

    /// Number of retained lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True when no history is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Iterates oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &Line> {
        self.lines.iter()
    }

    /// The configured cap.
    #[must_use]
    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    /// Reconfigures the cap, retiring excess immediately.
    pub fn set_max_lines(&mut self, max_lines: usize) {
        self.max_lines = max_lines;
        if self.max_lines > 0 {
            while self.lines.len() > self.max_lines {
                self.lines.pop_front();
            }
        }
    }

    /// Drops all history.
    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_text_trims_trailing_blanks() {
        let mut line = Line::blank(10);
        line.set_cell(0, Cell { glyph: 'h', ..Cell::blank() });
        line.set_cell(1, Cell { glyph: 'i', ..Cell::blank() });
        assert_eq!(line.text(), "hi");
    }

    #[test]
    fn scrollback_retires_oldest_first() {
        let mut scrollback = Scrollback::new(2);
        for glyph in ['a', 'b', 'c'] {
            let mut line = Line::blank(4);
            line.set_cell(0, Cell { glyph, ..Cell::blank() });
            scrollback.push(line);
        }
        assert_eq!(scrollback.len(), 2);
        let texts: Vec<String> = scrollback.iter().map(Line::text).collect();
        assert_eq!(texts, vec!["b", "c"]);
    }

    #[test]
    fn zero_cap_is_unlimited() {
        let mut scrollback = Scrollback::new(0);
        for _ in 0..100 {
            scrollback.push(Line::blank(4));
        }
        assert_eq!(scrollback.len(), 100);
    }

    #[test]
    fn line_width_is_capped() {
        let line = Line::blank(1000);
        assert_eq!(line.width(), MAX_LINE_WIDTH);
    }
}
