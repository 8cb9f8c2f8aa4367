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

use bitflags::bitflags;

bitflags! {
    /// Per-cell attribute flags.
    ///
    /// `WIDE_RIGHT_HALF` marks the sentinel cell to the right of a
    /// double-width glyph; the pair is always written and erased together.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct CellFlags: u16 {
        /// Bold / increased intensity.
        const BOLD = 0x0001;
        /// Underlined.
        const UNDERLINE = 0x0002;
        /// Blinking.
        const BLINK = 0x0004;
        /// Foreground and background swapped.
        const REVERSE = 0x0008;
        /// Invisible (concealed) text.
        const INVISIBLE = 0x0010;
        /// Protected against erasure and destructive backspace.
        const PROTECTED = 0x0020;
        /// Left half of a double-width pair.
        const DOUBLE_WIDTH = 0x0040;
        /// Top half of a double-height line.
        const DOUBLE_HEIGHT_TOP = 0x0080;
        /// Bottom half of a double-height line.
        const DOUBLE_HEIGHT_BOTTOM = 0x0100;
        /// Sentinel right half of a double-width pair.
        const WIDE_RIGHT_HALF = 0x0200;
    }
}

/// Indexed colors 0-7; 8-15 are the bright variants reached through
/// SGR 90-107.
pub mod color {
    /// Black.
    pub const BLACK: u8 = 0;
    /// Red.
    pub const RED: u8 = 1;
    /// Green.
    pub const GREEN: u8 = 2;
    /// Yellow.
    pub const YELLOW: u8 = 3;
    /// Blue.
    pub const BLUE: u8 = 4;
    /// Magenta.
    pub const MAGENTA: u8 = 5;
    /// Cyan.
    pub const CYAN: u8 = 6;
    /// White.
    pub const WHITE: u8 = 7;
    /// Default foreground index.
    pub const DEFAULT_FG: u8 = WHITE;
    /// Default background index.
    pub const DEFAULT_BG: u8 = BLACK;
}

/// The attribute word carried by every cell: flags plus foreground and
/// background color indices.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CellAttr {
    /// Attribute flags.
    pub flags: CellFlags,
    /// Foreground color index.
    pub foreground: u8,
    /// Background color index.
    pub background: u8,
}

impl Default for CellAttr {
    fn default() -> Self {
        CellAttr {
            flags: CellFlags::empty(),
            foreground: color::DEFAULT_FG,
            background: color::DEFAULT_BG,
        }
    }
}

impl CellAttr {
    /// Resets to the default rendition (SGR 0).
    pub fn reset(&mut self) {
        *self = CellAttr::default();
    }
}

/// One displayable unit of the grid: a Unicode scalar and its attribute.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Cell {
    /// The glyph in this cell.
    pub glyph: char,
    /// The attribute word.
    pub attr: CellAttr,
}

impl Default for Cell {
    fn default() -> Self {
        Cell::blank()
    }
}

impl Cell {
    /// A blank cell with the default attribute.
    #[must_use]
    pub fn blank() -> Cell {
        Cell {
            glyph: ' ',
            attr: CellAttr::default(),
        }
    }

    /// A blank cell carrying the given colors (erase operations keep the
    /// active background).
    #[must_use]
    pub fn blank_with(attr: CellAttr) -> Cell {
        Cell {
            glyph: ' ',
            attr: CellAttr {
                flags: CellFlags::empty(),
                foreground: attr.foreground,
                background: attr.background,
            },
        }
    }

    /// True for the sentinel right half of a double-width pair.
    #[must_use]
    pub fn is_wide_right_half(&self) -> bool {
        self.attr.flags.contains(CellFlags::WIDE_RIGHT_HALF)
    }

    /// True when this cell is protected against erasure.
    #[must_use]
    pub fn is_protected(&self) -> bool {
        self.attr.flags.contains(CellFlags::PROTECTED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cell_is_blank_white_on_black() {
        let cell = Cell::default();
        assert_eq!(cell.glyph, ' ');
        assert_eq!(cell.attr.foreground, color::DEFAULT_FG);
        assert_eq!(cell.attr.background, color::DEFAULT_BG);
        assert!(cell.attr.flags.is_empty());
    }

    #[test]
    fn blank_with_keeps_colors_drops_flags() {
        let attr = CellAttr {
            flags: CellFlags::BOLD | CellFlags::UNDERLINE,
            foreground: color::RED,
            background: color::BLUE,
        };
        let cell = Cell::blank_with(attr);
        assert_eq!(cell.attr.foreground, color::RED);
        assert_eq!(cell.attr.background, color::BLUE);
        assert!(cell.attr.flags.is_empty());
    }
}
