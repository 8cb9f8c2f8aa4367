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

//! Commodore PETSCII interpretation: color controls, reverse video, the
//! shifted/unshifted character banks, and a Unicode approximation of the
//! graphics bank. Declared wide-font; the UI renders these sessions in
//! 40-column glyphs.

use crate::cell::color;
use crate::emulator::RetroAction;

/// Interpreter state carried between bytes.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct PetsciiState {
    /// Reverse-video latch (RVS ON 0x12 / RVS OFF 0x92).
    reverse: bool,
    /// Shifted (text) bank selected with 0x0E; unshifted with 0x8E.
    shifted: bool,
}

/// PETSCII control color codes to the ANSI palette.
fn color_for(byte: u8) -> Option<u8> {
    match byte {
        0x05 => Some(color::WHITE),
        0x1C => Some(color::RED),
        0x1E => Some(color::GREEN),
        0x1F => Some(color::BLUE),
        0x90 => Some(color::BLACK),
        0x9C => Some(color::MAGENTA),
        0x9E => Some(color::YELLOW),
        0x9F => Some(color::CYAN),
        _ => None,
    }
}

/// Consumes one PETSCII byte into retro actions.
pub(crate) fn consume(state: &mut PetsciiState, byte: u8, actions: &mut Vec<RetroAction>) {
    if let Some(index) = color_for(byte) {
        actions.push(RetroAction::SetForeground(index));
        return;
    }
    match byte {
        0x0D | 0x8D => {
            actions.push(RetroAction::Control(0x0D));
            actions.push(RetroAction::Control(0x0A));
            if state.reverse {
                state.reverse = false;
                actions.push(RetroAction::ReverseVideo(false));
            }
        }
        0x0E => state.shifted = true,
        0x8E => state.shifted = false,
        0x11 => actions.push(RetroAction::CursorDown),
        0x91 => actions.push(RetroAction::CursorUp),
        0x1D => actions.push(RetroAction::CursorRight),
        0x9D => actions.push(RetroAction::CursorLeft),
        0x12 => {
            state.reverse = true;
            actions.push(RetroAction::ReverseVideo(true));
        }
        0x92 => {
            state.reverse = false;
            actions.push(RetroAction::ReverseVideo(false));
        }
        0x13 => actions.push(RetroAction::MoveTo(0, 0)),
        0x93 => {
            actions.push(RetroAction::ClearScreen);
        }
        0x14 => actions.push(RetroAction::Control(0x08)),
        0x07 => actions.push(RetroAction::Control(0x07)),
        0x00..=0x1F | 0x80..=0x9F => {
            // Remaining control range is silently consumed.
        }
        _ => actions.push(RetroAction::Print(glyph_for(state, byte))),
    }
}

/// Maps a printable PETSCII byte to a Unicode approximation.
fn glyph_for(state: &PetsciiState, byte: u8) -> char {
    match byte {
        0x20..=0x3F => byte as char,
        // Unshifted: 0x41-0x5A render uppercase; the shifted bank swaps
        // in lowercase there and uppercase at 0xC1.
        0x41..=0x5A => {
            if state.shifted {
                (byte + 0x20) as char
            } else {
                byte as char
            }
        }
        0x5B => '[',
        0x5C => '£',
        0x5D => ']',
        0x5E => '↑',
        0x5F => '←',
        0x40 => '@',
        0xC1..=0xDA => (byte - 0x80) as char,
        // Common graphics bank glyphs.
        0x60 | 0xC0 => '─',
        0x7D | 0xDD => '│',
        0x6D => '╲',
        0x6E => '╱',
        0xA0 => '\u{00A0}',
        0xA1 => '▌',
        0xA2 => '▄',
        0xA4 => '▁',
        0xA5 => '▎',
        0xA6 => '▒',
        0xAF => '▃',
        0x66 | 0xE6 => '▒',
        0x61 | 0xE1 => '▌',
        0x62 | 0xE2 => '▐',
        0x63 | 0xE3 => '▔',
        0x64 | 0xE4 => '▁',
        0x65 | 0xE5 => '▏',
        0x67 | 0xE7 => '▕',
        0x68 | 0xE8 => '▒',
        0x69 | 0xE9 => '◤',
        0x6A | 0xEA => '▕',
        0x7B | 0xDB => '┼',
        0x6B | 0xEB => '├',
        0x73 | 0xF3 => '┤',
        0x71 | 0xF1 => '┴',
        0x72 | 0xF2 => '┬',
        0x70 | 0xF0 => '┌',
        0x6C | 0xEC => '▗',
        0x7A | 0xFA => '◆',
        0x77 | 0xF7 => '●',
        0x78 | 0xF8 => '♣',
        0x76 | 0xF6 => '╳',
        0x75 | 0xF5 => '◥',
        _ => ' ',
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellFlags;
    use crate::emulator::{Emulation, Emulator};

    fn emulator() -> Emulator {
        Emulator::new(Emulation::Petscii, 40, 25, 0)
    }

    #[test]
    fn uppercase_in_unshifted_bank() {
        let mut emu = emulator();
        emu.consume(b"HELLO");
        assert_eq!(emu.screen().rows()[0].text(), "HELLO");
    }

    #[test]
    fn shifted_bank_renders_lowercase() {
        let mut emu = emulator();
        emu.consume(&[0x0E]);
        emu.consume(b"HI");
        assert_eq!(emu.screen().rows()[0].text(), "hi");
    }

    #[test]
    fn reverse_video_latch() {
        let mut emu = emulator();
        emu.consume(&[0x12, b'A', 0x92, b'B']);
        assert!(emu.screen().rows()[0]
            .cell(0)
            .attr
            .flags
            .contains(CellFlags::REVERSE));
        assert!(!emu.screen().rows()[0]
            .cell(1)
            .attr
            .flags
            .contains(CellFlags::REVERSE));
    }

    #[test]
    fn return_clears_reverse() {
        let mut emu = emulator();
        emu.consume(&[0x12, b'A', 0x0D, b'B']);
        assert!(!emu.screen().rows()[1]
            .cell(0)
            .attr
            .flags
            .contains(CellFlags::REVERSE));
    }

    #[test]
    fn color_codes_change_foreground() {
        let mut emu = emulator();
        emu.consume(&[0x1C, b'r']);
        assert_eq!(
            emu.screen().rows()[0].cell(0).attr.foreground,
            crate::cell::color::RED
        );
    }

    #[test]
    fn clear_screen_and_home() {
        let mut emu = emulator();
        emu.consume(b"JUNK");
        emu.consume(&[0x93, b'X']);
        assert_eq!(emu.screen().rows()[0].text(), "X");
    }

    #[test]
    fn wide_font_declared() {
        assert!(Emulation::Petscii.requires_wide_font());
    }
}
