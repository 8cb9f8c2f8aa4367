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

//! Atari ATASCII interpretation. Bit 7 is inverse video on printable
//! glyphs; the low control region carries the graphics bank. Declared
//! wide-font like PETSCII.

use crate::emulator::RetroAction;

/// State carried between bytes; ATASCII has no latching controls beyond
/// an escape that passes the next control byte through as a glyph.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct AtasciiState {
    /// 0x1B: display the next byte literally.
    literal_next: bool,
}

/// Consumes one ATASCII byte into retro actions.
pub(crate) fn consume(state: &mut AtasciiState, byte: u8, actions: &mut Vec<RetroAction>) {
    if state.literal_next {
        state.literal_next = false;
        push_glyph(byte, actions);
        return;
    }
    match byte {
        0x1B => state.literal_next = true,
        // EOL.
        0x9B => {
            actions.push(RetroAction::Control(0x0D));
            actions.push(RetroAction::Control(0x0A));
        }
        0x7D => actions.push(RetroAction::ClearScreen),
        0x1C => actions.push(RetroAction::CursorUp),
        0x1D => actions.push(RetroAction::CursorDown),
        0x1E => actions.push(RetroAction::CursorLeft),
        0x1F => actions.push(RetroAction::CursorRight),
        0x7E => actions.push(RetroAction::Control(0x08)),
        0x7F => actions.push(RetroAction::Control(0x09)),
        0xFD => actions.push(RetroAction::Control(0x07)),
        _ => push_glyph(byte, actions),
    }
}

fn push_glyph(byte: u8, actions: &mut Vec<RetroAction>) {
    let inverse = byte & 0x80 != 0;
    if inverse {
        actions.push(RetroAction::ReverseVideo(true));
    }
    actions.push(RetroAction::Print(glyph_for(byte & 0x7F)));
    if inverse {
        actions.push(RetroAction::ReverseVideo(false));
    }
}

/// The ATASCII graphics bank occupies 0x00-0x1F; the rest is ASCII.
fn glyph_for(byte: u8) -> char {
    match byte {
        0x00 => '♥',
        0x01 => '├',
        0x02 => '▕',
        0x03 => '┘',
        0x04 => '┤',
        0x05 => '┐',
        0x06 => '╱',
        0x07 => '╲',
        0x08 => '◢',
        0x09 => '▗',
        0x0A => '◣',
        0x0B => '▝',
        0x0C => '▘',
        0x0D => '▔',
        0x0E => '▁',
        0x0F => '▖',
        0x10 => '♣',
        0x11 => '┌',
        0x12 => '─',
        0x13 => '┼',
        0x14 => '●',
        0x15 => '▄',
        0x16 => '▎',
        0x17 => '┬',
        0x18 => '┴',
        0x19 => '▌',
        0x1A => '└',
        0x1B => '\u{241B}',
        0x1C => '↑',
        0x1D => '↓',
        0x1E => '←',
        0x1F => '→',
        0x60 => '◆',
        _ => byte as char,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellFlags;
    use crate::emulator::{Emulation, Emulator};

    fn emulator() -> Emulator {
        Emulator::new(Emulation::Atascii, 40, 24, 0)
    }

    #[test]
    fn plain_ascii_prints() {
        let mut emu = emulator();
        emu.consume(b"READY");
        assert_eq!(emu.screen().rows()[0].text(), "READY");
    }

    #[test]
    fn eol_moves_to_next_line() {
        let mut emu = emulator();
        emu.consume(b"A");
        emu.consume(&[0x9B]);
        emu.consume(b"B");
        assert_eq!(emu.screen().rows()[1].text(), "B");
    }

    #[test]
    fn inverse_video_per_byte() {
        let mut emu = emulator();
        emu.consume(&[b'A' | 0x80, b'B']);
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
    fn clear_screen() {
        let mut emu = emulator();
        emu.consume(b"JUNK");
        emu.consume(&[0x7D]);
        emu.consume(b"X");
        assert_eq!(emu.screen().rows()[0].text(), "X");
    }

    #[test]
    fn graphics_bank_maps_to_unicode() {
        let mut emu = emulator();
        emu.consume(&[0x00, 0x10]);
        assert_eq!(emu.screen().rows()[0].text(), "♥♣");
    }

    #[test]
    fn escape_displays_next_control_literally() {
        let mut emu = emulator();
        emu.consume(&[0x1B, 0x1C]);
        // Displayed as the up-arrow glyph rather than moving the cursor.
        assert_eq!(emu.screen().cursor_row(), 0);
        assert_eq!(emu.screen().rows()[0].text(), "↑");
    }

    #[test]
    fn buzzer_beeps() {
        let mut emu = emulator();
        emu.consume(&[0xFD]);
        assert!(emu
            .drain_effects()
            .contains(&crate::emulator::EmulatorEffect::Beep));
    }
}
