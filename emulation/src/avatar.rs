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

//! AVATAR (AVT/0) interpreter.
//!
//! AVT/0 compresses the common ANSI operations into one- and two-byte
//! commands: `^L` clears, `^V` prefixes a command, `^Y` run-length repeats
//! a character. An ESC anywhere hands the current sequence to the ANSI
//! interpreter, since BBS software mixed the two freely.

use crate::emulator::RetroAction;
use crate::parser::{Parser, Sequence};

/// Interpreter states.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum State {
    /// Ordinary bytes.
    #[default]
    Ground,
    /// After `^V`.
    Command,
    /// After `^V ^A`, the attribute byte follows.
    Attribute,
    /// After `^V ^H`, the row byte follows.
    Row,
    /// After `^V ^H row`, the column byte follows.
    Column(u8),
    /// After `^Y`, the character to repeat follows.
    RepeatChar,
    /// After `^Y char`, the count follows.
    RepeatCount(u8),
    /// Inside an ANSI escape sequence.
    AnsiFallback,
}

/// The AVT/0 state machine; grid mutations are queued as
/// [`RetroAction`]s and ANSI fallback sequences surface to the caller.
#[derive(Debug, Default)]
pub(crate) struct AvatarInterpreter {
    state: State,
    actions: Vec<RetroAction>,
}

impl AvatarInterpreter {
    pub(crate) fn new() -> AvatarInterpreter {
        AvatarInterpreter::default()
    }

    /// Consumes one byte. Returns a parsed ANSI sequence while in
    /// fallback; otherwise queues actions retrievable with
    /// [`AvatarInterpreter::take_actions`].
    pub(crate) fn consume(&mut self, byte: u8, parser: &mut Parser) -> Option<Sequence> {
        match self.state {
            State::AnsiFallback => {
                let sequence = parser.next(byte);
                if sequence.is_some() {
                    // One complete sequence, then back to AVATAR rules.
                    self.state = State::Ground;
                }
                sequence
            }
            State::Ground => {
                match byte {
                    0x1B => {
                        self.state = State::AnsiFallback;
                        let _ = parser.next(byte);
                    }
                    0x0C => {
                        self.actions.push(RetroAction::ResetAttr);
                        self.actions.push(RetroAction::ClearScreen);
                    }
                    0x16 => self.state = State::Command,
                    0x19 => self.state = State::RepeatChar,
                    0x00..=0x1F | 0x7F => self.actions.push(RetroAction::Control(byte)),
                    _ => self.actions.push(RetroAction::PrintByte(byte)),
                }
                None
            }
            State::Command => {
                match byte {
                    0x01 => self.state = State::Attribute,
                    0x02 => {
                        self.actions.push(RetroAction::BlinkOn);
                        self.state = State::Ground;
                    }
                    0x03 => {
                        self.actions.push(RetroAction::CursorUp);
                        self.state = State::Ground;
                    }
                    0x04 => {
                        self.actions.push(RetroAction::CursorDown);
                        self.state = State::Ground;
                    }
                    0x05 => {
                        self.actions.push(RetroAction::CursorLeft);
                        self.state = State::Ground;
                    }
                    0x06 => {
                        self.actions.push(RetroAction::CursorRight);
                        self.state = State::Ground;
                    }
                    0x07 => {
                        self.actions.push(RetroAction::ClearToEol);
                        self.state = State::Ground;
                    }
                    0x08 => self.state = State::Row,
                    _ => {
                        // Unknown command byte; drop it.
                        self.state = State::Ground;
                    }
                }
                None
            }
            State::Attribute => {
                self.actions.push(RetroAction::SetAvatarColor(byte));
                self.state = State::Ground;
                None
            }
            State::Row => {
                self.state = State::Column(byte);
                None
            }
            State::Column(row) => {
                // One-based coordinates on the wire.
                let row = usize::from(row.saturating_sub(1));
                let col = usize::from(byte.saturating_sub(1));
                self.actions.push(RetroAction::MoveTo(row, col));
                self.state = State::Ground;
                None
            }
            State::RepeatChar => {
                self.state = State::RepeatCount(byte);
                None
            }
            State::RepeatCount(repeated) => {
                for _ in 0..byte {
                    self.actions.push(RetroAction::PrintByte(repeated));
                }
                self.state = State::Ground;
                None
            }
        }
    }

    /// Takes the queued grid mutations.
    pub(crate) fn take_actions(&mut self) -> Vec<RetroAction> {
        std::mem::take(&mut self.actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::{Emulation, Emulator};
    use crate::cell::CellFlags;

    fn emulator() -> Emulator {
        Emulator::new(Emulation::Avatar, 80, 25, 0)
    }

    #[test]
    fn plain_text_prints() {
        let mut emu = emulator();
        emu.consume(b"hello");
        assert_eq!(emu.screen().rows()[0].text(), "hello");
    }

    #[test]
    fn clear_resets_and_homes() {
        let mut emu = emulator();
        emu.consume(b"junk\x0c");
        assert_eq!(emu.screen().rows()[0].text(), "");
        assert_eq!(emu.screen().cursor_col(), 0);
    }

    #[test]
    fn attribute_command_sets_colors() {
        let mut emu = emulator();
        // ^V ^A 0x1E: bold yellow on blue in IBM attribute order.
        emu.consume(&[0x16, 0x01, 0x1E, b'x']);
        let cell = emu.screen().rows()[0].cell(0);
        assert_eq!(cell.attr.foreground, crate::cell::color::YELLOW);
        assert_eq!(cell.attr.background, crate::cell::color::BLUE);
        assert!(cell.attr.flags.contains(CellFlags::BOLD));
    }

    #[test]
    fn repeat_command_prints_run() {
        let mut emu = emulator();
        emu.consume(&[0x19, b'-', 5]);
        assert_eq!(emu.screen().rows()[0].text(), "-----");
    }

    #[test]
    fn position_command_is_one_based() {
        let mut emu = emulator();
        emu.consume(&[0x16, 0x08, 3, 10, b'X']);
        assert_eq!(emu.screen().rows()[2].cell(9).glyph, 'X');
    }

    #[test]
    fn cursor_step_commands() {
        let mut emu = emulator();
        emu.consume(&[0x16, 0x08, 5, 5]);
        emu.consume(&[0x16, 0x04, 0x16, 0x06]);
        assert_eq!(emu.screen().cursor_row(), 5);
        assert_eq!(emu.screen().cursor_col(), 5);
    }

    #[test]
    fn ansi_fallback_for_one_sequence() {
        let mut emu = emulator();
        emu.consume(b"\x1b[1;31mred\x19.\x03");
        let cell = emu.screen().rows()[0].cell(0);
        assert_eq!(cell.glyph, 'r');
        assert_eq!(cell.attr.foreground, 1);
        assert!(cell.attr.flags.contains(CellFlags::BOLD));
        // The ^Y repeat still works after the fallback.
        assert_eq!(emu.screen().rows()[0].text(), "red...");
    }

    #[test]
    fn cp437_box_drawing_in_avatar() {
        let mut emu = emulator();
        emu.consume(&[0x19, 0xCD, 3]);
        assert_eq!(emu.screen().rows()[0].text(), "═══");
    }
}
