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

use crate::avatar::AvatarInterpreter;
use crate::parser::{Parser, Sequence};
use crate::screen::Screen;
use crate::{atascii, petscii, vt};
use qodem_codepage::{Codepage, UnicodeMap};
use tracing::debug;

/// The emulations the terminal can speak.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Emulation {
    /// Bare teletype: CR/LF/BS/TAB/BEL only.
    Tty,
    /// Hex dump of the raw stream, for wire debugging.
    Debug,
    /// ANSI.SYS / BBS ANSI with music and Avatar-style extensions.
    #[default]
    Ansi,
    /// AVATAR (AVT/0).
    Avatar,
    /// DEC VT52.
    Vt52,
    /// DEC VT100.
    Vt100,
    /// DEC VT102.
    Vt102,
    /// DEC VT220.
    Vt220,
    /// Linux console.
    Linux,
    /// XTerm, 8-bit codepage.
    Xterm,
    /// XTerm speaking UTF-8.
    XtermUtf8,
    /// Commodore PETSCII.
    Petscii,
    /// Atari ATASCII.
    Atascii,
}

impl Emulation {
    /// Parses an emulation name from the CLI / options file.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Emulation> {
        match name.to_ascii_uppercase().as_str() {
            "TTY" => Some(Emulation::Tty),
            "DEBUG" => Some(Emulation::Debug),
            "ANSI" => Some(Emulation::Ansi),
            "AVATAR" => Some(Emulation::Avatar),
            "VT52" => Some(Emulation::Vt52),
            "VT100" => Some(Emulation::Vt100),
            "VT102" => Some(Emulation::Vt102),
            "VT220" => Some(Emulation::Vt220),
            "LINUX" => Some(Emulation::Linux),
            "XTERM" => Some(Emulation::Xterm),
            "XTERM-UTF8" | "X_UTF8" => Some(Emulation::XtermUtf8),
            "PETSCII" => Some(Emulation::Petscii),
            "ATASCII" => Some(Emulation::Atascii),
            _ => None,
        }
    }

    /// The canonical name, also used for the telnet TERMINAL-TYPE answer.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Emulation::Tty => "TTY",
            Emulation::Debug => "DEBUG",
            Emulation::Ansi => "ANSI",
            Emulation::Avatar => "AVATAR",
            Emulation::Vt52 => "VT52",
            Emulation::Vt100 => "VT100",
            Emulation::Vt102 => "VT102",
            Emulation::Vt220 => "VT220",
            Emulation::Linux => "LINUX",
            Emulation::Xterm | Emulation::XtermUtf8 => "XTERM",
            Emulation::Petscii => "PETSCII",
            Emulation::Atascii => "ATASCII",
        }
    }

    /// True for emulations decoding the stream as UTF-8.
    #[must_use]
    pub fn is_utf8(self) -> bool {
        matches!(self, Emulation::XtermUtf8)
    }

    /// True for the VT/ANSI family sharing the CSI dispatch.
    #[must_use]
    pub fn is_vt_family(self) -> bool {
        matches!(
            self,
            Emulation::Ansi
                | Emulation::Vt100
                | Emulation::Vt102
                | Emulation::Vt220
                | Emulation::Linux
                | Emulation::Xterm
                | Emulation::XtermUtf8
        )
    }

    /// The 8-bit retro emulations want the platform's wide font.
    #[must_use]
    pub fn requires_wide_font(self) -> bool {
        matches!(self, Emulation::Petscii | Emulation::Atascii)
    }

    /// The default codepage for the emulation.
    #[must_use]
    pub fn default_codepage(self) -> Codepage {
        match self {
            Emulation::XtermUtf8 => Codepage::Utf8,
            Emulation::Vt52 | Emulation::Vt100 | Emulation::Vt102 | Emulation::Vt220 => {
                Codepage::Windows1252
            }
            _ => Codepage::Cp437,
        }
    }
}

/// Mouse reporting requested by the remote (XTerm 1000/1002, encoded per
/// 1006 when set).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MouseMode {
    /// Reporting off.
    #[default]
    Off,
    /// Button presses (mode 1000).
    Normal,
    /// Presses plus drag motion (mode 1002).
    ButtonEvent,
}

/// Side effects an emulator produces beyond grid mutation. The dispatcher
/// drains these every iteration; `Response` bytes must reach the wire
/// within the same loop pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmulatorEffect {
    /// Ring the bell.
    Beep,
    /// Bytes to transmit (DA/DSR/CPR/answerback replies).
    Response(Vec<u8>),
    /// Window title from an OSC, delivered to the UI sink.
    SetTitle(String),
    /// ANSI music payload for the external music sink.
    Music(Vec<u8>),
}

/// Emulator tunables from the options file.
#[derive(Clone, Debug)]
pub struct EmulatorConfig {
    /// ENQ answerback string (empty disables).
    pub answerback: Vec<u8>,
    /// Recognize `ESC [ M` ANSI music in the ANSI emulation.
    pub ansi_music: bool,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        EmulatorConfig {
            answerback: Vec::new(),
            ansi_music: true,
        }
    }
}

/// Transient VT52 direct-cursor-address capture (`ESC Y row col`).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum Vt52Address {
    #[default]
    Idle,
    WantRow,
    WantCol(u8),
}

///
/// One terminal emulator: a parser, a screen, and the per-emulation
/// dispatch rules, consuming one byte of remote output at a time.
///
/// The byte flow is: raw byte → (parser framing) → codepage / charset
/// mapping → cell writes on [`Screen`], with side effects accumulating in
/// an effect queue the owner drains after each batch.
///
pub struct Emulator {
    emulation: Emulation,
    parser: Parser,
    screen: Screen,
    codepage: Codepage,
    unicode_map: UnicodeMap,
    config: EmulatorConfig,
    effects: Vec<EmulatorEffect>,
    avatar: AvatarInterpreter,
    vt52_address: Vt52Address,
    /// Where `ESC <` returns after a DECANM drop into VT52.
    vt52_return: Option<Emulation>,
    petscii: petscii::PetsciiState,
    atascii_state: atascii::AtasciiState,
    mouse_mode: MouseMode,
    sgr_mouse: bool,
    bracketed_paste: bool,
    cursor_visible: bool,
    debug_column: usize,
}

impl Emulator {
    /// Creates an emulator with the emulation's default codepage.
    #[must_use]
    pub fn new(emulation: Emulation, width: usize, height: usize, scrollback_max: usize) -> Emulator {
        Emulator::with_config(
            emulation,
            width,
            height,
            scrollback_max,
            EmulatorConfig::default(),
        )
    }

    /// Creates an emulator with explicit tunables.
    #[must_use]
    pub fn with_config(
        emulation: Emulation,
        width: usize,
        height: usize,
        scrollback_max: usize,
        config: EmulatorConfig,
    ) -> Emulator {
        Emulator {
            emulation,
            parser: Parser::new(emulation.is_utf8()),
            screen: Screen::new(width, height, scrollback_max),
            codepage: emulation.default_codepage(),
            unicode_map: UnicodeMap::new(),
            config,
            effects: Vec::new(),
            avatar: AvatarInterpreter::new(),
            vt52_address: Vt52Address::Idle,
            vt52_return: None,
            petscii: petscii::PetsciiState::default(),
            atascii_state: atascii::AtasciiState::default(),
            mouse_mode: MouseMode::Off,
            sgr_mouse: false,
            bracketed_paste: false,
            cursor_visible: true,
            debug_column: 0,
        }
    }

    /// The active emulation.
    #[must_use]
    pub fn emulation(&self) -> Emulation {
        self.emulation
    }

    /// Switches emulation, resetting parser state but keeping the grid.
    pub fn set_emulation(&mut self, emulation: Emulation) {
        self.emulation = emulation;
        self.parser.set_utf8_mode(emulation.is_utf8());
        self.codepage = emulation.default_codepage();
        self.vt52_address = Vt52Address::Idle;
        self.avatar = AvatarInterpreter::new();
    }

    /// DECANM reset: drop from an ANSI emulation into VT52, remembering
    /// where to come back to on `ESC <`.
    pub(crate) fn enter_vt52_mode(&mut self) {
        if self.emulation != Emulation::Vt52 {
            self.vt52_return = Some(self.emulation);
            self.set_emulation(Emulation::Vt52);
        }
    }

    /// The active codepage.
    #[must_use]
    pub fn codepage(&self) -> Codepage {
        self.codepage
    }

    /// Overrides the codepage (`--codepage`).
    pub fn set_codepage(&mut self, codepage: Codepage) {
        self.codepage = codepage;
    }

    /// Replaces the render-time Unicode overrides.
    pub fn set_unicode_map(&mut self, map: UnicodeMap) {
        self.unicode_map = map;
    }

    /// The display model.
    #[must_use]
    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    /// Mutable display model access (resize, scrollback cap).
    pub fn screen_mut(&mut self) -> &mut Screen {
        &mut self.screen
    }

    /// Whether the cursor should be drawn (DECTCEM).
    #[must_use]
    pub fn cursor_visible(&self) -> bool {
        self.cursor_visible
    }

    /// Active mouse reporting mode.
    #[must_use]
    pub fn mouse_mode(&self) -> MouseMode {
        self.mouse_mode
    }

    /// True when SGR (1006) mouse encoding was requested.
    #[must_use]
    pub fn sgr_mouse(&self) -> bool {
        self.sgr_mouse
    }

    /// True when bracketed paste (2004) is active; the keyboard path
    /// wraps pasted bytes with `ESC [ 200~` / `ESC [ 201~`.
    #[must_use]
    pub fn bracketed_paste(&self) -> bool {
        self.bracketed_paste
    }

    /// Takes the accumulated side effects.
    pub fn drain_effects(&mut self) -> Vec<EmulatorEffect> {
        std::mem::take(&mut self.effects)
    }

    /// Consumes a batch of remote output.
    pub fn consume(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.consume_byte(byte);
        }
    }

    /// Consumes a single byte of remote output.
    pub fn consume_byte(&mut self, byte: u8) {
        match self.emulation {
            Emulation::Debug => self.debug_byte(byte),
            Emulation::Tty => self.tty_byte(byte),
            Emulation::Petscii => {
                let mut actions = Vec::new();
                petscii::consume(&mut self.petscii, byte, &mut actions);
                self.apply_retro_actions(actions);
            }
            Emulation::Atascii => {
                let mut actions = Vec::new();
                atascii::consume(&mut self.atascii_state, byte, &mut actions);
                self.apply_retro_actions(actions);
            }
            Emulation::Avatar => {
                if let Some(sequence) = self.avatar.consume(byte, &mut self.parser) {
                    self.dispatch(sequence);
                } else {
                    let actions = self.avatar.take_actions();
                    self.apply_retro_actions(actions);
                }
            }
            _ => {
                // VT52 direct addressing swallows the two raw bytes after
                // ESC Y before they reach the parser.
                if self.emulation == Emulation::Vt52 && self.vt52_address != Vt52Address::Idle {
                    self.vt52_capture(byte);
                    return;
                }
                if let Some(sequence) = self.parser.next(byte) {
                    self.dispatch(sequence);
                }
            }
        }
    }

    // ===== Shared dispatch =====

    fn dispatch(&mut self, sequence: Sequence) {
        match sequence {
            Sequence::Print(ch) => self.print_scalar(ch),
            Sequence::Control(byte) => self.control(byte),
            Sequence::Escape(byte) => {
                if self.emulation == Emulation::Vt52 {
                    self.vt52_escape(byte);
                } else {
                    vt::dispatch_escape(self, byte);
                }
            }
            Sequence::EscapeIntermediate(intermediate, final_byte) => {
                vt::dispatch_escape_intermediate(self, intermediate, final_byte);
            }
            Sequence::Csi(csi) => {
                if self.emulation == Emulation::Ansi
                    && self.config.ansi_music
                    && csi.final_byte == b'M'
                    && csi.private.is_none()
                    && csi.params.is_empty()
                {
                    self.parser.begin_music();
                } else if self.emulation.is_vt_family() || self.emulation == Emulation::Avatar {
                    // Avatar reaches here through its ANSI fallback.
                    vt::dispatch_csi(self, &csi);
                } else {
                    debug!("emulation {:?} ignores CSI {:?}", self.emulation, csi);
                }
            }
            Sequence::Osc(payload) => self.osc(&payload),
            Sequence::Dcs(payload) => {
                debug!("ignoring DCS of {} bytes", payload.len());
            }
            Sequence::Music(payload) => {
                self.effects.push(EmulatorEffect::Music(payload));
            }
        }
    }

    /// Prints one scalar after codepage / charset / override mapping.
    fn print_scalar(&mut self, raw: char) {
        let mapped = if self.emulation.is_utf8() {
            raw
        } else {
            let byte = raw as u32;
            let byte = u8::try_from(byte).unwrap_or(b'?');
            if self.emulation.is_vt_family()
                && self.screen.active_charset() == crate::screen::Charset::DecGraphics
            {
                Codepage::DecSpecialGraphics.decode(byte)
            } else {
                self.codepage.decode(byte)
            }
        };
        let mapped = self.unicode_map.apply(mapped);
        self.screen.print(mapped);
    }

    /// The control-byte handling every emulation shares.
    pub(crate) fn control(&mut self, byte: u8) {
        match byte {
            0x05 => {
                // ENQ answerback.
                if !self.config.answerback.is_empty() {
                    self.effects
                        .push(EmulatorEffect::Response(self.config.answerback.clone()));
                }
            }
            0x07 => self.effects.push(EmulatorEffect::Beep),
            0x08 => self.screen.backspace(),
            0x09 => self.screen.horizontal_tab(),
            0x0A | 0x0B | 0x0C => self.screen.index(),
            0x0D => self.screen.carriage_return(),
            0x0E if self.emulation.is_vt_family() => self.screen.shift = 1,
            0x0F if self.emulation.is_vt_family() => self.screen.shift = 0,
            0x00 | 0x7F => {}
            other => {
                debug!("unhandled control byte {:#04x}", other);
            }
        }
    }

    fn osc(&mut self, payload: &[u8]) {
        let Some(split) = payload.iter().position(|&b| b == b';') else {
            return;
        };
        let (selector, value) = payload.split_at(split);
        let value = &value[1..];
        match selector {
            b"0" | b"2" => {
                let title = String::from_utf8_lossy(value).into_owned();
                self.effects.push(EmulatorEffect::SetTitle(title));
            }
            _ => {
                debug!("ignoring OSC selector {:?}", String::from_utf8_lossy(selector));
            }
        }
    }

    // ===== TTY =====

    fn tty_byte(&mut self, byte: u8) {
        match byte {
            0x05 | 0x07..=0x0D => self.control(byte),
            0x00..=0x1F | 0x7F => {}
            _ => {
                let glyph = self.codepage.decode(byte);
                let glyph = self.unicode_map.apply(glyph);
                self.screen.print(glyph);
            }
        }
    }

    // ===== DEBUG =====

    /// Hex dump rendering: sixteen byte pairs per line.
    fn debug_byte(&mut self, byte: u8) {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        if self.debug_column >= 16 {
            self.debug_column = 0;
            self.screen.carriage_return();
            self.screen.index();
        }
        self.screen.print(HEX[(byte >> 4) as usize] as char);
        self.screen.print(HEX[(byte & 0x0F) as usize] as char);
        self.screen.print(' ');
        self.debug_column += 1;
    }

    // ===== VT52 =====

    fn vt52_escape(&mut self, byte: u8) {
        match byte {
            b'A' => self.screen.cursor_up(1),
            b'B' => self.screen.cursor_down(1),
            b'C' => self.screen.cursor_forward(1),
            b'D' => self.screen.cursor_back(1),
            b'H' => self.screen.move_to(0, 0),
            b'I' => self.screen.reverse_index(),
            b'J' => self.screen.erase_display(crate::screen::EraseMode::ToEnd),
            b'K' => self.screen.erase_line(crate::screen::EraseMode::ToEnd),
            b'Y' => self.vt52_address = Vt52Address::WantRow,
            b'Z' => self
                .effects
                .push(EmulatorEffect::Response(b"\x1b/Z".to_vec())),
            b'F' => self.screen.g0 = crate::screen::Charset::DecGraphics,
            b'G' => self.screen.g0 = crate::screen::Charset::Ascii,
            b'=' => self.screen.keypad_application = true,
            b'>' => self.screen.keypad_application = false,
            b'<' => {
                // Back to ANSI mode.
                let target = self.vt52_return.take().unwrap_or(Emulation::Vt100);
                self.set_emulation(target);
            }
            other => {
                debug!("unhandled VT52 escape {:?}", other as char);
            }
        }
    }

    fn vt52_capture(&mut self, byte: u8) {
        match self.vt52_address {
            Vt52Address::WantRow => {
                self.vt52_address = Vt52Address::WantCol(byte);
            }
            Vt52Address::WantCol(row) => {
                self.vt52_address = Vt52Address::Idle;
                let row = usize::from(row.saturating_sub(0x20));
                let col = usize::from(byte.saturating_sub(0x20));
                self.screen.move_to(row, col);
            }
            Vt52Address::Idle => {}
        }
    }

    // ===== Retro actions (Avatar / PETSCII / ATASCII) =====

    fn apply_retro_actions(&mut self, actions: Vec<RetroAction>) {
        for action in actions {
            match action {
                RetroAction::Print(glyph) => {
                    let glyph = self.unicode_map.apply(glyph);
                    self.screen.print(glyph);
                }
                RetroAction::PrintByte(byte) => {
                    let glyph = self.codepage.decode(byte);
                    let glyph = self.unicode_map.apply(glyph);
                    self.screen.print(glyph);
                }
                RetroAction::Control(byte) => self.control(byte),
                RetroAction::SetAvatarColor(ibm) => {
                    // IBM attribute nibbles order colors blue-first.
                    const IBM_TO_ANSI: [u8; 8] = [0, 4, 2, 6, 1, 5, 3, 7];
                    let attr = self.screen.attr_mut();
                    attr.reset();
                    attr.foreground = IBM_TO_ANSI[usize::from(ibm & 0x07)];
                    attr.background = IBM_TO_ANSI[usize::from((ibm >> 4) & 0x07)];
                    attr.flags
                        .set(crate::cell::CellFlags::BOLD, ibm & 0x08 != 0);
                    attr.flags
                        .set(crate::cell::CellFlags::BLINK, ibm & 0x80 != 0);
                }
                RetroAction::BlinkOn => {
                    self.screen
                        .attr_mut()
                        .flags
                        .insert(crate::cell::CellFlags::BLINK);
                }
                RetroAction::SetForeground(index) => {
                    self.screen.attr_mut().foreground = index;
                }
                RetroAction::ReverseVideo(on) => {
                    self.screen
                        .attr_mut()
                        .flags
                        .set(crate::cell::CellFlags::REVERSE, on);
                }
                RetroAction::MoveTo(row, col) => self.screen.move_to(row, col),
                RetroAction::CursorUp => self.screen.cursor_up(1),
                RetroAction::CursorDown => self.screen.cursor_down(1),
                RetroAction::CursorLeft => self.screen.cursor_back(1),
                RetroAction::CursorRight => self.screen.cursor_forward(1),
                RetroAction::ClearScreen => {
                    self.screen.erase_display(crate::screen::EraseMode::All);
                    self.screen.move_to(0, 0);
                }
                RetroAction::ClearToEol => {
                    self.screen.erase_line(crate::screen::EraseMode::ToEnd);
                }
                RetroAction::ResetAttr => self.screen.attr_mut().reset(),
            }
        }
    }

    pub(crate) fn push_effect(&mut self, effect: EmulatorEffect) {
        self.effects.push(effect);
    }

    pub(crate) fn set_mouse_mode(&mut self, mode: MouseMode) {
        self.mouse_mode = mode;
    }

    pub(crate) fn set_sgr_mouse(&mut self, on: bool) {
        self.sgr_mouse = on;
    }

    pub(crate) fn set_bracketed_paste(&mut self, on: bool) {
        self.bracketed_paste = on;
    }

    pub(crate) fn set_cursor_visible(&mut self, on: bool) {
        self.cursor_visible = on;
    }
}

/// Grid mutations the byte-oriented retro emulations request; kept as
/// data so their interpreters stay free of `Screen` borrows.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum RetroAction {
    /// Print an already-mapped glyph.
    Print(char),
    /// Print a byte through the active codepage.
    PrintByte(u8),
    /// Run the shared control handler.
    Control(u8),
    /// Replace the rendition from an IBM attribute byte.
    SetAvatarColor(u8),
    /// Turn blink on in the active rendition.
    BlinkOn,
    /// Change only the foreground index.
    SetForeground(u8),
    /// Toggle reverse video in the active rendition.
    ReverseVideo(bool),
    /// Absolute move (zero-based).
    MoveTo(usize, usize),
    /// Relative moves.
    CursorUp,
    /// Relative moves.
    CursorDown,
    /// Relative moves.
    CursorLeft,
    /// Relative moves.
    CursorRight,
    /// Clear and home.
    ClearScreen,
    /// Erase to end of line.
    ClearToEol,
    /// Reset the rendition.
    ResetAttr,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::color;

    fn emulator(emulation: Emulation) -> Emulator {
        Emulator::new(emulation, 80, 25, 100)
    }

    #[test]
    fn clear_and_hello_bold_red() {
        let mut emu = emulator(Emulation::Ansi);
        emu.consume(b"\x1b[2J\x1b[H\x1b[1;31mHELLO\x1b[0m");
        let screen = emu.screen();
        for (col, expected) in "HELLO".chars().enumerate() {
            let cell = screen.rows()[0].cell(col);
            assert_eq!(cell.glyph, expected);
            assert_eq!(cell.attr.foreground, color::RED);
            assert!(cell.attr.flags.contains(crate::cell::CellFlags::BOLD));
        }
        // Everything else is blank with the default attribute.
        for (row_index, row) in screen.rows().iter().enumerate() {
            for (col_index, cell) in row.cells().iter().enumerate() {
                if row_index == 0 && col_index < 5 {
                    continue;
                }
                assert_eq!(cell.glyph, ' ');
                assert_eq!(cell.attr, crate::cell::CellAttr::default());
            }
        }
    }

    #[test]
    fn cp437_glyphs_in_ansi() {
        let mut emu = emulator(Emulation::Ansi);
        emu.consume(&[0xC9, 0xCD, 0xBB]);
        assert_eq!(emu.screen().rows()[0].text(), "╔═╗");
    }

    #[test]
    fn bel_produces_beep_effect() {
        let mut emu = emulator(Emulation::Ansi);
        emu.consume(b"\x07");
        assert_eq!(emu.drain_effects(), vec![EmulatorEffect::Beep]);
    }

    #[test]
    fn enq_answerback() {
        let mut emu = Emulator::with_config(
            Emulation::Vt100,
            80,
            25,
            0,
            EmulatorConfig {
                answerback: b"qodem".to_vec(),
                ..EmulatorConfig::default()
            },
        );
        emu.consume(b"\x05");
        assert_eq!(
            emu.drain_effects(),
            vec![EmulatorEffect::Response(b"qodem".to_vec())]
        );
    }

    #[test]
    fn vt52_direct_addressing() {
        let mut emu = emulator(Emulation::Vt52);
        // ESC Y row col with 0x20 bias: row 5, col 10.
        emu.consume(b"\x1bY\x25\x2aX");
        assert_eq!(emu.screen().cursor_row(), 5);
        // 'X' printed at col 10 advances to 11.
        assert_eq!(emu.screen().cursor_col(), 11);
        assert_eq!(emu.screen().rows()[5].cell(10).glyph, 'X');
    }

    #[test]
    fn vt52_identify() {
        let mut emu = emulator(Emulation::Vt52);
        emu.consume(b"\x1bZ");
        assert_eq!(
            emu.drain_effects(),
            vec![EmulatorEffect::Response(b"\x1b/Z".to_vec())]
        );
    }

    #[test]
    fn xterm_title_effect() {
        let mut emu = emulator(Emulation::Xterm);
        emu.consume(b"\x1b]0;hello world\x07");
        assert_eq!(
            emu.drain_effects(),
            vec![EmulatorEffect::SetTitle(String::from("hello world"))]
        );
    }

    #[test]
    fn ansi_music_is_collected() {
        let mut emu = emulator(Emulation::Ansi);
        emu.consume(b"\x1b[MFT120ABC\x0e");
        assert_eq!(
            emu.drain_effects(),
            vec![EmulatorEffect::Music(b"MFT120ABC".to_vec())]
        );
    }

    #[test]
    fn utf8_xterm_prints_multibyte() {
        let mut emu = emulator(Emulation::XtermUtf8);
        emu.consume("héllo".as_bytes());
        assert_eq!(emu.screen().rows()[0].text(), "héllo");
    }

    #[test]
    fn debug_emulation_dumps_hex() {
        let mut emu = emulator(Emulation::Debug);
        emu.consume(&[0x1B, 0x41]);
        assert_eq!(emu.screen().rows()[0].text(), "1b 41");
    }

    #[test]
    fn tty_ignores_escape_sequences() {
        let mut emu = emulator(Emulation::Tty);
        emu.consume(b"\x1b[31mplain");
        // The CSI bytes render as-is minus the ESC control itself.
        assert!(emu.screen().rows()[0].text().contains("plain"));
        assert!(!emu.screen().rows()[0].text().contains('\x1b'));
    }
}
