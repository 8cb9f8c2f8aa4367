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

//! # Qodem Codepage Support
//!
//! This crate provides the two orthogonal byte translations the terminal
//! core performs around the emulator:
//!
//! 1. **Codepages**: static 256-entry tables mapping an 8-bit byte to a
//!    Unicode scalar, covering the DOS/BBS pages (CP437, CP850, CP852),
//!    Windows-1252, and the DEC special graphics set selected by VT
//!    emulations through SCS sequences. UTF-8 emulations bypass the table
//!    entirely and are represented by the [`Codepage::Utf8`] marker.
//!
//! 2. **Translate tables**: user-editable 256→256 byte maps applied to the
//!    raw stream (the input table before a byte reaches the emulator, the
//!    output table exactly once per byte queued for the wire), plus a
//!    sparse Unicode override map applied at cell-render time.
//!
//! Parity helpers for serial lines live here as well: mark parity OR-sets
//! bit 7 outbound, space parity AND-strips it, and inbound mark parity
//! strips bit 7 before the byte enters the pipeline.

#![warn(
    clippy::cargo,
    missing_docs,
    clippy::pedantic,
    future_incompatible,
    rust_2018_idioms
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

mod tables;
mod translate;

pub use self::tables::{CP437, CP850, CP852, CP1252, DEC_SPECIAL_GRAPHICS};
pub use self::translate::{ParityMode, TranslateTable, UnicodeMap, apply_parity_in, apply_parity_out};

/// A codepage selects how raw 8-bit bytes become Unicode scalars before
/// they reach the cell grid.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Codepage {
    /// IBM PC codepage 437, the primary page for BBS emulations.
    #[default]
    Cp437,
    /// IBM codepage 850 (Western European).
    Cp850,
    /// IBM codepage 852 (Central European).
    Cp852,
    /// Windows-1252 (Latin-1 superset).
    Windows1252,
    /// DEC special graphics / line drawing, selected via `ESC ( 0`.
    DecSpecialGraphics,
    /// UTF-8 passthrough; decoding happens upstream of the table.
    Utf8,
}

impl Codepage {
    /// Decodes a single 8-bit byte to its Unicode scalar.
    ///
    /// For [`Codepage::Utf8`] the byte is returned unchanged as a scalar;
    /// real UTF-8 assembly is the emulator parser's job.
    #[must_use]
    pub fn decode(self, byte: u8) -> char {
        match self {
            Codepage::Cp437 => CP437[byte as usize],
            Codepage::Cp850 => CP850[byte as usize],
            Codepage::Cp852 => CP852[byte as usize],
            Codepage::Windows1252 => CP1252[byte as usize],
            Codepage::DecSpecialGraphics => DEC_SPECIAL_GRAPHICS[byte as usize],
            Codepage::Utf8 => byte as char,
        }
    }

    /// Best-effort reverse mapping used on the keyboard path, scanning the
    /// active table for the scalar. ASCII short-circuits.
    #[must_use]
    pub fn encode(self, ch: char) -> Option<u8> {
        if ch.is_ascii() && self != Codepage::DecSpecialGraphics {
            return Some(ch as u8);
        }
        let table: &[char; 256] = match self {
            Codepage::Cp437 => &CP437,
            Codepage::Cp850 => &CP850,
            Codepage::Cp852 => &CP852,
            Codepage::Windows1252 => &CP1252,
            Codepage::DecSpecialGraphics => &DEC_SPECIAL_GRAPHICS,
            Codepage::Utf8 => return u8::try_from(ch as u32).ok(),
        };
        table
            .iter()
            .position(|&entry| entry == ch)
            .and_then(|index| u8::try_from(index).ok())
    }

    /// Parses a codepage name as used on the command line and in the
    /// options file.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Codepage> {
        match name.to_ascii_uppercase().as_str() {
            "CP437" => Some(Codepage::Cp437),
            "CP850" => Some(Codepage::Cp850),
            "CP852" => Some(Codepage::Cp852),
            "CP1252" | "WINDOWS-1252" => Some(Codepage::Windows1252),
            "DEC" => Some(Codepage::DecSpecialGraphics),
            "UTF-8" | "UTF8" => Some(Codepage::Utf8),
            _ => None,
        }
    }

    /// The canonical name reported back through the configuration surface.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Codepage::Cp437 => "CP437",
            Codepage::Cp850 => "CP850",
            Codepage::Cp852 => "CP852",
            Codepage::Windows1252 => "CP1252",
            Codepage::DecSpecialGraphics => "DEC",
            Codepage::Utf8 => "UTF-8",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cp437_box_drawing() {
        assert_eq!(Codepage::Cp437.decode(0xC9), '╔');
        assert_eq!(Codepage::Cp437.decode(0xCD), '═');
        assert_eq!(Codepage::Cp437.decode(0xBB), '╗');
        assert_eq!(Codepage::Cp437.decode(0xB0), '░');
    }

    #[test]
    fn cp437_control_glyphs() {
        assert_eq!(Codepage::Cp437.decode(0x01), '☺');
        assert_eq!(Codepage::Cp437.decode(0x03), '♥');
        assert_eq!(Codepage::Cp437.decode(0x7F), '⌂');
    }

    #[test]
    fn ascii_passthrough_everywhere() {
        for page in [
            Codepage::Cp437,
            Codepage::Cp850,
            Codepage::Cp852,
            Codepage::Windows1252,
        ] {
            for byte in 0x20..0x7Fu8 {
                assert_eq!(page.decode(byte), byte as char, "{page:?} {byte:#04x}");
            }
        }
    }

    #[test]
    fn dec_graphics_line_drawing() {
        assert_eq!(Codepage::DecSpecialGraphics.decode(b'q'), '─');
        assert_eq!(Codepage::DecSpecialGraphics.decode(b'x'), '│');
        assert_eq!(Codepage::DecSpecialGraphics.decode(b'l'), '┌');
        // Bytes outside the graphics range stay ASCII
        assert_eq!(Codepage::DecSpecialGraphics.decode(b'A'), 'A');
    }

    #[test]
    fn encode_round_trips_high_half() {
        for byte in 0x80..=0xFFu8 {
            let ch = Codepage::Cp437.decode(byte);
            assert_eq!(Codepage::Cp437.encode(ch), Some(byte));
        }
    }

    #[test]
    fn from_name_is_case_insensitive() {
        assert_eq!(Codepage::from_name("cp437"), Some(Codepage::Cp437));
        assert_eq!(Codepage::from_name("utf-8"), Some(Codepage::Utf8));
        assert_eq!(Codepage::from_name("ebcdic"), None);
    }
}
