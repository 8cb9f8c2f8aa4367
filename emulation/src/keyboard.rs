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

//! The keyboard path: keystrokes to wire bytes, per emulation and mode.

use crate::emulator::Emulation;

/// A keystroke from the UI.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Key {
    /// A character key.
    Char(char),
    /// Enter / Return.
    Enter,
    /// Backspace.
    Backspace,
    /// Tab.
    Tab,
    /// Escape.
    Escape,
    /// Arrow up.
    Up,
    /// Arrow down.
    Down,
    /// Arrow right.
    Right,
    /// Arrow left.
    Left,
    /// Home.
    Home,
    /// End.
    End,
    /// Page up.
    PageUp,
    /// Page down.
    PageDown,
    /// Insert.
    Insert,
    /// Delete.
    Delete,
    /// Function key F1-F12.
    Function(u8),
}

/// Modifier state accompanying a keystroke.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct KeyModifiers {
    /// Shift held.
    pub shift: bool,
    /// Control held.
    pub control: bool,
    /// Alt / Meta held.
    pub alt: bool,
}

/// Encodes a keystroke for the wire.
///
/// `application_cursor` reflects DECCKM; VT-family cursor keys switch
/// between `ESC [ A` and `ESC O A` forms. Alt prefixes ESC; Control folds
/// letters into the C0 range.
#[must_use]
pub fn encode_key(
    emulation: Emulation,
    key: Key,
    modifiers: KeyModifiers,
    application_cursor: bool,
) -> Vec<u8> {
    let mut bytes = Vec::new();
    if modifiers.alt {
        bytes.push(0x1B);
    }
    match key {
        Key::Char(ch) => {
            if modifiers.control {
                if let Some(folded) = control_fold(ch) {
                    bytes.push(folded);
                    return bytes;
                }
            }
            encode_char(emulation, ch, &mut bytes);
        }
        Key::Enter => bytes.push(b'\r'),
        Key::Backspace => bytes.push(0x08),
        Key::Tab => bytes.push(b'\t'),
        Key::Escape => bytes.push(0x1B),
        Key::Up | Key::Down | Key::Right | Key::Left => {
            encode_arrow(emulation, key, application_cursor, &mut bytes);
        }
        Key::Home => bytes.extend_from_slice(b"\x1b[H"),
        Key::End => bytes.extend_from_slice(b"\x1b[F"),
        Key::PageUp => bytes.extend_from_slice(b"\x1b[5~"),
        Key::PageDown => bytes.extend_from_slice(b"\x1b[6~"),
        Key::Insert => bytes.extend_from_slice(b"\x1b[2~"),
        Key::Delete => bytes.extend_from_slice(b"\x1b[3~"),
        Key::Function(n) => encode_function(n, &mut bytes),
    }
    bytes
}

fn control_fold(ch: char) -> Option<u8> {
    let upper = ch.to_ascii_uppercase();
    match upper {
        '@'..='_' => Some(upper as u8 & 0x1F),
        ' ' => Some(0x00),
        '?' => Some(0x7F),
        _ => None,
    }
}

fn encode_char(emulation: Emulation, ch: char, bytes: &mut Vec<u8>) {
    if emulation.is_utf8() {
        let mut buf = [0u8; 4];
        bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
    } else {
        let codepage = emulation.default_codepage();
        match codepage.encode(ch) {
            Some(byte) => bytes.push(byte),
            None => bytes.push(b'?'),
        }
    }
}

fn encode_arrow(emulation: Emulation, key: Key, application_cursor: bool, bytes: &mut Vec<u8>) {
    let letter = match key {
        Key::Up => b'A',
        Key::Down => b'B',
        Key::Right => b'C',
        Key::Left => b'D',
        _ => unreachable!(),
    };
    match emulation {
        Emulation::Vt52 => {
            bytes.push(0x1B);
            bytes.push(letter);
        }
        Emulation::Petscii => {
            bytes.push(match key {
                Key::Up => 0x91,
                Key::Down => 0x11,
                Key::Right => 0x1D,
                Key::Left => 0x9D,
                _ => unreachable!(),
            });
        }
        Emulation::Atascii => {
            bytes.push(match key {
                Key::Up => 0x1C,
                Key::Down => 0x1D,
                Key::Left => 0x1E,
                Key::Right => 0x1F,
                _ => unreachable!(),
            });
        }
        _ => {
            bytes.push(0x1B);
            bytes.push(if application_cursor { b'O' } else { b'[' });
            bytes.push(letter);
        }
    }
}

fn encode_function(n: u8, bytes: &mut Vec<u8>) {
    let sequence: &[u8] = match n {
        1 => b"\x1bOP",
        2 => b"\x1bOQ",
        3 => b"\x1bOR",
        4 => b"\x1bOS",
        5 => b"\x1b[15~",
        6 => b"\x1b[17~",
        7 => b"\x1b[18~",
        8 => b"\x1b[19~",
        9 => b"\x1b[20~",
        10 => b"\x1b[21~",
        11 => b"\x1b[23~",
        12 => b"\x1b[24~",
        _ => b"",
    };
    bytes.extend_from_slice(sequence);
}

/// Wraps pasted bytes for the wire. With bracketed paste active the
/// payload travels between `ESC [ 200~` and `ESC [ 201~`.
#[must_use]
pub fn wrap_paste(bracketed: bool, payload: &[u8]) -> Vec<u8> {
    if !bracketed {
        return payload.to_vec();
    }
    let mut bytes = Vec::with_capacity(payload.len() + 12);
    bytes.extend_from_slice(b"\x1b[200~");
    bytes.extend_from_slice(payload);
    bytes.extend_from_slice(b"\x1b[201~");
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_char() {
        assert_eq!(
            encode_key(Emulation::Ansi, Key::Char('a'), KeyModifiers::default(), false),
            b"a"
        );
    }

    #[test]
    fn control_c_folds() {
        let mods = KeyModifiers {
            control: true,
            ..KeyModifiers::default()
        };
        assert_eq!(
            encode_key(Emulation::Ansi, Key::Char('c'), mods, false),
            vec![0x03]
        );
    }

    #[test]
    fn alt_prefixes_escape() {
        let mods = KeyModifiers {
            alt: true,
            ..KeyModifiers::default()
        };
        assert_eq!(
            encode_key(Emulation::Ansi, Key::Char('x'), mods, false),
            vec![0x1B, b'x']
        );
    }

    #[test]
    fn arrows_follow_decckm() {
        assert_eq!(
            encode_key(Emulation::Vt100, Key::Up, KeyModifiers::default(), false),
            b"\x1b[A"
        );
        assert_eq!(
            encode_key(Emulation::Vt100, Key::Up, KeyModifiers::default(), true),
            b"\x1bOA"
        );
    }

    #[test]
    fn vt52_arrows_have_no_bracket() {
        assert_eq!(
            encode_key(Emulation::Vt52, Key::Left, KeyModifiers::default(), false),
            b"\x1bD"
        );
    }

    #[test]
    fn petscii_arrows_are_single_bytes() {
        assert_eq!(
            encode_key(Emulation::Petscii, Key::Up, KeyModifiers::default(), false),
            vec![0x91]
        );
    }

    #[test]
    fn utf8_char_encodes_multibyte() {
        assert_eq!(
            encode_key(
                Emulation::XtermUtf8,
                Key::Char('é'),
                KeyModifiers::default(),
                false
            ),
            "é".as_bytes()
        );
    }

    #[test]
    fn cp437_char_encodes_single_byte() {
        assert_eq!(
            encode_key(Emulation::Ansi, Key::Char('║'), KeyModifiers::default(), false),
            vec![0xBA]
        );
    }

    #[test]
    fn bracketed_paste_wraps() {
        assert_eq!(wrap_paste(true, b"hi"), b"\x1b[200~hi\x1b[201~");
        assert_eq!(wrap_paste(false, b"hi"), b"hi");
    }
}
