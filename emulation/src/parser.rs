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

use tracing::warn;

/// Longest escape sequence the parser will accumulate before giving up
/// and resynchronizing on the stream.
pub const MAX_SEQUENCE_LENGTH: usize = 128;

/// Most CSI parameters a sequence may carry; extras are dropped.
pub const MAX_CSI_PARAMS: usize = 16;

///
/// One parsed unit of the terminal stream.
///
/// Every emulation shares this framing; only the dispatch on
/// [`Sequence::Csi`] final bytes and [`Sequence::Escape`] bytes differs
/// per emulation.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sequence {
    /// A printable scalar. For 8-bit streams this is the raw byte as a
    /// scalar; codepage mapping is the emulator's job.
    Print(char),
    /// A C0 control byte (0x00-0x1F) or DEL.
    Control(u8),
    /// `ESC` followed directly by a final byte (`ESC 7`, `ESC c`, ...).
    Escape(u8),
    /// `ESC intermediate final` (`ESC ( B`, `ESC # 8`, ...).
    EscapeIntermediate(u8, u8),
    /// A complete control sequence.
    Csi(CsiSequence),
    /// An operating system command, payload without terminator.
    Osc(Vec<u8>),
    /// A device control string, payload without terminator.
    Dcs(Vec<u8>),
    /// ANSI music payload accumulated after [`Parser::begin_music`],
    /// terminated by 0x0E.
    Music(Vec<u8>),
}

/// A parsed CSI: prefix flag, intermediates, up to sixteen numeric
/// parameters, and the final byte the emulations dispatch on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CsiSequence {
    /// `?` (DEC private) or `>` (secondary DA) prefix, when present.
    pub private: Option<u8>,
    /// Intermediate bytes (0x20-0x2F).
    pub intermediates: Vec<u8>,
    /// Raw numeric parameters; absent parameters read as zero.
    pub params: Vec<u16>,
    /// The dispatch byte (0x40-0x7E).
    pub final_byte: u8,
}

impl CsiSequence {
    /// Parameter `index` with `default` standing in for missing or zero.
    #[must_use]
    pub fn param(&self, index: usize, default: u16) -> u16 {
        match self.params.get(index) {
            Some(&value) if value != 0 => value,
            _ => default,
        }
    }

    /// Raw parameter `index`; zero when absent.
    #[must_use]
    pub fn param_raw(&self, index: usize) -> u16 {
        self.params.get(index).copied().unwrap_or(0)
    }

    /// True for a DEC private (`?`-prefixed) sequence.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.private == Some(b'?')
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Ordinary text and control bytes.
    Normal,
    /// After ESC, waiting for the discriminating byte.
    Escape,
    /// After ESC and an intermediate, waiting for the final byte.
    EscapeIntermediate(u8),
    /// Accumulating a control sequence.
    Csi,
    /// Accumulating an operating system command.
    Osc,
    /// Saw ESC inside an OSC; a `\` completes ST.
    OscEscape,
    /// Accumulating a device control string.
    Dcs,
    /// Saw ESC inside a DCS.
    DcsEscape,
    /// Accumulating ANSI music until 0x0E.
    Music,
    /// Assembling a multi-byte UTF-8 scalar.
    Utf8 {
        expected: usize,
        accumulated: u32,
    },
}

///
/// The stateful escape-sequence parser shared by every emulation.
///
/// Feed bytes one at a time with [`Parser::next`]; a `None` means the
/// byte extended an unfinished sequence. The parser never errors:
/// overlong or malformed sequences are dropped with a warning and the
/// stream resynchronizes at the next byte.
///
#[derive(Debug)]
pub struct Parser {
    state: State,
    buffer: Vec<u8>,
    utf8_mode: bool,
}

impl Parser {
    /// Creates a parser. `utf8_mode` assembles multi-byte scalars instead
    /// of passing 0x80-0xFF through as single bytes.
    #[must_use]
    pub fn new(utf8_mode: bool) -> Parser {
        Parser {
            state: State::Normal,
            buffer: Vec::new(),
            utf8_mode,
        }
    }

    /// Discards any partial sequence and returns to the normal state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::Normal;
    }

    /// Switches UTF-8 assembly on or off (emulation change).
    pub fn set_utf8_mode(&mut self, utf8_mode: bool) {
        self.utf8_mode = utf8_mode;
        self.clear();
    }

    /// Enters music accumulation. The ANSI emulation calls this after
    /// recognizing `ESC [ M` with music enabled; subsequent bytes collect
    /// until the 0x0E terminator.
    pub fn begin_music(&mut self) {
        self.buffer.clear();
        self.state = State::Music;
    }

    /// Processes the next byte.
    pub fn next(&mut self, byte: u8) -> Option<Sequence> {
        if self.buffer.len() >= MAX_SEQUENCE_LENGTH {
            warn!(
                "escape sequence exceeded {} bytes, dropping",
                MAX_SEQUENCE_LENGTH
            );
            self.clear();
        }
        match self.state {
            State::Normal => self.process_normal(byte),
            State::Escape => self.process_escape(byte),
            State::EscapeIntermediate(intermediate) => {
                self.process_escape_intermediate(intermediate, byte)
            }
            State::Csi => self.process_csi(byte),
            State::Osc => self.process_string(byte, StringKind::Osc),
            State::OscEscape => self.process_string_escape(byte, StringKind::Osc),
            State::Dcs => self.process_string(byte, StringKind::Dcs),
            State::DcsEscape => self.process_string_escape(byte, StringKind::Dcs),
            State::Music => self.process_music(byte),
            State::Utf8 {
                expected,
                accumulated,
            } => self.process_utf8(byte, expected, accumulated),
        }
    }

    fn process_normal(&mut self, byte: u8) -> Option<Sequence> {
        match byte {
            0x1B => {
                self.state = State::Escape;
                self.buffer.clear();
                None
            }
            0x00..=0x1F | 0x7F => Some(Sequence::Control(byte)),
            0x20..=0x7E => Some(Sequence::Print(byte as char)),
            0x80..=0xFF if !self.utf8_mode => Some(Sequence::Print(byte as char)),
            0xC0..=0xDF => {
                self.state = State::Utf8 {
                    expected: 1,
                    accumulated: u32::from(byte & 0x1F),
                };
                None
            }
            0xE0..=0xEF => {
                self.state = State::Utf8 {
                    expected: 2,
                    accumulated: u32::from(byte & 0x0F),
                };
                None
            }
            0xF0..=0xF7 => {
                self.state = State::Utf8 {
                    expected: 3,
                    accumulated: u32::from(byte & 0x07),
                };
                None
            }
            _ => {
                // Stray continuation byte.
                Some(Sequence::Print(char::REPLACEMENT_CHARACTER))
            }
        }
    }

    fn process_escape(&mut self, byte: u8) -> Option<Sequence> {
        match byte {
            b'[' => {
                self.state = State::Csi;
                self.buffer.clear();
                None
            }
            b']' => {
                self.state = State::Osc;
                self.buffer.clear();
                None
            }
            b'P' => {
                self.state = State::Dcs;
                self.buffer.clear();
                None
            }
            0x1B => None,
            0x18 | 0x1A => {
                self.state = State::Normal;
                None
            }
            0x00..=0x17 | 0x19 | 0x1C..=0x1F => Some(Sequence::Control(byte)),
            0x20..=0x2F => {
                self.state = State::EscapeIntermediate(byte);
                None
            }
            0x30..=0x7E => {
                self.state = State::Normal;
                Some(Sequence::Escape(byte))
            }
            _ => {
                self.state = State::Normal;
                None
            }
        }
    }

    fn process_escape_intermediate(&mut self, intermediate: u8, byte: u8) -> Option<Sequence> {
        match byte {
            0x30..=0x7E => {
                self.state = State::Normal;
                Some(Sequence::EscapeIntermediate(intermediate, byte))
            }
            0x1B => {
                self.state = State::Escape;
                None
            }
            _ => {
                self.state = State::Normal;
                None
            }
        }
    }

    fn process_csi(&mut self, byte: u8) -> Option<Sequence> {
        match byte {
            0x30..=0x3F | 0x20..=0x2F => {
                self.buffer.push(byte);
                None
            }
            0x40..=0x7E => {
                self.state = State::Normal;
                let csi = parse_csi(&self.buffer, byte);
                self.buffer.clear();
                Some(Sequence::Csi(csi))
            }
            0x1B => {
                self.state = State::Escape;
                self.buffer.clear();
                None
            }
            0x18 | 0x1A => {
                self.state = State::Normal;
                self.buffer.clear();
                None
            }
            0x00..=0x17 | 0x19 | 0x1C..=0x1F => Some(Sequence::Control(byte)),
            _ => {
                warn!("invalid byte {:#04x} inside control sequence", byte);
                self.state = State::Normal;
                self.buffer.clear();
                None
            }
        }
    }

    fn process_string(&mut self, byte: u8, kind: StringKind) -> Option<Sequence> {
        match byte {
            0x07 if kind == StringKind::Osc => {
                self.state = State::Normal;
                Some(Sequence::Osc(std::mem::take(&mut self.buffer)))
            }
            0x1B => {
                self.state = match kind {
                    StringKind::Osc => State::OscEscape,
                    StringKind::Dcs => State::DcsEscape,
                };
                None
            }
            _ => {
                self.buffer.push(byte);
                None
            }
        }
    }

    fn process_string_escape(&mut self, byte: u8, kind: StringKind) -> Option<Sequence> {
        if byte == b'\\' {
            self.state = State::Normal;
            let payload = std::mem::take(&mut self.buffer);
            Some(match kind {
                StringKind::Osc => Sequence::Osc(payload),
                StringKind::Dcs => Sequence::Dcs(payload),
            })
        } else {
            // Not a terminator after all; keep both bytes.
            self.buffer.push(0x1B);
            self.buffer.push(byte);
            self.state = match kind {
                StringKind::Osc => State::Osc,
                StringKind::Dcs => State::Dcs,
            };
            None
        }
    }

    fn process_music(&mut self, byte: u8) -> Option<Sequence> {
        if byte == 0x0E {
            self.state = State::Normal;
            Some(Sequence::Music(std::mem::take(&mut self.buffer)))
        } else {
            self.buffer.push(byte);
            None
        }
    }

    fn process_utf8(&mut self, byte: u8, expected: usize, accumulated: u32) -> Option<Sequence> {
        if byte & 0xC0 != 0x80 {
            // Broken sequence; reprocess this byte from scratch.
            self.state = State::Normal;
            let _ = self.next(byte);
            return Some(Sequence::Print(char::REPLACEMENT_CHARACTER));
        }
        let accumulated = (accumulated << 6) | u32::from(byte & 0x3F);
        if expected == 1 {
            self.state = State::Normal;
            Some(Sequence::Print(
                char::from_u32(accumulated).unwrap_or(char::REPLACEMENT_CHARACTER),
            ))
        } else {
            self.state = State::Utf8 {
                expected: expected - 1,
                accumulated,
            };
            None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StringKind {
    Osc,
    Dcs,
}

fn parse_csi(buffer: &[u8], final_byte: u8) -> CsiSequence {
    let mut csi = CsiSequence {
        final_byte,
        ..CsiSequence::default()
    };
    let mut current: Option<u16> = None;
    for &byte in buffer {
        match byte {
            b'?' | b'>' | b'<' | b'=' if csi.params.is_empty() && current.is_none() => {
                csi.private = Some(byte);
            }
            b'0'..=b'9' => {
                let digit = u16::from(byte - b'0');
                current = Some(
                    current
                        .unwrap_or(0)
                        .saturating_mul(10)
                        .saturating_add(digit),
                );
            }
            b';' => {
                if csi.params.len() < MAX_CSI_PARAMS {
                    csi.params.push(current.unwrap_or(0));
                }
                current = None;
            }
            0x20..=0x2F => {
                csi.intermediates.push(byte);
            }
            _ => {
                // Sub-parameters and stray markers are dropped.
            }
        }
    }
    if let Some(value) = current {
        if csi.params.len() < MAX_CSI_PARAMS {
            csi.params.push(value);
        }
    } else if !buffer.is_empty() && buffer.ends_with(b";") && csi.params.len() < MAX_CSI_PARAMS {
        csi.params.push(0);
    }
    csi
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(parser: &mut Parser, bytes: &[u8]) -> Vec<Sequence> {
        bytes.iter().filter_map(|&b| parser.next(b)).collect()
    }

    #[test]
    fn plain_text() {
        let mut parser = Parser::new(false);
        let out = run(&mut parser, b"ok");
        assert_eq!(out, vec![Sequence::Print('o'), Sequence::Print('k')]);
    }

    #[test]
    fn csi_with_params() {
        let mut parser = Parser::new(false);
        let out = run(&mut parser, b"\x1b[1;31m");
        assert_eq!(out.len(), 1);
        let Sequence::Csi(csi) = &out[0] else {
            panic!("expected CSI");
        };
        assert_eq!(csi.params, vec![1, 31]);
        assert_eq!(csi.final_byte, b'm');
        assert_eq!(csi.private, None);
    }

    #[test]
    fn csi_private_prefix() {
        let mut parser = Parser::new(false);
        let out = run(&mut parser, b"\x1b[?7h");
        let Sequence::Csi(csi) = &out[0] else {
            panic!("expected CSI");
        };
        assert!(csi.is_private());
        assert_eq!(csi.param_raw(0), 7);
        assert_eq!(csi.final_byte, b'h');
    }

    #[test]
    fn csi_missing_params_default() {
        let mut parser = Parser::new(false);
        let out = run(&mut parser, b"\x1b[H");
        let Sequence::Csi(csi) = &out[0] else {
            panic!("expected CSI");
        };
        assert_eq!(csi.param(0, 1), 1);
        assert_eq!(csi.param(1, 1), 1);
    }

    #[test]
    fn csi_empty_middle_param() {
        let mut parser = Parser::new(false);
        let out = run(&mut parser, b"\x1b[1;;3m");
        let Sequence::Csi(csi) = &out[0] else {
            panic!("expected CSI");
        };
        assert_eq!(csi.params, vec![1, 0, 3]);
    }

    #[test]
    fn params_cap_at_sixteen() {
        let mut parser = Parser::new(false);
        let mut seq = b"\x1b[".to_vec();
        seq.extend_from_slice(b"1;2;3;4;5;6;7;8;9;10;11;12;13;14;15;16;17;18m");
        let out = run(&mut parser, &seq);
        let Sequence::Csi(csi) = &out[0] else {
            panic!("expected CSI");
        };
        assert_eq!(csi.params.len(), MAX_CSI_PARAMS);
    }

    #[test]
    fn scs_designator() {
        let mut parser = Parser::new(false);
        let out = run(&mut parser, b"\x1b(0");
        assert_eq!(out, vec![Sequence::EscapeIntermediate(b'(', b'0')]);
    }

    #[test]
    fn line_attribute() {
        let mut parser = Parser::new(false);
        let out = run(&mut parser, b"\x1b#8");
        assert_eq!(out, vec![Sequence::EscapeIntermediate(b'#', b'8')]);
    }

    #[test]
    fn simple_escape() {
        let mut parser = Parser::new(false);
        let out = run(&mut parser, b"\x1b7\x1b8");
        assert_eq!(out, vec![Sequence::Escape(b'7'), Sequence::Escape(b'8')]);
    }

    #[test]
    fn osc_bel_terminated() {
        let mut parser = Parser::new(false);
        let out = run(&mut parser, b"\x1b]0;title\x07");
        assert_eq!(out, vec![Sequence::Osc(b"0;title".to_vec())]);
    }

    #[test]
    fn osc_st_terminated() {
        let mut parser = Parser::new(false);
        let out = run(&mut parser, b"\x1b]2;name\x1b\\");
        assert_eq!(out, vec![Sequence::Osc(b"2;name".to_vec())]);
    }

    #[test]
    fn control_inside_csi_executes() {
        let mut parser = Parser::new(false);
        let out = run(&mut parser, b"\x1b[1\x0731m");
        // BEL executes mid-sequence; the CSI still completes.
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Sequence::Control(0x07));
        let Sequence::Csi(csi) = &out[1] else {
            panic!("expected CSI");
        };
        assert_eq!(csi.params, vec![131]);
    }

    #[test]
    fn high_bytes_pass_through_in_eight_bit_mode() {
        let mut parser = Parser::new(false);
        let out = run(&mut parser, &[0xB0, 0xDB]);
        assert_eq!(
            out,
            vec![Sequence::Print('\u{B0}'), Sequence::Print('\u{DB}')]
        );
    }

    #[test]
    fn utf8_assembly() {
        let mut parser = Parser::new(true);
        let out = run(&mut parser, "é─".as_bytes());
        assert_eq!(out, vec![Sequence::Print('é'), Sequence::Print('─')]);
    }

    #[test]
    fn music_accumulates_until_so() {
        let mut parser = Parser::new(false);
        parser.begin_music();
        let out = run(&mut parser, b"MFT120ABC\x0e");
        assert_eq!(out, vec![Sequence::Music(b"MFT120ABC".to_vec())]);
    }

    #[test]
    fn overlong_sequence_is_dropped() {
        let mut parser = Parser::new(false);
        let mut seq = b"\x1b]".to_vec();
        seq.extend(std::iter::repeat_n(b'x', MAX_SEQUENCE_LENGTH + 8));
        let out = run(&mut parser, &seq);
        // The tail re-enters the normal state as plain text.
        assert!(out.iter().all(|s| matches!(s, Sequence::Print('x'))));
        assert!(!out.is_empty());
    }
}
