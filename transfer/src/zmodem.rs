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

//! ZMODEM send and receive engines.
//!
//! Framing summary: every frame starts with a header, either hex
//! (`** ZDLE B` + 14 hex digits + CRC16), binary (`* ZDLE A` + 5 bytes +
//! CRC16) or 32-bit binary (`* ZDLE C` + 5 bytes + CRC32), and `ZDATA`
//! / `ZFILE` headers are followed by ZDLE-escaped subpackets terminated
//! by one of ZCRCE/ZCRCG/ZCRCQ/ZCRCW. Receiver-driven recovery: any CRC
//! failure answers `ZRPOS` with the last good offset, and the sender
//! repositions. Three consecutive failures at one offset abort.

use crate::store::FileStore;
use crate::{TransferEngine, TransferProgress, TransferStatus};
use bitflags::bitflags;
use bytes::{BufMut, BytesMut};
use crc::{CRC_16_XMODEM, CRC_32_ISO_HDLC, Crc};
use std::io::{Read, Seek, SeekFrom, Write};
use std::time::Duration;
use tracing::{debug, warn};

const ZPAD: u8 = b'*';
const ZDLE: u8 = 0x18;
const XON: u8 = 0x11;

const ZBIN: u8 = b'A';
const ZHEX: u8 = b'B';
const ZBIN32: u8 = b'C';

const ZCRCE: u8 = b'h';
const ZCRCG: u8 = b'i';
const ZCRCQ: u8 = b'j';
const ZCRCW: u8 = b'k';

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Subpacket payload size.
const BLOCK_SIZE: usize = 1024;
/// Consecutive same-offset CRC failures before aborting.
const MAX_ERRORS_AT_OFFSET: u32 = 3;
/// Handshake resend interval.
const RETRY_INTERVAL: Duration = Duration::from_secs(10);
/// Handshake retries before giving up.
const MAX_RETRIES: u32 = 6;
/// Subpackets emitted per pump call, bounding outbound growth.
const SUBPACKETS_PER_PUMP: usize = 16;

/// Escape table for the mandatory set (ZDLE, XON, XOFF, DLE, CR and their
/// high-bit twins, DEL, 0xFF). An entry differing from its index is sent
/// as `ZDLE entry`.
const ZDLE_TABLE: [u8; 0x100] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x4d, 0x0e, 0x0f,
    0x50, 0x51, 0x12, 0x53, 0x14, 0x15, 0x16, 0x17, 0x58, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e, 0x1f,
    0x20, 0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2a, 0x2b, 0x2c, 0x2d, 0x2e, 0x2f,
    0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x3b, 0x3c, 0x3d, 0x3e, 0x3f,
    0x40, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4a, 0x4b, 0x4c, 0x4d, 0x4e, 0x4f,
    0x50, 0x51, 0x52, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x5b, 0x5c, 0x5d, 0x5e, 0x5f,
    0x60, 0x61, 0x62, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x6a, 0x6b, 0x6c, 0x6d, 0x6e, 0x6f,
    0x70, 0x71, 0x72, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x7b, 0x7c, 0x7d, 0x7e, 0x6c,
    0x80, 0x81, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8a, 0x8b, 0x8c, 0xcd, 0x8e, 0x8f,
    0xd0, 0xd1, 0x92, 0xd3, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0x9b, 0x9c, 0x9d, 0x9e, 0x9f,
    0xa0, 0xa1, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xab, 0xac, 0xad, 0xae, 0xaf,
    0xb0, 0xb1, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xbb, 0xbc, 0xbd, 0xbe, 0xbf,
    0xc0, 0xc1, 0xc2, 0xc3, 0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xcb, 0xcc, 0xcd, 0xce, 0xcf,
    0xd0, 0xd1, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xdb, 0xdc, 0xdd, 0xde, 0xdf,
    0xe0, 0xe1, 0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xeb, 0xec, 0xed, 0xee, 0xef,
    0xf0, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8, 0xf9, 0xfa, 0xfb, 0xfc, 0xfd, 0xfe, 0x6d,
];

/// Reverse of [`ZDLE_TABLE`] applied to the byte following a ZDLE.
const UNZDLE_TABLE: [u8; 0x100] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
    0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e, 0x1f,
    0x20, 0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2a, 0x2b, 0x2c, 0x2d, 0x2e, 0x2f,
    0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x3b, 0x3c, 0x3d, 0x3e, 0x3f,
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
    0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e, 0x1f,
    0x60, 0x61, 0x62, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x6a, 0x6b, 0x7f, 0xff, 0x6e, 0x6f,
    0x70, 0x71, 0x72, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x7b, 0x7c, 0x7d, 0x7e, 0x7f,
    0x80, 0x81, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8a, 0x8b, 0x8c, 0x8d, 0x8e, 0x8f,
    0x90, 0x91, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0x9b, 0x9c, 0x9d, 0x9e, 0x9f,
    0xa0, 0xa1, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xab, 0xac, 0xad, 0xae, 0xaf,
    0xb0, 0xb1, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xbb, 0xbc, 0xbd, 0xbe, 0xbf,
    0x80, 0x81, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8a, 0x8b, 0x8c, 0x8d, 0x8e, 0x8f,
    0x90, 0x91, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0x9b, 0x9c, 0x9d, 0x9e, 0x9f,
    0xe0, 0xe1, 0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xeb, 0xec, 0xed, 0xee, 0xef,
    0xf0, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8, 0xf9, 0xfa, 0xfb, 0xfc, 0xfd, 0xfe, 0xff,
];

/// Frame types.
#[repr(u8)]
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Frame {
    ZRQINIT = 0,
    ZRINIT = 1,
    ZSINIT = 2,
    ZACK = 3,
    ZFILE = 4,
    ZSKIP = 5,
    ZNAK = 6,
    ZABORT = 7,
    ZFIN = 8,
    ZRPOS = 9,
    ZDATA = 10,
    ZEOF = 11,
    ZFERR = 12,
    ZCRC = 13,
    ZCHALLENGE = 14,
    ZCOMPL = 15,
    ZCAN = 16,
    ZFREECNT = 17,
    ZCOMMAND = 18,
    ZSTDERR = 19,
}

impl Frame {
    fn from_u8(value: u8) -> Option<Frame> {
        use Frame::{
            ZABORT, ZACK, ZCAN, ZCHALLENGE, ZCOMMAND, ZCOMPL, ZCRC, ZDATA, ZEOF, ZFERR, ZFILE,
            ZFIN, ZFREECNT, ZNAK, ZRINIT, ZRPOS, ZRQINIT, ZSINIT, ZSKIP, ZSTDERR,
        };
        const ALL: [Frame; 20] = [
            ZRQINIT, ZRINIT, ZSINIT, ZACK, ZFILE, ZSKIP, ZNAK, ZABORT, ZFIN, ZRPOS, ZDATA, ZEOF,
            ZFERR, ZCRC, ZCHALLENGE, ZCOMPL, ZCAN, ZFREECNT, ZCOMMAND, ZSTDERR,
        ];
        ALL.into_iter().find(|frame| *frame as u8 == value)
    }
}

bitflags! {
    /// ZRINIT capability flags.
    struct Zrinit: u8 {
        const CANFDX = 0x01;
        const CANOVIO = 0x02;
        const CANBRK = 0x04;
        const CANCRY = 0x08;
        const CANLZW = 0x10;
        const CANFC32 = 0x20;
        const ESCCTL = 0x40;
        const ESC8 = 0x80;
    }
}

/// Header encodings on the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Encoding {
    Bin,
    Hex,
    Bin32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Header {
    encoding: Encoding,
    frame: Frame,
    flags: [u8; 4],
}

impl Header {
    fn new(encoding: Encoding, frame: Frame) -> Header {
        Header {
            encoding,
            frame,
            flags: [0; 4],
        }
    }

    fn with_count(mut self, count: u32) -> Header {
        self.flags = count.to_le_bytes();
        self
    }

    fn count(&self) -> u32 {
        u32::from_le_bytes(self.flags)
    }
}

/// Tunables from the options file.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZmodemConfig {
    /// Escape every control character, not just the mandatory set.
    pub escape_control: bool,
    /// Receiver issues a ZCHALLENGE before ZRINIT.
    pub zchallenge: bool,
}

/// True when the console byte window contains the ZRQINIT autostart
/// signature (`rz\r**<ZDLE>B00`).
#[must_use]
pub fn zmodem_autostart(window: &[u8]) -> bool {
    const SIGNATURE: &[u8] = &[ZPAD, ZPAD, ZDLE, ZHEX, b'0', b'0'];
    window
        .windows(SIGNATURE.len())
        .any(|slice| slice == SIGNATURE)
}

// ===== Wire encoding helpers =====

fn escape_into(out: &mut BytesMut, byte: u8, escape_control: bool) {
    let mapped = ZDLE_TABLE[byte as usize];
    if mapped != byte {
        out.put_u8(ZDLE);
        out.put_u8(mapped);
    } else if escape_control && byte & 0x60 == 0 {
        out.put_u8(ZDLE);
        out.put_u8(byte ^ 0x40);
    } else {
        out.put_u8(byte);
    }
}

fn escape_slice(out: &mut BytesMut, bytes: &[u8], escape_control: bool) {
    for &byte in bytes {
        escape_into(out, byte, escape_control);
    }
}

fn put_hex(out: &mut BytesMut, byte: u8) {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    out.put_u8(HEX[(byte >> 4) as usize]);
    out.put_u8(HEX[(byte & 0x0F) as usize]);
}

fn encode_header(out: &mut BytesMut, header: Header, escape_control: bool) {
    match header.encoding {
        Encoding::Hex => {
            out.put_u8(ZPAD);
            out.put_u8(ZPAD);
            out.put_u8(ZDLE);
            out.put_u8(ZHEX);
            let mut body = [0u8; 5];
            body[0] = header.frame as u8;
            body[1..].copy_from_slice(&header.flags);
            for byte in body {
                put_hex(out, byte);
            }
            let crc = CRC16.checksum(&body).to_be_bytes();
            put_hex(out, crc[0]);
            put_hex(out, crc[1]);
            out.put_u8(b'\r');
            out.put_u8(b'\n');
            if header.frame != Frame::ZACK && header.frame != Frame::ZFIN {
                out.put_u8(XON);
            }
        }
        Encoding::Bin => {
            out.put_u8(ZPAD);
            out.put_u8(ZDLE);
            out.put_u8(ZBIN);
            let mut body = [0u8; 5];
            body[0] = header.frame as u8;
            body[1..].copy_from_slice(&header.flags);
            escape_slice(out, &body, escape_control);
            let crc = CRC16.checksum(&body).to_be_bytes();
            escape_slice(out, &crc, escape_control);
        }
        Encoding::Bin32 => {
            out.put_u8(ZPAD);
            out.put_u8(ZDLE);
            out.put_u8(ZBIN32);
            let mut body = [0u8; 5];
            body[0] = header.frame as u8;
            body[1..].copy_from_slice(&header.flags);
            escape_slice(out, &body, escape_control);
            let crc = CRC32.checksum(&body).to_le_bytes();
            escape_slice(out, &crc, escape_control);
        }
    }
}

fn encode_subpacket(
    out: &mut BytesMut,
    encoding: Encoding,
    frameend: u8,
    data: &[u8],
    escape_control: bool,
) {
    escape_slice(out, data, escape_control);
    out.put_u8(ZDLE);
    out.put_u8(frameend);
    match encoding {
        Encoding::Bin32 => {
            let mut digest = CRC32.digest();
            digest.update(data);
            digest.update(&[frameend]);
            escape_slice(out, &digest.finalize().to_le_bytes(), escape_control);
        }
        _ => {
            let mut digest = CRC16.digest();
            digest.update(data);
            digest.update(&[frameend]);
            escape_slice(out, &digest.finalize().to_be_bytes(), escape_control);
        }
    }
}

// ===== Wire decoding helpers =====

#[derive(Debug)]
enum Scan {
    /// Nothing usable yet; keep the tail.
    Incomplete,
    /// A valid header, with bytes consumed.
    Header(Header, usize),
    /// Garbage or a bad CRC; consume and (for bad CRC) complain.
    Garbage(usize, bool),
    /// Five consecutive CANs: the peer aborted.
    Cancel,
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Unescapes `needed` bytes starting at `buf[from]`. Returns the decoded
/// bytes and input consumed, or `None` when the input runs short.
fn unescape_n(buf: &[u8], from: usize, needed: usize) -> Option<(Vec<u8>, usize)> {
    let mut decoded = Vec::with_capacity(needed);
    let mut index = from;
    while decoded.len() < needed {
        let &byte = buf.get(index)?;
        if byte == ZDLE {
            let &escaped = buf.get(index + 1)?;
            decoded.push(UNZDLE_TABLE[escaped as usize]);
            index += 2;
        } else {
            decoded.push(byte);
            index += 1;
        }
    }
    Some((decoded, index - from))
}

fn scan_header(buf: &[u8]) -> Scan {
    if buf.len() >= 5 && buf[..5].iter().all(|&byte| byte == ZDLE) {
        return Scan::Cancel;
    }
    let Some(start) = buf.iter().position(|&byte| byte == ZPAD) else {
        return Scan::Garbage(buf.len(), false);
    };
    let mut index = start;
    while buf.get(index) == Some(&ZPAD) {
        index += 1;
    }
    match buf.get(index) {
        None => return Scan::Incomplete,
        Some(&ZDLE) => {}
        Some(_) => return Scan::Garbage(index + 1, false),
    }
    index += 1;
    let Some(&encoding_byte) = buf.get(index) else {
        return Scan::Incomplete;
    };
    index += 1;
    match encoding_byte {
        ZHEX => {
            // 14 hex digits; CR LF XON trail is optional per frame type.
            if buf.len() < index + 14 {
                return Scan::Incomplete;
            }
            let mut body = [0u8; 7];
            for (slot, pair) in body.iter_mut().zip(buf[index..index + 14].chunks(2)) {
                let (Some(high), Some(low)) = (hex_value(pair[0]), hex_value(pair[1])) else {
                    return Scan::Garbage(index, false);
                };
                *slot = (high << 4) | low;
            }
            index += 14;
            // Trailing CR LF XON.
            for _ in 0..3 {
                if matches!(buf.get(index), Some(&b'\r' | &b'\n' | &0x8A | &XON)) {
                    index += 1;
                }
            }
            if CRC16.checksum(&body[..5]).to_be_bytes() != body[5..7] {
                return Scan::Garbage(index, true);
            }
            let Some(frame) = Frame::from_u8(body[0]) else {
                return Scan::Garbage(index, true);
            };
            let mut header = Header::new(Encoding::Hex, frame);
            header.flags.copy_from_slice(&body[1..5]);
            Scan::Header(header, index)
        }
        ZBIN | ZBIN32 => {
            let crc_len = if encoding_byte == ZBIN32 { 4 } else { 2 };
            let Some((body, used)) = unescape_n(buf, index, 5 + crc_len) else {
                return Scan::Incomplete;
            };
            index += used;
            let crc_ok = if encoding_byte == ZBIN32 {
                CRC32.checksum(&body[..5]).to_le_bytes()[..] == body[5..9]
            } else {
                CRC16.checksum(&body[..5]).to_be_bytes()[..] == body[5..7]
            };
            if !crc_ok {
                return Scan::Garbage(index, true);
            }
            let Some(frame) = Frame::from_u8(body[0]) else {
                return Scan::Garbage(index, true);
            };
            let encoding = if encoding_byte == ZBIN32 {
                Encoding::Bin32
            } else {
                Encoding::Bin
            };
            let mut header = Header::new(encoding, frame);
            header.flags.copy_from_slice(&body[1..5]);
            Scan::Header(header, index)
        }
        _ => Scan::Garbage(index, false),
    }
}

/// Incremental ZDLE-escaped subpacket decoder.
#[derive(Debug, Default)]
struct SubpacketDecoder {
    data: Vec<u8>,
    pending_zdle: bool,
    frameend: Option<u8>,
    crc: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq)]
enum SubpacketEvent {
    /// A complete, CRC-verified subpacket.
    Done(Vec<u8>, u8),
    /// CRC mismatch.
    BadCrc,
    /// Peer cancel inside the data stream.
    Cancel,
}

impl SubpacketDecoder {
    fn reset(&mut self) {
        self.data.clear();
        self.pending_zdle = false;
        self.frameend = None;
        self.crc.clear();
    }

    fn push(&mut self, byte: u8, crc32: bool) -> Option<SubpacketEvent> {
        let crc_len = if crc32 { 4 } else { 2 };
        if let Some(frameend) = self.frameend {
            // Collecting the escaped CRC.
            if self.pending_zdle {
                self.pending_zdle = false;
                self.crc.push(UNZDLE_TABLE[byte as usize]);
            } else if byte == ZDLE {
                self.pending_zdle = true;
                return None;
            } else {
                self.crc.push(byte);
            }
            if self.crc.len() == crc_len {
                let good = if crc32 {
                    let mut digest = CRC32.digest();
                    digest.update(&self.data);
                    digest.update(&[frameend]);
                    digest.finalize().to_le_bytes()[..] == self.crc[..]
                } else {
                    let mut digest = CRC16.digest();
                    digest.update(&self.data);
                    digest.update(&[frameend]);
                    digest.finalize().to_be_bytes()[..] == self.crc[..]
                };
                let data = std::mem::take(&mut self.data);
                self.reset();
                return Some(if good {
                    SubpacketEvent::Done(data, frameend)
                } else {
                    SubpacketEvent::BadCrc
                });
            }
            return None;
        }
        if self.pending_zdle {
            self.pending_zdle = false;
            if matches!(byte, ZCRCE | ZCRCG | ZCRCQ | ZCRCW) {
                self.frameend = Some(byte);
                return None;
            }
            if byte == ZDLE {
                // Runs of CAN mean abort.
                return Some(SubpacketEvent::Cancel);
            }
            self.data.push(UNZDLE_TABLE[byte as usize]);
        } else if byte == ZDLE {
            self.pending_zdle = true;
        } else {
            self.data.push(byte);
        }
        if self.data.len() > BLOCK_SIZE * 8 {
            self.reset();
            return Some(SubpacketEvent::BadCrc);
        }
        None
    }
}

// ===== Sender =====

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TxState {
    AwaitRinit,
    AwaitRpos,
    Sending,
    AwaitEofAck,
    AwaitFin,
    Done,
    Failed,
}

///
/// The sending engine for one file.
///
/// Lifecycle: emit `ZRQINIT`, wait for the receiver's `ZRINIT`
/// (capabilities select CRC16 vs CRC32 framing), announce the file with
/// `ZFILE` + a `ZCRCW` subpacket of `name NUL size`, and stream `ZDATA`
/// subpackets from whatever offset the receiver's `ZRPOS` requests,
/// which is also how both crash recovery and error recovery work. `ZEOF`
/// at the end, `ZFIN`/`OO` to close.
///
pub struct ZmodemSender<F: Read + Seek> {
    file: F,
    name: String,
    size: u64,
    config: ZmodemConfig,
    state: TxState,
    offset: u64,
    encoding: Encoding,
    outbound: BytesMut,
    inbound: BytesMut,
    progress: TransferProgress,
    waited: Duration,
    retries: u32,
    abort_requested: bool,
}

impl<F: Read + Seek> ZmodemSender<F> {
    /// Creates a sender; `size` is advertised in the ZFILE frame.
    pub fn new(file: F, name: &str, size: u64, config: ZmodemConfig) -> ZmodemSender<F> {
        let mut sender = ZmodemSender {
            file,
            name: name.to_string(),
            size,
            config,
            state: TxState::AwaitRinit,
            offset: 0,
            encoding: Encoding::Bin32,
            outbound: BytesMut::new(),
            inbound: BytesMut::new(),
            progress: TransferProgress {
                file_name: name.to_string(),
                file_size: size,
                block_size: BLOCK_SIZE,
                ..TransferProgress::default()
            },
            waited: Duration::ZERO,
            retries: 0,
            abort_requested: false,
        };
        sender.send_header(Header::new(Encoding::Hex, Frame::ZRQINIT));
        sender
    }

    fn send_header(&mut self, header: Header) {
        encode_header(&mut self.outbound, header, self.config.escape_control);
    }

    fn fail(&mut self) {
        self.state = TxState::Failed;
    }

    fn handle_header(&mut self, header: Header) {
        match header.frame {
            Frame::ZRINIT => {
                let flags = Zrinit::from_bits_truncate(header.flags[3]);
                self.encoding = if flags.contains(Zrinit::CANFC32) {
                    Encoding::Bin32
                } else {
                    Encoding::Bin
                };
                match self.state {
                    TxState::AwaitRinit => {
                        self.send_zfile();
                        self.state = TxState::AwaitRpos;
                    }
                    TxState::AwaitEofAck => {
                        self.send_header(Header::new(Encoding::Hex, Frame::ZFIN));
                        self.state = TxState::AwaitFin;
                    }
                    // Duplicate ZRINIT while already mid-transfer.
                    _ => {}
                }
            }
            Frame::ZRPOS => {
                let position = u64::from(header.count());
                match self.state {
                    TxState::AwaitRpos | TxState::Sending | TxState::AwaitEofAck => {
                        if self.state != TxState::AwaitRpos {
                            self.progress.errors += 1;
                        }
                        if self.file.seek(SeekFrom::Start(position)).is_err() {
                            self.fail();
                            return;
                        }
                        self.offset = position;
                        self.progress.offset = position;
                        self.send_header(
                            Header::new(self.encoding, Frame::ZDATA).with_count(header.count()),
                        );
                        self.state = TxState::Sending;
                    }
                    _ => {}
                }
            }
            Frame::ZSKIP => {
                // Receiver already has the file.
                self.progress.files_done += 1;
                self.send_header(Header::new(Encoding::Hex, Frame::ZFIN));
                self.state = TxState::AwaitFin;
            }
            Frame::ZACK => {
                // Window acknowledgment; informational.
            }
            Frame::ZFIN => {
                if self.state == TxState::AwaitFin {
                    self.outbound.put_slice(b"OO");
                    self.state = TxState::Done;
                }
            }
            Frame::ZCHALLENGE => {
                self.send_header(
                    Header::new(Encoding::Hex, Frame::ZACK).with_count(header.count()),
                );
            }
            Frame::ZNAK => {
                // Resend whatever the state is waiting on.
                self.progress.errors += 1;
                self.resend_current();
            }
            Frame::ZABORT | Frame::ZCAN | Frame::ZFERR => {
                warn!("peer aborted zmodem send ({:?})", header.frame);
                self.fail();
            }
            other => {
                debug!("zmodem sender ignoring {:?}", other);
            }
        }
    }

    fn resend_current(&mut self) {
        match self.state {
            TxState::AwaitRinit => self.send_header(Header::new(Encoding::Hex, Frame::ZRQINIT)),
            TxState::AwaitRpos => self.send_zfile(),
            TxState::AwaitEofAck => {
                self.send_header(
                    Header::new(Encoding::Hex, Frame::ZEOF).with_count(self.offset as u32),
                );
            }
            TxState::AwaitFin => self.send_header(Header::new(Encoding::Hex, Frame::ZFIN)),
            _ => {}
        }
    }

    fn send_zfile(&mut self) {
        self.send_header(Header::new(self.encoding, Frame::ZFILE));
        let mut info = Vec::with_capacity(self.name.len() + 24);
        info.extend_from_slice(self.name.as_bytes());
        info.push(0);
        info.extend_from_slice(self.size.to_string().as_bytes());
        info.push(0);
        encode_subpacket(
            &mut self.outbound,
            self.encoding,
            ZCRCW,
            &info,
            self.config.escape_control,
        );
    }

    fn stream_data(&mut self) {
        let mut block = [0u8; BLOCK_SIZE];
        for _ in 0..SUBPACKETS_PER_PUMP {
            if self.state != TxState::Sending {
                return;
            }
            let count = match self.file.read(&mut block) {
                Ok(count) => count,
                Err(error) => {
                    warn!("zmodem read failed: {error}");
                    self.fail();
                    return;
                }
            };
            if count == 0 {
                encode_subpacket(
                    &mut self.outbound,
                    self.encoding,
                    ZCRCE,
                    &[],
                    self.config.escape_control,
                );
                self.send_header(
                    Header::new(self.encoding, Frame::ZEOF).with_count(self.offset as u32),
                );
                self.state = TxState::AwaitEofAck;
                return;
            }
            encode_subpacket(
                &mut self.outbound,
                self.encoding,
                ZCRCG,
                &block[..count],
                self.config.escape_control,
            );
            self.offset += count as u64;
            self.progress.offset = self.offset;
        }
    }
}

impl<F: Read + Seek> TransferEngine for ZmodemSender<F> {
    fn pump(&mut self, inbound: &[u8]) -> (usize, TransferStatus) {
        if self.abort_requested {
            self.fail();
            return (inbound.len(), self.status());
        }
        self.inbound.extend_from_slice(inbound);
        loop {
            if self.state == TxState::Done || self.state == TxState::Failed {
                break;
            }
            match scan_header(&self.inbound) {
                Scan::Incomplete => break,
                Scan::Cancel => {
                    self.fail();
                    break;
                }
                Scan::Garbage(consumed, bad_crc) => {
                    if consumed == 0 {
                        break;
                    }
                    let _ = self.inbound.split_to(consumed.min(self.inbound.len()));
                    if bad_crc {
                        self.progress.errors += 1;
                    }
                }
                Scan::Header(header, consumed) => {
                    let _ = self.inbound.split_to(consumed.min(self.inbound.len()));
                    self.waited = Duration::ZERO;
                    self.retries = 0;
                    self.handle_header(header);
                }
            }
        }
        if self.state == TxState::Sending {
            self.stream_data();
        }
        (inbound.len(), self.status())
    }

    fn take_outbound(&mut self) -> BytesMut {
        self.outbound.split()
    }

    fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    fn tick(&mut self, elapsed: Duration) -> TransferStatus {
        if self.status().is_terminal() {
            return self.status();
        }
        if self.state == TxState::Sending {
            return TransferStatus::Running;
        }
        self.waited += elapsed;
        if self.waited >= RETRY_INTERVAL {
            self.waited = Duration::ZERO;
            self.retries += 1;
            self.progress.errors += 1;
            if self.retries > MAX_RETRIES {
                self.fail();
            } else {
                self.resend_current();
            }
        }
        self.status()
    }

    fn status(&self) -> TransferStatus {
        match self.state {
            TxState::Done => TransferStatus::Complete,
            TxState::Failed => TransferStatus::Failed,
            TxState::Sending => TransferStatus::Running,
            _ => {
                if self.outbound.is_empty() {
                    TransferStatus::AwaitingTimeout
                } else {
                    TransferStatus::Running
                }
            }
        }
    }

    fn progress(&self) -> TransferProgress {
        self.progress.clone()
    }

    fn abort(&mut self) {
        self.abort_requested = true;
    }
}

// ===== Receiver =====

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum RxState {
    AwaitChallengeAck,
    AwaitFile,
    FileInfo,
    AwaitData,
    Data,
    Done,
    Failed,
}

/// Fixed challenge payload used when `zchallenge` is on.
const CHALLENGE: u32 = 0x5AA5_C33C;

///
/// The receiving engine, possibly for a batch of files.
///
/// Crash recovery per the protocol: when the announced file already
/// exists locally and is shorter than the announced size, receiving
/// resumes at the existing size via `ZRPOS` and the store opens the file
/// in append mode. CRC failures answer `ZRPOS` at the last good offset;
/// three consecutive failures there send `ZABORT` and fail the transfer.
///
pub struct ZmodemReceiver<S: FileStore> {
    store: S,
    file: Option<S::File>,
    config: ZmodemConfig,
    state: RxState,
    offset: u64,
    expected_size: u64,
    data_encoding: Encoding,
    decoder: SubpacketDecoder,
    outbound: BytesMut,
    inbound: BytesMut,
    progress: TransferProgress,
    last_error_offset: u64,
    errors_at_offset: u32,
    waited: Duration,
    retries: u32,
    abort_requested: bool,
}

impl<S: FileStore> ZmodemReceiver<S> {
    /// Creates a receiver writing into `store`.
    pub fn new(store: S, config: ZmodemConfig) -> ZmodemReceiver<S> {
        let mut receiver = ZmodemReceiver {
            store,
            file: None,
            config,
            state: RxState::AwaitFile,
            offset: 0,
            expected_size: 0,
            data_encoding: Encoding::Bin32,
            decoder: SubpacketDecoder::default(),
            outbound: BytesMut::new(),
            inbound: BytesMut::new(),
            progress: TransferProgress {
                block_size: BLOCK_SIZE,
                ..TransferProgress::default()
            },
            last_error_offset: u64::MAX,
            errors_at_offset: 0,
            waited: Duration::ZERO,
            retries: 0,
            abort_requested: false,
        };
        if receiver.config.zchallenge {
            receiver.send_header(
                Header::new(Encoding::Hex, Frame::ZCHALLENGE).with_count(CHALLENGE),
            );
            receiver.state = RxState::AwaitChallengeAck;
        } else {
            receiver.send_zrinit();
        }
        receiver
    }

    /// Consumes the receiver, returning the store (tests read results
    /// back out of a [`crate::MemoryStore`]).
    pub fn into_store(self) -> S {
        self.store
    }

    fn send_header(&mut self, header: Header) {
        encode_header(&mut self.outbound, header, self.config.escape_control);
    }

    fn send_zrinit(&mut self) {
        let capabilities = Zrinit::CANFDX | Zrinit::CANOVIO | Zrinit::CANFC32;
        let mut header = Header::new(Encoding::Hex, Frame::ZRINIT);
        header.flags[3] = capabilities.bits();
        self.send_header(header);
    }

    fn fail(&mut self) {
        self.state = RxState::Failed;
    }

    fn data_error(&mut self) {
        self.progress.errors += 1;
        if self.offset == self.last_error_offset {
            self.errors_at_offset += 1;
        } else {
            self.last_error_offset = self.offset;
            self.errors_at_offset = 1;
        }
        if self.errors_at_offset >= MAX_ERRORS_AT_OFFSET {
            self.send_header(Header::new(Encoding::Hex, Frame::ZABORT));
            self.fail();
            return;
        }
        self.decoder.reset();
        self.state = RxState::AwaitData;
        self.send_header(Header::new(Encoding::Hex, Frame::ZRPOS).with_count(self.offset as u32));
    }

    fn open_target(&mut self, name: &str, size: u64) {
        self.expected_size = size;
        self.progress.file_name = name.to_string();
        self.progress.file_size = size;
        let existing = self.store.existing_size(name);
        match existing {
            Some(have) if size > 0 && have >= size => {
                // Already complete; skip it.
                self.send_header(Header::new(Encoding::Hex, Frame::ZSKIP));
                self.state = RxState::AwaitFile;
                self.file = None;
                return;
            }
            Some(have) if have > 0 => match self.store.open_append(name) {
                Ok((file, have)) => {
                    self.file = Some(file);
                    self.offset = have;
                }
                Err(error) => {
                    warn!("cannot append {name}: {error}");
                    self.send_header(Header::new(Encoding::Hex, Frame::ZFERR));
                    self.fail();
                    return;
                }
            },
            _ => match self.store.create(name) {
                Ok(file) => {
                    self.file = Some(file);
                    self.offset = 0;
                }
                Err(error) => {
                    warn!("cannot create {name}: {error}");
                    self.send_header(Header::new(Encoding::Hex, Frame::ZFERR));
                    self.fail();
                    return;
                }
            },
        }
        self.progress.offset = self.offset;
        self.last_error_offset = u64::MAX;
        self.errors_at_offset = 0;
        self.state = RxState::AwaitData;
        self.send_header(Header::new(Encoding::Hex, Frame::ZRPOS).with_count(self.offset as u32));
    }

    fn handle_header(&mut self, header: Header) {
        match header.frame {
            Frame::ZRQINIT => {
                if self.state == RxState::AwaitChallengeAck {
                    // The challenge stands until its echo arrives.
                    self.send_header(
                        Header::new(Encoding::Hex, Frame::ZCHALLENGE).with_count(CHALLENGE),
                    );
                } else {
                    self.send_zrinit();
                }
            }
            Frame::ZACK if self.state == RxState::AwaitChallengeAck => {
                if header.count() == CHALLENGE {
                    self.send_zrinit();
                    self.state = RxState::AwaitFile;
                } else {
                    warn!("zchallenge mismatch");
                    self.fail();
                }
            }
            Frame::ZFILE => {
                self.data_encoding = header.encoding;
                self.decoder.reset();
                self.state = RxState::FileInfo;
            }
            Frame::ZSINIT => {
                // Attn string follows in a subpacket; consume and ack.
                self.decoder.reset();
                self.state = RxState::FileInfo;
                self.expected_size = u64::MAX; // sentinel: ZSINIT payload
            }
            Frame::ZDATA => {
                if u64::from(header.count()) == self.offset {
                    self.data_encoding = header.encoding;
                    self.decoder.reset();
                    self.state = RxState::Data;
                } else {
                    self.send_header(
                        Header::new(Encoding::Hex, Frame::ZRPOS).with_count(self.offset as u32),
                    );
                    self.state = RxState::AwaitData;
                }
            }
            Frame::ZEOF => {
                if u64::from(header.count()) == self.offset {
                    self.file = None;
                    self.progress.files_done += 1;
                    self.send_zrinit();
                    self.state = RxState::AwaitFile;
                } else {
                    self.send_header(
                        Header::new(Encoding::Hex, Frame::ZRPOS).with_count(self.offset as u32),
                    );
                    self.state = RxState::AwaitData;
                }
            }
            Frame::ZFIN => {
                self.send_header(Header::new(Encoding::Hex, Frame::ZFIN));
                self.state = RxState::Done;
            }
            Frame::ZABORT | Frame::ZCAN => {
                self.fail();
            }
            Frame::ZNAK => {
                // Our last header was garbled; resend the relevant one.
                self.progress.errors += 1;
                match self.state {
                    RxState::AwaitFile => self.send_zrinit(),
                    RxState::AwaitData => self.send_header(
                        Header::new(Encoding::Hex, Frame::ZRPOS).with_count(self.offset as u32),
                    ),
                    _ => {}
                }
            }
            other => {
                debug!("zmodem receiver ignoring {:?}", other);
            }
        }
    }

    fn handle_file_info(&mut self, data: &[u8]) {
        if self.expected_size == u64::MAX {
            // ZSINIT attn payload; acknowledge and move on.
            self.expected_size = 0;
            self.send_header(Header::new(Encoding::Hex, Frame::ZACK));
            self.state = RxState::AwaitFile;
            return;
        }
        let mut fields = data.split(|&byte| byte == 0);
        let name = fields
            .next()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| String::from("NONAME.DAT"));
        let size = fields
            .next()
            .and_then(|bytes| {
                let text = String::from_utf8_lossy(bytes);
                text.split_ascii_whitespace()
                    .next()
                    .and_then(|field| field.parse::<u64>().ok())
            })
            .unwrap_or(0);
        self.open_target(&name, size);
    }

    fn write_block(&mut self, data: &[u8]) -> bool {
        let Some(file) = self.file.as_mut() else {
            return false;
        };
        if file.write_all(data).is_err() {
            self.send_header(Header::new(Encoding::Hex, Frame::ZFERR));
            self.fail();
            return false;
        }
        self.offset += data.len() as u64;
        self.progress.offset = self.offset;
        true
    }

    fn pump_data(&mut self) {
        while !self.inbound.is_empty() && matches!(self.state, RxState::Data | RxState::FileInfo) {
            let byte = self.inbound[0];
            let _ = self.inbound.split_to(1);
            let crc32 = self.data_encoding == Encoding::Bin32;
            let Some(event) = self.decoder.push(byte, crc32) else {
                continue;
            };
            match event {
                SubpacketEvent::Done(data, frameend) => {
                    if self.state == RxState::FileInfo {
                        self.handle_file_info(&data);
                        continue;
                    }
                    if !self.write_block(&data) {
                        return;
                    }
                    self.errors_at_offset = 0;
                    match frameend {
                        ZCRCW | ZCRCQ => {
                            self.send_header(
                                Header::new(Encoding::Hex, Frame::ZACK)
                                    .with_count(self.offset as u32),
                            );
                        }
                        ZCRCE => {
                            self.state = RxState::AwaitData;
                        }
                        _ => {}
                    }
                }
                SubpacketEvent::BadCrc => {
                    self.data_error();
                    return;
                }
                SubpacketEvent::Cancel => {
                    self.fail();
                    return;
                }
            }
        }
    }
}

impl<S: FileStore> TransferEngine for ZmodemReceiver<S> {
    fn pump(&mut self, inbound: &[u8]) -> (usize, TransferStatus) {
        if self.abort_requested {
            self.outbound.extend_from_slice(&[ZDLE; 8]);
            self.fail();
            return (inbound.len(), self.status());
        }
        self.inbound.extend_from_slice(inbound);
        loop {
            match self.state {
                RxState::Done | RxState::Failed => break,
                RxState::Data | RxState::FileInfo => {
                    self.pump_data();
                    if matches!(self.state, RxState::Data | RxState::FileInfo) {
                        // Ran out of input mid-subpacket.
                        break;
                    }
                }
                _ => match scan_header(&self.inbound) {
                    Scan::Incomplete => break,
                    Scan::Cancel => {
                        self.fail();
                        break;
                    }
                    Scan::Garbage(consumed, bad_crc) => {
                        if consumed == 0 {
                            break;
                        }
                        let _ = self.inbound.split_to(consumed.min(self.inbound.len()));
                        if bad_crc {
                            self.progress.errors += 1;
                            self.send_header(Header::new(Encoding::Hex, Frame::ZNAK));
                        }
                    }
                    Scan::Header(header, consumed) => {
                        let _ = self.inbound.split_to(consumed.min(self.inbound.len()));
                        self.waited = Duration::ZERO;
                        self.retries = 0;
                        self.handle_header(header);
                    }
                },
            }
        }
        (inbound.len(), self.status())
    }

    fn take_outbound(&mut self) -> BytesMut {
        self.outbound.split()
    }

    fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    fn tick(&mut self, elapsed: Duration) -> TransferStatus {
        if self.status().is_terminal() {
            return self.status();
        }
        self.waited += elapsed;
        if self.waited >= RETRY_INTERVAL {
            self.waited = Duration::ZERO;
            self.retries += 1;
            self.progress.errors += 1;
            if self.retries > MAX_RETRIES {
                self.fail();
            } else {
                match self.state {
                    RxState::AwaitFile => self.send_zrinit(),
                    RxState::AwaitData | RxState::Data => {
                        self.decoder.reset();
                        self.state = RxState::AwaitData;
                        self.send_header(
                            Header::new(Encoding::Hex, Frame::ZRPOS).with_count(self.offset as u32),
                        );
                    }
                    RxState::AwaitChallengeAck => {
                        self.send_header(
                            Header::new(Encoding::Hex, Frame::ZCHALLENGE).with_count(CHALLENGE),
                        );
                    }
                    _ => {}
                }
            }
        }
        self.status()
    }

    fn status(&self) -> TransferStatus {
        match self.state {
            RxState::Done => TransferStatus::Complete,
            RxState::Failed => TransferStatus::Failed,
            _ => {
                if self.outbound.is_empty() {
                    TransferStatus::AwaitingTimeout
                } else {
                    TransferStatus::Running
                }
            }
        }
    }

    fn progress(&self) -> TransferProgress {
        self.progress.clone()
    }

    fn abort(&mut self) {
        self.abort_requested = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use std::io::Cursor;

    /// Ferries bytes between two engines until both go quiet.
    fn shuttle<A: TransferEngine, B: TransferEngine>(a: &mut A, b: &mut B, rounds: usize) {
        for _ in 0..rounds {
            let from_a = a.take_outbound();
            let (_, _status) = b.pump(&from_a);
            let from_b = b.take_outbound();
            let (_, _status) = a.pump(&from_b);
            if a.status().is_terminal() && b.status().is_terminal() {
                break;
            }
        }
    }

    #[test]
    fn autostart_signature_detection() {
        assert!(zmodem_autostart(b"rz\r**\x18B00000000000000\r\n\x11"));
        assert!(!zmodem_autostart(b"plain console noise"));
    }

    #[test]
    fn hex_header_round_trip() {
        let mut out = BytesMut::new();
        let header = Header::new(Encoding::Hex, Frame::ZRPOS).with_count(0x0102_0304);
        encode_header(&mut out, header, false);
        match scan_header(&out) {
            Scan::Header(parsed, consumed) => {
                assert_eq!(parsed.frame, Frame::ZRPOS);
                assert_eq!(parsed.count(), 0x0102_0304);
                assert_eq!(consumed, out.len());
            }
            other => panic!("expected header, got {other:?}"),
        }
    }

    #[test]
    fn bin32_header_round_trip() {
        let mut out = BytesMut::new();
        let header = Header::new(Encoding::Bin32, Frame::ZDATA).with_count(42);
        encode_header(&mut out, header, false);
        match scan_header(&out) {
            Scan::Header(parsed, _) => {
                assert_eq!(parsed.frame, Frame::ZDATA);
                assert_eq!(parsed.encoding, Encoding::Bin32);
                assert_eq!(parsed.count(), 42);
            }
            other => panic!("expected header, got {other:?}"),
        }
    }

    #[test]
    fn corrupted_hex_header_is_garbage() {
        let mut out = BytesMut::new();
        encode_header(&mut out, Header::new(Encoding::Hex, Frame::ZRINIT), false);
        // Flip one hex digit.
        let index = 6;
        out[index] = if out[index] == b'0' { b'1' } else { b'0' };
        assert!(matches!(scan_header(&out), Scan::Garbage(_, true)));
    }

    #[test]
    fn subpacket_round_trip() {
        let mut wire = BytesMut::new();
        let payload: Vec<u8> = (0u8..=255).collect();
        encode_subpacket(&mut wire, Encoding::Bin32, ZCRCG, &payload, false);
        let mut decoder = SubpacketDecoder::default();
        let mut result = None;
        for &byte in wire.iter() {
            if let Some(event) = decoder.push(byte, true) {
                result = Some(event);
                break;
            }
        }
        assert_eq!(result, Some(SubpacketEvent::Done(payload, ZCRCG)));
    }

    #[test]
    fn full_send_receive() {
        let contents: Vec<u8> = (0..4000u32).map(|v| (v % 251) as u8).collect();
        let mut sender = ZmodemSender::new(
            Cursor::new(contents.clone()),
            "data.bin",
            contents.len() as u64,
            ZmodemConfig::default(),
        );
        let mut receiver = ZmodemReceiver::new(MemoryStore::new(), ZmodemConfig::default());
        shuttle(&mut sender, &mut receiver, 64);
        assert_eq!(sender.status(), TransferStatus::Complete);
        assert_eq!(receiver.status(), TransferStatus::Complete);
        let store = receiver.into_store();
        assert_eq!(store.contents("data.bin").unwrap(), contents);
    }

    #[test]
    fn crash_recovery_resumes_at_existing_size() {
        let contents: Vec<u8> = (0..3000u32).map(|v| (v % 199) as u8).collect();
        let mut store = MemoryStore::new();
        store.seed("data.bin", &contents[..1000]);
        let mut sender = ZmodemSender::new(
            Cursor::new(contents.clone()),
            "data.bin",
            contents.len() as u64,
            ZmodemConfig::default(),
        );
        let mut receiver = ZmodemReceiver::new(store, ZmodemConfig::default());
        shuttle(&mut sender, &mut receiver, 64);
        assert_eq!(receiver.status(), TransferStatus::Complete);
        let store = receiver.into_store();
        assert_eq!(store.contents("data.bin").unwrap(), contents);
    }

    #[test]
    fn complete_file_is_skipped() {
        let contents = b"all here".to_vec();
        let mut store = MemoryStore::new();
        store.seed("data.bin", &contents);
        let mut sender = ZmodemSender::new(
            Cursor::new(contents.clone()),
            "data.bin",
            contents.len() as u64,
            ZmodemConfig::default(),
        );
        let mut receiver = ZmodemReceiver::new(store, ZmodemConfig::default());
        shuttle(&mut sender, &mut receiver, 32);
        assert_eq!(sender.status(), TransferStatus::Complete);
        assert_eq!(receiver.status(), TransferStatus::Complete);
    }

    #[test]
    fn zchallenge_handshake() {
        let contents = b"challenge me".to_vec();
        let mut sender = ZmodemSender::new(
            Cursor::new(contents.clone()),
            "c.bin",
            contents.len() as u64,
            ZmodemConfig::default(),
        );
        let mut receiver = ZmodemReceiver::new(
            MemoryStore::new(),
            ZmodemConfig {
                zchallenge: true,
                ..ZmodemConfig::default()
            },
        );
        shuttle(&mut sender, &mut receiver, 32);
        assert_eq!(receiver.status(), TransferStatus::Complete);
        let store = receiver.into_store();
        assert_eq!(store.contents("c.bin").unwrap(), contents);
    }

    #[test]
    fn escape_control_round_trips() {
        let mut wire = BytesMut::new();
        let payload: Vec<u8> = (0u8..64).collect();
        encode_subpacket(&mut wire, Encoding::Bin32, ZCRCE, &payload, true);
        let mut decoder = SubpacketDecoder::default();
        let mut result = None;
        for &byte in wire.iter() {
            if let Some(event) = decoder.push(byte, true) {
                result = Some(event);
                break;
            }
        }
        assert_eq!(result, Some(SubpacketEvent::Done(payload, ZCRCE)));
    }
}
