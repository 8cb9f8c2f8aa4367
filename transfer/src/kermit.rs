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

//! Kermit send and receive engines.
//!
//! Packet shape: `MARK LEN SEQ TYPE DATA CHECK EOL`, every field but the
//! mark printable via the +32 char encoding. `LEN` of `char(0)` switches
//! to the long-packet form with a two-character extended length and its
//! own header checksum. The S/I init exchange negotiates packet size,
//! quoting, 8-bit prefixing, block-check type (1, 2, or 3 = CRC-16),
//! long packets, windows (declined), and streaming; init packets and
//! their acks always use the type-1 check.

use crate::store::FileStore;
use crate::{TransferEngine, TransferProgress, TransferStatus};
use bytes::{BufMut, BytesMut};
use crc::{CRC_16_KERMIT, Crc};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, warn};

const MARK: u8 = 0x01;
const DEFAULT_EOL: u8 = 0x0D;
const QCTL: u8 = b'#';
const QBIN: u8 = b'&';
/// Short-packet capacity advertised in MAXL.
const SHORT_MAXL: usize = 80;
/// Long-packet payload we advertise and accept.
const LONG_MAXL: usize = 1024;
/// Data bytes read per D packet when long packets are on.
const LONG_BLOCK: usize = 512;

/// Capability bits carried in the CAPAS init field.
const CAPA_LONG_PACKETS: u8 = 0x10;
const CAPA_ATTRIBUTES: u8 = 0x08;
const CAPA_STREAMING: u8 = 0x01;

const CRCK: Crc<u16> = Crc::<u16>::new(&CRC_16_KERMIT);

const RETRY_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RETRIES: u32 = 10;

fn tochar(value: u8) -> u8 {
    value + 32
}

fn unchar(value: u8) -> u8 {
    value.wrapping_sub(32)
}

fn ctl(value: u8) -> u8 {
    value ^ 64
}

fn chk1(bytes: &[u8]) -> u8 {
    let sum: u32 = bytes.iter().map(|&byte| u32::from(byte)).sum();
    tochar((((sum + ((sum >> 6) & 3)) & 0x3F) as u8).min(0x3F))
}

fn chk2(bytes: &[u8]) -> [u8; 2] {
    let sum: u32 = bytes.iter().map(|&byte| u32::from(byte)).sum();
    [tochar(((sum >> 6) & 0x3F) as u8), tochar((sum & 0x3F) as u8)]
}

fn chk3(bytes: &[u8]) -> [u8; 3] {
    let crc = CRCK.checksum(bytes);
    [
        tochar(((crc >> 12) & 0x0F) as u8),
        tochar(((crc >> 6) & 0x3F) as u8),
        tochar((crc & 0x3F) as u8),
    ]
}

fn check_len(check_type: u8) -> usize {
    match check_type {
        2 => 2,
        3 => 3,
        _ => 1,
    }
}

fn append_check(out: &mut Vec<u8>, body: &[u8], check_type: u8) {
    match check_type {
        2 => out.extend_from_slice(&chk2(body)),
        3 => out.extend_from_slice(&chk3(body)),
        _ => out.push(chk1(body)),
    }
}

fn verify_check(body: &[u8], check: &[u8], check_type: u8) -> bool {
    match check_type {
        2 => chk2(body)[..] == *check,
        3 => chk3(body)[..] == *check,
        _ => check.first() == Some(&chk1(body)),
    }
}

/// Control/8-bit prefix encoding of file data into packet data.
fn encode_data(raw: &[u8], eight_bit: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    for &byte in raw {
        let (high, low) = if eight_bit && byte & 0x80 != 0 {
            (true, byte & 0x7F)
        } else {
            (false, byte)
        };
        if high {
            out.push(QBIN);
        }
        if low < 32 || low == 127 {
            out.push(QCTL);
            out.push(ctl(low));
        } else if low == QCTL || (eight_bit && low == QBIN) {
            out.push(QCTL);
            out.push(low);
        } else {
            out.push(low);
        }
    }
    out
}

/// Reverse of [`encode_data`].
fn decode_data(encoded: &[u8], eight_bit: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded.len());
    let mut high = false;
    let mut index = 0usize;
    while index < encoded.len() {
        let byte = encoded[index];
        if eight_bit && byte == QBIN && !high {
            high = true;
            index += 1;
            continue;
        }
        let value = if byte == QCTL {
            index += 1;
            let Some(&next) = encoded.get(index) else {
                break;
            };
            let folded = ctl(next);
            if folded < 32 || folded == 127 { folded } else { next }
        } else {
            byte
        };
        out.push(if high { value | 0x80 } else { value });
        high = false;
        index += 1;
    }
    out
}

/// The robust-filename transform: uppercase, a single dot, and only
/// alphanumerics plus `._-` survive.
#[must_use]
pub fn robust_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let mut out = String::with_capacity(base.len());
    let mut seen_dot = false;
    let last_dot = base.rfind('.');
    for (index, ch) in base.chars().enumerate() {
        let upper = ch.to_ascii_uppercase();
        if upper == '.' {
            if Some(index) == last_dot && !seen_dot {
                seen_dot = true;
                out.push('.');
            }
            continue;
        }
        if upper.is_ascii_alphanumeric() || upper == '_' || upper == '-' {
            out.push(upper);
        }
    }
    if out.is_empty() { String::from("NONAME") } else { out }
}

/// True when the console window carries a Kermit send-init signature.
#[must_use]
pub fn kermit_autostart(window: &[u8]) -> bool {
    window.windows(4).any(|slice| {
        slice[0] == MARK
            && slice[1] >= 32
            && slice[2] >= 32
            && slice[3] == b'S'
    })
}

/// Binary/text heuristic over the first KiB: printable plus common
/// whitespace reads as text.
fn looks_like_text(sample: &[u8]) -> bool {
    sample
        .iter()
        .all(|&byte| matches!(byte, 0x20..=0x7E | b'\r' | b'\n' | b'\t' | 0x0C))
}

/// Engine tunables from the options file.
#[derive(Clone, Copy, Debug)]
pub struct KermitConfig {
    /// Apply [`robust_filename`] to offered names.
    pub robust_filename: bool,
    /// Stream D packets without per-packet acks when both sides agree.
    pub streaming: bool,
    /// Negotiate long packets.
    pub long_packets: bool,
    /// Skip the text heuristic and always send binary.
    pub uploads_force_binary: bool,
    /// Convert received text files to local line endings.
    pub downloads_convert_text: bool,
    /// Ask the receiver to append from its current size (RESEND).
    pub resend: bool,
}

impl Default for KermitConfig {
    fn default() -> Self {
        KermitConfig {
            robust_filename: true,
            streaming: false,
            long_packets: true,
            uploads_force_binary: false,
            downloads_convert_text: true,
            resend: false,
        }
    }
}

/// Negotiated session parameters.
#[derive(Clone, Copy, Debug)]
struct Negotiated {
    maxl: usize,
    check_type: u8,
    eight_bit: bool,
    long_packets: bool,
    streaming: bool,
    eol: u8,
}

impl Default for Negotiated {
    fn default() -> Self {
        Negotiated {
            maxl: SHORT_MAXL,
            check_type: 1,
            eight_bit: false,
            long_packets: false,
            streaming: false,
            eol: DEFAULT_EOL,
        }
    }
}

/// One parsed packet.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Packet {
    seq: u8,
    ptype: u8,
    data: Vec<u8>,
}

#[derive(Debug)]
enum PacketScan {
    Incomplete,
    Bad(usize),
    Found(Packet, usize),
}

/// Parses one packet from `buf` using `check_type` (init packets pass 1).
fn scan_packet(buf: &[u8], check_type: u8) -> PacketScan {
    let Some(start) = buf.iter().position(|&byte| byte == MARK) else {
        return PacketScan::Bad(buf.len());
    };
    let header = &buf[start..];
    if header.len() < 4 {
        return PacketScan::Incomplete;
    }
    let len_char = header[1];
    let chk_len = check_len(check_type);
    if unchar(len_char) == 0 {
        // Long packet: MARK char(0) SEQ TYPE LENX1 LENX2 HCHECK ...
        if header.len() < 7 {
            return PacketScan::Incomplete;
        }
        let hdr = &header[1..6];
        if chk1(hdr) != header[6] {
            return PacketScan::Bad(start + 2);
        }
        let extended =
            usize::from(unchar(header[4])) * 95 + usize::from(unchar(header[5]));
        let total = start + 7 + extended;
        if buf.len() < total {
            return PacketScan::Incomplete;
        }
        let body = &buf[start + 1..total - chk_len];
        let check = &buf[total - chk_len..total];
        if !verify_check(body, check, check_type) {
            return PacketScan::Bad(total);
        }
        let packet = Packet {
            seq: unchar(header[2]) & 0x3F,
            ptype: header[3],
            data: buf[start + 7..total - chk_len].to_vec(),
        };
        PacketScan::Found(packet, total)
    } else {
        let len = usize::from(unchar(len_char));
        if len < 2 + chk_len {
            return PacketScan::Bad(start + 2);
        }
        let total = start + 2 + len;
        if buf.len() < total {
            return PacketScan::Incomplete;
        }
        let body = &buf[start + 1..total - chk_len];
        let check = &buf[total - chk_len..total];
        if !verify_check(body, check, check_type) {
            return PacketScan::Bad(total);
        }
        let packet = Packet {
            seq: unchar(header[2]) & 0x3F,
            ptype: header[3],
            data: buf[start + 4..total - chk_len].to_vec(),
        };
        PacketScan::Found(packet, total)
    }
}

/// Builds a packet, choosing the long form when the data will not fit.
fn build_packet(
    out: &mut BytesMut,
    seq: u8,
    ptype: u8,
    data: &[u8],
    negotiated: &Negotiated,
    force_check1: bool,
) {
    let check_type = if force_check1 { 1 } else { negotiated.check_type };
    let chk_len = check_len(check_type);
    let mut body: Vec<u8> = Vec::with_capacity(data.len() + 16);
    let short_len = data.len() + 2 + chk_len;
    if short_len <= 94 {
        body.push(tochar(short_len as u8));
        body.push(tochar(seq));
        body.push(ptype);
        body.extend_from_slice(data);
    } else {
        let extended = data.len() + chk_len;
        body.push(tochar(0));
        body.push(tochar(seq));
        body.push(ptype);
        body.push(tochar((extended / 95) as u8));
        body.push(tochar((extended % 95) as u8));
        let hcheck = chk1(&body);
        body.push(hcheck);
        body.extend_from_slice(data);
    }
    out.put_u8(MARK);
    let mut packet = body;
    let checked = packet.clone();
    append_check(&mut packet, &checked, check_type);
    out.extend_from_slice(&packet);
    out.put_u8(negotiated.eol);
}

/// The init parameter block we offer / answer with.
fn init_params(config: &KermitConfig) -> Vec<u8> {
    let mut capas = CAPA_ATTRIBUTES;
    if config.long_packets {
        capas |= CAPA_LONG_PACKETS;
    }
    if config.streaming {
        capas |= CAPA_STREAMING;
    }
    vec![
        tochar(SHORT_MAXL as u8),      // MAXL
        tochar(5),                     // TIME
        tochar(0),                     // NPAD
        ctl(0),                        // PADC
        tochar(DEFAULT_EOL),           // EOL
        QCTL,                          // QCTL
        QBIN,                          // QBIN
        b'3',                          // CHKT
        b' ',                          // REPT (none)
        tochar(capas),                 // CAPAS
        tochar(0),                     // WINDO (no sliding windows)
        tochar((LONG_MAXL / 95) as u8), // MAXLX1
        tochar((LONG_MAXL % 95) as u8), // MAXLX2
    ]
}

/// Merges the peer's init parameters with our configuration.
fn merge_params(data: &[u8], config: &KermitConfig) -> Negotiated {
    let mut negotiated = Negotiated::default();
    if let Some(&maxl) = data.first() {
        negotiated.maxl = usize::from(unchar(maxl)).clamp(10, 94);
    }
    if let Some(&eol) = data.get(4) {
        let eol = unchar(eol);
        negotiated.eol = if eol == 0 { DEFAULT_EOL } else { eol };
    }
    if data.get(6).is_some_and(|&qbin| qbin == QBIN || qbin == b'Y') {
        negotiated.eight_bit = true;
    }
    if let Some(&chkt) = data.get(7) {
        if (b'1'..=b'3').contains(&chkt) {
            negotiated.check_type = chkt - b'0';
        }
    }
    if let Some(&capas) = data.get(9) {
        let capas = unchar(capas);
        negotiated.long_packets = config.long_packets && capas & CAPA_LONG_PACKETS != 0;
        negotiated.streaming = config.streaming && capas & CAPA_STREAMING != 0;
        if negotiated.long_packets {
            let x1 = data.get(11).map_or(0, |&c| usize::from(unchar(c)));
            let x2 = data.get(12).map_or(0, |&c| usize::from(unchar(c)));
            let long = x1 * 95 + x2;
            if long >= 96 {
                negotiated.maxl = long.min(LONG_MAXL);
            }
        }
    }
    negotiated
}

// ===== Sender =====

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TxState {
    SendInit,
    SendFile,
    SendAttributes,
    SendData,
    SendEof,
    SendBreak,
    Done,
    Failed,
}

///
/// The Kermit sender for one file.
///
pub struct KermitSender<F: Read> {
    file: F,
    name: String,
    size: u64,
    config: KermitConfig,
    negotiated: Negotiated,
    state: TxState,
    seq: u8,
    outbound: BytesMut,
    inbound: BytesMut,
    progress: TransferProgress,
    text_mode: bool,
    /// File bytes read ahead of packetization (text conversion happens
    /// here).
    pending: Vec<u8>,
    file_eof: bool,
    carried_cr: bool,
    last_packet: (u8, Vec<u8>),
    unacked: u32,
    waited: Duration,
    retries: u32,
    abort_requested: bool,
}

impl<F: Read> KermitSender<F> {
    /// Creates a sender and queues the S packet.
    pub fn new(file: F, name: &str, size: u64, config: KermitConfig) -> KermitSender<F> {
        let offered = if config.robust_filename {
            robust_filename(name)
        } else {
            name.to_string()
        };
        let mut sender = KermitSender {
            file,
            name: offered.clone(),
            size,
            config,
            negotiated: Negotiated::default(),
            state: TxState::SendInit,
            seq: 0,
            outbound: BytesMut::new(),
            inbound: BytesMut::new(),
            progress: TransferProgress {
                file_name: offered,
                file_size: size,
                block_size: SHORT_MAXL,
                ..TransferProgress::default()
            },
            text_mode: false,
            pending: Vec::new(),
            file_eof: false,
            carried_cr: false,
            last_packet: (b'S', Vec::new()),
            unacked: 0,
            waited: Duration::ZERO,
            retries: 0,
            abort_requested: false,
        };
        let params = init_params(&sender.config);
        sender.emit(b'S', &params, true);
        sender
    }

    fn emit(&mut self, ptype: u8, data: &[u8], force_check1: bool) {
        build_packet(
            &mut self.outbound,
            self.seq,
            ptype,
            data,
            &self.negotiated,
            force_check1,
        );
        self.last_packet = (ptype, data.to_vec());
    }

    fn resend_last(&mut self) {
        let (ptype, data) = self.last_packet.clone();
        let force_check1 = ptype == b'S';
        build_packet(
            &mut self.outbound,
            self.seq,
            ptype,
            &data,
            &self.negotiated,
            force_check1,
        );
    }

    fn bump_seq(&mut self) {
        self.seq = (self.seq + 1) & 0x3F;
    }

    fn fail(&mut self) {
        self.state = TxState::Failed;
    }

    fn refill_pending(&mut self) {
        let target = self.block_payload() * 2;
        let mut block = [0u8; 1024];
        while self.pending.len() < target && !self.file_eof {
            match self.file.read(&mut block) {
                Ok(0) => self.file_eof = true,
                Ok(count) => {
                    if self.text_mode {
                        for &byte in &block[..count] {
                            if byte == b'\n' && !self.carried_cr {
                                self.pending.push(b'\r');
                            }
                            self.carried_cr = byte == b'\r';
                            self.pending.push(byte);
                        }
                    } else {
                        self.pending.extend_from_slice(&block[..count]);
                    }
                }
                Err(error) => {
                    warn!("kermit read failed: {error}");
                    self.file_eof = true;
                }
            }
        }
    }

    fn block_payload(&self) -> usize {
        if self.negotiated.long_packets {
            LONG_BLOCK
        } else {
            // Room for worst-case quoting in a short packet.
            (self.negotiated.maxl.saturating_sub(2 + check_len(self.negotiated.check_type))) / 2
        }
        .max(10)
    }

    fn send_next_data(&mut self) -> bool {
        self.refill_pending();
        if self.pending.is_empty() {
            return false;
        }
        // Take raw bytes whose encoding stays within the packet budget.
        let budget = if self.negotiated.long_packets {
            LONG_MAXL - check_len(self.negotiated.check_type) - 8
        } else {
            self.negotiated.maxl - 2 - check_len(self.negotiated.check_type)
        };
        let mut take = 0usize;
        let mut encoded_len = 0usize;
        for &byte in &self.pending {
            let cost = encoded_cost(byte, self.negotiated.eight_bit);
            if encoded_len + cost > budget || take >= self.block_payload() {
                break;
            }
            encoded_len += cost;
            take += 1;
        }
        let raw: Vec<u8> = self.pending.drain(..take).collect();
        let encoded = encode_data(&raw, self.negotiated.eight_bit);
        self.bump_seq();
        self.emit(b'D', &encoded, false);
        self.progress.offset += raw.len() as u64;
        true
    }

    fn sample_text_mode(&mut self) {
        // The heuristic runs on the first refill.
        self.refill_pending();
        if !self.config.uploads_force_binary {
            let sample = &self.pending[..self.pending.len().min(1024)];
            self.text_mode = looks_like_text(sample);
            if self.text_mode {
                // Re-run conversion on what was already buffered.
                let raw = std::mem::take(&mut self.pending);
                for &byte in &raw {
                    if byte == b'\n' && !self.carried_cr {
                        self.pending.push(b'\r');
                    }
                    self.carried_cr = byte == b'\r';
                    self.pending.push(byte);
                }
            }
        }
    }

    fn attribute_data(&self) -> Vec<u8> {
        let mut data = Vec::new();
        // '1': file size in bytes.
        let size = self.size.to_string();
        data.push(b'1');
        data.push(tochar(size.len() as u8));
        data.extend_from_slice(size.as_bytes());
        // '"': file type, A for text, B for binary.
        data.push(b'"');
        data.push(tochar(1));
        data.push(if self.text_mode { b'A' } else { b'B' });
        if self.config.resend {
            // '+': disposition RESEND, append at the receiver's size.
            data.push(b'+');
            data.push(tochar(1));
            data.push(b'R');
        }
        data
    }

    fn handle_packet(&mut self, packet: &Packet) {
        match packet.ptype {
            b'Y' => self.handle_ack(packet),
            b'N' => {
                self.progress.errors += 1;
                self.resend_last();
            }
            b'E' => {
                warn!(
                    "kermit peer error: {}",
                    String::from_utf8_lossy(&packet.data)
                );
                self.fail();
            }
            other => {
                debug!("kermit sender ignoring packet type {}", other as char);
            }
        }
    }

    fn handle_ack(&mut self, packet: &Packet) {
        match self.state {
            TxState::SendInit => {
                self.negotiated = merge_params(&packet.data, &self.config);
                self.progress.block_size = self.negotiated.maxl;
                self.sample_text_mode();
                self.bump_seq();
                let name = self.name.clone();
                self.emit(b'F', name.as_bytes(), false);
                self.state = TxState::SendFile;
            }
            TxState::SendFile => {
                self.bump_seq();
                let data = self.attribute_data();
                self.emit(b'A', &data, false);
                self.state = TxState::SendAttributes;
            }
            TxState::SendAttributes => {
                self.state = TxState::SendData;
                self.pump_send();
            }
            TxState::SendData => {
                if packet.seq == self.seq {
                    self.unacked = self.unacked.saturating_sub(1);
                }
                self.pump_send();
            }
            TxState::SendEof => {
                self.bump_seq();
                self.emit(b'B', &[], false);
                self.state = TxState::SendBreak;
            }
            TxState::SendBreak => {
                self.state = TxState::Done;
            }
            _ => {}
        }
    }

    fn pump_send(&mut self) {
        if self.state != TxState::SendData {
            return;
        }
        if self.negotiated.streaming {
            // Burst-bounded; the dispatcher keeps pumping while the
            // outbound buffer grows, and the single Y arrives after Z.
            let mut burst = 0;
            while burst < 64 && self.send_next_data() {
                burst += 1;
            }
            if self.pending.is_empty() && self.file_eof {
                self.bump_seq();
                self.emit(b'Z', &[], false);
                self.state = TxState::SendEof;
            }
        } else if self.unacked == 0 {
            if self.send_next_data() {
                self.unacked = 1;
            } else if self.file_eof {
                self.bump_seq();
                self.emit(b'Z', &[], false);
                self.state = TxState::SendEof;
            }
        }
    }
}

fn encoded_cost(byte: u8, eight_bit: bool) -> usize {
    let (high, low) = if eight_bit && byte & 0x80 != 0 {
        (1usize, byte & 0x7F)
    } else {
        (0, byte)
    };
    let base = if low < 32 || low == 127 || low == QCTL || (eight_bit && low == QBIN) {
        2
    } else {
        1
    };
    high + base
}

impl<F: Read> TransferEngine for KermitSender<F> {
    fn pump(&mut self, inbound: &[u8]) -> (usize, TransferStatus) {
        if self.abort_requested {
            let mut out = BytesMut::new();
            build_packet(&mut out, self.seq, b'E', b"cancelled", &self.negotiated, false);
            self.outbound.extend_from_slice(&out);
            self.fail();
            return (inbound.len(), self.status());
        }
        self.inbound.extend_from_slice(inbound);
        loop {
            if self.status().is_terminal() {
                break;
            }
            // Init acks always use the type-1 check.
            let check_type = if self.state == TxState::SendInit {
                1
            } else {
                self.negotiated.check_type
            };
            match scan_packet(&self.inbound, check_type) {
                PacketScan::Incomplete => break,
                PacketScan::Bad(consumed) => {
                    if consumed == 0 {
                        break;
                    }
                    let _ = self.inbound.split_to(consumed.min(self.inbound.len()));
                }
                PacketScan::Found(packet, consumed) => {
                    let _ = self.inbound.split_to(consumed.min(self.inbound.len()));
                    self.waited = Duration::ZERO;
                    self.retries = 0;
                    self.handle_packet(&packet);
                }
            }
        }
        if self.state == TxState::SendData && self.negotiated.streaming {
            self.pump_send();
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
                self.resend_last();
            }
        }
        self.status()
    }

    fn status(&self) -> TransferStatus {
        match self.state {
            TxState::Done => TransferStatus::Complete,
            TxState::Failed => TransferStatus::Failed,
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
    AwaitInit,
    AwaitFile,
    AwaitData,
    Done,
    Failed,
}

///
/// The Kermit receiver, writing into a [`FileStore`].
///
pub struct KermitReceiver<S: FileStore> {
    store: S,
    file: Option<S::File>,
    config: KermitConfig,
    negotiated: Negotiated,
    state: RxState,
    expected_seq: u8,
    outbound: BytesMut,
    inbound: BytesMut,
    progress: TransferProgress,
    pending_name: Option<String>,
    append_requested: bool,
    text_file: bool,
    carried_cr: bool,
    waited: Duration,
    retries: u32,
    abort_requested: bool,
}

impl<S: FileStore> KermitReceiver<S> {
    /// Creates a receiver; it waits silently for the sender's S packet.
    pub fn new(store: S, config: KermitConfig) -> KermitReceiver<S> {
        KermitReceiver {
            store,
            file: None,
            config,
            negotiated: Negotiated::default(),
            state: RxState::AwaitInit,
            expected_seq: 0,
            outbound: BytesMut::new(),
            inbound: BytesMut::new(),
            progress: TransferProgress {
                block_size: SHORT_MAXL,
                ..TransferProgress::default()
            },
            pending_name: None,
            append_requested: false,
            text_file: false,
            carried_cr: false,
            waited: Duration::ZERO,
            retries: 0,
            abort_requested: false,
        }
    }

    /// Consumes the receiver, returning the store.
    pub fn into_store(self) -> S {
        self.store
    }

    fn fail(&mut self) {
        self.state = RxState::Failed;
    }

    fn ack(&mut self, seq: u8, data: &[u8], force_check1: bool) {
        build_packet(
            &mut self.outbound,
            seq,
            b'Y',
            data,
            &self.negotiated,
            force_check1,
        );
    }

    fn nak(&mut self, seq: u8) {
        self.progress.errors += 1;
        build_packet(&mut self.outbound, seq, b'N', &[], &self.negotiated, false);
    }

    fn open_file(&mut self) -> bool {
        let Some(name) = self.pending_name.clone() else {
            return false;
        };
        let result = if self.config.resend && self.append_requested {
            self.store.open_append(&name).map(|(file, size)| {
                self.progress.offset = size;
                file
            })
        } else {
            self.store.create(&name)
        };
        match result {
            Ok(file) => {
                self.file = Some(file);
                true
            }
            Err(error) => {
                warn!("kermit cannot open {name}: {error}");
                build_packet(
                    &mut self.outbound,
                    self.expected_seq,
                    b'E',
                    b"cannot open file",
                    &self.negotiated,
                    false,
                );
                self.fail();
                false
            }
        }
    }

    fn write_data(&mut self, decoded: &[u8]) -> bool {
        if self.file.is_none() && !self.open_file() {
            return false;
        }
        let Some(file) = self.file.as_mut() else {
            return false;
        };
        if self.text_file && self.config.downloads_convert_text {
            let mut converted = Vec::with_capacity(decoded.len());
            for &byte in decoded {
                if self.carried_cr && byte != b'\n' {
                    converted.push(b'\r');
                }
                if byte == b'\r' {
                    self.carried_cr = true;
                    continue;
                }
                self.carried_cr = false;
                converted.push(byte);
            }
            if file.write_all(&converted).is_err() {
                self.fail();
                return false;
            }
            self.progress.offset += converted.len() as u64;
        } else {
            if file.write_all(decoded).is_err() {
                self.fail();
                return false;
            }
            self.progress.offset += decoded.len() as u64;
        }
        true
    }

    fn parse_attributes(&mut self, data: &[u8]) {
        let mut index = 0usize;
        while index + 2 <= data.len() {
            let attribute = data[index];
            let length = usize::from(unchar(data[index + 1]));
            let value = data.get(index + 2..index + 2 + length).unwrap_or(&[]);
            match attribute {
                b'1' => {
                    if let Ok(text) = std::str::from_utf8(value) {
                        self.progress.file_size = text.parse().unwrap_or(0);
                    }
                }
                b'"' => {
                    self.text_file = value.first() == Some(&b'A');
                }
                b'+' => {
                    self.append_requested = value.first() == Some(&b'R');
                }
                _ => {}
            }
            index += 2 + length;
        }
    }

    fn handle_packet(&mut self, packet: Packet) {
        match packet.ptype {
            b'S' | b'I' => {
                self.negotiated = merge_params(&packet.data, &self.config);
                self.progress.block_size = self.negotiated.maxl;
                self.expected_seq = (packet.seq + 1) & 0x3F;
                let params = init_params(&self.config);
                self.ack(packet.seq, &params, true);
                if packet.ptype == b'S' {
                    self.state = RxState::AwaitFile;
                }
            }
            b'F' => {
                let offered = String::from_utf8_lossy(&packet.data).into_owned();
                let name = if self.config.robust_filename {
                    robust_filename(&offered)
                } else {
                    offered
                };
                self.progress.file_name = name.clone();
                self.pending_name = Some(name);
                self.file = None;
                self.append_requested = false;
                self.text_file = false;
                self.carried_cr = false;
                self.expected_seq = (packet.seq + 1) & 0x3F;
                self.ack(packet.seq, &[], false);
                self.state = RxState::AwaitData;
            }
            b'A' => {
                self.parse_attributes(&packet.data);
                self.expected_seq = (packet.seq + 1) & 0x3F;
                self.ack(packet.seq, &[], false);
            }
            b'D' => {
                if packet.seq != self.expected_seq {
                    // Duplicate of an already-acked packet.
                    if !self.negotiated.streaming {
                        self.ack(packet.seq, &[], false);
                    }
                    return;
                }
                let decoded = decode_data(&packet.data, self.negotiated.eight_bit);
                if !self.write_data(&decoded) {
                    return;
                }
                self.expected_seq = (self.expected_seq + 1) & 0x3F;
                if !self.negotiated.streaming {
                    self.ack(packet.seq, &[], false);
                }
            }
            b'Z' => {
                if self.carried_cr {
                    // Flush a file-final CR.
                    if let Some(file) = self.file.as_mut() {
                        let _ = file.write_all(b"\r");
                    }
                    self.carried_cr = false;
                }
                self.file = None;
                self.progress.files_done += 1;
                self.expected_seq = (packet.seq + 1) & 0x3F;
                self.ack(packet.seq, &[], false);
                self.state = RxState::AwaitFile;
            }
            b'B' => {
                self.ack(packet.seq, &[], false);
                self.state = RxState::Done;
            }
            b'E' => {
                warn!(
                    "kermit peer error: {}",
                    String::from_utf8_lossy(&packet.data)
                );
                self.fail();
            }
            other => {
                debug!("kermit receiver ignoring packet type {}", other as char);
                self.nak(self.expected_seq);
            }
        }
    }
}

impl<S: FileStore> TransferEngine for KermitReceiver<S> {
    fn pump(&mut self, inbound: &[u8]) -> (usize, TransferStatus) {
        if self.abort_requested {
            let mut out = BytesMut::new();
            build_packet(&mut out, self.expected_seq, b'E', b"cancelled", &self.negotiated, false);
            self.outbound.extend_from_slice(&out);
            self.fail();
            return (inbound.len(), self.status());
        }
        self.inbound.extend_from_slice(inbound);
        loop {
            if self.status().is_terminal() {
                break;
            }
            let check_type = if self.state == RxState::AwaitInit {
                1
            } else {
                self.negotiated.check_type
            };
            match scan_packet(&self.inbound, check_type) {
                PacketScan::Incomplete => break,
                PacketScan::Bad(consumed) => {
                    if consumed == 0 {
                        break;
                    }
                    let _ = self.inbound.split_to(consumed.min(self.inbound.len()));
                    if self.state != RxState::AwaitInit {
                        self.nak(self.expected_seq);
                    }
                }
                PacketScan::Found(packet, consumed) => {
                    let _ = self.inbound.split_to(consumed.min(self.inbound.len()));
                    self.waited = Duration::ZERO;
                    self.retries = 0;
                    self.handle_packet(packet);
                }
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
            if self.retries > MAX_RETRIES {
                self.fail();
            } else if self.state != RxState::AwaitInit {
                self.nak(self.expected_seq);
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

    fn shuttle<A: TransferEngine, B: TransferEngine>(a: &mut A, b: &mut B, rounds: usize) {
        for _ in 0..rounds {
            let from_a = a.take_outbound();
            let _ = b.pump(&from_a);
            let from_b = b.take_outbound();
            let _ = a.pump(&from_b);
            if a.status().is_terminal() && b.status().is_terminal() {
                break;
            }
        }
    }

    #[test]
    fn tochar_unchar_round_trip() {
        for value in 0..95u8 {
            assert_eq!(unchar(tochar(value)), value);
        }
    }

    #[test]
    fn data_encoding_round_trip() {
        let raw: Vec<u8> = (0u8..=255).collect();
        let encoded = encode_data(&raw, true);
        assert!(encoded.iter().all(|&byte| (32..127).contains(&byte)));
        assert_eq!(decode_data(&encoded, true), raw);
    }

    #[test]
    fn data_encoding_seven_bit_round_trip() {
        let raw: Vec<u8> = (0u8..128).collect();
        let encoded = encode_data(&raw, false);
        assert_eq!(decode_data(&encoded, false), raw);
    }

    #[test]
    fn robust_filename_transform() {
        assert_eq!(robust_filename("My File (1).tar.gz"), "MYFILE1TAR.GZ");
        assert_eq!(robust_filename("/tmp/path/to/alpha.bin"), "ALPHA.BIN");
        assert_eq!(robust_filename("...."), "NONAME");
    }

    #[test]
    fn autostart_detects_send_init() {
        let mut wire = BytesMut::new();
        build_packet(&mut wire, 0, b'S', &init_params(&KermitConfig::default()), &Negotiated::default(), true);
        assert!(kermit_autostart(&wire));
        assert!(!kermit_autostart(b"no kermit here"));
    }

    #[test]
    fn short_packet_round_trip() {
        let mut wire = BytesMut::new();
        let negotiated = Negotiated::default();
        build_packet(&mut wire, 5, b'D', b"hello", &negotiated, false);
        match scan_packet(&wire, 1) {
            PacketScan::Found(packet, consumed) => {
                assert_eq!(packet.seq, 5);
                assert_eq!(packet.ptype, b'D');
                assert_eq!(packet.data, b"hello");
                assert_eq!(consumed, wire.len() - 1); // EOL not consumed
            }
            other => panic!("expected packet, got {other:?}"),
        }
    }

    #[test]
    fn long_packet_round_trip() {
        let mut wire = BytesMut::new();
        let negotiated = Negotiated {
            long_packets: true,
            check_type: 3,
            ..Negotiated::default()
        };
        let data: Vec<u8> = (0..300).map(|v| tochar((v % 90) as u8)).collect();
        build_packet(&mut wire, 9, b'D', &data, &negotiated, false);
        match scan_packet(&wire, 3) {
            PacketScan::Found(packet, _) => {
                assert_eq!(packet.seq, 9);
                assert_eq!(packet.data, data);
            }
            other => panic!("expected packet, got {other:?}"),
        }
    }

    #[test]
    fn corrupted_packet_is_bad() {
        let mut wire = BytesMut::new();
        build_packet(&mut wire, 1, b'D', b"payload", &Negotiated::default(), false);
        wire[5] ^= 0x01;
        assert!(matches!(scan_packet(&wire, 1), PacketScan::Bad(_)));
    }

    #[test]
    fn full_transfer_acked_per_packet() {
        let contents: Vec<u8> = (0..2048u32).map(|v| (v % 256) as u8).collect();
        let mut sender = KermitSender::new(
            Cursor::new(contents.clone()),
            "alpha.bin",
            contents.len() as u64,
            KermitConfig {
                streaming: false,
                ..KermitConfig::default()
            },
        );
        let mut receiver = KermitReceiver::new(MemoryStore::new(), KermitConfig::default());
        shuttle(&mut sender, &mut receiver, 128);
        assert_eq!(sender.status(), TransferStatus::Complete);
        assert_eq!(receiver.status(), TransferStatus::Complete);
        let store = receiver.into_store();
        assert_eq!(store.contents("ALPHA.BIN").unwrap(), contents);
    }

    #[test]
    fn streaming_transfer() {
        let contents: Vec<u8> = (0..4096u32).map(|v| (v % 251) as u8).collect();
        let config = KermitConfig {
            streaming: true,
            ..KermitConfig::default()
        };
        let mut sender = KermitSender::new(
            Cursor::new(contents.clone()),
            "s.bin",
            contents.len() as u64,
            config,
        );
        let mut receiver = KermitReceiver::new(MemoryStore::new(), config);
        shuttle(&mut sender, &mut receiver, 64);
        assert_eq!(receiver.status(), TransferStatus::Complete);
        let store = receiver.into_store();
        assert_eq!(store.contents("S.BIN").unwrap(), contents);
    }

    #[test]
    fn resend_appends_at_existing_size() {
        let contents = b"0123456789abcdef".to_vec();
        let mut store = MemoryStore::new();
        // First half already on disk from an interrupted run.
        store.seed("R.BIN", &contents[..8]);
        let config = KermitConfig {
            resend: true,
            uploads_force_binary: true,
            ..KermitConfig::default()
        };
        let mut sender = KermitSender::new(
            Cursor::new(contents[8..].to_vec()),
            "r.bin",
            (contents.len() - 8) as u64,
            config,
        );
        let mut receiver = KermitReceiver::new(store, config);
        shuttle(&mut sender, &mut receiver, 64);
        assert_eq!(receiver.status(), TransferStatus::Complete);
        let store = receiver.into_store();
        assert_eq!(store.contents("R.BIN").unwrap(), contents);
    }

    #[test]
    fn text_heuristic_detects_binary() {
        assert!(looks_like_text(b"hello world\r\nline two\r\n"));
        assert!(!looks_like_text(&[0u8, 159, 200, 7]));
    }
}
