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

//! XMODEM family engines: classic checksum, CRC-16, 1K blocks, and
//! YMODEM's block-0 name/size header with batch support.
//!
//! Block shape: `SOH|STX  num  255-num  payload  check`, where SOH
//! carries 128 bytes and STX 1024, padded with SUB. The receiver drives
//! the handshake by emitting NAK (checksum) or `C` (CRC) until the first
//! block lands; each block is acked or nak'd, with ten retries per block
//! before both sides give up.

use crate::store::FileStore;
use crate::{TransferEngine, TransferProgress, TransferStatus};
use bytes::{BufMut, BytesMut};
use crc::{CRC_16_XMODEM, Crc};
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, warn};

const SOH: u8 = 0x01;
const STX: u8 = 0x02;
const EOT: u8 = 0x04;
const ACK: u8 = 0x06;
const NAK: u8 = 0x15;
const CAN: u8 = 0x18;
const CRC_REQ: u8 = b'C';
const PAD: u8 = 0x1A;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

const MAX_BLOCK_RETRIES: u32 = 10;
const HANDSHAKE_INTERVAL: Duration = Duration::from_secs(3);
const MAX_HANDSHAKES: u32 = 20;

/// Protocol flavor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum XmodemVariant {
    /// 128-byte blocks, additive checksum.
    Checksum,
    /// 128-byte blocks, CRC-16.
    Crc,
    /// 1024-byte blocks, CRC-16.
    OneK,
    /// YMODEM: 1K blocks, CRC-16, block-0 header, batch.
    Ymodem,
}

impl XmodemVariant {
    fn block_size(self) -> usize {
        match self {
            XmodemVariant::Checksum | XmodemVariant::Crc => 128,
            XmodemVariant::OneK | XmodemVariant::Ymodem => 1024,
        }
    }

    fn uses_crc(self) -> bool {
        !matches!(self, XmodemVariant::Checksum)
    }

    fn is_batch(self) -> bool {
        matches!(self, XmodemVariant::Ymodem)
    }
}

fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, &byte| acc.wrapping_add(byte))
}

fn push_block(out: &mut BytesMut, variant: XmodemVariant, number: u8, payload: &[u8]) {
    let block_size = payload.len();
    out.put_u8(if block_size == 1024 { STX } else { SOH });
    out.put_u8(number);
    out.put_u8(255 - number);
    out.put_slice(payload);
    if variant.uses_crc() {
        out.put_u16(CRC16.checksum(payload));
    } else {
        out.put_u8(checksum(payload));
    }
}

// ===== Sender =====

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TxState {
    AwaitHandshake,
    AwaitBlockAck,
    AwaitEotAck,
    AwaitNextHandshake,
    Done,
    Failed,
}

/// One outgoing file in a batch.
struct Outgoing<F: Read> {
    name: String,
    file: F,
    size: u64,
}

///
/// The sending engine. XMODEM flavors carry exactly one file; YMODEM
/// carries the whole batch and terminates it with an empty block 0.
///
pub struct XmodemSender<F: Read> {
    variant: XmodemVariant,
    files: VecDeque<Outgoing<F>>,
    current: Option<Outgoing<F>>,
    state: TxState,
    block_number: u8,
    last_block: BytesMut,
    retries: u32,
    outbound: BytesMut,
    progress: TransferProgress,
    waited: Duration,
    handshakes: u32,
    sent_block0: bool,
    saw_can: bool,
    abort_requested: bool,
}

impl<F: Read> XmodemSender<F> {
    /// Creates a single-file sender.
    pub fn new(variant: XmodemVariant, name: &str, file: F, size: u64) -> XmodemSender<F> {
        XmodemSender::new_batch(variant, vec![(name.to_string(), file, size)])
    }

    /// Creates a batch sender (YMODEM); other variants send only the
    /// first file.
    pub fn new_batch(variant: XmodemVariant, files: Vec<(String, F, u64)>) -> XmodemSender<F> {
        let files: VecDeque<Outgoing<F>> = files
            .into_iter()
            .map(|(name, file, size)| Outgoing { name, file, size })
            .collect();
        let first_name = files.front().map(|f| f.name.clone()).unwrap_or_default();
        let first_size = files.front().map_or(0, |f| f.size);
        XmodemSender {
            variant,
            files,
            current: None,
            state: TxState::AwaitHandshake,
            block_number: 0,
            last_block: BytesMut::new(),
            retries: 0,
            outbound: BytesMut::new(),
            progress: TransferProgress {
                file_name: first_name,
                file_size: first_size,
                block_size: variant.block_size(),
                ..TransferProgress::default()
            },
            waited: Duration::ZERO,
            handshakes: 0,
            sent_block0: false,
            saw_can: false,
            abort_requested: false,
        }
    }

    fn fail(&mut self) {
        self.outbound.put_slice(&[CAN, CAN]);
        self.state = TxState::Failed;
    }

    fn send_block0(&mut self) {
        let mut payload = vec![0u8; 128];
        if let Some(next) = self.files.front() {
            let header = format!("{}\0{}", next.name, next.size);
            let bytes = header.as_bytes();
            payload[..bytes.len().min(128)].copy_from_slice(&bytes[..bytes.len().min(128)]);
        }
        self.last_block.clear();
        push_block(&mut self.last_block, self.variant, 0, &payload);
        self.outbound.extend_from_slice(&self.last_block);
        self.sent_block0 = true;
    }

    fn send_next_block(&mut self) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        let block_size = self.variant.block_size();
        let mut payload = vec![PAD; block_size];
        let mut filled = 0usize;
        while filled < block_size {
            match current.file.read(&mut payload[filled..]) {
                Ok(0) => break,
                Ok(count) => filled += count,
                Err(error) => {
                    warn!("xmodem read failed: {error}");
                    self.fail();
                    return;
                }
            }
        }
        if filled == 0 {
            // End of this file.
            self.outbound.put_u8(EOT);
            self.state = TxState::AwaitEotAck;
            return;
        }
        // A short tail on 1K variants falls back to 128-byte blocks.
        let payload = if filled <= 128 && block_size == 1024 {
            let mut short = vec![PAD; 128];
            short[..filled].copy_from_slice(&payload[..filled]);
            short
        } else {
            payload
        };
        self.block_number = self.block_number.wrapping_add(1);
        self.last_block.clear();
        push_block(&mut self.last_block, self.variant, self.block_number, &payload);
        self.outbound.extend_from_slice(&self.last_block);
        self.progress.offset += filled as u64;
        self.state = TxState::AwaitBlockAck;
    }

    fn begin_file(&mut self) {
        self.current = self.files.pop_front();
        self.block_number = 0;
        if let Some(current) = self.current.as_ref() {
            self.progress.file_name = current.name.clone();
            self.progress.file_size = current.size;
            self.progress.offset = 0;
        }
    }

    fn handle_byte(&mut self, byte: u8) {
        match (self.state, byte) {
            (TxState::AwaitHandshake, CRC_REQ | NAK) => {
                if self.variant.uses_crc() && byte != CRC_REQ {
                    debug!("checksum handshake for a CRC variant, obliging");
                }
                if self.variant.is_batch() && !self.sent_block0 {
                    self.send_block0();
                    self.state = TxState::AwaitBlockAck;
                } else {
                    self.begin_file();
                    self.send_next_block();
                }
            }
            (TxState::AwaitBlockAck, ACK) => {
                self.retries = 0;
                if self.variant.is_batch() && self.current.is_none() {
                    if self.files.is_empty() && self.progress.files_done > 0 {
                        // Empty block 0 acked; batch over.
                        self.state = TxState::Done;
                        return;
                    }
                    // Block 0 acked; data starts on the next handshake.
                    self.state = TxState::AwaitNextHandshake;
                    return;
                }
                self.send_next_block();
            }
            (TxState::AwaitNextHandshake, CRC_REQ | NAK) => {
                self.begin_file();
                self.send_next_block();
            }
            (TxState::AwaitBlockAck | TxState::AwaitEotAck, NAK) => {
                self.retries += 1;
                self.progress.errors += 1;
                if self.retries > MAX_BLOCK_RETRIES {
                    self.fail();
                    return;
                }
                if self.state == TxState::AwaitEotAck {
                    self.outbound.put_u8(EOT);
                } else {
                    let block = self.last_block.clone();
                    self.outbound.extend_from_slice(&block);
                }
            }
            (TxState::AwaitEotAck, ACK) => {
                self.retries = 0;
                self.progress.files_done += 1;
                self.current = None;
                if self.variant.is_batch() {
                    // Next handshake asks for the next block 0.
                    self.sent_block0 = false;
                    self.state = TxState::AwaitHandshake;
                } else {
                    self.state = TxState::Done;
                }
            }
            (_, CAN) => {
                // A lone CAN may be line noise; two in a row abort.
                if self.saw_can {
                    warn!("xmodem peer cancelled");
                    self.state = TxState::Failed;
                } else {
                    self.saw_can = true;
                    return;
                }
            }
            (state, byte) => {
                debug!("xmodem sender ignoring byte {byte:#04x} in {state:?}");
            }
        }
        self.saw_can = false;
    }
}

impl<F: Read> TransferEngine for XmodemSender<F> {
    fn pump(&mut self, inbound: &[u8]) -> (usize, TransferStatus) {
        if self.abort_requested {
            self.fail();
            return (inbound.len(), self.status());
        }
        for &byte in inbound {
            if self.status().is_terminal() {
                break;
            }
            self.waited = Duration::ZERO;
            self.handle_byte(byte);
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
        if self.waited >= HANDSHAKE_INTERVAL {
            self.waited = Duration::ZERO;
            self.handshakes += 1;
            if self.handshakes > MAX_HANDSHAKES {
                self.fail();
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
    Handshake,
    Receiving,
    AwaitBatchHeader,
    Done,
    Failed,
}

///
/// The receiving engine. For plain XMODEM the caller names the file
/// (the protocol doesn't); YMODEM names come from block 0 and an empty
/// block 0 ends the batch.
///
pub struct XmodemReceiver<S: FileStore> {
    store: S,
    file: Option<S::File>,
    variant: XmodemVariant,
    fallback_name: String,
    state: RxState,
    expected_block: u8,
    expected_size: Option<u64>,
    written: u64,
    inbound: BytesMut,
    outbound: BytesMut,
    progress: TransferProgress,
    retries: u32,
    waited: Duration,
    handshakes: u32,
    abort_requested: bool,
}

impl<S: FileStore> XmodemReceiver<S> {
    /// Creates a receiver. `fallback_name` names the file for the
    /// header-less XMODEM flavors.
    pub fn new(variant: XmodemVariant, store: S, fallback_name: &str) -> XmodemReceiver<S> {
        let mut receiver = XmodemReceiver {
            store,
            file: None,
            variant,
            fallback_name: if fallback_name.is_empty() {
                String::from("NONAME.DAT")
            } else {
                fallback_name.to_string()
            },
            state: RxState::Handshake,
            expected_block: 1,
            expected_size: None,
            written: 0,
            inbound: BytesMut::new(),
            outbound: BytesMut::new(),
            progress: TransferProgress {
                block_size: variant.block_size(),
                ..TransferProgress::default()
            },
            retries: 0,
            waited: Duration::ZERO,
            handshakes: 0,
            abort_requested: false,
        };
        receiver.send_handshake();
        receiver
    }

    /// Consumes the receiver, returning the store.
    pub fn into_store(self) -> S {
        self.store
    }

    fn send_handshake(&mut self) {
        self.outbound.put_u8(if self.variant.uses_crc() {
            CRC_REQ
        } else {
            NAK
        });
    }

    fn fail(&mut self) {
        self.outbound.put_slice(&[CAN, CAN]);
        self.state = RxState::Failed;
    }

    fn check_len(&self) -> usize {
        if self.variant.uses_crc() { 2 } else { 1 }
    }

    fn open_current(&mut self, name: &str) -> bool {
        match self.store.create(name) {
            Ok(file) => {
                self.file = Some(file);
                self.written = 0;
                self.progress.file_name = name.to_string();
                self.progress.offset = 0;
                true
            }
            Err(error) => {
                warn!("xmodem cannot create {name}: {error}");
                self.fail();
                false
            }
        }
    }

    /// Parses one block from the inbound buffer. Returns false when more
    /// bytes are needed.
    fn try_block(&mut self) -> bool {
        let Some(&first) = self.inbound.first() else {
            return false;
        };
        match first {
            EOT => {
                let _ = self.inbound.split_to(1);
                self.outbound.put_u8(ACK);
                self.finish_file();
                return true;
            }
            CAN => {
                if self.inbound.len() >= 2 && self.inbound[1] == CAN {
                    self.state = RxState::Failed;
                    return false;
                }
                let _ = self.inbound.split_to(1);
                return true;
            }
            SOH | STX => {}
            _ => {
                let _ = self.inbound.split_to(1);
                return true;
            }
        }
        let payload_len = if first == STX { 1024 } else { 128 };
        let total = 3 + payload_len + self.check_len();
        if self.inbound.len() < total {
            return false;
        }
        let block = self.inbound.split_to(total);
        let number = block[1];
        let complement = block[2];
        let payload = &block[3..3 + payload_len];
        let check_ok = if self.variant.uses_crc() {
            let wire = u16::from(block[total - 2]) << 8 | u16::from(block[total - 1]);
            CRC16.checksum(payload) == wire
        } else {
            checksum(payload) == block[total - 1]
        };
        if number != 255 - complement || !check_ok {
            self.progress.errors += 1;
            self.retries += 1;
            if self.retries > MAX_BLOCK_RETRIES {
                self.fail();
            } else {
                self.outbound.put_u8(NAK);
            }
            return true;
        }
        self.retries = 0;
        self.accept_block(number, payload);
        true
    }

    fn accept_block(&mut self, number: u8, payload: &[u8]) {
        if self.variant.is_batch()
            && number == 0
            && matches!(self.state, RxState::Handshake | RxState::AwaitBatchHeader)
        {
            self.handle_block0(payload);
            return;
        }
        if number == self.expected_block.wrapping_sub(1) {
            // Duplicate of the last block; ack and drop.
            self.outbound.put_u8(ACK);
            return;
        }
        if number != self.expected_block {
            warn!(
                "xmodem block {number} out of order (expected {})",
                self.expected_block
            );
            self.fail();
            return;
        }
        if self.file.is_none() {
            let name = self.fallback_name.clone();
            if !self.open_current(&name) {
                return;
            }
        }
        // YMODEM knows the size and trims the final block's padding.
        let take = match self.expected_size {
            Some(size) => {
                let remaining = size.saturating_sub(self.written);
                payload.len().min(usize::try_from(remaining).unwrap_or(payload.len()))
            }
            None => payload.len(),
        };
        let Some(file) = self.file.as_mut() else {
            return;
        };
        if file.write_all(&payload[..take]).is_err() {
            self.fail();
            return;
        }
        self.written += take as u64;
        self.progress.offset = self.written;
        self.expected_block = self.expected_block.wrapping_add(1);
        self.state = RxState::Receiving;
        self.outbound.put_u8(ACK);
    }

    fn handle_block0(&mut self, payload: &[u8]) {
        self.outbound.put_u8(ACK);
        let mut fields = payload.split(|&byte| byte == 0);
        let name = fields
            .next()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default();
        if name.is_empty() {
            // Batch terminator.
            self.state = RxState::Done;
            return;
        }
        let size = fields.next().and_then(|bytes| {
            let text = String::from_utf8_lossy(bytes);
            text.split_ascii_whitespace()
                .next()
                .and_then(|field| field.parse::<u64>().ok())
        });
        self.expected_size = size;
        self.progress.file_size = size.unwrap_or(0);
        if !self.open_current(&name) {
            return;
        }
        self.expected_block = 1;
        self.state = RxState::Receiving;
        // Data blocks start after a fresh handshake byte.
        self.send_handshake();
    }

    fn finish_file(&mut self) {
        self.file = None;
        self.progress.files_done += 1;
        if self.variant.is_batch() {
            self.expected_size = None;
            self.state = RxState::AwaitBatchHeader;
            self.send_handshake();
        } else {
            self.state = RxState::Done;
        }
    }
}

impl<S: FileStore> TransferEngine for XmodemReceiver<S> {
    fn pump(&mut self, inbound: &[u8]) -> (usize, TransferStatus) {
        if self.abort_requested {
            self.fail();
            return (inbound.len(), self.status());
        }
        self.inbound.extend_from_slice(inbound);
        while !self.status().is_terminal() {
            self.waited = Duration::ZERO;
            if !self.try_block() {
                break;
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
        if self.waited >= HANDSHAKE_INTERVAL {
            self.waited = Duration::ZERO;
            self.handshakes += 1;
            if self.handshakes > MAX_HANDSHAKES {
                self.fail();
            } else if self.state == RxState::Handshake || self.state == RxState::AwaitBatchHeader {
                self.send_handshake();
            } else {
                self.progress.errors += 1;
                self.outbound.put_u8(NAK);
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
    fn crc_variant_round_trip() {
        let contents: Vec<u8> = (0..300u32).map(|v| (v % 256) as u8).collect();
        let mut sender = XmodemSender::new(
            XmodemVariant::Crc,
            "x.bin",
            Cursor::new(contents.clone()),
            contents.len() as u64,
        );
        let mut receiver = XmodemReceiver::new(XmodemVariant::Crc, MemoryStore::new(), "x.bin");
        shuttle(&mut sender, &mut receiver, 64);
        assert_eq!(sender.status(), TransferStatus::Complete);
        assert_eq!(receiver.status(), TransferStatus::Complete);
        let received = receiver.into_store().contents("x.bin").unwrap();
        // Classic XMODEM pads the tail with SUB.
        assert_eq!(received.len(), 384);
        assert_eq!(&received[..300], &contents[..]);
        assert!(received[300..].iter().all(|&byte| byte == PAD));
    }

    #[test]
    fn checksum_variant_round_trip() {
        let contents = vec![7u8; 128];
        let mut sender = XmodemSender::new(
            XmodemVariant::Checksum,
            "c.bin",
            Cursor::new(contents.clone()),
            contents.len() as u64,
        );
        let mut receiver =
            XmodemReceiver::new(XmodemVariant::Checksum, MemoryStore::new(), "c.bin");
        shuttle(&mut sender, &mut receiver, 64);
        assert_eq!(receiver.status(), TransferStatus::Complete);
        assert_eq!(receiver.into_store().contents("c.bin").unwrap(), contents);
    }

    #[test]
    fn ymodem_carries_name_and_exact_size() {
        let contents: Vec<u8> = (0..2500u32).map(|v| (v % 256) as u8).collect();
        let mut sender = XmodemSender::new(
            XmodemVariant::Ymodem,
            "batch.bin",
            Cursor::new(contents.clone()),
            contents.len() as u64,
        );
        let mut receiver =
            XmodemReceiver::new(XmodemVariant::Ymodem, MemoryStore::new(), "ignored");
        shuttle(&mut sender, &mut receiver, 64);
        assert_eq!(sender.status(), TransferStatus::Complete);
        assert_eq!(receiver.status(), TransferStatus::Complete);
        let store = receiver.into_store();
        // Size from block 0 trims the padding exactly.
        assert_eq!(store.contents("batch.bin").unwrap(), contents);
    }

    #[test]
    fn corrupted_block_is_retried() {
        let contents = vec![0xABu8; 256];
        let mut sender = XmodemSender::new(
            XmodemVariant::Crc,
            "r.bin",
            Cursor::new(contents.clone()),
            contents.len() as u64,
        );
        let mut receiver = XmodemReceiver::new(XmodemVariant::Crc, MemoryStore::new(), "r.bin");
        // Handshake.
        let handshake = receiver.take_outbound();
        sender.pump(&handshake);
        // Corrupt the first block on the wire.
        let mut wire = sender.take_outbound().to_vec();
        wire[5] ^= 0xFF;
        receiver.pump(&wire);
        let nak = receiver.take_outbound();
        assert_eq!(&nak[..], &[NAK]);
        assert_eq!(receiver.progress().errors, 1);
        // Retransmission goes through clean.
        sender.pump(&nak);
        shuttle(&mut sender, &mut receiver, 32);
        assert_eq!(receiver.status(), TransferStatus::Complete);
        assert_eq!(receiver.into_store().contents("r.bin").unwrap(), contents);
    }

    #[test]
    fn short_tail_uses_small_blocks() {
        // 1100 bytes: one 1K block plus a 128-byte tail block.
        let contents: Vec<u8> = (0..1100u32).map(|v| (v % 251) as u8).collect();
        let mut sender = XmodemSender::new(
            XmodemVariant::OneK,
            "k.bin",
            Cursor::new(contents.clone()),
            contents.len() as u64,
        );
        let mut receiver = XmodemReceiver::new(XmodemVariant::OneK, MemoryStore::new(), "k.bin");
        shuttle(&mut sender, &mut receiver, 64);
        assert_eq!(receiver.status(), TransferStatus::Complete);
        let received = receiver.into_store().contents("k.bin").unwrap();
        assert_eq!(received.len(), 1024 + 128);
        assert_eq!(&received[..1100], &contents[..]);
    }
}
