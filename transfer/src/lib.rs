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

//! # Qodem File Transfer Engines
//!
//! Pump-style protocol engines for the classic BBS transfer protocols.
//! An engine never touches the wire: the session dispatcher feeds it
//! inbound bytes with [`TransferEngine::pump`], drains the engine's
//! outbound buffer to the transport, and calls [`TransferEngine::tick`]
//! with elapsed wall-clock time for retry and timeout handling. The pump
//! loop repeats until the outbound buffer stops growing, so protocol
//! exchanges complete within one dispatcher iteration whenever the bytes
//! are already buffered.
//!
//! File storage is abstracted behind [`FileStore`] so the engines test
//! against in-memory files and the session runs them against a download
//! directory. Crash recovery (ZMODEM ZRPOS, Kermit RESEND) needs the
//! store to answer existence/size queries and open in append mode.
//!
//! Engines: [`ZmodemSender`]/[`ZmodemReceiver`], [`KermitSender`]/
//! [`KermitReceiver`], [`XmodemSender`]/[`XmodemReceiver`] (covering the
//! checksum/CRC/1K variants plus YMODEM batch), and
//! [`AsciiSender`]/[`AsciiReceiver`].

#![warn(
    clippy::cargo,
    missing_docs,
    clippy::pedantic,
    future_incompatible,
    rust_2018_idioms
)]
#![allow(
    clippy::option_if_let_else,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation
)]

mod ascii;
mod kermit;
mod store;
mod xmodem;
mod zmodem;

pub use self::ascii::{AsciiReceiver, AsciiSender, LinePolicy};
pub use self::kermit::{KermitConfig, KermitReceiver, KermitSender};
pub use self::store::{DirectoryStore, FileStore, MemoryStore};
pub use self::xmodem::{XmodemReceiver, XmodemSender, XmodemVariant};
pub use self::zmodem::{ZmodemConfig, ZmodemReceiver, ZmodemSender, zmodem_autostart};
pub use self::kermit::kermit_autostart;

use bytes::BytesMut;
use std::time::Duration;

/// Where a transfer stands after a pump or tick.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransferStatus {
    /// Making progress.
    Running,
    /// All files delivered and the protocol closed cleanly.
    Complete,
    /// The transfer unwound; partial files are the protocol's business.
    Failed,
    /// Nothing to do until the peer speaks or a timeout expires.
    AwaitingTimeout,
}

impl TransferStatus {
    /// True when the engine is finished, successfully or not.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Complete | TransferStatus::Failed)
    }
}

/// Which way the bytes flow.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransferDirection {
    /// Local → remote.
    Send,
    /// Remote → local.
    Receive,
}

/// Counters the UI renders while a transfer runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferProgress {
    /// Current file name.
    pub file_name: String,
    /// Current file size when known (0 otherwise).
    pub file_size: u64,
    /// Bytes transferred for the current file.
    pub offset: u64,
    /// Active block/subpacket size.
    pub block_size: usize,
    /// Errors seen (CRC failures, NAKs, timeouts).
    pub errors: u32,
    /// Files fully delivered this batch.
    pub files_done: usize,
}

///
/// The contract every protocol engine implements.
///
/// The dispatcher's routing step is: `pump` with whatever arrived, drain
/// outbound, repeat while outbound grows, then on the timer tick call
/// `tick`. `abort` is observed on the next pump/tick and unwinds with
/// [`TransferStatus::Failed`].
///
pub trait TransferEngine {
    /// Feeds inbound bytes. Returns how many were consumed (the rest
    /// stays buffered upstream) and the status after processing.
    fn pump(&mut self, inbound: &[u8]) -> (usize, TransferStatus);

    /// Takes the bytes queued for the wire.
    fn take_outbound(&mut self) -> BytesMut;

    /// True when outbound bytes are waiting.
    fn has_outbound(&self) -> bool;

    /// Advances protocol timers.
    fn tick(&mut self, elapsed: Duration) -> TransferStatus;

    /// Current status without feeding anything.
    fn status(&self) -> TransferStatus;

    /// Progress counters for the UI.
    fn progress(&self) -> TransferProgress;

    /// Requests cancellation.
    fn abort(&mut self);
}
