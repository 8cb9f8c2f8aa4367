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

//! # Qodem Transports
//!
//! One uniform byte-pipe interface over the connection kinds a BBS
//! terminal dials: raw TCP, telnet (with option negotiation handled
//! inside the transport so only DATA bytes surface), rlogin, SSH via the
//! system client, a local shell process, and a serial device node.
//!
//! ## Contract
//!
//! `read` returns `Ok(0)` only at end-of-stream; would-block and
//! interrupted conditions are retried internally and never surface.
//! `write` may accept fewer bytes than offered; `write_sync` retries a
//! short write a bounded number of times (with yields, never a busy
//! spin) and then reports `WouldBlock` to the caller.
//!
//! SSH decouples socket readability from plaintext availability, so the
//! trait exposes [`Transport::maybe_readable`] and the session forces a
//! poll at least every 250 ms while an SSH transport is active. Serial
//! carrier drop surfaces through [`Transport::carrier_lost`] and is a
//! first-class disconnect for the dispatcher.

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
    clippy::missing_errors_doc
)]

mod process;
mod rlogin;
mod serial;
mod ssh;
mod tcp;
mod telnet;

pub use self::process::ProcessTransport;
pub use self::rlogin::RloginTransport;
pub use self::serial::SerialTransport;
pub use self::ssh::{SshOptions, SshTransport};
pub use self::tcp::TcpTransport;
pub use self::telnet::TelnetTransport;

use async_trait::async_trait;
use std::io;

/// How many short-write retries `write_sync` attempts before surfacing
/// would-block.
pub const SYNC_WRITE_RETRIES: usize = 3;

/// The connection kinds.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TransportKind {
    /// Plain TCP, byte pass-through.
    Socket,
    /// Telnet with option negotiation.
    Telnet,
    /// BSD rlogin.
    Rlogin,
    /// SSH through the system client.
    Ssh,
    /// Local shell process.
    Shell,
    /// Serial device.
    Serial,
}

impl TransportKind {
    /// Parses the `--connect-method` spelling.
    #[must_use]
    pub fn from_name(name: &str) -> Option<TransportKind> {
        match name {
            "socket" => Some(TransportKind::Socket),
            "telnet" => Some(TransportKind::Telnet),
            "rlogin" => Some(TransportKind::Rlogin),
            "ssh" => Some(TransportKind::Ssh),
            "shell" => Some(TransportKind::Shell),
            "serial" => Some(TransportKind::Serial),
            _ => None,
        }
    }

    /// The canonical name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            TransportKind::Socket => "socket",
            TransportKind::Telnet => "telnet",
            TransportKind::Rlogin => "rlogin",
            TransportKind::Ssh => "ssh",
            TransportKind::Shell => "shell",
            TransportKind::Serial => "serial",
        }
    }
}

/// Errors from establishing a connection. Established-stream failures
/// travel as `io::Error` through the read/write paths and collapse to
/// EOF at the session layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// DNS or address parsing failed.
    #[error("cannot resolve {host}: {source}")]
    Resolve {
        /// The host as given.
        host: String,
        /// Underlying error.
        source: io::Error,
    },
    /// The connect itself failed.
    #[error("connect to {target} failed: {source}")]
    Connect {
        /// host:port or device path.
        target: String,
        /// Underlying error.
        source: io::Error,
    },
    /// Spawning a child process failed.
    #[error("cannot spawn {command}: {source}")]
    Spawn {
        /// The command line.
        command: String,
        /// Underlying error.
        source: io::Error,
    },
    /// The rlogin handshake was refused.
    #[error("rlogin handshake refused: {reason}")]
    Handshake {
        /// Server's stated reason, if any.
        reason: String,
    },
}

///
/// The uniform byte pipe the dispatcher drives.
///
/// All implementations are owned by a single task; the methods take
/// `&mut self` and are never called concurrently.
///
#[async_trait]
pub trait Transport: Send {
    /// Which kind of connection this is.
    fn kind(&self) -> TransportKind;

    /// Reads into `buf`. `Ok(0)` means the peer closed.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes, possibly short.
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Writes everything or reports would-block after
    /// [`SYNC_WRITE_RETRIES`] yielding retries.
    async fn write_sync(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut remaining = buf;
        let mut stalls = 0usize;
        while !remaining.is_empty() {
            let accepted = self.write(remaining).await?;
            if accepted == 0 {
                stalls += 1;
                if stalls >= SYNC_WRITE_RETRIES {
                    return Err(io::Error::new(
                        io::ErrorKind::WouldBlock,
                        "sync write made no progress",
                    ));
                }
                tokio::task::yield_now().await;
                continue;
            }
            stalls = 0;
            remaining = &remaining[accepted..];
        }
        self.flush().await
    }

    /// Flushes buffered output.
    async fn flush(&mut self) -> io::Result<()>;

    /// Graceful close.
    async fn shutdown(&mut self) -> io::Result<()>;

    /// True until EOF or a hard failure was observed.
    fn is_connected(&self) -> bool;

    /// True when plaintext may be buffered even though the socket shows
    /// idle (SSH). The dispatcher re-polls such transports every 250 ms.
    fn maybe_readable(&self) -> bool {
        false
    }

    /// Serial carrier-detect drop.
    fn carrier_lost(&self) -> bool {
        false
    }

    /// Exit status of a process-backed transport, once known.
    fn exit_status(&mut self) -> Option<i32> {
        None
    }

    /// Window-size change notification (telnet NAWS).
    fn resize(&mut self, _columns: u16, _rows: u16) {}
}
