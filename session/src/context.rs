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

//! The session context and the command/event surface the UI talks to.

use crate::capture::CaptureFile;
use crate::config::CaptureType;
use bytes::BytesMut;
use qodem_codepage::TranslateTable;
use qodem_emulation::Emulator;
use qodem_emulation::keyboard::{Key, KeyModifiers};
use qodem_transfer::{TransferDirection, TransferEngine, TransferProgress, TransferStatus, XmodemVariant};
use qodem_transport::Transport;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// The session's top-level mode. Routing and the read/write gate key off
/// this; transitions are explicit and happen only inside the dispatcher.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionMode {
    /// No connection.
    Offline,
    /// Connect in progress.
    Dialing,
    /// Connected, bytes flow through the emulator.
    Console,
    /// Connected, bytes flow through a transfer engine.
    Transfer,
    /// Connected, bytes flow through the script co-process.
    Script,
    /// Connected, bytes flow to the host-mode shim.
    Host,
    /// Close requested, waiting for the loop to notice.
    Hangup,
}

impl SessionMode {
    /// Display name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            SessionMode::Offline => "offline",
            SessionMode::Dialing => "dialing",
            SessionMode::Console => "console",
            SessionMode::Transfer => "transfer",
            SessionMode::Script => "script",
            SessionMode::Host => "host",
            SessionMode::Hangup => "hangup",
        }
    }
}

/// Doorway keystroke policy.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DoorwayMode {
    /// Local command keys work normally.
    #[default]
    Off,
    /// Nearly everything passes to the remote.
    Doorway,
    /// A curated set of command keys stays local.
    Mixed,
}

impl DoorwayMode {
    /// Parses the `--doorway` spelling.
    #[must_use]
    pub fn from_name(name: &str) -> Option<DoorwayMode> {
        match name {
            "off" => Some(DoorwayMode::Off),
            "doorway" => Some(DoorwayMode::Doorway),
            "mixed" => Some(DoorwayMode::Mixed),
            _ => None,
        }
    }
}

/// Which protocol a transfer uses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransferProtocol {
    /// ZMODEM with crash recovery.
    Zmodem,
    /// Kermit.
    Kermit,
    /// XMODEM family / YMODEM batch.
    Xmodem(XmodemVariant),
    /// Raw ASCII with CR/LF policies.
    Ascii,
}

impl TransferProtocol {
    /// Display name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            TransferProtocol::Zmodem => "ZMODEM",
            TransferProtocol::Kermit => "Kermit",
            TransferProtocol::Xmodem(XmodemVariant::Ymodem) => "YMODEM",
            TransferProtocol::Xmodem(_) => "XMODEM",
            TransferProtocol::Ascii => "ASCII",
        }
    }
}

/// A transfer request from the UI.
#[derive(Clone, Debug)]
pub struct TransferSpec {
    /// Protocol to run.
    pub protocol: TransferProtocol,
    /// Upload or download.
    pub direction: TransferDirection,
    /// Files to send (uploads) or the suggested name (protocol-less
    /// downloads).
    pub files: Vec<PathBuf>,
}

/// Commands the UI sends. Each is serialized through one channel; no two
/// are ever in flight together.
#[derive(Debug)]
pub enum SessionCommand {
    /// A keystroke for the remote.
    Keystroke(Key, KeyModifiers),
    /// Pasted bytes for the remote (bracketed-paste aware).
    Paste(Vec<u8>),
    /// Raw bytes for the remote (doorway passthrough).
    RawBytes(Vec<u8>),
    /// The window changed size.
    Resize(u16, u16),
    /// Open a capture file.
    BeginCapture(PathBuf, CaptureType),
    /// Close the capture file.
    EndCapture,
    /// Start a file transfer.
    BeginTransfer(TransferSpec),
    /// Abort the running transfer.
    AbortTransfer,
    /// Dump the visible screen to a file.
    ScreenDump(PathBuf, CaptureType),
    /// Save scrollback plus screen to a file.
    SaveScrollback(PathBuf, CaptureType),
    /// A menu or dialog is up; stop reading the transport so key
    /// chording cannot race incoming bytes.
    SetUiModal(bool),
    /// Close the connection.
    Hangup,
}

/// Events the dispatcher emits toward the UI sink.
#[derive(Debug)]
pub enum SessionEvent {
    /// The connection is up and in console mode.
    Connected,
    /// Console bytes after the input translate table (the headless
    /// front end writes these to its own terminal).
    Output(Vec<u8>),
    /// BEL.
    Beep,
    /// Window title from the emulator.
    SetTitle(String),
    /// ANSI music payload for the music sink.
    Music(Vec<u8>),
    /// A transfer engine took over the byte stream.
    TransferStarted {
        /// Protocol name.
        protocol: &'static str,
        /// Direction.
        direction: TransferDirection,
    },
    /// The transfer engine finished or unwound.
    TransferEnded {
        /// Final status.
        status: TransferStatus,
        /// Final counters.
        progress: TransferProgress,
    },
    /// The session closed.
    Disconnected {
        /// Total time online.
        online: std::time::Duration,
        /// Peer exit code when the transport was process-backed.
        exit_code: Option<i32>,
    },
}

/// Byte counters and connection timing.
#[derive(Clone, Copy, Debug, Default)]
pub struct SessionStats {
    /// Bytes received from the transport.
    pub bytes_received: u64,
    /// Bytes written to the transport.
    pub bytes_sent: u64,
}

///
/// Everything the dispatcher owns: the transport handle, both raw byte
/// rings, the emulator (which owns the grid and scrollback), timers,
/// translate tables, capture, and the running transfer engine. Dropping
/// the context releases the transport first, then the buffers, then the
/// emulator with its scrollback.
///
pub struct SessionContext {
    /// Current mode.
    pub(crate) mode: SessionMode,
    /// The byte pipe; `None` once closed.
    pub(crate) transport: Option<Box<dyn Transport>>,
    /// Bytes read but not yet routed.
    pub(crate) in_raw: BytesMut,
    /// Bytes queued for the wire.
    pub(crate) out_raw: BytesMut,
    /// How much of `out_raw` has been through the output translate
    /// table already.
    pub(crate) out_watermark: usize,
    /// The terminal emulator.
    pub(crate) emulator: Emulator,
    /// Byte counters.
    pub(crate) stats: SessionStats,
    /// When the connection came up.
    pub(crate) connected_at: Option<Instant>,
    /// Input translate table (before the emulator).
    pub(crate) input_table: TranslateTable,
    /// Output translate table (exactly once per wire byte).
    pub(crate) output_table: TranslateTable,
    /// Last byte received.
    pub(crate) last_rx: Instant,
    /// Last byte sent.
    pub(crate) last_tx: Instant,
    /// Open capture file.
    pub(crate) capture: Option<CaptureFile>,
    /// Running transfer engine.
    pub(crate) engine: Option<Box<dyn TransferEngine + Send>>,
    /// Script co-process pipe, routed to in Script mode.
    pub(crate) script: Option<Box<dyn Transport>>,
    /// Hangup was requested; the loop notices on its next pass.
    pub(crate) hangup: bool,
    /// A menu/dialog has the keyboard.
    pub(crate) ui_modal: bool,
    /// Keystrokes are discarded.
    pub(crate) read_only: bool,
    /// Split-screen flag (state only; the UI renders it).
    pub(crate) split_screen: bool,
    /// Doorway policy.
    pub(crate) doorway: DoorwayMode,
    /// Where downloads land.
    pub(crate) download_dir: PathBuf,
}

impl SessionContext {
    /// Queues bytes for the wire; translation happens at the watermark.
    pub(crate) fn queue_outbound(&mut self, bytes: &[u8]) {
        self.out_raw.extend_from_slice(bytes);
    }
}

/// The UI's handle: a serialized command pipe into the dispatcher.
#[derive(Clone)]
pub struct SessionHandle {
    pub(crate) commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Sends a command; errors mean the session is gone.
    pub async fn send(&self, command: SessionCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Blocking send for plain threads (the stdin pump).
    pub fn blocking_send(&self, command: SessionCommand) -> bool {
        self.commands.blocking_send(command).is_ok()
    }

    /// Convenience for [`SessionCommand::Hangup`].
    pub async fn hangup(&self) -> bool {
        self.send(SessionCommand::Hangup).await
    }
}
