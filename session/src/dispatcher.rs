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

//! The session event loop.
//!
//! One task owns all mutable state and cycles at a 20 ms tick: wait for
//! {transport readable, a UI command, the tick}; route whatever arrived
//! through exactly one of the emulator, the transfer engine, or the
//! script co-process; apply the output translate table behind a
//! watermark so no byte is translated twice; drain the outbound ring;
//! then run the wall-clock work (idle and keepalive timers, capture
//! flush, carrier drop, defunct children, the hangup flag).
//!
//! Ordering guarantees: within one iteration every byte read is consumed
//! in FIFO order, bytes produced are appended in production order, and
//! the watermark ensures nothing reaches the wire twice.

use crate::capture::{CaptureFile, scrollback_save, screen_dump};
use crate::config::{CaptureType, QodemConfig};
use crate::context::{
    DoorwayMode, SessionCommand, SessionContext, SessionEvent, SessionHandle, SessionMode,
    SessionStats, TransferProtocol, TransferSpec,
};
use bytes::{Buf, BytesMut};
use qodem_codepage::TranslateTable;
use qodem_emulation::keyboard::{self, Key, KeyModifiers};
use qodem_emulation::{Emulation, Emulator, EmulatorConfig, EmulatorEffect};
use qodem_transfer::{
    AsciiReceiver, AsciiSender, DirectoryStore, KermitConfig, KermitReceiver, KermitSender,
    LinePolicy, TransferDirection, TransferEngine, TransferStatus, XmodemReceiver, XmodemSender,
    ZmodemConfig, ZmodemReceiver, ZmodemSender, kermit_autostart, zmodem_autostart,
};
use qodem_transport::{Transport, TransportKind};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Selector timeout per loop pass.
pub const TICK: Duration = Duration::from_millis(20);
/// SSH transports get an engine tick at least this often.
pub const SSH_FORCE_POLL: Duration = Duration::from_millis(250);
/// Reads stop while this much input is still unrouted.
const IN_RAW_LIMIT: usize = 64 * 1024;
/// Largest single write per iteration.
const OUT_CHUNK: usize = 8 * 1024;
/// Autostart signature window.
const AUTOSTART_WINDOW: usize = 64;

/// What a loop pass observed.
enum Wakeup {
    Command(Option<SessionCommand>),
    Read(std::io::Result<usize>, usize),
    ScriptRead(std::io::Result<usize>, usize),
    Tick,
}

/// Per-mode read/write permission.
#[derive(Clone, Copy, Debug)]
struct Gate {
    may_read: bool,
    may_write: bool,
}

fn gate(mode: SessionMode, ui_modal: bool) -> Gate {
    let base = match mode {
        SessionMode::Console | SessionMode::Transfer | SessionMode::Script | SessionMode::Host => {
            Gate {
                may_read: true,
                may_write: true,
            }
        }
        SessionMode::Dialing => Gate {
            may_read: false,
            may_write: true,
        },
        SessionMode::Offline | SessionMode::Hangup => Gate {
            may_read: false,
            may_write: false,
        },
    };
    // Menus and dialogs park the transport so key chording cannot race
    // incoming bytes.
    Gate {
        may_read: base.may_read && !ui_modal,
        may_write: base.may_write,
    }
}

///
/// The event loop owner. Construct with [`Dispatcher::new`], spawn
/// [`Dispatcher::run`], drive it through the returned [`SessionHandle`],
/// and watch the event receiver.
///
pub struct Dispatcher {
    ctx: SessionContext,
    config: QodemConfig,
    commands: mpsc::Receiver<SessionCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
    autostart_window: Vec<u8>,
    keepalive_payload: Vec<u8>,
    idle_timeout: Duration,
    keepalive_timeout: Duration,
    last_engine_tick: Instant,
    exit_code: Option<i32>,
}

impl Dispatcher {
    /// Builds a dispatcher around a connected transport.
    pub fn new(
        transport: Box<dyn Transport>,
        config: QodemConfig,
        emulation: Emulation,
        columns: usize,
        rows: usize,
        download_dir: PathBuf,
    ) -> (
        Dispatcher,
        SessionHandle,
        mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let keepalive_payload = config.keepalive_payload().unwrap_or_else(|reason| {
            warn!("keepalive-bytes rejected ({reason}), keepalive disabled");
            Vec::new()
        });
        let answerback = crate::config::parse_hex_escapes(&config.enq_answerback)
            .unwrap_or_else(|reason| {
                warn!("enq-answerback rejected ({reason})");
                Vec::new()
            });
        let emulator = Emulator::with_config(
            emulation,
            columns,
            rows,
            config.scrollback_max_lines,
            EmulatorConfig {
                answerback,
                ansi_music: config.ansi_music,
            },
        );
        let now = Instant::now();
        let dispatcher = Dispatcher {
            ctx: SessionContext {
                mode: SessionMode::Console,
                transport: Some(transport),
                in_raw: BytesMut::new(),
                out_raw: BytesMut::new(),
                out_watermark: 0,
                emulator,
                stats: SessionStats::default(),
                connected_at: Some(now),
                input_table: TranslateTable::identity(),
                output_table: TranslateTable::identity(),
                last_rx: now,
                last_tx: now,
                capture: None,
                engine: None,
                script: None,
                hangup: false,
                ui_modal: false,
                read_only: false,
                split_screen: false,
                doorway: DoorwayMode::Off,
                download_dir,
            },
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            keepalive_timeout: Duration::from_secs(config.keepalive_timeout_secs),
            keepalive_payload,
            config,
            commands: command_rx,
            events: event_tx,
            autostart_window: Vec::with_capacity(AUTOSTART_WINDOW),
            last_engine_tick: now,
            exit_code: None,
        };
        let handle = SessionHandle {
            commands: command_tx,
        };
        (dispatcher, handle, event_rx)
    }

    /// Replaces the 8-bit translate tables.
    pub fn set_translate_tables(&mut self, input: TranslateTable, output: TranslateTable) {
        self.ctx.input_table = input;
        self.ctx.output_table = output;
    }

    /// Overrides the emulator's codepage (`--codepage`).
    pub fn set_codepage(&mut self, codepage: qodem_codepage::Codepage) {
        self.ctx.emulator.set_codepage(codepage);
    }

    /// Marks the session read-only (keystrokes discarded).
    pub fn set_read_only(&mut self, read_only: bool) {
        self.ctx.read_only = read_only;
    }

    /// Sets the doorway keystroke policy.
    pub fn set_doorway(&mut self, doorway: DoorwayMode) {
        self.ctx.doorway = doorway;
    }

    /// Toggles the split-screen flag; rendering is the UI's business.
    pub fn set_split_screen(&mut self, split: bool) {
        self.ctx.split_screen = split;
    }

    /// Attaches the script co-process pipe.
    pub fn set_script_pipe(&mut self, pipe: Box<dyn Transport>) {
        self.ctx.script = Some(pipe);
    }

    fn emit(&self, event: SessionEvent) {
        // A departed UI is not an error.
        let _ = self.events.send(event);
    }

    /// Runs the loop to completion. Returns the exit code to use when
    /// `exit-on-disconnect` terminates the process.
    pub async fn run(mut self) -> Option<i32> {
        self.emit(SessionEvent::Connected);
        info!("session online ({})", self.transport_kind_name());
        loop {
            let wakeup = self.wait_for_wakeup().await;
            match wakeup {
                Wakeup::Command(None) => {
                    // UI went away; shut the session down.
                    self.close_connection("ui closed").await;
                    return self.exit_code;
                }
                Wakeup::Command(Some(command)) => {
                    self.handle_command(command);
                }
                Wakeup::Read(Ok(0), _) => {
                    self.close_connection("peer closed").await;
                    if self.config.exit_on_disconnect {
                        return self.exit_code;
                    }
                }
                Wakeup::Read(Ok(_), buffered) => {
                    self.ctx.stats.bytes_received += buffered as u64;
                    self.ctx.last_rx = Instant::now();
                }
                Wakeup::Read(Err(error), _) => {
                    // Hard failure is EOF to the session layer.
                    warn!("transport read failed: {error}");
                    self.close_connection("read error").await;
                    if self.config.exit_on_disconnect {
                        return self.exit_code;
                    }
                }
                Wakeup::ScriptRead(Ok(0), _) | Wakeup::ScriptRead(Err(_), _) => {
                    debug!("script co-process closed its pipe");
                    self.ctx.script = None;
                    self.ctx.mode = SessionMode::Console;
                }
                Wakeup::ScriptRead(Ok(_), _) => {
                    // Script output was queued outbound in the wakeup.
                }
                Wakeup::Tick => {}
            }
            self.route_input().await;
            self.translate_outbound();
            self.drain_outbound().await;
            self.timers().await;
            if self.ctx.mode == SessionMode::Offline && self.config.exit_on_disconnect {
                return self.exit_code;
            }
        }
    }

    fn transport_kind_name(&self) -> &'static str {
        self.ctx
            .transport
            .as_ref()
            .map_or("closed", |transport| transport.kind().name())
    }

    async fn wait_for_wakeup(&mut self) -> Wakeup {
        let gate = gate(self.ctx.mode, self.ctx.ui_modal);
        let readable = gate.may_read
            && self.ctx.transport.is_some()
            && self.ctx.in_raw.len() < IN_RAW_LIMIT;
        let script_readable = self.ctx.mode == SessionMode::Script && self.ctx.script.is_some();
        let mut chunk = [0u8; 4096];
        let mut script_chunk = [0u8; 1024];

        let transport = &mut self.ctx.transport;
        let script = &mut self.ctx.script;
        let commands = &mut self.commands;
        let in_raw = &mut self.ctx.in_raw;
        let out_raw = &mut self.ctx.out_raw;

        tokio::select! {
            command = commands.recv() => Wakeup::Command(command),
            result = async {
                transport
                    .as_mut()
                    .expect("readable implies transport")
                    .read(&mut chunk)
                    .await
            }, if readable => {
                match result {
                    Ok(count) if count > 0 => {
                        in_raw.extend_from_slice(&chunk[..count]);
                        Wakeup::Read(Ok(count), count)
                    }
                    other => Wakeup::Read(other, 0),
                }
            }
            result = async {
                script
                    .as_mut()
                    .expect("script_readable implies pipe")
                    .read(&mut script_chunk)
                    .await
            }, if script_readable => {
                match result {
                    Ok(count) if count > 0 => {
                        // Script output rides the outbound ring to the
                        // remote, through the output translate table.
                        out_raw.extend_from_slice(&script_chunk[..count]);
                        Wakeup::ScriptRead(Ok(count), count)
                    }
                    other => Wakeup::ScriptRead(other, 0),
                }
            }
            () = tokio::time::sleep(TICK) => Wakeup::Tick,
        }
    }

    // ===== Routing =====

    async fn route_input(&mut self) {
        if self.ctx.in_raw.is_empty() {
            return;
        }
        match self.ctx.mode {
            SessionMode::Console => self.route_console(),
            SessionMode::Transfer => {
                let bytes = self.ctx.in_raw.split().to_vec();
                self.pump_engine(&bytes);
            }
            SessionMode::Script => {
                // Remote bytes feed the script's stdin; its output was
                // picked up in the wakeup and queued outbound there.
                let bytes = self.ctx.in_raw.split().to_vec();
                if let Some(script) = self.ctx.script.as_mut() {
                    if script.write_sync(&bytes).await.is_err() {
                        warn!("script pipe write failed");
                        self.ctx.script = None;
                        self.ctx.mode = SessionMode::Console;
                    }
                }
            }
            SessionMode::Host => {
                // Host-mode BBS logic is an external collaborator;
                // without one attached the bytes are discarded.
                let dropped = self.ctx.in_raw.split();
                debug!("host mode dropped {} bytes", dropped.len());
            }
            _ => {
                self.ctx.in_raw.clear();
            }
        }
    }

    fn route_console(&mut self) {
        let raw = self.ctx.in_raw.split().to_vec();
        // Raw capture sees the bytes exactly as read.
        if let Some(capture) = self.ctx.capture.as_mut() {
            if capture.format() == CaptureType::Raw {
                if let Err(error) = capture.record(&raw) {
                    warn!("capture write failed: {error}");
                    self.ctx.capture = None;
                }
            }
        }
        let mut bytes = raw;
        self.ctx.input_table.apply_in_place(&mut bytes);

        // Autostart detection runs over a small rolling window so a
        // signature split across reads still matches.
        self.autostart_window.extend_from_slice(&bytes);
        if self.autostart_window.len() > AUTOSTART_WINDOW {
            let excess = self.autostart_window.len() - AUTOSTART_WINDOW;
            self.autostart_window.drain(..excess);
        }
        if self.config.zmodem_autostart && zmodem_autostart(&self.autostart_window) {
            info!("ZMODEM autostart signature seen, switching to receive");
            self.autostart_window.clear();
            self.begin_download_engine(TransferProtocol::Zmodem);
            self.pump_engine(&bytes);
            return;
        }
        if self.config.kermit_autostart && kermit_autostart(&self.autostart_window) {
            info!("Kermit autostart signature seen, switching to receive");
            self.autostart_window.clear();
            self.begin_download_engine(TransferProtocol::Kermit);
            self.pump_engine(&bytes);
            return;
        }

        if let Some(capture) = self.ctx.capture.as_mut() {
            if capture.format() != CaptureType::Raw {
                if let Err(error) = capture.record(&bytes) {
                    warn!("capture write failed: {error}");
                    self.ctx.capture = None;
                }
            }
        }
        self.ctx.emulator.consume(&bytes);
        for effect in self.ctx.emulator.drain_effects() {
            match effect {
                EmulatorEffect::Beep => self.emit(SessionEvent::Beep),
                EmulatorEffect::SetTitle(title) => self.emit(SessionEvent::SetTitle(title)),
                EmulatorEffect::Music(payload) => self.emit(SessionEvent::Music(payload)),
                EmulatorEffect::Response(reply) => {
                    // Query answers must reach the wire this iteration;
                    // they ride the normal outbound path.
                    self.ctx.queue_outbound(&reply);
                }
            }
        }
        self.emit(SessionEvent::Output(bytes));
    }

    fn pump_engine(&mut self, bytes: &[u8]) {
        let Some(engine) = self.ctx.engine.as_mut() else {
            return;
        };
        let (_, mut status) = engine.pump(bytes);
        // Keep pumping until the outbound buffer stops growing, bounded
        // by a high-water mark; the engine tick resumes a long stream on
        // the next pass.
        loop {
            let outbound = engine.take_outbound();
            if outbound.is_empty() {
                break;
            }
            self.ctx.out_raw.extend_from_slice(&outbound);
            if self.ctx.out_raw.len() > 4 * OUT_CHUNK {
                break;
            }
            let (_, next) = engine.pump(&[]);
            status = next;
        }
        if status.is_terminal() {
            self.finish_transfer(status);
        }
    }

    fn finish_transfer(&mut self, status: TransferStatus) {
        if let Some(engine) = self.ctx.engine.take() {
            let progress = engine.progress();
            info!(
                "transfer ended: {:?} at {} bytes, {} errors",
                status, progress.offset, progress.errors
            );
            self.emit(SessionEvent::TransferEnded { status, progress });
        }
        if self.ctx.mode == SessionMode::Transfer {
            self.ctx.mode = SessionMode::Console;
        }
    }

    fn begin_download_engine(&mut self, protocol: TransferProtocol) {
        let store = DirectoryStore::new(self.ctx.download_dir.clone());
        let engine: Box<dyn TransferEngine + Send> = match protocol {
            TransferProtocol::Zmodem => Box::new(ZmodemReceiver::new(
                store,
                ZmodemConfig {
                    escape_control: self.config.zmodem_escape_ctrl,
                    zchallenge: self.config.zmodem_zchallenge,
                },
            )),
            TransferProtocol::Kermit => {
                Box::new(KermitReceiver::new(store, self.kermit_config()))
            }
            TransferProtocol::Xmodem(variant) => {
                Box::new(XmodemReceiver::new(variant, store, "NONAME.DAT"))
            }
            TransferProtocol::Ascii => Box::new(AsciiReceiver::new(
                store,
                "ascii-download.txt",
                self.line_policy(&self.config.ascii_download_cr_policy.clone()),
                self.line_policy(&self.config.ascii_download_lf_policy.clone()),
            )),
        };
        self.ctx.engine = Some(engine);
        self.ctx.mode = SessionMode::Transfer;
        self.emit(SessionEvent::TransferStarted {
            protocol: protocol.name(),
            direction: TransferDirection::Receive,
        });
    }

    fn kermit_config(&self) -> KermitConfig {
        KermitConfig {
            robust_filename: self.config.kermit_robust_filename,
            streaming: self.config.kermit_streaming,
            long_packets: self.config.kermit_long_packets,
            uploads_force_binary: self.config.kermit_uploads_force_binary,
            downloads_convert_text: self.config.kermit_downloads_convert_text,
            resend: self.config.kermit_resend,
        }
    }

    fn line_policy(&self, name: &str) -> LinePolicy {
        LinePolicy::from_name(name).unwrap_or_else(|| {
            warn!("unknown line policy {name:?}, using none");
            LinePolicy::None
        })
    }

    // ===== Outbound =====

    /// Applies the output translate table to bytes that have not been
    /// through it, tracked by the watermark.
    fn translate_outbound(&mut self) {
        if self.ctx.out_watermark < self.ctx.out_raw.len() {
            let fresh = &mut self.ctx.out_raw[self.ctx.out_watermark..];
            if !self.ctx.output_table.is_identity() {
                self.ctx.output_table.apply_in_place(fresh);
            }
            self.ctx.out_watermark = self.ctx.out_raw.len();
        }
    }

    async fn drain_outbound(&mut self) {
        let gate = gate(self.ctx.mode, self.ctx.ui_modal);
        if !gate.may_write || self.ctx.out_raw.is_empty() {
            return;
        }
        let Some(transport) = self.ctx.transport.as_mut() else {
            return;
        };
        let chunk = self.ctx.out_raw.len().min(OUT_CHUNK);
        match transport.write(&self.ctx.out_raw[..chunk]).await {
            Ok(0) => {}
            Ok(accepted) => {
                self.ctx.out_raw.advance(accepted);
                self.ctx.out_watermark -= accepted;
                self.ctx.stats.bytes_sent += accepted as u64;
                self.ctx.last_tx = Instant::now();
            }
            Err(error) => {
                warn!("transport write failed: {error}");
                self.close_connection("write error").await;
            }
        }
    }

    // ===== Timers =====

    async fn timers(&mut self) {
        let now = Instant::now();

        // Capture flush after five dirty seconds.
        if let Some(capture) = self.ctx.capture.as_mut() {
            if let Err(error) = capture.flush_if_stale() {
                warn!("capture flush failed: {error}");
                self.ctx.capture = None;
            }
        }

        // Transfer engine clock, forced at least every 250 ms for SSH
        // transports whose plaintext can sit buffered behind an idle
        // socket.
        let engine_due = now.duration_since(self.last_engine_tick);
        let ssh_active = self
            .ctx
            .transport
            .as_ref()
            .is_some_and(|transport| transport.kind() == TransportKind::Ssh && transport.maybe_readable());
        if self.ctx.engine.is_some()
            && (engine_due >= TICK || (ssh_active && engine_due >= SSH_FORCE_POLL))
        {
            self.last_engine_tick = now;
            if let Some(engine) = self.ctx.engine.as_mut() {
                let status = engine.tick(engine_due);
                if status.is_terminal() {
                    self.finish_transfer(status);
                } else {
                    // A retry may have queued bytes.
                    self.pump_engine(&[]);
                }
            }
        }

        if self.ctx.transport.is_some() {
            // Idle timeout requires silence in both directions.
            if self.idle_timeout > Duration::ZERO
                && now.duration_since(self.ctx.last_rx) >= self.idle_timeout
                && now.duration_since(self.ctx.last_tx) >= self.idle_timeout
            {
                info!("idle timeout reached");
                self.close_connection("idle timeout").await;
                return;
            }
            // Keepalive after silence in both directions.
            if self.keepalive_timeout > Duration::ZERO
                && !self.keepalive_payload.is_empty()
                && now.duration_since(self.ctx.last_tx) >= self.keepalive_timeout
                && now.duration_since(self.ctx.last_rx) >= self.keepalive_timeout
            {
                debug!("sending keepalive");
                let payload = self.keepalive_payload.clone();
                self.ctx.queue_outbound(&payload);
                self.ctx.last_tx = now;
            }
            // Serial carrier drop is a first-class disconnect.
            let carrier_lost = self
                .ctx
                .transport
                .as_ref()
                .is_some_and(|transport| transport.carrier_lost());
            if carrier_lost {
                info!("carrier lost");
                self.close_connection("carrier lost").await;
                return;
            }
            // A defunct child with a still-open pipe is closed here.
            let defunct = self
                .ctx
                .transport
                .as_mut()
                .and_then(|transport| transport.exit_status());
            if let Some(code) = defunct {
                self.exit_code = Some(code);
                self.close_connection("child exited").await;
                return;
            }
        }

        if self.ctx.hangup {
            self.ctx.hangup = false;
            self.close_connection("hangup").await;
        }
    }

    // ===== Commands =====

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Keystroke(key, modifiers) => self.keystroke(key, modifiers),
            SessionCommand::Paste(bytes) => {
                if !self.ctx.read_only {
                    let wrapped =
                        keyboard::wrap_paste(self.ctx.emulator.bracketed_paste(), &bytes);
                    self.ctx.queue_outbound(&wrapped);
                }
            }
            SessionCommand::RawBytes(bytes) => {
                if !self.ctx.read_only {
                    self.ctx.queue_outbound(&bytes);
                }
            }
            SessionCommand::Resize(columns, rows) => {
                let columns = if self.config.assume_80_columns {
                    80
                } else {
                    columns
                };
                self.ctx
                    .emulator
                    .screen_mut()
                    .resize(columns as usize, rows as usize);
                if let Some(transport) = self.ctx.transport.as_mut() {
                    transport.resize(columns, rows);
                }
            }
            SessionCommand::BeginCapture(path, format) => match CaptureFile::open(&path, format) {
                Ok(capture) => {
                    info!("capture started to {}", path.display());
                    self.ctx.capture = Some(capture);
                }
                Err(error) => warn!("cannot open capture {}: {error}", path.display()),
            },
            SessionCommand::EndCapture => {
                if let Some(capture) = self.ctx.capture.take() {
                    if let Err(error) = capture.close() {
                        warn!("capture close failed: {error}");
                    }
                }
            }
            SessionCommand::BeginTransfer(spec) => self.begin_transfer(spec),
            SessionCommand::AbortTransfer => {
                if let Some(engine) = self.ctx.engine.as_mut() {
                    engine.abort();
                    // The abort is observed on the next pump.
                    self.pump_engine(&[]);
                }
            }
            SessionCommand::ScreenDump(path, format) => {
                if let Err(error) = screen_dump(self.ctx.emulator.screen(), format, &path) {
                    warn!("screen dump failed: {error}");
                }
            }
            SessionCommand::SaveScrollback(path, format) => {
                if let Err(error) = scrollback_save(self.ctx.emulator.screen(), format, &path) {
                    warn!("scrollback save failed: {error}");
                }
            }
            SessionCommand::SetUiModal(modal) => {
                self.ctx.ui_modal = modal;
            }
            SessionCommand::Hangup => {
                self.ctx.hangup = true;
            }
        }
    }

    fn keystroke(&mut self, key: Key, modifiers: KeyModifiers) {
        if self.ctx.read_only {
            return;
        }
        // In doorway mode nearly everything reaches the remote; the UI
        // has already filtered the few local command keys for `mixed`.
        let application_cursor = self.ctx.emulator.screen().cursor_keys_application;
        let bytes = keyboard::encode_key(
            self.ctx.emulator.emulation(),
            key,
            modifiers,
            application_cursor,
        );
        self.ctx.queue_outbound(&bytes);
    }

    fn begin_transfer(&mut self, spec: TransferSpec) {
        if self.ctx.engine.is_some() {
            warn!("transfer already running");
            return;
        }
        match spec.direction {
            TransferDirection::Receive => self.begin_download_engine(spec.protocol),
            TransferDirection::Send => {
                let Some(path) = spec.files.first().cloned() else {
                    warn!("upload requested without files");
                    return;
                };
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| String::from("NONAME.DAT"));
                let file = match std::fs::File::open(&path) {
                    Ok(file) => file,
                    Err(error) => {
                        warn!("cannot open {}: {error}", path.display());
                        return;
                    }
                };
                let size = file.metadata().map(|meta| meta.len()).unwrap_or(0);
                let engine: Box<dyn TransferEngine + Send> = match spec.protocol {
                    TransferProtocol::Zmodem => Box::new(ZmodemSender::new(
                        file,
                        &name,
                        size,
                        ZmodemConfig {
                            escape_control: self.config.zmodem_escape_ctrl,
                            zchallenge: self.config.zmodem_zchallenge,
                        },
                    )),
                    TransferProtocol::Kermit => {
                        Box::new(KermitSender::new(file, &name, size, self.kermit_config()))
                    }
                    TransferProtocol::Xmodem(variant) => {
                        let mut batch = Vec::new();
                        batch.push((name, file, size));
                        for extra in spec.files.iter().skip(1) {
                            if let Ok(file) = std::fs::File::open(extra) {
                                let size = file.metadata().map(|meta| meta.len()).unwrap_or(0);
                                let name = extra
                                    .file_name()
                                    .map(|name| name.to_string_lossy().into_owned())
                                    .unwrap_or_else(|| String::from("NONAME.DAT"));
                                batch.push((name, file, size));
                            }
                        }
                        Box::new(XmodemSender::new_batch(variant, batch))
                    }
                    TransferProtocol::Ascii => Box::new(AsciiSender::new(
                        file,
                        &name,
                        self.line_policy(&self.config.ascii_upload_cr_policy.clone()),
                        self.line_policy(&self.config.ascii_upload_lf_policy.clone()),
                    )),
                };
                self.ctx.engine = Some(engine);
                self.ctx.mode = SessionMode::Transfer;
                self.emit(SessionEvent::TransferStarted {
                    protocol: spec.protocol.name(),
                    direction: TransferDirection::Send,
                });
                // Senders that open the conversation have bytes ready.
                self.pump_engine(&[]);
            }
        }
    }

    // ===== Close path =====

    async fn close_connection(&mut self, reason: &str) {
        if self.ctx.mode == SessionMode::Offline {
            return;
        }
        if let Some(engine) = self.ctx.engine.as_mut() {
            engine.abort();
            let (_, status) = engine.pump(&[]);
            let status = if status.is_terminal() {
                status
            } else {
                TransferStatus::Failed
            };
            self.finish_transfer(status);
        }
        if let Some(mut transport) = self.ctx.transport.take() {
            if self.exit_code.is_none() {
                self.exit_code = transport.exit_status();
            }
            let _ = transport.shutdown().await;
        }
        if let Some(capture) = self.ctx.capture.take() {
            let _ = capture.close();
        }
        let online = self
            .ctx
            .connected_at
            .map(|start| start.elapsed())
            .unwrap_or_default();
        let total = online.as_secs();
        info!(
            "CONNECTION CLOSED. Total time online: {:02}:{:02}:{:02}",
            total / 3600,
            (total / 60) % 60,
            total % 60
        );
        debug!("close reason: {reason}");
        self.ctx.mode = SessionMode::Offline;
        self.emit(SessionEvent::Disconnected {
            online,
            exit_code: self.exit_code,
        });
    }
}
