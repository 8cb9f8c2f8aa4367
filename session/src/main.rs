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

//! The `qodem` binary: a headless front end over the session core. The
//! full-screen phonebook shell is a separate layer; this entry point
//! dials one target, bridges stdin/stdout to the session, and honors the
//! capture, autostart, keepalive, and exit-code behaviors.

use clap::Parser;
use qodem_codepage::Codepage;
use qodem_emulation::Emulation;
use qodem_session::cli::{CliArgs, default_port, exit_code, parse_geometry};
use qodem_session::config::QodemConfig;
use qodem_session::{
    ConnectTarget, Dispatcher, DoorwayMode, SessionCommand, SessionEvent, connect_transport,
};
use qodem_transport::TransportKind;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(error) => {
            use clap::error::ErrorKind;
            let code = match error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit_code::HELP,
                _ => exit_code::COMMAND_LINE,
            };
            let _ = error.print();
            return ExitCode::from(u8::try_from(code).unwrap_or(2));
        }
    };
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    if let Some(path) = args.create_config.as_ref() {
        return match QodemConfig::write_default(path) {
            Ok(()) => {
                info!("wrote default options to {}", path.display());
                ExitCode::from(u8::try_from(exit_code::OK).unwrap_or(0))
            }
            Err(error) => {
                error!("cannot write {}: {error}", path.display());
                ExitCode::from(u8::try_from(exit_code::COMMAND_LINE).unwrap_or(2))
            }
        };
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            error!("cannot start the event loop: {error}");
            return ExitCode::from(u8::try_from(exit_code::SELECT_FAILED).unwrap_or(3));
        }
    };
    let code = runtime.block_on(run(args));
    ExitCode::from(u8::try_from(code.clamp(0, 255)).unwrap_or(0))
}

async fn run(args: CliArgs) -> i32 {
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| default_config_path());
    let mut config = QodemConfig::load(&config_path);
    if args.exit_on_completion {
        config.exit_on_disconnect = true;
    }

    let Some(host) = args.connect.clone() else {
        // Without a target there is nothing for the headless front end
        // to do; the phonebook lives in the full-screen shell.
        warn!("no --connect target given");
        return exit_code::OK;
    };
    if args.dial.is_some() {
        warn!("--dial needs the phonebook shell; using --connect instead");
    }

    let Some(method) = TransportKind::from_name(&args.connect_method) else {
        error!("unknown connect method {:?}", args.connect_method);
        return exit_code::COMMAND_LINE;
    };
    let emulation = match Emulation::from_name(&args.emulation) {
        Some(emulation) => emulation,
        None => {
            error!("unknown emulation {:?}", args.emulation);
            return exit_code::COMMAND_LINE;
        }
    };
    let (columns, rows) = args
        .geometry
        .as_deref()
        .and_then(parse_geometry)
        .unwrap_or((80, 25));
    let columns = if config.assume_80_columns { 80 } else { columns };

    let lang = if emulation.is_utf8() {
        config.utf8_lang.clone()
    } else {
        config.iso8859_lang.clone()
    };
    let target = ConnectTarget {
        method,
        host,
        port: args.port.unwrap_or_else(|| default_port(&args.connect_method)),
        username: args.username.clone(),
        terminal: emulation.name().to_string(),
        lang,
        columns: columns as u16,
        rows: rows as u16,
        // 8-bit-clean both ways; file transfers depend on it.
        binary: true,
        dial_timeout: Duration::from_secs(config.dial_timeout_secs),
    };

    let transport = match connect_transport(&target).await {
        Ok(transport) => transport,
        Err(error) => {
            error!("connect failed: {error}");
            return if method == TransportKind::Serial {
                exit_code::SERIAL_FAILED
            } else {
                exit_code::OK
            };
        }
    };

    let download_dir = args
        .download_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir());
    let (mut dispatcher, handle, mut events) = Dispatcher::new(
        transport,
        config.clone(),
        emulation,
        columns,
        rows,
        download_dir,
    );
    if let Some(doorway) = DoorwayMode::from_name(&args.doorway) {
        dispatcher.set_doorway(doorway);
    }
    if let Some(codepage) = args.codepage.as_deref() {
        match Codepage::from_name(codepage) {
            Some(page) => dispatcher.set_codepage(page),
            None => warn!("unknown codepage {codepage:?}"),
        }
    }
    if let Some(path) = args.capfile.clone() {
        let format = config.capture_type;
        let handle = handle.clone();
        tokio::spawn(async move {
            handle
                .send(SessionCommand::BeginCapture(path, format))
                .await;
        });
    }
    if args.play.is_some() {
        // Music synthesis lives in the UI layer's sink.
        warn!("--play has no audio sink in the headless front end");
        if args.play_exit {
            return exit_code::OK;
        }
    }

    let session = tokio::spawn(dispatcher.run());

    // stdin → session as raw bytes (doorway-style passthrough).
    let stdin_handle = handle.clone();
    std::thread::spawn(move || {
        let mut stdin = std::io::stdin().lock();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(count) => {
                    let bytes = buf[..count].to_vec();
                    if !stdin_handle.blocking_send(SessionCommand::RawBytes(bytes)) {
                        break;
                    }
                }
            }
        }
    });

    // Session events → stdout / log.
    let mut stdout = std::io::stdout();
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Output(bytes) => {
                if stdout.write_all(&bytes).is_err() {
                    break;
                }
                let _ = stdout.flush();
            }
            SessionEvent::Beep => {
                let _ = stdout.write_all(b"\x07");
            }
            SessionEvent::SetTitle(title) => {
                info!("remote set title: {title}");
            }
            SessionEvent::Music(payload) => {
                info!("ANSI music sequence of {} notes dropped (no sink)", payload.len());
            }
            SessionEvent::Connected => {}
            SessionEvent::TransferStarted { protocol, direction } => {
                info!("{protocol} transfer started ({direction:?})");
            }
            SessionEvent::TransferEnded { status, progress } => {
                info!(
                    "{} ended: {:?}, {} bytes",
                    progress.file_name, status, progress.offset
                );
            }
            SessionEvent::Disconnected { online, exit_code: peer } => {
                let secs = online.as_secs();
                info!(
                    "CONNECTION CLOSED. Total time online: {:02}:{:02}:{:02}",
                    secs / 3600,
                    (secs / 60) % 60,
                    secs % 60
                );
                if config.exit_on_disconnect {
                    return peer.unwrap_or(exit_code::OK);
                }
            }
        }
    }
    match session.await {
        Ok(code) => code.unwrap_or(exit_code::OK),
        Err(error) => {
            error!("session task failed: {error}");
            exit_code::SELECT_FAILED
        }
    }
}

fn default_config_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".qodem")
        .join("qodemrc")
}
