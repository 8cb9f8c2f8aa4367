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

//! # Qodem Session Core
//!
//! The single-owner event loop binding the transports, the terminal
//! emulator, and the transfer engines into one session, plus the
//! configuration and command-line surfaces.
//!
//! The shape: a [`Dispatcher`] owns a [`SessionContext`] (transport
//! handle, both raw byte rings, the emulator with its scrollback, the
//! timers, and any running transfer engine) and cycles on a 20 ms tick.
//! The UI talks through a [`SessionHandle`] command channel (commands
//! are strictly serialized) and observes [`SessionEvent`]s. Connection
//! lifecycle is `OFFLINE → DIALING → CONNECTED → {console, transfer,
//! script, host, hangup} → OFFLINE`, with the dialing phase living in
//! [`connect_transport`] and everything after living in the loop.

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

pub mod capture;
pub mod cli;
pub mod config;
mod context;
mod dispatcher;
mod error;

pub use self::context::{
    DoorwayMode, SessionCommand, SessionContext, SessionEvent, SessionHandle, SessionMode,
    SessionStats, TransferProtocol, TransferSpec,
};
pub use self::dispatcher::{Dispatcher, SSH_FORCE_POLL, TICK};
pub use self::error::{SessionError, SessionResult};

use qodem_codepage::ParityMode;
use qodem_telnetcodec::TelnetMachineConfig;
use qodem_transport::{
    ProcessTransport, RloginTransport, SerialTransport, SshOptions, SshTransport, TcpTransport,
    TelnetTransport, Transport, TransportKind,
};
use std::time::Duration;
use tracing::info;

/// Connection request assembled from the CLI / phonebook.
#[derive(Clone, Debug)]
pub struct ConnectTarget {
    /// Transport kind.
    pub method: TransportKind,
    /// Host, device path, or ignored for local shells.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Login name where the method uses one.
    pub username: String,
    /// Terminal name reported to the remote.
    pub terminal: String,
    /// LANG reported over telnet NEW-ENVIRON.
    pub lang: String,
    /// Window columns.
    pub columns: u16,
    /// Window rows.
    pub rows: u16,
    /// Ask for 8-bit-clean telnet (BINARY both ways).
    pub binary: bool,
    /// Give up dialing after this long.
    pub dial_timeout: Duration,
}

/// Dials a target: the `OFFLINE → DIALING → CONNECTED` leg.
pub async fn connect_transport(target: &ConnectTarget) -> SessionResult<Box<dyn Transport>> {
    info!("dialing {} via {}", target.host, target.method.name());
    let dial = async {
        let transport: Box<dyn Transport> = match target.method {
            TransportKind::Socket => {
                Box::new(TcpTransport::connect(&target.host, target.port).await?)
            }
            TransportKind::Telnet => Box::new(
                TelnetTransport::connect(
                    &target.host,
                    target.port,
                    TelnetMachineConfig {
                        terminal_name: target.terminal.clone(),
                        lang: target.lang.clone(),
                        speed: String::from("38400,38400"),
                        columns: target.columns,
                        rows: target.rows,
                        request_binary: target.binary,
                    },
                )
                .await?,
            ),
            TransportKind::Rlogin => Box::new(
                RloginTransport::connect(
                    &target.host,
                    target.port,
                    &target.username,
                    &target.terminal,
                    target.columns,
                    target.rows,
                )
                .await?,
            ),
            TransportKind::Ssh => Box::new(SshTransport::connect(&SshOptions {
                host: target.host.clone(),
                port: target.port,
                username: target.username.clone(),
                terminal: target.terminal.to_lowercase(),
            })?),
            TransportKind::Shell => Box::new(ProcessTransport::spawn_shell()?),
            TransportKind::Serial => {
                Box::new(SerialTransport::open(&target.host, ParityMode::None).await?)
            }
        };
        Ok::<_, SessionError>(transport)
    };
    match tokio::time::timeout(target.dial_timeout, dial).await {
        Ok(result) => result,
        Err(_) => Err(SessionError::BadOption {
            key: String::from("dial-timeout-secs"),
            reason: format!("no answer from {} within the dial timeout", target.host),
        }),
    }
}
