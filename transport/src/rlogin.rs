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

use crate::{Transport, TransportError, TransportKind};
use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Window-size request control byte the server may deliver.
const WINDOW_REQUEST: u8 = 0x80;
/// Flush-output control byte.
const DISCARD_OUTPUT: u8 = 0x02;
/// Raw-mode toggles; tracked but otherwise transparent here.
const RAW_ON: u8 = 0x10;
const RAW_OFF: u8 = 0x20;

///
/// BSD rlogin (RFC 1282). The connect handshake sends
/// `NUL client-user NUL server-user NUL terminal/speed NUL` and expects a
/// single NUL back. Server control bytes arrive on the urgent channel;
/// with the socket in OOB-inline mode they appear in the byte stream, so
/// they are honored where seen: a window-size request answers with the
/// twelve-byte `0xFF 0xFF s s` report.
///
pub struct RloginTransport {
    stream: TcpStream,
    connected: bool,
    columns: u16,
    rows: u16,
    raw_mode: bool,
}

impl RloginTransport {
    /// Connects and performs the handshake. Classic servers require a
    /// privileged local port; when binding one fails (unprivileged
    /// process) the connect falls back to an ordinary ephemeral port.
    pub async fn connect(
        host: &str,
        port: u16,
        username: &str,
        terminal: &str,
        columns: u16,
        rows: u16,
    ) -> Result<RloginTransport, TransportError> {
        let target = format!("{host}:{port}");
        let stream = connect_privileged(host, port)
            .await
            .map_err(|source| TransportError::Connect {
                target: target.clone(),
                source,
            })?;
        stream.set_nodelay(true).ok();
        let mut transport = RloginTransport {
            stream,
            connected: true,
            columns,
            rows,
            raw_mode: false,
        };
        transport
            .handshake(username, terminal)
            .await?;
        info!("rlogin connected to {target}");
        Ok(transport)
    }

    async fn handshake(&mut self, username: &str, terminal: &str) -> Result<(), TransportError> {
        let mut hello = Vec::with_capacity(username.len() * 2 + terminal.len() + 16);
        hello.push(0);
        hello.extend_from_slice(username.as_bytes());
        hello.push(0);
        hello.extend_from_slice(username.as_bytes());
        hello.push(0);
        hello.extend_from_slice(terminal.as_bytes());
        hello.extend_from_slice(b"/38400");
        hello.push(0);
        self.stream
            .write_all(&hello)
            .await
            .map_err(|source| TransportError::Connect {
                target: String::from("rlogin handshake"),
                source,
            })?;
        let mut ack = [0u8; 1];
        self.stream
            .read_exact(&mut ack)
            .await
            .map_err(|source| TransportError::Connect {
                target: String::from("rlogin handshake"),
                source,
            })?;
        if ack[0] != 0 {
            // The server sends an error line instead of the NUL ack.
            let mut reason = vec![ack[0]];
            let mut tail = [0u8; 256];
            if let Ok(count) = self.stream.read(&mut tail).await {
                reason.extend_from_slice(&tail[..count]);
            }
            return Err(TransportError::Handshake {
                reason: String::from_utf8_lossy(&reason).into_owned(),
            });
        }
        Ok(())
    }

    async fn send_window_size(&mut self) -> io::Result<()> {
        let mut report = [0u8; 12];
        report[0] = 0xFF;
        report[1] = 0xFF;
        report[2] = b's';
        report[3] = b's';
        report[4..6].copy_from_slice(&self.rows.to_be_bytes());
        report[6..8].copy_from_slice(&self.columns.to_be_bytes());
        // Pixel fields stay zero.
        self.stream.write_all(&report).await
    }
}

async fn connect_privileged(host: &str, port: u16) -> io::Result<TcpStream> {
    // rlogin's privileged-port origin needs root; try 512-1023 first.
    for local_port in (512..1024).rev() {
        let Ok(socket) = tokio::net::TcpSocket::new_v4() else {
            break;
        };
        let Ok(local) = format!("0.0.0.0:{local_port}").parse::<std::net::SocketAddr>() else {
            break;
        };
        if socket.bind(local).is_err() {
            continue;
        }
        let addr = tokio::net::lookup_host((host, port))
            .await?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address"))?;
        return socket.connect(addr).await;
    }
    debug!("no privileged port available, using an ephemeral one");
    TcpStream::connect((host, port)).await
}

#[async_trait]
impl Transport for RloginTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Rlogin
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut raw = vec![0u8; buf.len().max(64)];
            let count = match self.stream.read(&mut raw).await {
                Ok(0) => {
                    self.connected = false;
                    return Ok(0);
                }
                Ok(count) => count,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => {
                    self.connected = false;
                    return Err(error);
                }
            };
            let mut produced = 0usize;
            let mut window_requested = false;
            for &byte in &raw[..count] {
                match byte {
                    WINDOW_REQUEST => window_requested = true,
                    DISCARD_OUTPUT => debug!("rlogin discard-output control"),
                    RAW_ON => self.raw_mode = true,
                    RAW_OFF => self.raw_mode = false,
                    data => {
                        if produced < buf.len() {
                            buf[produced] = data;
                            produced += 1;
                        }
                    }
                }
            }
            if window_requested {
                self.send_window_size().await?;
            }
            if produced > 0 {
                return Ok(produced);
            }
        }
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.stream.write(buf).await {
            Ok(count) => Ok(count),
            Err(error) => {
                self.connected = false;
                Err(error)
            }
        }
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.stream.flush().await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.connected = false;
        self.stream.shutdown().await
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn resize(&mut self, columns: u16, rows: u16) {
        self.columns = columns;
        self.rows = rows;
    }
}
