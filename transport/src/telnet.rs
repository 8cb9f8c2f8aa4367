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
use bytes::{Buf, BytesMut};
use qodem_telnetcodec::{TelnetMachine, TelnetMachineConfig};
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

///
/// Telnet over TCP. The option machine lives inside the transport:
/// negotiation is answered on the read path within the same call, and
/// only DATA bytes ever surface to the session. The write path applies
/// IAC doubling and NVT CR rules through the same machine.
///
pub struct TelnetTransport {
    stream: TcpStream,
    machine: TelnetMachine,
    decoded: BytesMut,
    connected: bool,
}

impl TelnetTransport {
    /// Connects and queues the client-side opening negotiation.
    pub async fn connect(
        host: &str,
        port: u16,
        config: TelnetMachineConfig,
    ) -> Result<TelnetTransport, TransportError> {
        let target = format!("{host}:{port}");
        let stream = TcpStream::connect(&target)
            .await
            .map_err(|source| TransportError::Connect {
                target: target.clone(),
                source,
            })?;
        stream.set_nodelay(true).ok();
        info!("telnet connected to {target}");
        let mut transport = TelnetTransport {
            stream,
            machine: TelnetMachine::new(config),
            decoded: BytesMut::new(),
            connected: true,
        };
        transport.machine.open();
        transport.flush_replies().await.map_err(|source| {
            TransportError::Connect {
                target,
                source,
            }
        })?;
        Ok(transport)
    }

    /// Wraps an accepted stream (tests).
    #[must_use]
    pub fn from_stream(stream: TcpStream, config: TelnetMachineConfig) -> TelnetTransport {
        TelnetTransport {
            stream,
            machine: TelnetMachine::new(config),
            decoded: BytesMut::new(),
            connected: true,
        }
    }

    /// True when the far side agreed to echo.
    #[must_use]
    pub fn remote_echo(&self) -> bool {
        self.machine.remote_echo()
    }

    async fn flush_replies(&mut self) -> io::Result<()> {
        if self.machine.has_reply() {
            let reply = self.machine.take_reply();
            self.stream.write_all(&reply).await?;
            self.stream.flush().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for TelnetTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Telnet
    }

    /// Reads decoded DATA bytes. Negotiation traffic is answered on the
    /// spot and never returned; a read that carried only negotiation
    /// loops for more input rather than returning zero bytes.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if !self.decoded.is_empty() {
                let count = self.decoded.len().min(buf.len());
                buf[..count].copy_from_slice(&self.decoded[..count]);
                self.decoded.advance(count);
                return Ok(count);
            }
            let mut raw = [0u8; 4096];
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
            for &byte in &raw[..count] {
                if let Some(data) = self.machine.receive(byte) {
                    self.decoded.extend_from_slice(&[data]);
                }
            }
            // Negotiation answers go out in the same iteration.
            self.flush_replies().await?;
            if self.decoded.is_empty() {
                debug!("telnet read consumed {count} negotiation bytes");
            }
        }
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut encoded = BytesMut::with_capacity(buf.len() + 8);
        self.machine.send_data(buf, &mut encoded);
        match self.stream.write_all(&encoded).await {
            Ok(()) => Ok(buf.len()),
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
        // The NAWS report is queued here and rides out with the next
        // write or read-path flush.
        self.machine.resize(columns, rows);
    }
}
