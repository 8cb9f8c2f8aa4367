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
use tracing::info;

/// Raw socket: every byte passes through untouched.
pub struct TcpTransport {
    stream: TcpStream,
    connected: bool,
}

impl TcpTransport {
    /// Connects to `host:port`.
    pub async fn connect(host: &str, port: u16) -> Result<TcpTransport, TransportError> {
        let target = format!("{host}:{port}");
        let stream = TcpStream::connect(&target)
            .await
            .map_err(|source| TransportError::Connect {
                target: target.clone(),
                source,
            })?;
        stream.set_nodelay(true).ok();
        info!("connected to {target}");
        Ok(TcpTransport {
            stream,
            connected: true,
        })
    }

    /// Wraps an already-connected stream (tests, inbound host mode).
    #[must_use]
    pub fn from_stream(stream: TcpStream) -> TcpTransport {
        TcpTransport {
            stream,
            connected: true,
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.stream.read(buf).await {
                Ok(0) => {
                    self.connected = false;
                    return Ok(0);
                }
                Ok(count) => return Ok(count),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => {
                    self.connected = false;
                    return Err(error);
                }
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
}
