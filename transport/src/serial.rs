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
use qodem_codepage::{ParityMode, apply_parity_in, apply_parity_out};
use std::io;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{info, warn};

///
/// A serial device node. Line discipline (baud, word size) is left to
/// the environment; this transport handles the byte pipe, mark/space
/// parity transforms, and carrier-drop mapping: an I/O error on a serial
/// read is a dropped carrier, which the dispatcher treats as a
/// first-class disconnect.
///
pub struct SerialTransport {
    device: File,
    path: String,
    parity: ParityMode,
    connected: bool,
    carrier_lost: bool,
}

impl SerialTransport {
    /// Opens the device read-write.
    pub async fn open(path: &str, parity: ParityMode) -> Result<SerialTransport, TransportError> {
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .await
            .map_err(|source| TransportError::Connect {
                target: path.to_string(),
                source,
            })?;
        info!("opened serial device {path}");
        Ok(SerialTransport {
            device,
            path: path.to_string(),
            parity,
            connected: true,
            carrier_lost: false,
        })
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.device.read(buf).await {
            Ok(0) => {
                self.connected = false;
                self.carrier_lost = true;
                Ok(0)
            }
            Ok(count) => {
                for byte in &mut buf[..count] {
                    *byte = apply_parity_in(self.parity, *byte);
                }
                Ok(count)
            }
            Err(error) => {
                warn!("serial read on {} failed: {error}", self.path);
                self.connected = false;
                self.carrier_lost = true;
                Err(error)
            }
        }
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let transformed: Vec<u8> = buf
            .iter()
            .map(|&byte| apply_parity_out(self.parity, byte))
            .collect();
        match self.device.write(&transformed).await {
            Ok(count) => Ok(count),
            Err(error) => {
                self.connected = false;
                self.carrier_lost = true;
                Err(error)
            }
        }
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.device.flush().await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.connected = false;
        self.device.flush().await
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn carrier_lost(&self) -> bool {
        self.carrier_lost
    }
}
