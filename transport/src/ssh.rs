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

use crate::process::ProcessTransport;
use crate::{Transport, TransportError, TransportKind};
use async_trait::async_trait;
use std::io;
use tokio::process::Command;

/// Connection parameters for the external SSH client.
#[derive(Clone, Debug)]
pub struct SshOptions {
    /// Remote host.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Login name; empty lets the client pick.
    pub username: String,
    /// TERM value requested on the remote side.
    pub terminal: String,
}

///
/// SSH through the system `ssh` client over pipes. Crypto stays in the
/// client; this transport is plumbing plus the readability caveat: the
/// client buffers decrypted plaintext, so the socket selector can show
/// idle while bytes wait. [`Transport::maybe_readable`] therefore stays
/// true while connected, and the dispatcher guarantees a poll at least
/// every 250 ms.
///
pub struct SshTransport {
    inner: ProcessTransport,
}

impl SshTransport {
    /// Spawns `ssh -tt` to the target.
    pub fn connect(options: &SshOptions) -> Result<SshTransport, TransportError> {
        let mut command = Command::new("ssh");
        command
            .arg("-tt")
            .arg("-e")
            .arg("none")
            .arg("-p")
            .arg(options.port.to_string())
            .env("TERM", &options.terminal);
        let target = if options.username.is_empty() {
            options.host.clone()
        } else {
            format!("{}@{}", options.username, options.host)
        };
        command.arg(&target);
        let command_line = format!("ssh -tt -p {} {target}", options.port);
        let inner =
            ProcessTransport::from_command(command, TransportKind::Ssh, command_line)?;
        Ok(SshTransport { inner })
    }
}

#[async_trait]
impl Transport for SshTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Ssh
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).await
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn maybe_readable(&self) -> bool {
        self.inner.is_connected()
    }

    fn exit_status(&mut self) -> Option<i32> {
        self.inner.exit_status()
    }
}
