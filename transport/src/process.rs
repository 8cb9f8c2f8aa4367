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
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info};

///
/// A local child process as the far end: writes go to its stdin, reads
/// come from its stdout, EOF arrives when the pipes close. Also the
/// backing for the external-SSH transport.
///
/// A defunct child with a still-open pipe is detected through
/// [`Transport::exit_status`]; the dispatcher closes such sessions
/// explicitly.
///
pub struct ProcessTransport {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    kind: TransportKind,
    command_line: String,
    connected: bool,
    exit_code: Option<i32>,
}

impl ProcessTransport {
    /// Spawns the user's shell (`$SHELL`, falling back to `/bin/sh`).
    pub fn spawn_shell() -> Result<ProcessTransport, TransportError> {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| String::from("/bin/sh"));
        let mut command = Command::new(&shell);
        command.arg("-i");
        Self::from_command(command, TransportKind::Shell, shell)
    }

    pub(crate) fn from_command(
        mut command: Command,
        kind: TransportKind,
        command_line: String,
    ) -> Result<ProcessTransport, TransportError> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        let mut child = command.spawn().map_err(|source| TransportError::Spawn {
            command: command_line.clone(),
            source,
        })?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        info!("spawned {command_line}");
        Ok(ProcessTransport {
            child,
            stdin,
            stdout,
            kind,
            command_line,
            connected: true,
            exit_code: None,
        })
    }

    fn harvest_exit(&mut self) {
        if self.exit_code.is_some() {
            return;
        }
        if let Ok(Some(status)) = self.child.try_wait() {
            self.exit_code = Some(status.code().unwrap_or(0));
            debug!("{} exited with {:?}", self.command_line, self.exit_code);
        }
    }
}

#[async_trait]
impl Transport for ProcessTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(stdout) = self.stdout.as_mut() else {
            self.connected = false;
            return Ok(0);
        };
        loop {
            match stdout.read(buf).await {
                Ok(0) => {
                    self.connected = false;
                    self.harvest_exit();
                    return Ok(0);
                }
                Ok(count) => return Ok(count),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => {
                    self.connected = false;
                    self.harvest_exit();
                    return Err(error);
                }
            }
        }
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed"));
        };
        match stdin.write(buf).await {
            Ok(count) => Ok(count),
            Err(error) => {
                self.connected = false;
                Err(error)
            }
        }
    }

    async fn flush(&mut self) -> io::Result<()> {
        if let Some(stdin) = self.stdin.as_mut() {
            stdin.flush().await?;
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.connected = false;
        // Dropping stdin delivers EOF; a stuck child is killed.
        self.stdin = None;
        if self.child.try_wait().ok().flatten().is_none() {
            self.child.start_kill().ok();
        }
        self.harvest_exit();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn exit_status(&mut self) -> Option<i32> {
        self.harvest_exit();
        self.exit_code
    }
}
