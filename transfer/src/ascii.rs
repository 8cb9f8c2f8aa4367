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

//! ASCII upload/download: no framing, just byte flow with per-direction
//! CR/LF policies. An upload completes at end of file; a download runs
//! until the session ends it with [`AsciiReceiver::finish`].

use crate::store::FileStore;
use crate::{TransferEngine, TransferProgress, TransferStatus};
use bytes::BytesMut;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::warn;

/// What to do with a CR or LF on its way through.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LinePolicy {
    /// Pass through untouched.
    #[default]
    None,
    /// Remove the byte.
    Strip,
    /// Add the complementary byte (CR before LF, or LF after CR).
    Add,
}

impl LinePolicy {
    /// Parses the options-file spelling.
    #[must_use]
    pub fn from_name(name: &str) -> Option<LinePolicy> {
        match name {
            "none" => Some(LinePolicy::None),
            "strip" => Some(LinePolicy::Strip),
            "add" => Some(LinePolicy::Add),
            _ => None,
        }
    }
}

/// Streaming CR/LF rewriting shared by both directions.
#[derive(Debug, Default)]
struct LineRewriter {
    cr_policy: LinePolicy,
    lf_policy: LinePolicy,
    last_emitted: Option<u8>,
}

impl LineRewriter {
    fn new(cr_policy: LinePolicy, lf_policy: LinePolicy) -> LineRewriter {
        LineRewriter {
            cr_policy,
            lf_policy,
            last_emitted: None,
        }
    }

    fn emit(&mut self, out: &mut Vec<u8>, byte: u8) {
        out.push(byte);
        self.last_emitted = Some(byte);
    }

    fn push(&mut self, out: &mut Vec<u8>, byte: u8) {
        match byte {
            b'\r' => {
                if self.cr_policy != LinePolicy::Strip {
                    self.emit(out, b'\r');
                }
                if self.lf_policy == LinePolicy::Add {
                    self.emit(out, b'\n');
                }
            }
            b'\n' => {
                if self.cr_policy == LinePolicy::Add && self.last_emitted != Some(b'\r') {
                    self.emit(out, b'\r');
                }
                if self.lf_policy != LinePolicy::Strip {
                    self.emit(out, b'\n');
                }
            }
            other => self.emit(out, other),
        }
    }

    /// End-of-stream: `add` guarantees a final line terminator.
    fn finish(&mut self, out: &mut Vec<u8>) {
        if self.lf_policy == LinePolicy::Add && self.last_emitted != Some(b'\n') {
            self.emit(out, b'\n');
        }
    }
}

///
/// ASCII upload: file bytes through the CR/LF policies onto the wire.
///
pub struct AsciiSender<F: Read> {
    file: F,
    rewriter: LineRewriter,
    outbound: BytesMut,
    progress: TransferProgress,
    done: bool,
    failed: bool,
}

impl<F: Read> AsciiSender<F> {
    /// Creates an upload with the configured policies.
    pub fn new(file: F, name: &str, cr_policy: LinePolicy, lf_policy: LinePolicy) -> AsciiSender<F> {
        AsciiSender {
            file,
            rewriter: LineRewriter::new(cr_policy, lf_policy),
            outbound: BytesMut::new(),
            progress: TransferProgress {
                file_name: name.to_string(),
                block_size: 1024,
                ..TransferProgress::default()
            },
            done: false,
            failed: false,
        }
    }
}

impl<F: Read> TransferEngine for AsciiSender<F> {
    fn pump(&mut self, _inbound: &[u8]) -> (usize, TransferStatus) {
        if self.done || self.failed {
            return (0, self.status());
        }
        let mut block = [0u8; 1024];
        let mut converted = Vec::with_capacity(2048);
        match self.file.read(&mut block) {
            Ok(0) => {
                self.rewriter.finish(&mut converted);
                self.done = true;
            }
            Ok(count) => {
                for &byte in &block[..count] {
                    self.rewriter.push(&mut converted, byte);
                }
                self.progress.offset += count as u64;
            }
            Err(error) => {
                warn!("ascii upload read failed: {error}");
                self.failed = true;
            }
        }
        self.outbound.extend_from_slice(&converted);
        (0, self.status())
    }

    fn take_outbound(&mut self) -> BytesMut {
        self.outbound.split()
    }

    fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    fn tick(&mut self, _elapsed: Duration) -> TransferStatus {
        self.status()
    }

    fn status(&self) -> TransferStatus {
        if self.failed {
            TransferStatus::Failed
        } else if self.done && self.outbound.is_empty() {
            TransferStatus::Complete
        } else {
            TransferStatus::Running
        }
    }

    fn progress(&self) -> TransferProgress {
        self.progress.clone()
    }

    fn abort(&mut self) {
        self.failed = true;
    }
}

///
/// ASCII download: wire bytes through the CR/LF policies into a file.
/// There is no protocol end; the session calls [`AsciiReceiver::finish`]
/// when the operator stops the capture.
///
pub struct AsciiReceiver<S: FileStore> {
    store: S,
    file: Option<S::File>,
    name: String,
    rewriter: LineRewriter,
    outbound: BytesMut,
    progress: TransferProgress,
    done: bool,
    failed: bool,
}

impl<S: FileStore> AsciiReceiver<S> {
    /// Creates a download into `name`.
    pub fn new(
        mut store: S,
        name: &str,
        cr_policy: LinePolicy,
        lf_policy: LinePolicy,
    ) -> AsciiReceiver<S> {
        let file = match store.create(name) {
            Ok(file) => Some(file),
            Err(error) => {
                warn!("ascii download cannot create {name}: {error}");
                None
            }
        };
        let failed = file.is_none();
        AsciiReceiver {
            store,
            file,
            name: name.to_string(),
            rewriter: LineRewriter::new(cr_policy, lf_policy),
            outbound: BytesMut::new(),
            progress: TransferProgress {
                file_name: name.to_string(),
                block_size: 1024,
                ..TransferProgress::default()
            },
            done: false,
            failed,
        }
    }

    /// Seals the download.
    pub fn finish(&mut self) {
        if self.done || self.failed {
            return;
        }
        let mut tail = Vec::new();
        self.rewriter.finish(&mut tail);
        if let Some(file) = self.file.as_mut() {
            if file.write_all(&tail).is_err() {
                self.failed = true;
            }
        }
        self.file = None;
        self.done = true;
        self.progress.files_done = 1;
    }

    /// Consumes the receiver, returning the store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// The download file name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<S: FileStore> TransferEngine for AsciiReceiver<S> {
    fn pump(&mut self, inbound: &[u8]) -> (usize, TransferStatus) {
        if self.done || self.failed {
            return (inbound.len(), self.status());
        }
        let mut converted = Vec::with_capacity(inbound.len() * 2);
        for &byte in inbound {
            self.rewriter.push(&mut converted, byte);
        }
        if let Some(file) = self.file.as_mut() {
            if file.write_all(&converted).is_err() {
                self.failed = true;
            } else {
                self.progress.offset += converted.len() as u64;
            }
        }
        (inbound.len(), self.status())
    }

    fn take_outbound(&mut self) -> BytesMut {
        self.outbound.split()
    }

    fn has_outbound(&self) -> bool {
        false
    }

    fn tick(&mut self, _elapsed: Duration) -> TransferStatus {
        self.status()
    }

    fn status(&self) -> TransferStatus {
        if self.failed {
            TransferStatus::Failed
        } else if self.done {
            TransferStatus::Complete
        } else {
            TransferStatus::Running
        }
    }

    fn progress(&self) -> TransferProgress {
        self.progress.clone()
    }

    fn abort(&mut self) {
        // An aborted ASCII download keeps what already landed.
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use std::io::Cursor;

    fn drain<F: Read>(sender: &mut AsciiSender<F>) -> Vec<u8> {
        let mut wire = Vec::new();
        while !sender.status().is_terminal() {
            sender.pump(&[]);
            wire.extend_from_slice(&sender.take_outbound());
        }
        wire
    }

    #[test]
    fn lf_add_policy_matches_upload_contract() {
        // Input "A\rB\rC" with lf-policy=add goes out as
        // "A\r\nB\r\nC\n".
        let mut sender = AsciiSender::new(
            Cursor::new(b"A\rB\rC".to_vec()),
            "t.txt",
            LinePolicy::None,
            LinePolicy::Add,
        );
        assert_eq!(drain(&mut sender), b"A\r\nB\r\nC\n");
    }

    #[test]
    fn strip_policies() {
        let mut sender = AsciiSender::new(
            Cursor::new(b"a\r\nb\r\n".to_vec()),
            "t.txt",
            LinePolicy::Strip,
            LinePolicy::None,
        );
        assert_eq!(drain(&mut sender), b"a\nb\n");
    }

    #[test]
    fn cr_add_before_bare_lf() {
        let mut sender = AsciiSender::new(
            Cursor::new(b"a\nb\r\nc".to_vec()),
            "t.txt",
            LinePolicy::Add,
            LinePolicy::None,
        );
        assert_eq!(drain(&mut sender), b"a\r\nb\r\nc");
    }

    #[test]
    fn download_applies_policies_and_finishes() {
        let mut receiver = AsciiReceiver::new(
            MemoryStore::new(),
            "down.txt",
            LinePolicy::Strip,
            LinePolicy::None,
        );
        receiver.pump(b"line one\r\nline two\r\n");
        receiver.finish();
        assert_eq!(receiver.status(), TransferStatus::Complete);
        let store = receiver.into_store();
        assert_eq!(store.contents("down.txt").unwrap(), b"line one\nline two\n");
    }

    #[test]
    fn identity_policies_pass_through() {
        let payload: Vec<u8> = (0u8..=255).collect();
        let mut sender = AsciiSender::new(
            Cursor::new(payload.clone()),
            "t.bin",
            LinePolicy::None,
            LinePolicy::None,
        );
        assert_eq!(drain(&mut sender), payload);
    }
}
