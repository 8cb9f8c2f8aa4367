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

//! End-to-end ZMODEM runs, including the lossy-channel recovery
//! property: over a channel that corrupts bytes but eventually delivers,
//! the received file is byte-identical to the sent file.

use qodem_transfer::{
    MemoryStore, TransferEngine, TransferStatus, ZmodemConfig, ZmodemReceiver, ZmodemSender,
    zmodem_autostart,
};
use std::io::Cursor;

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|v| ((v * 7 + v / 253) % 256) as u8).collect()
}

#[test]
fn clean_channel_delivers_identical_file() {
    let contents = patterned(10_000);
    let mut sender = ZmodemSender::new(
        Cursor::new(contents.clone()),
        "big.bin",
        contents.len() as u64,
        ZmodemConfig::default(),
    );
    let mut receiver = ZmodemReceiver::new(MemoryStore::new(), ZmodemConfig::default());
    for _ in 0..256 {
        let a = sender.take_outbound();
        receiver.pump(&a);
        let b = receiver.take_outbound();
        sender.pump(&b);
        if sender.status().is_terminal() && receiver.status().is_terminal() {
            break;
        }
    }
    assert_eq!(sender.status(), TransferStatus::Complete);
    assert_eq!(receiver.status(), TransferStatus::Complete);
    let store = receiver.into_store();
    assert_eq!(store.contents("big.bin").unwrap(), contents);
}

#[test]
fn lossy_channel_recovers_to_identical_file() {
    let contents = patterned(8_192);
    let mut sender = ZmodemSender::new(
        Cursor::new(contents.clone()),
        "lossy.bin",
        contents.len() as u64,
        ZmodemConfig::default(),
    );
    let mut receiver = ZmodemReceiver::new(MemoryStore::new(), ZmodemConfig::default());

    // Corrupt two bytes of the sender's data stream at fixed wire
    // offsets; the receiver's ZRPOS must walk the sender back.
    let corrupt_at = [1_500usize, 5_200usize];
    let mut wire_position = 0usize;
    for _ in 0..512 {
        let mut a = sender.take_outbound().to_vec();
        for (index, byte) in a.iter_mut().enumerate() {
            if corrupt_at.contains(&(wire_position + index)) {
                *byte ^= 0x5A;
            }
        }
        wire_position += a.len();
        receiver.pump(&a);
        let b = receiver.take_outbound();
        sender.pump(&b);
        if sender.status().is_terminal() && receiver.status().is_terminal() {
            break;
        }
    }
    assert_eq!(receiver.status(), TransferStatus::Complete, "receiver recovered");
    assert_eq!(sender.status(), TransferStatus::Complete, "sender recovered");
    let progress = receiver.progress();
    assert!(progress.errors > 0, "corruption was actually seen");
    let store = receiver.into_store();
    assert_eq!(store.contents("lossy.bin").unwrap(), contents);
}

#[test]
fn receiver_abort_cancels_sender() {
    let contents = patterned(4_096);
    let mut sender = ZmodemSender::new(
        Cursor::new(contents.clone()),
        "gone.bin",
        contents.len() as u64,
        ZmodemConfig::default(),
    );
    let mut receiver = ZmodemReceiver::new(MemoryStore::new(), ZmodemConfig::default());
    // A couple of clean rounds, then the operator hits abort.
    for _ in 0..2 {
        let a = sender.take_outbound();
        receiver.pump(&a);
        let b = receiver.take_outbound();
        sender.pump(&b);
    }
    receiver.abort();
    let (_, status) = receiver.pump(&[]);
    assert_eq!(status, TransferStatus::Failed);
    let cancel = receiver.take_outbound();
    let (_, sender_status) = sender.pump(&cancel);
    assert_eq!(sender_status, TransferStatus::Failed);
}

#[test]
fn autostart_transition_signature() {
    // The literal console bytes a remote "rz" emits.
    let console = b"rz\r**\x18B00000000000000\r\n\x11";
    assert!(zmodem_autostart(console));
    // A screenful of ANSI art must not trigger it.
    let art: Vec<u8> = (0..2000).map(|v| (v % 223) as u8 + 32).collect();
    assert!(!zmodem_autostart(&art));
}
