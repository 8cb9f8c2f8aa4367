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

//! End-to-end Kermit scenarios, including the literal S→F→D→Z→B exchange
//! with per-packet acknowledgment.

use qodem_transfer::{
    KermitConfig, KermitReceiver, KermitSender, MemoryStore, TransferEngine, TransferStatus,
};
use std::io::Cursor;

const MARK: u8 = 0x01;

/// Counts packets of each type on a captured wire. MARK never occurs in
/// packet data (control bytes are prefix-quoted), so every 0x01 starts a
/// packet whose TYPE field sits three bytes later.
fn count_packets(wire: &[u8], wanted: u8) -> usize {
    wire.iter()
        .enumerate()
        .filter(|&(index, &byte)| byte == MARK && wire.get(index + 3) == Some(&wanted))
        .count()
}

#[test]
fn two_kib_file_in_four_individually_acked_packets() {
    // 2048 printable bytes so each D packet carries exactly 512 of them
    // with long packets on and streaming off.
    let contents: Vec<u8> = (0..2048usize).map(|v| 32 + (v % 95) as u8).collect();
    let config = KermitConfig {
        streaming: false,
        long_packets: true,
        uploads_force_binary: true,
        robust_filename: true,
        ..KermitConfig::default()
    };
    let mut sender = KermitSender::new(
        Cursor::new(contents.clone()),
        "alpha.bin",
        contents.len() as u64,
        config,
    );
    let mut receiver = KermitReceiver::new(MemoryStore::new(), config);

    let mut sender_wire = Vec::new();
    let mut receiver_wire = Vec::new();
    for _ in 0..64 {
        let a = sender.take_outbound();
        sender_wire.extend_from_slice(&a);
        receiver.pump(&a);
        let b = receiver.take_outbound();
        receiver_wire.extend_from_slice(&b);
        sender.pump(&b);
        if sender.status().is_terminal() && receiver.status().is_terminal() {
            break;
        }
    }

    assert_eq!(sender.status(), TransferStatus::Complete);
    assert_eq!(receiver.status(), TransferStatus::Complete);

    // S, F, A, 4×D, Z, B from the sender; one Y each from the receiver.
    assert_eq!(count_packets(&sender_wire, b'D'), 4, "four data packets");
    assert_eq!(count_packets(&sender_wire, b'S'), 1);
    assert_eq!(count_packets(&sender_wire, b'F'), 1);
    assert_eq!(count_packets(&sender_wire, b'Z'), 1);
    assert_eq!(count_packets(&sender_wire, b'B'), 1);
    assert_eq!(
        count_packets(&receiver_wire, b'Y'),
        9,
        "every packet, data included, is acked individually"
    );
    assert_eq!(count_packets(&receiver_wire, b'N'), 0);

    let store = receiver.into_store();
    assert_eq!(store.contents("ALPHA.BIN").unwrap(), contents);
}

#[test]
fn text_file_converts_line_endings_end_to_end() {
    // Unix text goes CRLF on the wire and lands as Unix text again.
    let contents = b"first line\nsecond line\nthird\n".to_vec();
    let config = KermitConfig {
        uploads_force_binary: false,
        downloads_convert_text: true,
        ..KermitConfig::default()
    };
    let mut sender = KermitSender::new(
        Cursor::new(contents.clone()),
        "notes.txt",
        contents.len() as u64,
        config,
    );
    let mut receiver = KermitReceiver::new(MemoryStore::new(), config);
    for _ in 0..64 {
        let a = sender.take_outbound();
        receiver.pump(&a);
        let b = receiver.take_outbound();
        sender.pump(&b);
        if sender.status().is_terminal() && receiver.status().is_terminal() {
            break;
        }
    }
    assert_eq!(receiver.status(), TransferStatus::Complete);
    let store = receiver.into_store();
    assert_eq!(store.contents("NOTES.TXT").unwrap(), contents);
}

#[test]
fn corrupted_data_packet_is_nakked_and_recovered() {
    let contents: Vec<u8> = (0..600usize).map(|v| 32 + (v % 95) as u8).collect();
    let config = KermitConfig {
        uploads_force_binary: true,
        ..KermitConfig::default()
    };
    let mut sender = KermitSender::new(
        Cursor::new(contents.clone()),
        "n.bin",
        contents.len() as u64,
        config,
    );
    let mut receiver = KermitReceiver::new(MemoryStore::new(), config);
    let mut corrupted = false;
    for _ in 0..128 {
        let mut a = sender.take_outbound().to_vec();
        // Corrupt the first D packet once.
        if !corrupted {
            if let Some(index) = a
                .iter()
                .enumerate()
                .find(|&(i, &b)| b == MARK && a.get(i + 3) == Some(&b'D'))
                .map(|(i, _)| i + 8)
            {
                if index < a.len() {
                    a[index] ^= 0x01;
                    corrupted = true;
                }
            }
        }
        receiver.pump(&a);
        let b = receiver.take_outbound();
        sender.pump(&b);
        if sender.status().is_terminal() && receiver.status().is_terminal() {
            break;
        }
    }
    assert!(corrupted);
    assert_eq!(receiver.status(), TransferStatus::Complete);
    let store = receiver.into_store();
    assert_eq!(store.contents("N.BIN").unwrap(), contents);
}
