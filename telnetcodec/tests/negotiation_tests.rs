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

use bytes::BytesMut;
use proptest::prelude::*;
use qodem_telnetcodec::{TelnetCodec, TelnetFrame, TelnetMachine, TelnetMachineConfig, consts};
use tokio_util::codec::{Decoder, Encoder};

fn decode_all(codec: &mut TelnetCodec, bytes: &[u8]) -> Vec<TelnetFrame> {
    let mut src = BytesMut::from(bytes);
    let mut frames = Vec::new();
    while let Some(frame) = codec.decode(&mut src).expect("decode ok") {
        frames.push(frame);
    }
    frames
}

#[test]
fn login_banner_negotiation_scenario() {
    // A typical BBS greeting: banner text interleaved with DO/WILL
    // negotiation, all of which must be answered without disturbing the
    // data stream.
    let mut machine = TelnetMachine::new(TelnetMachineConfig {
        terminal_name: String::from("ANSI"),
        ..TelnetMachineConfig::default()
    });
    let mut inbound = Vec::new();
    inbound.extend_from_slice(b"Welcome!\r\n");
    inbound.extend_from_slice(&[consts::IAC, consts::DO, consts::option::TTYPE]);
    inbound.extend_from_slice(&[consts::IAC, consts::WILL, consts::option::ECHO]);
    inbound.extend_from_slice(b"login: ");

    let data: Vec<u8> = inbound.iter().filter_map(|&b| machine.receive(b)).collect();
    assert_eq!(&data, b"Welcome!\r\nlogin: ");

    let reply = machine.take_reply();
    assert_eq!(
        &reply[..],
        &[
            consts::IAC,
            consts::WILL,
            consts::option::TTYPE,
            consts::IAC,
            consts::DO,
            consts::option::ECHO,
        ]
    );
    assert!(machine.remote_echo());
}

#[test]
fn subnegotiation_answers_within_one_batch() {
    let mut machine = TelnetMachine::new(TelnetMachineConfig {
        lang: String::from("en_US.UTF-8"),
        ..TelnetMachineConfig::default()
    });
    // Server asks for the environment.
    let mut inbound = vec![consts::IAC, consts::DO, consts::option::NEW_ENVIRON];
    inbound.extend_from_slice(&[
        consts::IAC,
        consts::SB,
        consts::option::NEW_ENVIRON,
        consts::SUB_SEND,
        consts::IAC,
        consts::SE,
    ]);
    for byte in inbound {
        machine.receive(byte);
    }
    let reply = machine.take_reply();
    let lang_at = reply
        .windows(4)
        .position(|window| window == b"LANG")
        .expect("LANG present in NEW-ENVIRON answer");
    let value = &reply[lang_at + 4..];
    assert_eq!(value[0], consts::environ::VALUE);
    assert!(value.windows(11).any(|w| w == b"en_US.UTF-8"));
}

proptest! {
    // With no negotiation in the stream, telnet encode → decode is the
    // identity on both sides.
    #[test]
    fn data_round_trip_is_identity(original in proptest::collection::vec(any::<u8>(), 0..512)) {
        let mut codec = TelnetCodec::new();
        let mut wire = BytesMut::new();
        for &byte in &original {
            codec.encode(TelnetFrame::Data(byte), &mut wire).expect("encode ok");
        }
        let frames = decode_all(&mut codec, &wire);
        let decoded: Vec<u8> = frames
            .into_iter()
            .map(|frame| match frame {
                TelnetFrame::Data(byte) => byte,
                other => panic!("unexpected frame {other:?}"),
            })
            .collect();
        prop_assert_eq!(decoded, original);
    }
}
