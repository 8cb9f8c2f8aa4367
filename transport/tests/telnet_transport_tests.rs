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

//! End-to-end transport checks against a mock telnet server on
//! 127.0.0.1.

use qodem_telnetcodec::{TelnetMachineConfig, consts};
use qodem_transport::{TelnetTransport, Transport};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

async fn read_some(stream: &mut tokio::net::TcpStream, buf: &mut Vec<u8>) {
    let mut chunk = [0u8; 512];
    let count = stream.read(&mut chunk).await.expect("server read");
    buf.extend_from_slice(&chunk[..count]);
}

#[tokio::test]
async fn naws_negotiation_reports_eighty_by_twenty_five() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("addr");

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        // Swallow the client's opening negotiation.
        let mut seen = Vec::new();
        read_some(&mut stream, &mut seen).await;
        // Ask for the window size.
        stream
            .write_all(&[consts::IAC, consts::DO, consts::option::NAWS])
            .await
            .expect("server write");
        // Collect until the subnegotiation arrives.
        let expected: &[u8] = &[
            consts::IAC,
            consts::SB,
            consts::option::NAWS,
            0x00,
            0x50,
            0x00,
            0x19,
            consts::IAC,
            consts::SE,
        ];
        let mut reply = Vec::new();
        for _ in 0..10 {
            read_some(&mut stream, &mut reply).await;
            if reply
                .windows(expected.len())
                .any(|window| window == expected)
            {
                break;
            }
        }
        assert!(
            reply.windows(expected.len()).any(|w| w == expected),
            "NAWS report 80x25 present: {reply:02x?}"
        );
        // Hand the client a byte of real data so its read returns.
        stream.write_all(b"ok").await.expect("server write");
    });

    let config = TelnetMachineConfig {
        columns: 80,
        rows: 25,
        ..TelnetMachineConfig::default()
    };
    let mut client = TelnetTransport::connect("127.0.0.1", address.port(), config)
        .await
        .expect("client connect");
    let mut buf = [0u8; 64];
    let count = client.read(&mut buf).await.expect("client read");
    assert_eq!(&buf[..count], b"ok");
    server.await.expect("server task");
}

#[tokio::test]
async fn iac_data_round_trips_through_transport() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("addr");

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut seen = Vec::new();
        // Opening negotiation, then the escaped payload.
        for _ in 0..10 {
            read_some(&mut stream, &mut seen).await;
            // IAC IAC (escaped 0xFF) after the negotiation block.
            if seen
                .windows(2)
                .any(|window| window == [consts::IAC, consts::IAC])
            {
                break;
            }
        }
        assert!(
            seen.windows(2).any(|w| w == [consts::IAC, consts::IAC]),
            "outbound 0xFF was doubled: {seen:02x?}"
        );
        // Send a doubled IAC back; the client must see a single 0xFF.
        stream
            .write_all(&[b'a', consts::IAC, consts::IAC, b'b'])
            .await
            .expect("server write");
    });

    let mut client = TelnetTransport::connect(
        "127.0.0.1",
        address.port(),
        TelnetMachineConfig::default(),
    )
    .await
    .expect("client connect");
    client.write(&[0xFF]).await.expect("client write");
    let mut buf = [0u8; 16];
    let count = client.read(&mut buf).await.expect("client read");
    assert_eq!(&buf[..count], &[b'a', 0xFF, b'b']);
    server.await.expect("server task");
}

#[tokio::test]
async fn eof_surfaces_as_zero_read() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        drop(stream);
    });
    let mut client = TelnetTransport::connect(
        "127.0.0.1",
        address.port(),
        TelnetMachineConfig::default(),
    )
    .await
    .expect("client connect");
    let mut buf = [0u8; 16];
    let count = client.read(&mut buf).await.expect("client read");
    assert_eq!(count, 0);
    assert!(!client.is_connected());
}
