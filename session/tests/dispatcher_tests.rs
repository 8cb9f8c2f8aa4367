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

//! Dispatcher behaviors driven end-to-end over an in-memory transport
//! with a paused clock: idle timeout, keepalive cadence, ZMODEM
//! autostart, and the outbound translate watermark.

use async_trait::async_trait;
use qodem_emulation::Emulation;
use qodem_emulation::keyboard::{Key, KeyModifiers};
use qodem_session::config::QodemConfig;
use qodem_session::{Dispatcher, SessionCommand, SessionEvent};
use qodem_transport::{Transport, TransportKind};
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::{Duration, Instant, timeout};

struct PipeTransport {
    stream: DuplexStream,
    connected: bool,
}

impl PipeTransport {
    fn pair() -> (PipeTransport, DuplexStream) {
        let (near, far) = tokio::io::duplex(64 * 1024);
        (
            PipeTransport {
                stream: near,
                connected: true,
            },
            far,
        )
    }
}

#[async_trait]
impl Transport for PipeTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream.read(buf).await {
            Ok(0) => {
                self.connected = false;
                Ok(0)
            }
            other => other,
        }
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf).await
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

fn start_session(
    config: QodemConfig,
) -> (
    qodem_session::SessionHandle,
    tokio::sync::mpsc::UnboundedReceiver<SessionEvent>,
    DuplexStream,
) {
    let (transport, far) = PipeTransport::pair();
    let dir = std::env::temp_dir();
    let (dispatcher, handle, events) = Dispatcher::new(
        Box::new(transport),
        config,
        Emulation::Ansi,
        80,
        25,
        dir,
    );
    tokio::spawn(dispatcher.run());
    (handle, events, far)
}

async fn wait_for<F: Fn(&SessionEvent) -> bool>(
    events: &mut tokio::sync::mpsc::UnboundedReceiver<SessionEvent>,
    budget: Duration,
    predicate: F,
) -> SessionEvent {
    timeout(budget, async {
        loop {
            let event = events.recv().await.expect("event stream open");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event within budget")
}

#[tokio::test(start_paused = true)]
async fn idle_timeout_closes_the_session() {
    let config = QodemConfig {
        idle_timeout_secs: 5,
        ..QodemConfig::default()
    };
    let (_handle, mut events, _far) = start_session(config);
    let started = Instant::now();
    wait_for(&mut events, Duration::from_secs(30), |event| {
        matches!(event, SessionEvent::Disconnected { .. })
    })
    .await;
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(7),
        "closed at {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn keepalive_sends_exactly_one_nul_per_interval() {
    let config = QodemConfig {
        keepalive_timeout_secs: 10,
        keepalive_bytes: String::from("\\x00"),
        ..QodemConfig::default()
    };
    let (handle, _events, mut far) = start_session(config);

    let collector = tokio::spawn(async move {
        let mut seen = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            match timeout(Duration::from_secs(60), far.read(&mut buf)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(count)) => seen.extend_from_slice(&buf[..count]),
                Ok(Err(_)) => break,
            }
        }
        seen
    });
    tokio::time::sleep(Duration::from_secs(35)).await;
    // Hang up so the far end sees EOF and the collector returns before a
    // fourth interval elapses.
    handle.hangup().await;
    let seen = collector.await.expect("collector");
    let nuls = seen.iter().filter(|&&byte| byte == 0).count();
    assert_eq!(nuls, 3, "one keepalive per ten idle seconds: {seen:?}");
}

#[tokio::test(start_paused = true)]
async fn zmodem_autostart_switches_to_receive_and_answers() {
    let config = QodemConfig::default();
    let (_handle, mut events, mut far) = start_session(config);
    far.write_all(b"rz\r**\x18B00000000000000\r\n\x11")
        .await
        .expect("far write");
    let event = wait_for(&mut events, Duration::from_secs(5), |event| {
        matches!(event, SessionEvent::TransferStarted { .. })
    })
    .await;
    let SessionEvent::TransferStarted { protocol, .. } = event else {
        unreachable!();
    };
    assert_eq!(protocol, "ZMODEM");
    // The ZRINIT answer arrives within a loop tick.
    let mut answer = Vec::new();
    let mut buf = [0u8; 256];
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        match timeout(Duration::from_millis(100), far.read(&mut buf)).await {
            Ok(Ok(count)) if count > 0 => {
                answer.extend_from_slice(&buf[..count]);
                if answer
                    .windows(6)
                    .any(|window| window == b"**\x18B01")
                {
                    break;
                }
            }
            _ => {}
        }
    }
    assert!(
        answer.windows(6).any(|window| window == b"**\x18B01"),
        "ZRINIT seen: {answer:02x?}"
    );
}

#[tokio::test(start_paused = true)]
async fn keystrokes_reach_the_wire_encoded() {
    let (handle, _events, mut far) = start_session(QodemConfig::default());
    handle
        .send(SessionCommand::Keystroke(Key::Up, KeyModifiers::default()))
        .await;
    handle
        .send(SessionCommand::Keystroke(
            Key::Char('x'),
            KeyModifiers::default(),
        ))
        .await;
    let mut buf = [0u8; 16];
    let mut seen = Vec::new();
    while seen.len() < 4 {
        let count = timeout(Duration::from_secs(2), far.read(&mut buf))
            .await
            .expect("wire bytes")
            .expect("read ok");
        seen.extend_from_slice(&buf[..count]);
    }
    assert_eq!(&seen, b"\x1b[Ax");
}

#[tokio::test(start_paused = true)]
async fn console_bytes_flow_to_the_output_sink() {
    let (_handle, mut events, mut far) = start_session(QodemConfig::default());
    far.write_all(b"login: ").await.expect("far write");
    let event = wait_for(&mut events, Duration::from_secs(2), |event| {
        matches!(event, SessionEvent::Output(_))
    })
    .await;
    let SessionEvent::Output(bytes) = event else {
        unreachable!();
    };
    assert_eq!(&bytes, b"login: ");
}

#[tokio::test(start_paused = true)]
async fn hangup_emits_connection_closed() {
    let (handle, mut events, _far) = start_session(QodemConfig::default());
    handle.hangup().await;
    let event = wait_for(&mut events, Duration::from_secs(2), |event| {
        matches!(event, SessionEvent::Disconnected { .. })
    })
    .await;
    let SessionEvent::Disconnected { exit_code, .. } = event else {
        unreachable!();
    };
    assert_eq!(exit_code, None);
}
