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

use crate::codec::encode_frame;
use crate::{TelnetDecoder, TelnetFrame, TelnetOption, consts};
use byteorder::{BigEndian, WriteBytesExt};
use bytes::BytesMut;
use tracing::{debug, warn};

/// Terminal-side parameters the machine answers subnegotiations with.
#[derive(Clone, Debug)]
pub struct TelnetMachineConfig {
    /// Terminal type reported to TTYPE SEND, e.g. `"XTERM"` or `"VT100"`.
    pub terminal_name: String,
    /// LANG value reported to NEW-ENVIRON SEND.
    pub lang: String,
    /// Speed string reported to TSPEED SEND.
    pub speed: String,
    /// Current window columns.
    pub columns: u16,
    /// Current window rows.
    pub rows: u16,
    /// Ask for BINARY in both directions on open (8-bit emulations).
    pub request_binary: bool,
}

impl Default for TelnetMachineConfig {
    fn default() -> Self {
        TelnetMachineConfig {
            terminal_name: String::from("VT100"),
            lang: String::from("en_US"),
            speed: String::from("38400,38400"),
            columns: 80,
            rows: 25,
            request_binary: true,
        }
    }
}

///
/// The policy-bearing telnet endpoint for a terminal client.
///
/// `TelnetMachine` couples a [`TelnetDecoder`] with the negotiation table
/// and a reply buffer. The owning transport feeds raw socket bytes to
/// [`TelnetMachine::receive`], surfaces the returned data bytes to the
/// session, and drains [`TelnetMachine::take_reply`] to the socket after
/// every batch, so negotiation answers go out within the same loop
/// iteration that produced them.
///
#[derive(Debug)]
pub struct TelnetMachine {
    decoder: TelnetDecoder,
    options: crate::TelnetOptions,
    config: TelnetMachineConfig,
    reply: BytesMut,
    after_cr: bool,
}

impl TelnetMachine {
    /// Creates a machine with the given terminal parameters.
    #[must_use]
    pub fn new(config: TelnetMachineConfig) -> TelnetMachine {
        TelnetMachine {
            decoder: TelnetDecoder::new(),
            options: crate::TelnetOptions::new(),
            config,
            reply: BytesMut::new(),
            after_cr: false,
        }
    }

    /// Queues the client's opening negotiation: DO SGA, offer SGA back,
    /// DO ECHO, and BINARY both ways when configured.
    pub fn open(&mut self) {
        let mut opening = Vec::new();
        if let Some(frame) = self.options.request_remote(TelnetOption::SuppressGoAhead) {
            opening.push(frame);
        }
        if let Some(frame) = self.options.offer_local(TelnetOption::SuppressGoAhead) {
            opening.push(frame);
        }
        if let Some(frame) = self.options.request_remote(TelnetOption::Echo) {
            opening.push(frame);
        }
        if self.config.request_binary {
            if let Some(frame) = self.options.request_remote(TelnetOption::TransmitBinary) {
                opening.push(frame);
            }
            if let Some(frame) = self.options.offer_local(TelnetOption::TransmitBinary) {
                opening.push(frame);
            }
        }
        for frame in opening {
            encode_frame(&frame, &mut self.reply);
        }
    }

    /// Feeds one raw socket byte. Returns the decoded data byte, if this
    /// byte completed one. Negotiation traffic never surfaces; its
    /// answers accumulate in the reply buffer.
    pub fn receive(&mut self, byte: u8) -> Option<u8> {
        let frame = self.decoder.push(byte)?;
        match frame {
            TelnetFrame::Data(data) => self.filter_inbound(data),
            TelnetFrame::Do(option) => {
                let (reply, changed) = self.options.handle_do(option);
                if let Some(frame) = reply {
                    encode_frame(&frame, &mut self.reply);
                }
                // Acquiring NAWS means the server wants a size report now
                // and after every resize.
                if changed && option == TelnetOption::WindowSize {
                    self.queue_naws();
                }
                None
            }
            TelnetFrame::Dont(option) => {
                let (reply, _) = self.options.handle_dont(option);
                if let Some(frame) = reply {
                    encode_frame(&frame, &mut self.reply);
                }
                None
            }
            TelnetFrame::Will(option) => {
                let (reply, _) = self.options.handle_will(option);
                if let Some(frame) = reply {
                    encode_frame(&frame, &mut self.reply);
                }
                None
            }
            TelnetFrame::Wont(option) => {
                let (reply, _) = self.options.handle_wont(option);
                if let Some(frame) = reply {
                    encode_frame(&frame, &mut self.reply);
                }
                None
            }
            TelnetFrame::Subnegotiate(option, payload) => {
                self.answer_subnegotiation(option, &payload);
                None
            }
            TelnetFrame::AreYouThere => {
                debug!("telnet AYT received");
                encode_frame(&TelnetFrame::NoOperation, &mut self.reply);
                None
            }
            other => {
                debug!("ignoring telnet command {:?}", other);
                None
            }
        }
    }

    /// NVT inbound CR handling: `CR NUL` collapses to `CR`; everything
    /// else passes through. Disabled when BINARY is active both ways.
    fn filter_inbound(&mut self, data: u8) -> Option<u8> {
        if self.options.binary_both_ways() {
            return Some(data);
        }
        if self.after_cr {
            self.after_cr = false;
            if data == consts::NUL {
                return None;
            }
        }
        if data == consts::CR {
            self.after_cr = true;
        }
        Some(data)
    }

    fn answer_subnegotiation(&mut self, option: TelnetOption, payload: &BytesMut) {
        match option {
            TelnetOption::TerminalType => {
                if payload.first() == Some(&consts::SUB_SEND) {
                    let mut answer = BytesMut::new();
                    answer.extend_from_slice(&[consts::SUB_IS]);
                    answer.extend_from_slice(self.config.terminal_name.as_bytes());
                    encode_frame(
                        &TelnetFrame::Subnegotiate(TelnetOption::TerminalType, answer),
                        &mut self.reply,
                    );
                }
            }
            TelnetOption::TerminalSpeed => {
                if payload.first() == Some(&consts::SUB_SEND) {
                    let mut answer = BytesMut::new();
                    answer.extend_from_slice(&[consts::SUB_IS]);
                    answer.extend_from_slice(self.config.speed.as_bytes());
                    encode_frame(
                        &TelnetFrame::Subnegotiate(TelnetOption::TerminalSpeed, answer),
                        &mut self.reply,
                    );
                }
            }
            TelnetOption::NewEnvironment => {
                if payload.first() == Some(&consts::SUB_SEND) {
                    let mut answer = BytesMut::new();
                    answer.extend_from_slice(&[consts::SUB_IS, consts::environ::VAR]);
                    answer.extend_from_slice(b"LANG");
                    answer.extend_from_slice(&[consts::environ::VALUE]);
                    answer.extend_from_slice(self.config.lang.as_bytes());
                    encode_frame(
                        &TelnetFrame::Subnegotiate(TelnetOption::NewEnvironment, answer),
                        &mut self.reply,
                    );
                }
            }
            other => {
                warn!("unanswerable subnegotiation for {:?}", other);
            }
        }
    }

    fn queue_naws(&mut self) {
        let mut payload = Vec::with_capacity(4);
        // Infallible on a Vec.
        let _ = payload.write_u16::<BigEndian>(self.config.columns);
        let _ = payload.write_u16::<BigEndian>(self.config.rows);
        encode_frame(
            &TelnetFrame::Subnegotiate(TelnetOption::WindowSize, BytesMut::from(&payload[..])),
            &mut self.reply,
        );
    }

    /// Records a window-size change, pushing a NAWS report when the
    /// option is active.
    pub fn resize(&mut self, columns: u16, rows: u16) {
        self.config.columns = columns;
        self.config.rows = rows;
        if self.options.local_enabled(TelnetOption::WindowSize) {
            self.queue_naws();
        }
    }

    /// Encodes outbound session data: IAC doubling plus NVT bare-CR
    /// padding. A CR at the end of the batch pads with NUL; per-call
    /// boundaries align with keystrokes and engine flushes.
    pub fn send_data(&mut self, data: &[u8], dst: &mut BytesMut) {
        let binary = self.options.binary_both_ways();
        let mut index = 0usize;
        while index < data.len() {
            let byte = data[index];
            if byte == consts::IAC {
                dst.extend_from_slice(&[consts::IAC, consts::IAC]);
            } else if byte == consts::CR && !binary {
                if data.get(index + 1) == Some(&consts::LF) {
                    dst.extend_from_slice(&[consts::CR, consts::LF]);
                    index += 2;
                    continue;
                }
                dst.extend_from_slice(&[consts::CR, consts::NUL]);
            } else {
                dst.extend_from_slice(&[byte]);
            }
            index += 1;
        }
    }

    /// Takes all queued protocol replies for the wire.
    pub fn take_reply(&mut self) -> BytesMut {
        self.reply.split()
    }

    /// True when queued protocol replies are waiting.
    #[must_use]
    pub fn has_reply(&self) -> bool {
        !self.reply.is_empty()
    }

    /// True when the far end has agreed to echo.
    #[must_use]
    pub fn remote_echo(&self) -> bool {
        self.options.remote_enabled(TelnetOption::Echo)
    }

    /// Access to the negotiation table, mainly for tests and diagnostics.
    #[must_use]
    pub fn options(&self) -> &crate::TelnetOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(machine: &mut TelnetMachine, bytes: &[u8]) -> Vec<u8> {
        bytes.iter().filter_map(|&b| machine.receive(b)).collect()
    }

    #[test]
    fn do_naws_sends_will_and_report() {
        let mut machine = TelnetMachine::new(TelnetMachineConfig {
            columns: 80,
            rows: 25,
            ..TelnetMachineConfig::default()
        });
        let data = feed(
            &mut machine,
            &[consts::IAC, consts::DO, consts::option::NAWS],
        );
        assert!(data.is_empty());
        let reply = machine.take_reply();
        assert_eq!(
            &reply[..],
            &[
                consts::IAC,
                consts::WILL,
                consts::option::NAWS,
                consts::IAC,
                consts::SB,
                consts::option::NAWS,
                0x00,
                0x50,
                0x00,
                0x19,
                consts::IAC,
                consts::SE,
            ]
        );
    }

    #[test]
    fn ttype_send_is_answered_with_name() {
        let mut machine = TelnetMachine::new(TelnetMachineConfig {
            terminal_name: String::from("XTERM"),
            ..TelnetMachineConfig::default()
        });
        feed(
            &mut machine,
            &[
                consts::IAC,
                consts::SB,
                consts::option::TTYPE,
                consts::SUB_SEND,
                consts::IAC,
                consts::SE,
            ],
        );
        let reply = machine.take_reply();
        let mut expected = vec![
            consts::IAC,
            consts::SB,
            consts::option::TTYPE,
            consts::SUB_IS,
        ];
        expected.extend_from_slice(b"XTERM");
        expected.extend_from_slice(&[consts::IAC, consts::SE]);
        assert_eq!(&reply[..], &expected[..]);
    }

    #[test]
    fn unknown_option_is_refused() {
        let mut machine = TelnetMachine::new(TelnetMachineConfig::default());
        feed(&mut machine, &[consts::IAC, consts::DO, 99]);
        let reply = machine.take_reply();
        assert_eq!(&reply[..], &[consts::IAC, consts::WONT, 99]);
    }

    #[test]
    fn cr_nul_collapses_to_cr() {
        let mut machine = TelnetMachine::new(TelnetMachineConfig::default());
        let data = feed(&mut machine, b"A\r\x00B");
        assert_eq!(data, b"A\rB");
    }

    #[test]
    fn cr_lf_passes_through() {
        let mut machine = TelnetMachine::new(TelnetMachineConfig::default());
        let data = feed(&mut machine, b"A\r\nB");
        assert_eq!(data, b"A\r\nB");
    }

    #[test]
    fn send_data_pads_bare_cr() {
        let mut machine = TelnetMachine::new(TelnetMachineConfig::default());
        let mut dst = BytesMut::new();
        machine.send_data(b"ls\r", &mut dst);
        assert_eq!(&dst[..], b"ls\r\x00");
    }

    #[test]
    fn send_data_keeps_crlf_and_doubles_iac() {
        let mut machine = TelnetMachine::new(TelnetMachineConfig::default());
        let mut dst = BytesMut::new();
        machine.send_data(&[b'a', consts::CR, consts::LF, consts::IAC], &mut dst);
        assert_eq!(
            &dst[..],
            &[b'a', consts::CR, consts::LF, consts::IAC, consts::IAC]
        );
    }

    #[test]
    fn open_requests_client_options() {
        let mut machine = TelnetMachine::new(TelnetMachineConfig::default());
        machine.open();
        let reply = machine.take_reply();
        // DO SGA, WILL SGA, DO ECHO, DO BINARY, WILL BINARY
        assert_eq!(
            &reply[..],
            &[
                consts::IAC,
                consts::DO,
                consts::option::SGA,
                consts::IAC,
                consts::WILL,
                consts::option::SGA,
                consts::IAC,
                consts::DO,
                consts::option::ECHO,
                consts::IAC,
                consts::DO,
                consts::option::BINARY,
                consts::IAC,
                consts::WILL,
                consts::option::BINARY,
            ]
        );
    }
}
