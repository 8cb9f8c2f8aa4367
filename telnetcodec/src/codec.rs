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

use crate::{TelnetError, TelnetFrame, TelnetOption, consts};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

///
/// The byte-at-a-time Telnet framing state machine.
///
/// `TelnetDecoder` owns nothing but its state and the subnegotiation
/// accumulator; feeding it one byte with [`TelnetDecoder::push`] yields at
/// most one complete [`TelnetFrame`]. This is the piece both the
/// `tokio_util` [`TelnetCodec`] adapter and the policy-bearing
/// [`crate::TelnetMachine`] are built on.
///
/// ## States
///
/// - `NormalData`: ordinary stream bytes. IAC transitions to
///   `InterpretAsCommand`; anything else is emitted as `Data`.
/// - `InterpretAsCommand`: the byte after IAC. Two-byte commands emit
///   their frame; DO/DONT/WILL/WONT transition to the matching negotiate
///   state; SB transitions to `Subnegotiate`; IAC emits a literal 0xFF
///   data byte; unknown commands degrade to `NoOperation` with a warning.
/// - `NegotiateDo/Dont/Will/Wont`: the option byte completes the
///   three-byte negotiation.
/// - `Subnegotiate`: the option byte opens a subnegotiation.
/// - `SubnegotiateArgument(option)`: payload bytes accumulate; IAC
///   transitions to the escape state.
/// - `SubnegotiateArgumentIac(option)`: IAC IAC appends a literal 0xFF
///   and returns to the argument state; IAC SE completes the frame; any
///   other byte aborts the subnegotiation (logged, payload discarded).
///
#[derive(Debug)]
pub struct TelnetDecoder {
    state: DecoderState,
    subneg: BytesMut,
}

impl Default for TelnetDecoder {
    fn default() -> Self {
        TelnetDecoder {
            state: DecoderState::NormalData,
            subneg: BytesMut::new(),
        }
    }
}

impl TelnetDecoder {
    /// Creates a decoder in the `NormalData` state.
    #[must_use]
    pub fn new() -> TelnetDecoder {
        TelnetDecoder::default()
    }

    /// Feeds one byte, returning a complete frame when one finishes.
    pub fn push(&mut self, byte: u8) -> Option<TelnetFrame> {
        match (self.state, byte) {
            (DecoderState::NormalData, consts::IAC) => {
                self.state = DecoderState::InterpretAsCommand;
                None
            }
            (DecoderState::NormalData, _) => Some(TelnetFrame::Data(byte)),
            (DecoderState::InterpretAsCommand, consts::IAC) => {
                self.state = DecoderState::NormalData;
                Some(TelnetFrame::Data(consts::IAC))
            }
            (DecoderState::InterpretAsCommand, consts::NOP) => {
                self.state = DecoderState::NormalData;
                Some(TelnetFrame::NoOperation)
            }
            (DecoderState::InterpretAsCommand, consts::DM) => {
                self.state = DecoderState::NormalData;
                Some(TelnetFrame::DataMark)
            }
            (DecoderState::InterpretAsCommand, consts::BRK) => {
                self.state = DecoderState::NormalData;
                Some(TelnetFrame::Break)
            }
            (DecoderState::InterpretAsCommand, consts::IP) => {
                self.state = DecoderState::NormalData;
                Some(TelnetFrame::InterruptProcess)
            }
            (DecoderState::InterpretAsCommand, consts::AO) => {
                self.state = DecoderState::NormalData;
                Some(TelnetFrame::AbortOutput)
            }
            (DecoderState::InterpretAsCommand, consts::AYT) => {
                self.state = DecoderState::NormalData;
                Some(TelnetFrame::AreYouThere)
            }
            (DecoderState::InterpretAsCommand, consts::EC) => {
                self.state = DecoderState::NormalData;
                Some(TelnetFrame::EraseCharacter)
            }
            (DecoderState::InterpretAsCommand, consts::EL) => {
                self.state = DecoderState::NormalData;
                Some(TelnetFrame::EraseLine)
            }
            (DecoderState::InterpretAsCommand, consts::GA) => {
                self.state = DecoderState::NormalData;
                Some(TelnetFrame::GoAhead)
            }
            (DecoderState::InterpretAsCommand, consts::DO) => {
                self.state = DecoderState::NegotiateDo;
                None
            }
            (DecoderState::InterpretAsCommand, consts::DONT) => {
                self.state = DecoderState::NegotiateDont;
                None
            }
            (DecoderState::InterpretAsCommand, consts::WILL) => {
                self.state = DecoderState::NegotiateWill;
                None
            }
            (DecoderState::InterpretAsCommand, consts::WONT) => {
                self.state = DecoderState::NegotiateWont;
                None
            }
            (DecoderState::InterpretAsCommand, consts::SB) => {
                self.state = DecoderState::Subnegotiate;
                None
            }
            (DecoderState::InterpretAsCommand, _) => {
                warn!("received unknown telnet command {:#04X}", byte);
                self.state = DecoderState::NormalData;
                Some(TelnetFrame::NoOperation)
            }
            (DecoderState::NegotiateDo, _) => {
                self.state = DecoderState::NormalData;
                Some(TelnetFrame::Do(TelnetOption::from_u8(byte)))
            }
            (DecoderState::NegotiateDont, _) => {
                self.state = DecoderState::NormalData;
                Some(TelnetFrame::Dont(TelnetOption::from_u8(byte)))
            }
            (DecoderState::NegotiateWill, _) => {
                self.state = DecoderState::NormalData;
                Some(TelnetFrame::Will(TelnetOption::from_u8(byte)))
            }
            (DecoderState::NegotiateWont, _) => {
                self.state = DecoderState::NormalData;
                Some(TelnetFrame::Wont(TelnetOption::from_u8(byte)))
            }
            (DecoderState::Subnegotiate, _) => {
                self.state = DecoderState::SubnegotiateArgument(byte);
                None
            }
            (DecoderState::SubnegotiateArgument(option), consts::IAC) => {
                self.state = DecoderState::SubnegotiateArgumentIac(option);
                None
            }
            (DecoderState::SubnegotiateArgument(_), _) => {
                self.subneg.put_u8(byte);
                None
            }
            (DecoderState::SubnegotiateArgumentIac(option), consts::IAC) => {
                self.state = DecoderState::SubnegotiateArgument(option);
                self.subneg.put_u8(consts::IAC);
                None
            }
            (DecoderState::SubnegotiateArgumentIac(option), consts::SE) => {
                self.state = DecoderState::NormalData;
                let payload = self.subneg.split();
                Some(TelnetFrame::Subnegotiate(
                    TelnetOption::from_u8(option),
                    payload,
                ))
            }
            (DecoderState::SubnegotiateArgumentIac(_), _) => {
                warn!(
                    "unexpected command {:#04X} inside subnegotiation, aborting",
                    byte
                );
                self.state = DecoderState::NormalData;
                self.subneg.clear();
                Some(TelnetFrame::NoOperation)
            }
        }
    }
}

/// Internal decoder states; see [`TelnetDecoder`].
#[derive(Clone, Copy, Debug)]
enum DecoderState {
    /// Normal data.
    NormalData,
    /// Received IAC, next byte is a command.
    InterpretAsCommand,
    /// Received DO, next byte is the option.
    NegotiateDo,
    /// Received DONT, next byte is the option.
    NegotiateDont,
    /// Received WILL, next byte is the option.
    NegotiateWill,
    /// Received WONT, next byte is the option.
    NegotiateWont,
    /// Received SB, next byte is the option.
    Subnegotiate,
    /// Accumulating subnegotiation payload for an option.
    SubnegotiateArgument(u8),
    /// Received IAC inside a subnegotiation payload.
    SubnegotiateArgumentIac(u8),
}

///
/// `tokio_util::codec` adapter over [`TelnetDecoder`], for callers that
/// want a `Framed<TcpStream, TelnetCodec>` stream of frames. The session
/// core does not use `Framed` (its transport drives the machine
/// directly) but the adapter keeps the crate usable standalone.
///
#[derive(Debug, Default)]
pub struct TelnetCodec {
    decoder: TelnetDecoder,
}

impl TelnetCodec {
    /// Creates a new codec.
    #[must_use]
    pub fn new() -> TelnetCodec {
        TelnetCodec::default()
    }
}

impl Decoder for TelnetCodec {
    type Item = TelnetFrame;
    type Error = TelnetError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<TelnetFrame>, Self::Error> {
        while src.remaining() > 0 {
            let byte = src.get_u8();
            if let Some(frame) = self.decoder.push(byte) {
                return Ok(Some(frame));
            }
        }
        Ok(None)
    }
}

impl Encoder<TelnetFrame> for TelnetCodec {
    type Error = TelnetError;

    /// Encodes a frame. Data bytes escape IAC by doubling; subnegotiation
    /// payloads escape embedded IAC bytes the same way.
    fn encode(&mut self, item: TelnetFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&item, dst);
        Ok(())
    }
}

/// Appends the wire form of a frame to `dst`.
pub(crate) fn encode_frame(frame: &TelnetFrame, dst: &mut BytesMut) {
    match frame {
        TelnetFrame::Data(byte) => {
            dst.reserve(2);
            if *byte == consts::IAC {
                dst.put_u8(consts::IAC);
            }
            dst.put_u8(*byte);
        }
        TelnetFrame::NoOperation => put_command(dst, consts::NOP),
        TelnetFrame::DataMark => put_command(dst, consts::DM),
        TelnetFrame::Break => put_command(dst, consts::BRK),
        TelnetFrame::InterruptProcess => put_command(dst, consts::IP),
        TelnetFrame::AbortOutput => put_command(dst, consts::AO),
        TelnetFrame::AreYouThere => put_command(dst, consts::AYT),
        TelnetFrame::EraseCharacter => put_command(dst, consts::EC),
        TelnetFrame::EraseLine => put_command(dst, consts::EL),
        TelnetFrame::GoAhead => put_command(dst, consts::GA),
        TelnetFrame::Do(option) => put_negotiation(dst, consts::DO, *option),
        TelnetFrame::Dont(option) => put_negotiation(dst, consts::DONT, *option),
        TelnetFrame::Will(option) => put_negotiation(dst, consts::WILL, *option),
        TelnetFrame::Wont(option) => put_negotiation(dst, consts::WONT, *option),
        TelnetFrame::Subnegotiate(option, payload) => {
            dst.reserve(5 + payload.len() * 2);
            dst.put_u8(consts::IAC);
            dst.put_u8(consts::SB);
            dst.put_u8(option.to_u8());
            for &byte in payload.iter() {
                if byte == consts::IAC {
                    dst.put_u8(consts::IAC);
                }
                dst.put_u8(byte);
            }
            dst.put_u8(consts::IAC);
            dst.put_u8(consts::SE);
        }
    }
}

fn put_command(dst: &mut BytesMut, command: u8) {
    dst.reserve(2);
    dst.put_u8(consts::IAC);
    dst.put_u8(command);
}

fn put_negotiation(dst: &mut BytesMut, verb: u8, option: TelnetOption) {
    dst.reserve(3);
    dst.put_u8(consts::IAC);
    dst.put_u8(verb);
    dst.put_u8(option.to_u8());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_all(codec: &mut TelnetCodec, mut src: BytesMut) -> Vec<TelnetFrame> {
        let mut out = Vec::new();
        while let Some(frame) = codec.decode(&mut src).expect("decode should not error") {
            out.push(frame);
        }
        out
    }

    fn encode_one(frame: TelnetFrame) -> BytesMut {
        let mut codec = TelnetCodec::new();
        let mut dst = BytesMut::new();
        codec.encode(frame, &mut dst).expect("encode ok");
        dst
    }

    #[test]
    fn decode_plain_data() {
        let mut codec = TelnetCodec::new();
        let frames = collect_all(&mut codec, BytesMut::from(&b"Hi"[..]));
        assert_eq!(
            frames,
            vec![TelnetFrame::Data(b'H'), TelnetFrame::Data(b'i')]
        );
    }

    #[test]
    fn decode_iac_iac_yields_single_ff() {
        let mut codec = TelnetCodec::new();
        let frames = collect_all(&mut codec, BytesMut::from(&[consts::IAC, consts::IAC][..]));
        assert_eq!(frames, vec![TelnetFrame::Data(consts::IAC)]);
    }

    #[test]
    fn decode_negotiation() {
        let mut codec = TelnetCodec::new();
        let frames = collect_all(
            &mut codec,
            BytesMut::from(&[consts::IAC, consts::DO, consts::option::NAWS][..]),
        );
        assert_eq!(frames, vec![TelnetFrame::Do(TelnetOption::WindowSize)]);
    }

    #[test]
    fn decode_subnegotiation_with_escaped_iac() {
        let mut codec = TelnetCodec::new();
        let frames = collect_all(
            &mut codec,
            BytesMut::from(
                &[
                    consts::IAC,
                    consts::SB,
                    consts::option::TTYPE,
                    0x01,
                    consts::IAC,
                    consts::IAC,
                    0x03,
                    consts::IAC,
                    consts::SE,
                ][..],
            ),
        );
        assert_eq!(
            frames,
            vec![TelnetFrame::Subnegotiate(
                TelnetOption::TerminalType,
                BytesMut::from(&[0x01, consts::IAC, 0x03][..])
            )]
        );
    }

    #[test]
    fn decode_split_across_buffers() {
        let mut codec = TelnetCodec::new();
        let first = collect_all(&mut codec, BytesMut::from(&[consts::IAC][..]));
        assert!(first.is_empty());
        let second = collect_all(&mut codec, BytesMut::from(&[consts::WILL][..]));
        assert!(second.is_empty());
        let third = collect_all(&mut codec, BytesMut::from(&[consts::option::ECHO][..]));
        assert_eq!(third, vec![TelnetFrame::Will(TelnetOption::Echo)]);
    }

    #[test]
    fn decode_unknown_command_degrades_to_noop() {
        let mut codec = TelnetCodec::new();
        let frames = collect_all(&mut codec, BytesMut::from(&[consts::IAC, 0x00][..]));
        assert_eq!(frames, vec![TelnetFrame::NoOperation]);
    }

    #[test]
    fn encode_data_iac_is_doubled() {
        let dst = encode_one(TelnetFrame::Data(consts::IAC));
        assert_eq!(&dst[..], &[consts::IAC, consts::IAC]);
    }

    #[test]
    fn encode_negotiation() {
        let dst = encode_one(TelnetFrame::Wont(TelnetOption::Unknown(199)));
        assert_eq!(&dst[..], &[consts::IAC, consts::WONT, 199]);
    }

    #[test]
    fn encode_subnegotiation_escapes_iac() {
        let payload = BytesMut::from(&[0x01, consts::IAC, 0x03][..]);
        let dst = encode_one(TelnetFrame::Subnegotiate(
            TelnetOption::TerminalType,
            payload,
        ));
        assert_eq!(
            &dst[..],
            &[
                consts::IAC,
                consts::SB,
                consts::option::TTYPE,
                0x01,
                consts::IAC,
                consts::IAC,
                0x03,
                consts::IAC,
                consts::SE,
            ]
        );
    }

    #[test]
    fn round_trip_with_no_negotiation_is_identity() {
        // Telnet decode followed by encode restores the original stream
        // for any data-only traffic. 0xFF goes out doubled like a real
        // sender would transmit it.
        let original: Vec<u8> = (0u8..=255).collect();
        let mut codec = TelnetCodec::new();
        let mut wire = BytesMut::new();
        for &byte in &original {
            codec
                .encode(TelnetFrame::Data(byte), &mut wire)
                .expect("encode ok");
        }
        let mut src = wire;
        let mut decoded = Vec::new();
        while let Some(frame) = codec.decode(&mut src).expect("decode ok") {
            if let TelnetFrame::Data(byte) = frame {
                decoded.push(byte);
            }
        }
        assert_eq!(decoded, original);
    }
}
