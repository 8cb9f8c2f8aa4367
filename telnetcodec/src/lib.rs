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

//! # Qodem Telnet Protocol Codec
//!
//! RFC 854 framing plus the client-side option policy a BBS terminal
//! actually needs. The crate splits into three layers:
//!
//! - [`TelnetDecoder`] / [`TelnetCodec`]: the byte-at-a-time IAC state
//!   machine. The decoder consumes one byte per call and emits at most one
//!   [`TelnetFrame`]; the codec adapts it to `tokio_util::codec` for use
//!   with `Framed` transports.
//!
//! - [`TelnetOptions`]: per-option negotiation state with loop protection,
//!   implementing the fixed policy of a terminal client: BINARY both
//!   ways, remote ECHO, SGA, and the client-answered subnegotiations
//!   TERMINAL-TYPE, NAWS, TERMINAL-SPEED and NEW-ENVIRON. Every other
//!   option is refused with DONT/WONT.
//!
//! - [`TelnetMachine`]: couples decoder and options, answers
//!   subnegotiation requests (TTYPE SEND, NEW-ENVIRON SEND, TSPEED SEND),
//!   pushes NAWS on connect and on window resize, applies NVT CR NUL
//!   rules, and accumulates all protocol replies in an outbound buffer
//!   the owning transport drains after each receive call.
//!
//! ## Protocol Details
//!
//! All Telnet commands start with IAC (0xFF):
//!
//! - 2-byte commands: `IAC <command>`
//! - 3-byte negotiation: `IAC <DO|DONT|WILL|WONT> <option>`
//! - Subnegotiation: `IAC SB <option> <data...> IAC SE`
//!
//! A literal 0xFF data byte is transmitted doubled (`IAC IAC`), inside and
//! outside subnegotiation. A bare CR in the data stream is transmitted as
//! `CR NUL` unless BINARY is active in that direction, and `CR NUL` on the
//! inbound side collapses back to a bare CR.

#![warn(
    clippy::cargo,
    missing_docs,
    clippy::pedantic,
    future_incompatible,
    rust_2018_idioms
)]
#![allow(
    clippy::option_if_let_else,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc
)]

pub mod consts;
mod codec;
mod frame;
mod machine;
mod options;
mod result;

pub use self::codec::{TelnetCodec, TelnetDecoder};
pub use self::frame::TelnetFrame;
pub use self::machine::{TelnetMachine, TelnetMachineConfig};
pub use self::options::{TelnetOption, TelnetOptions, TelnetSide};
pub use self::result::{TelnetError, TelnetResult};
