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

use crate::options::TelnetOption;
use bytes::BytesMut;

///
/// `TelnetFrame` is one decoded unit of the Telnet stream: a single data
/// byte, a two-byte command, a three-byte negotiation, or a complete
/// subnegotiation with its unescaped payload.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TelnetFrame {
    /// One byte of ordinary stream data (IAC IAC already collapsed).
    Data(u8),
    /// No operation.
    NoOperation,
    /// End of urgent data stream.
    DataMark,
    /// Operator pressed Break or Attention.
    Break,
    /// Interrupt the current process.
    InterruptProcess,
    /// Cancel output from the current process.
    AbortOutput,
    /// Request acknowledgment.
    AreYouThere,
    /// Erase the previous character.
    EraseCharacter,
    /// Erase the previous line.
    EraseLine,
    /// End of input for half-duplex connections.
    GoAhead,
    /// Request the remote side enable an option.
    Do(TelnetOption),
    /// Request the remote side disable an option.
    Dont(TelnetOption),
    /// Offer to enable an option locally.
    Will(TelnetOption),
    /// Refuse or disable an option locally.
    Wont(TelnetOption),
    /// A complete `IAC SB option ... IAC SE` block, payload unescaped.
    Subnegotiate(TelnetOption, BytesMut),
}
