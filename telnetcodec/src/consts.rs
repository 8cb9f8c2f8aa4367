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

//! Telnet protocol constants (RFC 854 and friends).

/// End of subnegotiation parameters.
pub const SE: u8 = 240;
/// No operation.
pub const NOP: u8 = 241;
/// Data Mark, the sync stream marker.
pub const DM: u8 = 242;
/// Break.
pub const BRK: u8 = 243;
/// Interrupt Process.
pub const IP: u8 = 244;
/// Abort Output.
pub const AO: u8 = 245;
/// Are You There.
pub const AYT: u8 = 246;
/// Erase Character.
pub const EC: u8 = 247;
/// Erase Line.
pub const EL: u8 = 248;
/// Go Ahead.
pub const GA: u8 = 249;
/// Begin subnegotiation.
pub const SB: u8 = 250;
/// Will perform option.
pub const WILL: u8 = 251;
/// Won't perform option.
pub const WONT: u8 = 252;
/// Request other side performs option.
pub const DO: u8 = 253;
/// Request other side stops performing option.
pub const DONT: u8 = 254;
/// Interpret As Command.
pub const IAC: u8 = 255;

/// Carriage return.
pub const CR: u8 = 0x0D;
/// Line feed.
pub const LF: u8 = 0x0A;
/// NUL, the NVT bare-CR pad byte.
pub const NUL: u8 = 0x00;

/// Subnegotiation verb: here is my value.
pub const SUB_IS: u8 = 0;
/// Subnegotiation verb: send me your value.
pub const SUB_SEND: u8 = 1;

/// Option codes.
pub mod option {
    /// Binary transmission (RFC 856).
    pub const BINARY: u8 = 0;
    /// Echo (RFC 857).
    pub const ECHO: u8 = 1;
    /// Suppress Go Ahead (RFC 858).
    pub const SGA: u8 = 3;
    /// Status (RFC 859).
    pub const STATUS: u8 = 5;
    /// Timing mark (RFC 860).
    pub const TM: u8 = 6;
    /// Terminal type (RFC 1091).
    pub const TTYPE: u8 = 24;
    /// End of record (RFC 885).
    pub const EOR: u8 = 25;
    /// Negotiate About Window Size (RFC 1073).
    pub const NAWS: u8 = 31;
    /// Terminal speed (RFC 1079).
    pub const TSPEED: u8 = 32;
    /// Remote flow control (RFC 1372).
    pub const LFLOW: u8 = 33;
    /// Linemode (RFC 1184).
    pub const LINEMODE: u8 = 34;
    /// New environment (RFC 1572).
    pub const NEW_ENVIRON: u8 = 39;
}

/// NEW-ENVIRON subnegotiation codes (RFC 1572).
pub mod environ {
    /// A well-known variable follows.
    pub const VAR: u8 = 0;
    /// A value follows.
    pub const VALUE: u8 = 1;
    /// An ESC quote byte.
    pub const ESC: u8 = 2;
    /// A user-defined variable follows.
    pub const USERVAR: u8 = 3;
}
