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

use crate::{TelnetFrame, consts};
use std::collections::{HashMap, HashSet};

///
/// The options a BBS terminal client negotiates. Everything else arrives
/// as [`TelnetOption::Unknown`] and is refused.
///
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TelnetOption {
    /// [`consts::option::BINARY`] Binary Transmission [RFC856](https://tools.ietf.org/html/rfc856)
    TransmitBinary,
    /// [`consts::option::ECHO`] Echo [RFC857](https://tools.ietf.org/html/rfc857)
    Echo,
    /// [`consts::option::SGA`] Suppress Go Ahead [RFC858](https://tools.ietf.org/html/rfc858)
    SuppressGoAhead,
    /// [`consts::option::TTYPE`] Terminal Type [RFC1091](http://www.iana.org/go/rfc1091)
    TerminalType,
    /// [`consts::option::NAWS`] Negotiate About Window Size [RFC1073](http://www.iana.org/go/rfc1073)
    WindowSize,
    /// [`consts::option::TSPEED`] Terminal Speed [RFC1079](http://www.iana.org/go/rfc1079)
    TerminalSpeed,
    /// [`consts::option::NEW_ENVIRON`] New Environment [RFC1572](http://www.iana.org/go/rfc1572)
    NewEnvironment,
    /// Any option this client refuses to negotiate.
    Unknown(u8),
}

impl TelnetOption {
    /// Maps a wire option code to its variant.
    #[must_use]
    pub fn from_u8(byte: u8) -> TelnetOption {
        match byte {
            consts::option::BINARY => TelnetOption::TransmitBinary,
            consts::option::ECHO => TelnetOption::Echo,
            consts::option::SGA => TelnetOption::SuppressGoAhead,
            consts::option::TTYPE => TelnetOption::TerminalType,
            consts::option::NAWS => TelnetOption::WindowSize,
            consts::option::TSPEED => TelnetOption::TerminalSpeed,
            consts::option::NEW_ENVIRON => TelnetOption::NewEnvironment,
            other => TelnetOption::Unknown(other),
        }
    }

    /// Maps the variant back to its wire option code.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        match self {
            TelnetOption::TransmitBinary => consts::option::BINARY,
            TelnetOption::Echo => consts::option::ECHO,
            TelnetOption::SuppressGoAhead => consts::option::SGA,
            TelnetOption::TerminalType => consts::option::TTYPE,
            TelnetOption::WindowSize => consts::option::NAWS,
            TelnetOption::TerminalSpeed => consts::option::TSPEED,
            TelnetOption::NewEnvironment => consts::option::NEW_ENVIRON,
            TelnetOption::Unknown(code) => code,
        }
    }
}

impl From<u8> for TelnetOption {
    fn from(byte: u8) -> Self {
        TelnetOption::from_u8(byte)
    }
}

impl From<TelnetOption> for u8 {
    fn from(option: TelnetOption) -> Self {
        option.to_u8()
    }
}

/// Which end of the connection an option state refers to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TelnetSide {
    /// This end (WILL/WONT space).
    Local,
    /// The far end (DO/DONT space).
    Remote,
}

///
/// Per-option negotiation state for a terminal client.
///
/// The policy is fixed rather than pluggable: this end is willing to
/// perform BINARY, SGA, TTYPE, NAWS, TSPEED, and NEW-ENVIRON, and wants
/// the far end to perform BINARY, ECHO, and SGA. Requests outside that set
/// are answered WONT/DONT. Loop protection follows the classic rule: an
/// acknowledgment is only sent when the request changes state, and our own
/// outstanding requests are remembered so the peer's answer is not
/// re-acknowledged.
///
#[derive(Debug, Default)]
pub struct TelnetOptions {
    local_enabled: HashMap<TelnetOption, bool>,
    remote_enabled: HashMap<TelnetOption, bool>,
    local_pending: HashSet<TelnetOption>,
    remote_pending: HashSet<TelnetOption>,
}

impl TelnetOptions {
    /// Creates a fresh table with everything disabled.
    #[must_use]
    pub fn new() -> TelnetOptions {
        TelnetOptions::default()
    }

    fn willing_local(option: TelnetOption) -> bool {
        matches!(
            option,
            TelnetOption::TransmitBinary
                | TelnetOption::SuppressGoAhead
                | TelnetOption::TerminalType
                | TelnetOption::WindowSize
                | TelnetOption::TerminalSpeed
                | TelnetOption::NewEnvironment
        )
    }

    fn wanted_remote(option: TelnetOption) -> bool {
        matches!(
            option,
            TelnetOption::TransmitBinary | TelnetOption::Echo | TelnetOption::SuppressGoAhead
        )
    }

    /// True when the option is active on this side.
    #[must_use]
    pub fn local_enabled(&self, option: TelnetOption) -> bool {
        self.local_enabled.get(&option).copied().unwrap_or(false)
    }

    /// True when the option is active on the far side.
    #[must_use]
    pub fn remote_enabled(&self, option: TelnetOption) -> bool {
        self.remote_enabled.get(&option).copied().unwrap_or(false)
    }

    /// True when BINARY is active in both directions, which switches off
    /// NVT CR NUL padding.
    #[must_use]
    pub fn binary_both_ways(&self) -> bool {
        self.local_enabled(TelnetOption::TransmitBinary)
            && self.remote_enabled(TelnetOption::TransmitBinary)
    }

    /// Asks the far end to enable an option (sends DO unless already
    /// enabled or already asked).
    pub fn request_remote(&mut self, option: TelnetOption) -> Option<TelnetFrame> {
        if self.remote_enabled(option) || self.remote_pending.contains(&option) {
            return None;
        }
        self.remote_pending.insert(option);
        Some(TelnetFrame::Do(option))
    }

    /// Offers to enable an option on this side (sends WILL unless already
    /// enabled or already offered).
    pub fn offer_local(&mut self, option: TelnetOption) -> Option<TelnetFrame> {
        if self.local_enabled(option) || self.local_pending.contains(&option) {
            return None;
        }
        self.local_pending.insert(option);
        Some(TelnetFrame::Will(option))
    }

    /// Handles a received DO, returning the reply to send (if any) and
    /// whether the local state changed.
    pub fn handle_do(&mut self, option: TelnetOption) -> (Option<TelnetFrame>, bool) {
        if self.local_pending.remove(&option) {
            // Peer confirmed our earlier WILL; no ack of an ack.
            self.local_enabled.insert(option, true);
            return (None, true);
        }
        if self.local_enabled(option) {
            return (None, false);
        }
        if Self::willing_local(option) {
            self.local_enabled.insert(option, true);
            (Some(TelnetFrame::Will(option)), true)
        } else {
            (Some(TelnetFrame::Wont(option)), false)
        }
    }

    /// Handles a received DONT.
    pub fn handle_dont(&mut self, option: TelnetOption) -> (Option<TelnetFrame>, bool) {
        let was_pending = self.local_pending.remove(&option);
        if self.local_enabled(option) {
            self.local_enabled.insert(option, false);
            (Some(TelnetFrame::Wont(option)), true)
        } else if was_pending {
            // Our WILL was refused.
            (None, false)
        } else {
            (None, false)
        }
    }

    /// Handles a received WILL.
    pub fn handle_will(&mut self, option: TelnetOption) -> (Option<TelnetFrame>, bool) {
        if self.remote_pending.remove(&option) {
            self.remote_enabled.insert(option, true);
            return (None, true);
        }
        if self.remote_enabled(option) {
            return (None, false);
        }
        if Self::wanted_remote(option) {
            self.remote_enabled.insert(option, true);
            (Some(TelnetFrame::Do(option)), true)
        } else {
            (Some(TelnetFrame::Dont(option)), false)
        }
    }

    /// Handles a received WONT.
    pub fn handle_wont(&mut self, option: TelnetOption) -> (Option<TelnetFrame>, bool) {
        let was_pending = self.remote_pending.remove(&option);
        if self.remote_enabled(option) {
            self.remote_enabled.insert(option, false);
            (Some(TelnetFrame::Dont(option)), true)
        } else if was_pending {
            (None, false)
        } else {
            (None, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn do_supported_option_answers_will() {
        let mut options = TelnetOptions::new();
        let (reply, changed) = options.handle_do(TelnetOption::WindowSize);
        assert_eq!(reply, Some(TelnetFrame::Will(TelnetOption::WindowSize)));
        assert!(changed);
        assert!(options.local_enabled(TelnetOption::WindowSize));
    }

    #[test]
    fn do_unsupported_option_answers_wont() {
        let mut options = TelnetOptions::new();
        let (reply, changed) = options.handle_do(TelnetOption::Unknown(200));
        assert_eq!(reply, Some(TelnetFrame::Wont(TelnetOption::Unknown(200))));
        assert!(!changed);
    }

    #[test]
    fn will_echo_is_accepted() {
        let mut options = TelnetOptions::new();
        let (reply, changed) = options.handle_will(TelnetOption::Echo);
        assert_eq!(reply, Some(TelnetFrame::Do(TelnetOption::Echo)));
        assert!(changed);
        assert!(options.remote_enabled(TelnetOption::Echo));
    }

    #[test]
    fn duplicate_do_is_not_reacknowledged() {
        let mut options = TelnetOptions::new();
        let (first, _) = options.handle_do(TelnetOption::SuppressGoAhead);
        assert!(first.is_some());
        let (second, changed) = options.handle_do(TelnetOption::SuppressGoAhead);
        assert_eq!(second, None);
        assert!(!changed);
    }

    #[test]
    fn confirmation_of_our_request_is_silent() {
        let mut options = TelnetOptions::new();
        let request = options.request_remote(TelnetOption::Echo);
        assert_eq!(request, Some(TelnetFrame::Do(TelnetOption::Echo)));
        // The peer answers WILL; we must not answer DO again.
        let (reply, changed) = options.handle_will(TelnetOption::Echo);
        assert_eq!(reply, None);
        assert!(changed);
        assert!(options.remote_enabled(TelnetOption::Echo));
    }

    #[test]
    fn binary_both_ways_requires_both_directions() {
        let mut options = TelnetOptions::new();
        options.handle_do(TelnetOption::TransmitBinary);
        assert!(!options.binary_both_ways());
        options.handle_will(TelnetOption::TransmitBinary);
        assert!(options.binary_both_ways());
    }

    #[test]
    fn wont_disables_remote_option() {
        let mut options = TelnetOptions::new();
        options.handle_will(TelnetOption::Echo);
        let (reply, changed) = options.handle_wont(TelnetOption::Echo);
        assert_eq!(reply, Some(TelnetFrame::Dont(TelnetOption::Echo)));
        assert!(changed);
        assert!(!options.remote_enabled(TelnetOption::Echo));
    }
}
