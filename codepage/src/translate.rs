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

//! User translate tables and serial parity transforms.

use std::collections::BTreeMap;

/// A 256→256 byte remapping. The session keeps two of these: the input
/// table runs before the emulator sees a byte, the output table runs
/// exactly once per byte queued for the wire (the dispatcher's watermark
/// guarantees the "exactly once").
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TranslateTable {
    map: [u8; 256],
}

impl Default for TranslateTable {
    fn default() -> Self {
        TranslateTable::identity()
    }
}

impl TranslateTable {
    /// The identity table; translation disabled.
    #[must_use]
    pub fn identity() -> Self {
        let mut map = [0u8; 256];
        for (index, slot) in map.iter_mut().enumerate() {
            *slot = index as u8;
        }
        TranslateTable { map }
    }

    /// Remap a single entry.
    pub fn set(&mut self, from: u8, to: u8) {
        self.map[from as usize] = to;
    }

    /// Translate one byte.
    #[must_use]
    pub fn apply(&self, byte: u8) -> u8 {
        self.map[byte as usize]
    }

    /// Translate a buffer in place.
    pub fn apply_in_place(&self, bytes: &mut [u8]) {
        for byte in bytes {
            *byte = self.map[*byte as usize];
        }
    }

    /// True when the table is the identity.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.map.iter().enumerate().all(|(index, &to)| index as u8 == to)
    }
}

/// Sparse Unicode scalar overrides applied when a decoded scalar is
/// rendered into the cell grid.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UnicodeMap {
    overrides: BTreeMap<char, char>,
}

impl UnicodeMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        UnicodeMap::default()
    }

    /// Adds or replaces an override.
    pub fn set(&mut self, from: char, to: char) {
        self.overrides.insert(from, to);
    }

    /// Applies the override for `ch`, or returns `ch` unchanged.
    #[must_use]
    pub fn apply(&self, ch: char) -> char {
        self.overrides.get(&ch).copied().unwrap_or(ch)
    }

    /// Number of overrides present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    /// True when no overrides are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

/// Serial parity handling. Mark parity forces bit 7 on outbound bytes and
/// strips it inbound; space parity clears bit 7 outbound.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ParityMode {
    /// No parity manipulation.
    #[default]
    None,
    /// Mark parity.
    Mark,
    /// Space parity.
    Space,
}

/// Transform an outbound byte for the configured parity.
#[must_use]
pub fn apply_parity_out(mode: ParityMode, byte: u8) -> u8 {
    match mode {
        ParityMode::None => byte,
        ParityMode::Mark => byte | 0x80,
        ParityMode::Space => byte & 0x7F,
    }
}

/// Transform an inbound byte for the configured parity.
#[must_use]
pub fn apply_parity_in(mode: ParityMode, byte: u8) -> u8 {
    match mode {
        ParityMode::None | ParityMode::Space => byte,
        ParityMode::Mark => byte & 0x7F,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn identity_is_identity() {
        let table = TranslateTable::identity();
        assert!(table.is_identity());
        for byte in 0..=255u8 {
            assert_eq!(table.apply(byte), byte);
        }
    }

    #[test]
    fn set_remaps_single_entry() {
        let mut table = TranslateTable::identity();
        table.set(b'\r', 0);
        assert_eq!(table.apply(b'\r'), 0);
        assert_eq!(table.apply(b'\n'), b'\n');
        assert!(!table.is_identity());
    }

    #[test]
    fn unicode_map_overrides() {
        let mut map = UnicodeMap::new();
        map.set('─', '-');
        assert_eq!(map.apply('─'), '-');
        assert_eq!(map.apply('x'), 'x');
    }

    #[test]
    fn mark_parity_round_trip() {
        assert_eq!(apply_parity_out(ParityMode::Mark, b'A'), b'A' | 0x80);
        assert_eq!(apply_parity_in(ParityMode::Mark, b'A' | 0x80), b'A');
        assert_eq!(apply_parity_out(ParityMode::Space, 0xC1), 0x41);
    }

    proptest! {
        #[test]
        fn applying_identity_twice_is_identity(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let table = TranslateTable::identity();
            let mut once = bytes.clone();
            table.apply_in_place(&mut once);
            table.apply_in_place(&mut once);
            prop_assert_eq!(once, bytes);
        }
    }
}
