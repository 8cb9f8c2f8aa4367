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

//! Conformance checks for the VT100/ANSI path driven through the public
//! emulator interface, including the quantified cursor and row-width
//! invariants.

use proptest::prelude::*;
use qodem_emulation::{CellAttr, CellFlags, Emulation, Emulator, color};

fn emulator() -> Emulator {
    Emulator::new(Emulation::Vt100, 80, 24, 1000)
}

#[test]
fn clear_home_hello_scenario() {
    let mut emu = Emulator::new(Emulation::Ansi, 80, 25, 0);
    emu.consume(b"\x1b[2J\x1b[H\x1b[1;31mHELLO\x1b[0m");
    let screen = emu.screen();
    let expected_attr = CellAttr {
        flags: CellFlags::BOLD,
        foreground: color::RED,
        background: color::BLACK,
    };
    for (col, ch) in "HELLO".chars().enumerate() {
        let cell = screen.rows()[0].cell(col);
        assert_eq!(cell.glyph, ch);
        assert_eq!(cell.attr, expected_attr);
    }
    for (row_index, row) in screen.rows().iter().enumerate() {
        for (col_index, cell) in row.cells().iter().enumerate() {
            if row_index == 0 && col_index < 5 {
                continue;
            }
            assert_eq!(cell.glyph, ' ', "row {row_index} col {col_index}");
            assert_eq!(cell.attr, CellAttr::default());
        }
    }
}

#[test]
fn printable_backspace_printable_overwrites() {
    let mut emu = emulator();
    emu.consume(b"x\x08y");
    assert_eq!(emu.screen().rows()[0].cell(0).glyph, 'y');
    assert_eq!(emu.screen().cursor_col(), 1);
}

#[test]
fn wrap_boundary_pending_then_backspace() {
    let mut emu = emulator();
    for _ in 0..80 {
        emu.consume(b"a");
    }
    assert_eq!(emu.screen().cursor_col(), 79);
    assert!(emu.screen().pending_wrap());
    emu.consume(b"\x08");
    assert_eq!(emu.screen().cursor_col(), 79);
    assert!(!emu.screen().pending_wrap());
}

#[test]
fn cuu_does_not_leave_scroll_region() {
    let mut emu = emulator();
    emu.consume(b"\x1b[5;20r");
    // Move to the region's top line, then try to leave upward.
    emu.consume(b"\x1b[5;1H\x1b[10A");
    assert_eq!(emu.screen().cursor_row(), 4);
}

#[test]
fn scrolling_feeds_scrollback() {
    let mut emu = emulator();
    emu.consume(b"first line\r\n");
    for _ in 0..30 {
        emu.consume(b"filler\r\n");
    }
    assert!(emu.screen().scrollback().len() >= 7);
    let oldest = emu.screen().scrollback().iter().next().unwrap();
    assert_eq!(oldest.text(), "first line");
}

#[test]
fn scrollback_round_trips_as_text() {
    let mut emu = emulator();
    for index in 0..40 {
        let line = format!("line {index:02}\r\n");
        emu.consume(line.as_bytes());
    }
    let saved: Vec<String> = emu
        .screen()
        .scrollback()
        .iter()
        .map(qodem_emulation::Line::text)
        .collect();
    // Save → load in normal mode preserves text per line.
    for (offset, text) in saved.iter().enumerate() {
        assert_eq!(text, &format!("line {offset:02}"));
    }
}

proptest! {
    // Whatever bytes arrive, the cursor stays inside the grid and every
    // row keeps exactly WIDTH cells.
    #[test]
    fn cursor_and_width_invariants(bytes in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let mut emu = emulator();
        emu.consume(&bytes);
        let screen = emu.screen();
        prop_assert!(screen.cursor_row() < screen.height());
        prop_assert!(screen.cursor_col() < screen.width());
        for row in screen.rows() {
            prop_assert_eq!(row.width(), screen.width());
        }
    }

    // Printing x, backspacing, then printing y leaves y in that cell.
    #[test]
    fn backspace_overwrite_property(x in 0x20u8..0x7F, y in 0x20u8..0x7F) {
        let mut emu = emulator();
        emu.consume(&[x, 0x08, y]);
        let expected = emu.codepage().decode(y);
        prop_assert_eq!(emu.screen().rows()[0].cell(0).glyph, expected);
    }
}
