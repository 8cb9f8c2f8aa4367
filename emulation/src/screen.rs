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

//! The display model: visible grid, cursor, modes, scroll region, and the
//! scrollback feed.
//!
//! Invariants the operations below maintain:
//!
//! - `cursor_row` is always within `[0, height)`; `cursor_col` within
//!   `[0, width)` with a separate pending-wrap flag standing in for the
//!   "column == width" state.
//! - Every visible row holds exactly `width` cells.
//! - Lines leave the top of the scroll region into the scrollback only
//!   when the region starts at row zero.

use crate::cell::{Cell, CellAttr};
use crate::scrollback::{Line, LineFlags, MAX_LINE_WIDTH, Scrollback};

/// Character sets selectable through SCS.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Charset {
    /// US ASCII (`ESC ( B`).
    #[default]
    Ascii,
    /// DEC special graphics (`ESC ( 0`).
    DecGraphics,
    /// Unmapped designators fall back to ASCII.
    Other,
}

/// Saved-cursor bundle for DECSC/DECRC.
#[derive(Clone, Copy, Debug)]
struct SavedCursor {
    row: usize,
    col: usize,
    attr: CellAttr,
    g0: Charset,
    g1: Charset,
    shift: u8,
    origin_mode: bool,
}

/// Erase extents shared by ED and EL.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EraseMode {
    /// From the cursor to the end.
    ToEnd,
    /// From the start to the cursor, inclusive.
    FromStart,
    /// Everything.
    All,
}

impl EraseMode {
    /// Maps the CSI parameter (0/1/2) onto the extent.
    #[must_use]
    pub fn from_param(param: u16) -> Option<EraseMode> {
        match param {
            0 => Some(EraseMode::ToEnd),
            1 => Some(EraseMode::FromStart),
            2 => Some(EraseMode::All),
            _ => None,
        }
    }
}

///
/// The mutable screen owned by an emulator.
///
#[derive(Debug)]
pub struct Screen {
    width: usize,
    height: usize,
    rows: Vec<Line>,
    cursor_row: usize,
    cursor_col: usize,
    pending_wrap: bool,
    attr: CellAttr,
    scroll_top: usize,
    scroll_bottom: usize,
    saved: Option<SavedCursor>,
    tabs: Vec<bool>,
    /// DECOM.
    pub origin_mode: bool,
    /// DECAWM.
    pub autowrap: bool,
    /// IRM insert/replace.
    pub insert_mode: bool,
    /// DECSCNM.
    pub reverse_video: bool,
    /// DECCKM application cursor keys.
    pub cursor_keys_application: bool,
    /// DECNKM / DECKPAM application keypad.
    pub keypad_application: bool,
    /// Keyboard LEDs 1-4 (DECLL).
    pub leds: [bool; 4],
    /// G0 designated charset.
    pub g0: Charset,
    /// G1 designated charset.
    pub g1: Charset,
    /// Active shift: 0 = G0 (SI), 1 = G1 (SO).
    pub shift: u8,
    scrollback: Scrollback,
}

impl Screen {
    /// Creates a screen of the given size with default modes.
    #[must_use]
    pub fn new(width: usize, height: usize, scrollback_max: usize) -> Screen {
        let width = width.clamp(1, MAX_LINE_WIDTH);
        let height = height.max(1);
        Screen {
            width,
            height,
            rows: (0..height).map(|_| Line::blank(width)).collect(),
            cursor_row: 0,
            cursor_col: 0,
            pending_wrap: false,
            attr: CellAttr::default(),
            scroll_top: 0,
            scroll_bottom: height - 1,
            saved: None,
            tabs: default_tabs(width),
            origin_mode: false,
            autowrap: true,
            insert_mode: false,
            reverse_video: false,
            cursor_keys_application: false,
            keypad_application: false,
            leds: [false; 4],
            g0: Charset::Ascii,
            g1: Charset::Ascii,
            shift: 0,
            scrollback: Scrollback::new(scrollback_max),
        }
    }

    /// Screen width in columns.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Screen height in rows.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Cursor row, absolute.
    #[must_use]
    pub fn cursor_row(&self) -> usize {
        self.cursor_row
    }

    /// Cursor column; equal positions with a set pending-wrap flag stand
    /// for the one-past-the-edge state.
    #[must_use]
    pub fn cursor_col(&self) -> usize {
        self.cursor_col
    }

    /// The wrap-pending flag.
    #[must_use]
    pub fn pending_wrap(&self) -> bool {
        self.pending_wrap
    }

    /// The active rendition.
    #[must_use]
    pub fn attr(&self) -> CellAttr {
        self.attr
    }

    /// Mutable access to the active rendition.
    pub fn attr_mut(&mut self) -> &mut CellAttr {
        &mut self.attr
    }

    /// Visible rows, top to bottom.
    #[must_use]
    pub fn rows(&self) -> &[Line] {
        &self.rows
    }

    /// The currently designated charset.
    #[must_use]
    pub fn active_charset(&self) -> Charset {
        if self.shift == 0 { self.g0 } else { self.g1 }
    }

    /// Scroll region top row (inclusive).
    #[must_use]
    pub fn scroll_top(&self) -> usize {
        self.scroll_top
    }

    /// Scroll region bottom row (inclusive).
    #[must_use]
    pub fn scroll_bottom(&self) -> usize {
        self.scroll_bottom
    }

    /// The retired-line history.
    #[must_use]
    pub fn scrollback(&self) -> &Scrollback {
        &self.scrollback
    }

    /// Mutable history access (cap changes, clears).
    pub fn scrollback_mut(&mut self) -> &mut Scrollback {
        &mut self.scrollback
    }

    // ===== Printing =====

    /// Writes one printable glyph at the cursor, honoring pending-wrap,
    /// insert mode, and autowrap.
    pub fn print(&mut self, glyph: char) {
        if self.pending_wrap && self.autowrap {
            self.pending_wrap = false;
            self.cursor_col = 0;
            self.index();
        }
        if self.insert_mode {
            let col = self.cursor_col;
            let width = self.width;
            let cells = self.rows[self.cursor_row].cells_mut();
            cells.insert(col, Cell::blank());
            cells.truncate(width);
        }
        let cell = Cell {
            glyph,
            attr: self.attr,
        };
        self.rows[self.cursor_row].set_cell(self.cursor_col, cell);
        if self.cursor_col + 1 >= self.width {
            if self.autowrap {
                self.pending_wrap = true;
            }
        } else {
            self.cursor_col += 1;
        }
    }

    // ===== Cursor motion =====

    /// CR.
    pub fn carriage_return(&mut self) {
        self.cursor_col = 0;
        self.pending_wrap = false;
    }

    /// LF / IND: down one row, scrolling the region at its bottom edge.
    pub fn index(&mut self) {
        self.pending_wrap = false;
        if self.cursor_row == self.scroll_bottom {
            self.scroll_region_up(1);
        } else if self.cursor_row + 1 < self.height {
            self.cursor_row += 1;
        }
    }

    /// RI: up one row, scrolling the region down at its top edge.
    pub fn reverse_index(&mut self) {
        self.pending_wrap = false;
        if self.cursor_row == self.scroll_top {
            self.scroll_region_down(1);
        } else if self.cursor_row > 0 {
            self.cursor_row -= 1;
        }
    }

    /// NEL: CR + LF.
    pub fn next_line(&mut self) {
        self.carriage_return();
        self.index();
    }

    /// BS: one column left. Stops at column zero, stops before a
    /// protected cell, and first cancels a pending wrap in place.
    pub fn backspace(&mut self) {
        if self.pending_wrap {
            self.pending_wrap = false;
            return;
        }
        if self.cursor_col == 0 {
            return;
        }
        let target = self.cursor_col - 1;
        if self.rows[self.cursor_row].cell(target).is_protected() {
            return;
        }
        self.cursor_col = target;
    }

    /// HT: advance to the next tab stop (or the last column).
    pub fn horizontal_tab(&mut self) {
        self.pending_wrap = false;
        let mut col = self.cursor_col + 1;
        while col < self.width {
            if self.tabs[col] {
                break;
            }
            col += 1;
        }
        self.cursor_col = col.min(self.width - 1);
    }

    /// HTS: set a tab stop at the cursor column.
    pub fn set_tab_stop(&mut self) {
        self.tabs[self.cursor_col] = true;
    }

    /// TBC 0: clear the tab stop at the cursor column.
    pub fn clear_tab_stop(&mut self) {
        self.tabs[self.cursor_col] = false;
    }

    /// TBC 3: clear every tab stop.
    pub fn clear_all_tab_stops(&mut self) {
        self.tabs.iter_mut().for_each(|stop| *stop = false);
    }

    /// CUU with scroll-region clamping.
    pub fn cursor_up(&mut self, count: usize) {
        self.pending_wrap = false;
        let count = count.max(1);
        let floor = if self.cursor_row >= self.scroll_top {
            self.scroll_top
        } else {
            0
        };
        self.cursor_row = self.cursor_row.saturating_sub(count).max(floor);
    }

    /// CUD with scroll-region clamping.
    pub fn cursor_down(&mut self, count: usize) {
        self.pending_wrap = false;
        let count = count.max(1);
        let ceiling = if self.cursor_row <= self.scroll_bottom {
            self.scroll_bottom
        } else {
            self.height - 1
        };
        self.cursor_row = (self.cursor_row + count).min(ceiling);
    }

    /// CUF; cancels a pending wrap.
    pub fn cursor_forward(&mut self, count: usize) {
        self.pending_wrap = false;
        let count = count.max(1);
        self.cursor_col = (self.cursor_col + count).min(self.width - 1);
    }

    /// CUB.
    pub fn cursor_back(&mut self, count: usize) {
        self.pending_wrap = false;
        let count = count.max(1);
        self.cursor_col = self.cursor_col.saturating_sub(count);
    }

    /// CUP/HVP with one-based parameters already converted to zero-based.
    /// Origin mode addresses and clamps within the scroll region.
    pub fn move_to(&mut self, row: usize, col: usize) {
        self.pending_wrap = false;
        if self.origin_mode {
            let row = (self.scroll_top + row).min(self.scroll_bottom);
            self.cursor_row = row;
        } else {
            self.cursor_row = row.min(self.height - 1);
        }
        self.cursor_col = col.min(self.width - 1);
    }

    /// CHA / HPA.
    pub fn move_to_column(&mut self, col: usize) {
        self.pending_wrap = false;
        self.cursor_col = col.min(self.width - 1);
    }

    /// VPA.
    pub fn move_to_row(&mut self, row: usize) {
        self.pending_wrap = false;
        if self.origin_mode {
            self.cursor_row = (self.scroll_top + row).min(self.scroll_bottom);
        } else {
            self.cursor_row = row.min(self.height - 1);
        }
    }

    // ===== Erase / edit =====

    /// EL.
    pub fn erase_line(&mut self, mode: EraseMode) {
        let blank = Cell::blank_with(self.attr);
        let (from, to) = match mode {
            EraseMode::ToEnd => (self.cursor_col, self.width - 1),
            EraseMode::FromStart => (0, self.cursor_col),
            EraseMode::All => (0, self.width - 1),
        };
        for col in from..=to {
            self.rows[self.cursor_row].set_cell(col, blank);
        }
    }

    /// ED.
    pub fn erase_display(&mut self, mode: EraseMode) {
        let blank = Cell::blank_with(self.attr);
        match mode {
            EraseMode::ToEnd => {
                self.erase_line(EraseMode::ToEnd);
                for row in self.cursor_row + 1..self.height {
                    fill_line(&mut self.rows[row], blank);
                }
            }
            EraseMode::FromStart => {
                for row in 0..self.cursor_row {
                    fill_line(&mut self.rows[row], blank);
                }
                self.erase_line(EraseMode::FromStart);
            }
            EraseMode::All => {
                for row in 0..self.height {
                    fill_line(&mut self.rows[row], blank);
                }
            }
        }
    }

    /// ECH: erase `count` cells at the cursor without shifting.
    pub fn erase_chars(&mut self, count: usize) {
        let blank = Cell::blank_with(self.attr);
        let count = count.max(1);
        let end = (self.cursor_col + count).min(self.width);
        for col in self.cursor_col..end {
            self.rows[self.cursor_row].set_cell(col, blank);
        }
    }

    /// ICH: shift cells right from the cursor.
    pub fn insert_chars(&mut self, count: usize) {
        let count = count.max(1).min(self.width - self.cursor_col);
        let col = self.cursor_col;
        let width = self.width;
        let cells = self.rows[self.cursor_row].cells_mut();
        for _ in 0..count {
            cells.insert(col, Cell::blank());
        }
        cells.truncate(width);
    }

    /// DCH: shift cells left into the cursor.
    pub fn delete_chars(&mut self, count: usize) {
        let count = count.max(1).min(self.width - self.cursor_col);
        let col = self.cursor_col;
        let width = self.width;
        let cells = self.rows[self.cursor_row].cells_mut();
        cells.drain(col..col + count);
        cells.resize(width, Cell::blank());
    }

    /// IL: insert blank lines at the cursor, pushing region contents down.
    /// A no-op outside the scroll region.
    pub fn insert_lines(&mut self, count: usize) {
        if self.cursor_row < self.scroll_top || self.cursor_row > self.scroll_bottom {
            return;
        }
        let count = count.max(1).min(self.scroll_bottom - self.cursor_row + 1);
        for _ in 0..count {
            self.rows.remove(self.scroll_bottom);
            self.rows.insert(self.cursor_row, Line::blank(self.width));
        }
        self.mark_region_dirty();
    }

    /// DL: delete lines at the cursor, pulling region contents up.
    pub fn delete_lines(&mut self, count: usize) {
        if self.cursor_row < self.scroll_top || self.cursor_row > self.scroll_bottom {
            return;
        }
        let count = count.max(1).min(self.scroll_bottom - self.cursor_row + 1);
        for _ in 0..count {
            self.rows.remove(self.cursor_row);
            self.rows.insert(self.scroll_bottom, Line::blank(self.width));
        }
        self.mark_region_dirty();
    }

    // ===== Scrolling =====

    /// SU: shift the scroll region up, feeding the scrollback when the
    /// region is anchored at the top of the screen.
    pub fn scroll_region_up(&mut self, count: usize) {
        let count = count.max(1).min(self.scroll_bottom - self.scroll_top + 1);
        for _ in 0..count {
            let retired = self.rows.remove(self.scroll_top);
            if self.scroll_top == 0 {
                self.scrollback.push(retired);
            }
            self.rows.insert(self.scroll_bottom, Line::blank(self.width));
        }
        self.mark_region_dirty();
    }

    /// SD: shift the scroll region down.
    pub fn scroll_region_down(&mut self, count: usize) {
        let count = count.max(1).min(self.scroll_bottom - self.scroll_top + 1);
        for _ in 0..count {
            self.rows.remove(self.scroll_bottom);
            self.rows.insert(self.scroll_top, Line::blank(self.width));
        }
        self.mark_region_dirty();
    }

    /// DECSTBM with zero-based inclusive rows. Invalid regions reset to
    /// full screen. The cursor homes per the standard.
    pub fn set_scroll_region(&mut self, top: usize, bottom: usize) {
        if top < bottom && bottom < self.height {
            self.scroll_top = top;
            self.scroll_bottom = bottom;
        } else {
            self.scroll_top = 0;
            self.scroll_bottom = self.height - 1;
        }
        let home_row = if self.origin_mode { self.scroll_top } else { 0 };
        self.cursor_row = home_row;
        self.cursor_col = 0;
        self.pending_wrap = false;
    }

    // ===== Save / restore / reset =====

    /// DECSC.
    pub fn save_cursor(&mut self) {
        self.saved = Some(SavedCursor {
            row: self.cursor_row,
            col: self.cursor_col,
            attr: self.attr,
            g0: self.g0,
            g1: self.g1,
            shift: self.shift,
            origin_mode: self.origin_mode,
        });
    }

    /// DECRC. Restoring with nothing saved homes the cursor with default
    /// attributes, per the VT100 manual.
    pub fn restore_cursor(&mut self) {
        self.pending_wrap = false;
        if let Some(saved) = self.saved {
            self.cursor_row = saved.row.min(self.height - 1);
            self.cursor_col = saved.col.min(self.width - 1);
            self.attr = saved.attr;
            self.g0 = saved.g0;
            self.g1 = saved.g1;
            self.shift = saved.shift;
            self.origin_mode = saved.origin_mode;
        } else {
            self.cursor_row = 0;
            self.cursor_col = 0;
            self.attr = CellAttr::default();
        }
    }

    /// RIS: full reset.
    pub fn reset(&mut self) {
        let scrollback_max = self.scrollback.max_lines();
        let mut fresh = Screen::new(self.width, self.height, scrollback_max);
        std::mem::swap(&mut fresh.scrollback, &mut self.scrollback);
        *self = fresh;
    }

    /// Applies line-level flags (DECDWL/DECDHL) to the cursor line.
    pub fn set_line_flags(&mut self, flags: LineFlags) {
        let line = &mut self.rows[self.cursor_row];
        line.flags.remove(
            LineFlags::DOUBLE_WIDTH | LineFlags::DOUBLE_HEIGHT_TOP | LineFlags::DOUBLE_HEIGHT_BOTTOM,
        );
        line.flags.insert(flags | LineFlags::DIRTY);
    }

    /// Resizes the grid, clamping the cursor and resetting the region.
    pub fn resize(&mut self, width: usize, height: usize) {
        let width = width.clamp(1, MAX_LINE_WIDTH);
        let height = height.max(1);
        for line in &mut self.rows {
            line.resize(width);
        }
        while self.rows.len() < height {
            self.rows.push(Line::blank(width));
        }
        self.rows.truncate(height);
        self.width = width;
        self.height = height;
        self.scroll_top = 0;
        self.scroll_bottom = height - 1;
        self.cursor_row = self.cursor_row.min(height - 1);
        self.cursor_col = self.cursor_col.min(width - 1);
        self.tabs = default_tabs(width);
        self.pending_wrap = false;
    }

    fn mark_region_dirty(&mut self) {
        for row in self.scroll_top..=self.scroll_bottom {
            self.rows[row].flags.insert(LineFlags::DIRTY);
        }
    }
}

fn fill_line(line: &mut Line, blank: Cell) {
    for col in 0..line.width() {
        line.set_cell(col, blank);
    }
}

fn default_tabs(width: usize) -> Vec<bool> {
    (0..width).map(|col| col % 8 == 0 && col != 0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen() -> Screen {
        Screen::new(10, 5, 100)
    }

    fn type_str(screen: &mut Screen, text: &str) {
        for ch in text.chars() {
            screen.print(ch);
        }
    }

    #[test]
    fn print_advances_cursor() {
        let mut s = screen();
        type_str(&mut s, "hi");
        assert_eq!(s.cursor_col(), 2);
        assert_eq!(s.rows()[0].text(), "hi");
    }

    #[test]
    fn wrap_is_deferred_until_next_printable() {
        let mut s = screen();
        type_str(&mut s, "0123456789");
        // Cursor holds at the last column with the wrap pending.
        assert_eq!(s.cursor_col(), 9);
        assert!(s.pending_wrap());
        s.print('X');
        assert_eq!(s.cursor_row(), 1);
        assert_eq!(s.cursor_col(), 1);
        assert_eq!(s.rows()[1].text(), "X");
    }

    #[test]
    fn backspace_clears_pending_wrap_in_place() {
        let mut s = screen();
        type_str(&mut s, "0123456789");
        assert!(s.pending_wrap());
        s.backspace();
        assert_eq!(s.cursor_col(), 9);
        assert!(!s.pending_wrap());
    }

    #[test]
    fn cursor_forward_cancels_pending_wrap() {
        let mut s = screen();
        type_str(&mut s, "0123456789");
        s.cursor_forward(1);
        assert!(!s.pending_wrap());
        assert_eq!(s.cursor_col(), 9);
    }

    #[test]
    fn overwrite_after_backspace() {
        let mut s = screen();
        s.print('x');
        s.backspace();
        s.print('y');
        assert_eq!(s.rows()[0].cell(0).glyph, 'y');
    }

    #[test]
    fn index_at_bottom_scrolls_into_scrollback() {
        let mut s = screen();
        type_str(&mut s, "top");
        for _ in 0..5 {
            s.index();
        }
        assert_eq!(s.cursor_row(), 4);
        assert_eq!(s.scrollback().len(), 1);
        assert_eq!(s.scrollback().iter().next().unwrap().text(), "top");
    }

    #[test]
    fn cursor_up_stops_at_region_top() {
        let mut s = screen();
        s.set_scroll_region(1, 3);
        s.move_to(2, 0);
        s.cursor_up(10);
        assert_eq!(s.cursor_row(), 1);
    }

    #[test]
    fn region_scroll_does_not_feed_scrollback() {
        let mut s = screen();
        s.set_scroll_region(1, 3);
        s.move_to(3, 0);
        s.index();
        assert_eq!(s.scrollback().len(), 0);
    }

    #[test]
    fn origin_mode_addresses_relative_to_region() {
        let mut s = screen();
        s.set_scroll_region(1, 3);
        s.origin_mode = true;
        s.move_to(0, 0);
        assert_eq!(s.cursor_row(), 1);
        s.move_to(9, 0);
        // Clamped inside the region.
        assert_eq!(s.cursor_row(), 3);
    }

    #[test]
    fn erase_line_modes() {
        let mut s = screen();
        type_str(&mut s, "abcdefghij");
        s.move_to_column(5);
        s.erase_line(EraseMode::ToEnd);
        assert_eq!(s.rows()[0].text(), "abcde");
        s.erase_line(EraseMode::FromStart);
        assert_eq!(s.rows()[0].text(), "");
    }

    #[test]
    fn insert_and_delete_chars() {
        let mut s = screen();
        type_str(&mut s, "abcdef");
        s.move_to_column(2);
        s.insert_chars(2);
        assert_eq!(s.rows()[0].text(), "ab  cdef");
        s.delete_chars(2);
        assert_eq!(s.rows()[0].text(), "abcdef");
    }

    #[test]
    fn insert_lines_respects_region() {
        let mut s = screen();
        for row in 0..5 {
            s.move_to(row, 0);
            s.print(char::from(b'a' + row as u8));
        }
        s.set_scroll_region(1, 3);
        s.move_to(1, 0);
        s.insert_lines(1);
        assert_eq!(s.rows()[0].text(), "a");
        assert_eq!(s.rows()[1].text(), "");
        assert_eq!(s.rows()[2].text(), "b");
        assert_eq!(s.rows()[3].text(), "c");
        // Row outside the region is untouched.
        assert_eq!(s.rows()[4].text(), "e");
    }

    #[test]
    fn tab_stops_every_eight() {
        let mut s = Screen::new(40, 5, 0);
        s.horizontal_tab();
        assert_eq!(s.cursor_col(), 8);
        s.horizontal_tab();
        assert_eq!(s.cursor_col(), 16);
        s.clear_all_tab_stops();
        s.move_to_column(0);
        s.horizontal_tab();
        assert_eq!(s.cursor_col(), 39);
    }

    #[test]
    fn save_restore_cursor_round_trip() {
        let mut s = screen();
        s.move_to(2, 3);
        s.attr_mut().foreground = 1;
        s.save_cursor();
        s.move_to(0, 0);
        s.attr_mut().reset();
        s.restore_cursor();
        assert_eq!((s.cursor_row(), s.cursor_col()), (2, 3));
        assert_eq!(s.attr().foreground, 1);
    }

    #[test]
    fn rows_always_full_width() {
        let mut s = screen();
        type_str(&mut s, "hello world this wraps around");
        s.insert_chars(3);
        s.delete_chars(1);
        s.scroll_region_up(2);
        for line in s.rows() {
            assert_eq!(line.width(), 10);
        }
    }
}
