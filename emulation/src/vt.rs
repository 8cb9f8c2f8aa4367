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

//! Final-byte dispatch for the VT/ANSI/XTerm family. The parser framing
//! is shared; everything here is the per-sequence semantics.

use crate::cell::CellFlags;
use crate::emulator::{Emulator, EmulatorEffect, MouseMode};
use crate::parser::CsiSequence;
use crate::scrollback::LineFlags;
use crate::screen::{Charset, EraseMode};
use tracing::debug;

/// Primary device attributes: a VT220 with the common extensions.
const PRIMARY_DA: &[u8] = b"\x1b[?62;1;2;6;7;8;9c";
/// Secondary device attributes.
const SECONDARY_DA: &[u8] = b"\x1b[>1;10;0c";

/// `ESC <final>` sequences outside VT52 mode.
pub(crate) fn dispatch_escape(emu: &mut Emulator, byte: u8) {
    match byte {
        b'7' => emu.screen_mut().save_cursor(),
        b'8' => emu.screen_mut().restore_cursor(),
        b'D' => emu.screen_mut().index(),
        b'E' => emu.screen_mut().next_line(),
        b'M' => emu.screen_mut().reverse_index(),
        b'H' => emu.screen_mut().set_tab_stop(),
        b'c' => {
            emu.screen_mut().reset();
            emu.set_cursor_visible(true);
            emu.set_mouse_mode(MouseMode::Off);
            emu.set_sgr_mouse(false);
            emu.set_bracketed_paste(false);
        }
        b'=' => emu.screen_mut().keypad_application = true,
        b'>' => emu.screen_mut().keypad_application = false,
        b'Z' => emu.push_effect(EmulatorEffect::Response(PRIMARY_DA.to_vec())),
        other => {
            debug!("unhandled escape final {:?}", other as char);
        }
    }
}

/// `ESC <intermediate> <final>`: SCS designators and DEC line attributes.
pub(crate) fn dispatch_escape_intermediate(emu: &mut Emulator, intermediate: u8, final_byte: u8) {
    let screen = emu.screen_mut();
    match intermediate {
        b'(' => screen.g0 = charset_for(final_byte),
        b')' => screen.g1 = charset_for(final_byte),
        // G2/G3 designators are accepted and mapped to ASCII.
        b'*' | b'+' => {}
        b'#' => match final_byte {
            b'3' => screen.set_line_flags(LineFlags::DOUBLE_HEIGHT_TOP | LineFlags::DOUBLE_WIDTH),
            b'4' => {
                screen.set_line_flags(LineFlags::DOUBLE_HEIGHT_BOTTOM | LineFlags::DOUBLE_WIDTH);
            }
            b'5' => screen.set_line_flags(LineFlags::empty()),
            b'6' => screen.set_line_flags(LineFlags::DOUBLE_WIDTH),
            b'8' => {
                // DECALN screen alignment pattern.
                let attr = screen.attr();
                for row in 0..screen.height() {
                    screen.move_to(row, 0);
                    for _ in 0..screen.width() {
                        screen.print('E');
                    }
                }
                screen.move_to(0, 0);
                *screen.attr_mut() = attr;
            }
            other => debug!("unhandled line attribute {:?}", other as char),
        },
        other => {
            debug!(
                "unhandled escape intermediate {:?} final {:?}",
                other as char, final_byte as char
            );
        }
    }
}

fn charset_for(designator: u8) -> Charset {
    match designator {
        b'0' => Charset::DecGraphics,
        b'B' => Charset::Ascii,
        // Every other designator renders as ASCII.
        _ => Charset::Other,
    }
}

/// CSI dispatch for the whole family.
pub(crate) fn dispatch_csi(emu: &mut Emulator, csi: &CsiSequence) {
    // DECSCA carries a double-quote intermediate.
    if csi.final_byte == b'q' && csi.intermediates.contains(&b'"') {
        let protect = csi.param_raw(0) == 1;
        let attr = emu.screen_mut().attr_mut();
        attr.flags.set(CellFlags::PROTECTED, protect);
        return;
    }
    match csi.final_byte {
        b'A' => emu.screen_mut().cursor_up(csi.param(0, 1) as usize),
        b'B' => emu.screen_mut().cursor_down(csi.param(0, 1) as usize),
        b'C' => emu.screen_mut().cursor_forward(csi.param(0, 1) as usize),
        b'D' => emu.screen_mut().cursor_back(csi.param(0, 1) as usize),
        b'E' => {
            let screen = emu.screen_mut();
            screen.carriage_return();
            screen.cursor_down(csi.param(0, 1) as usize);
        }
        b'F' => {
            let screen = emu.screen_mut();
            screen.carriage_return();
            screen.cursor_up(csi.param(0, 1) as usize);
        }
        b'G' | b'`' => emu
            .screen_mut()
            .move_to_column(csi.param(0, 1) as usize - 1),
        b'H' | b'f' => {
            let row = csi.param(0, 1) as usize - 1;
            let col = csi.param(1, 1) as usize - 1;
            emu.screen_mut().move_to(row, col);
        }
        b'd' => emu.screen_mut().move_to_row(csi.param(0, 1) as usize - 1),
        b'J' => {
            if let Some(mode) = EraseMode::from_param(csi.param_raw(0)) {
                emu.screen_mut().erase_display(mode);
            }
        }
        b'K' => {
            if let Some(mode) = EraseMode::from_param(csi.param_raw(0)) {
                emu.screen_mut().erase_line(mode);
            }
        }
        b'@' => emu.screen_mut().insert_chars(csi.param(0, 1) as usize),
        b'P' => emu.screen_mut().delete_chars(csi.param(0, 1) as usize),
        b'X' => emu.screen_mut().erase_chars(csi.param(0, 1) as usize),
        b'L' => emu.screen_mut().insert_lines(csi.param(0, 1) as usize),
        b'M' => emu.screen_mut().delete_lines(csi.param(0, 1) as usize),
        b'S' => emu.screen_mut().scroll_region_up(csi.param(0, 1) as usize),
        b'T' => emu
            .screen_mut()
            .scroll_region_down(csi.param(0, 1) as usize),
        b'r' => {
            let height = emu.screen_mut().height();
            let top = csi.param(0, 1) as usize;
            let bottom = csi.param(1, height as u16) as usize;
            emu.screen_mut()
                .set_scroll_region(top.saturating_sub(1), bottom.saturating_sub(1));
        }
        b's' => emu.screen_mut().save_cursor(),
        b'u' => emu.screen_mut().restore_cursor(),
        b'm' => select_graphic_rendition(emu, csi),
        b'n' => device_status_report(emu, csi),
        b'c' => device_attributes(emu, csi),
        b'g' => match csi.param_raw(0) {
            0 => emu.screen_mut().clear_tab_stop(),
            3 => emu.screen_mut().clear_all_tab_stops(),
            other => debug!("unhandled TBC parameter {}", other),
        },
        b'h' => set_mode(emu, csi, true),
        b'l' => set_mode(emu, csi, false),
        b'q' => {
            // DECLL keyboard LEDs.
            let leds = &mut emu.screen_mut().leds;
            for &param in if csi.params.is_empty() {
                &[0][..]
            } else {
                &csi.params[..]
            } {
                match param {
                    0 => *leds = [false; 4],
                    1..=4 => leds[param as usize - 1] = true,
                    other => debug!("unhandled DECLL parameter {}", other),
                }
            }
        }
        other => {
            debug!("unhandled CSI final {:?}", other as char);
        }
    }
}

/// SGR. Bright colors land on indices 8-15.
fn select_graphic_rendition(emu: &mut Emulator, csi: &CsiSequence) {
    let params: &[u16] = if csi.params.is_empty() {
        &[0]
    } else {
        &csi.params
    };
    let attr = emu.screen_mut().attr_mut();
    let mut index = 0usize;
    while index < params.len() {
        let param = params[index];
        match param {
            0 => attr.reset(),
            1 => attr.flags.insert(CellFlags::BOLD),
            4 => attr.flags.insert(CellFlags::UNDERLINE),
            5 | 6 => attr.flags.insert(CellFlags::BLINK),
            7 => attr.flags.insert(CellFlags::REVERSE),
            8 => attr.flags.insert(CellFlags::INVISIBLE),
            22 => attr.flags.remove(CellFlags::BOLD),
            24 => attr.flags.remove(CellFlags::UNDERLINE),
            25 => attr.flags.remove(CellFlags::BLINK),
            27 => attr.flags.remove(CellFlags::REVERSE),
            28 => attr.flags.remove(CellFlags::INVISIBLE),
            30..=37 => attr.foreground = (param - 30) as u8,
            39 => attr.foreground = crate::cell::color::DEFAULT_FG,
            40..=47 => attr.background = (param - 40) as u8,
            49 => attr.background = crate::cell::color::DEFAULT_BG,
            90..=97 => attr.foreground = 8 + (param - 90) as u8,
            100..=107 => attr.background = 8 + (param - 100) as u8,
            38 | 48 => {
                // Extended color; skip its arguments, keep the index.
                let skip = match params.get(index + 1) {
                    Some(5) => 2,
                    Some(2) => 4,
                    _ => 1,
                };
                index += skip;
            }
            other => {
                debug!("unhandled SGR parameter {}", other);
            }
        }
        index += 1;
    }
}

fn device_status_report(emu: &mut Emulator, csi: &CsiSequence) {
    match csi.param_raw(0) {
        5 => emu.push_effect(EmulatorEffect::Response(b"\x1b[0n".to_vec())),
        6 => {
            let screen = emu.screen_mut();
            let row = if screen.origin_mode {
                screen.cursor_row().saturating_sub(screen.scroll_top()) + 1
            } else {
                screen.cursor_row() + 1
            };
            let col = screen.cursor_col() + 1;
            let report = format!("\x1b[{row};{col}R").into_bytes();
            emu.push_effect(EmulatorEffect::Response(report));
        }
        other => debug!("unhandled DSR parameter {}", other),
    }
}

fn device_attributes(emu: &mut Emulator, csi: &CsiSequence) {
    if csi.private == Some(b'>') {
        emu.push_effect(EmulatorEffect::Response(SECONDARY_DA.to_vec()));
    } else if csi.param_raw(0) == 0 {
        emu.push_effect(EmulatorEffect::Response(PRIMARY_DA.to_vec()));
    }
}

fn set_mode(emu: &mut Emulator, csi: &CsiSequence, enable: bool) {
    for index in 0..csi.params.len().max(1) {
        let param = csi.param_raw(index);
        if csi.is_private() {
            match param {
                1 => emu.screen_mut().cursor_keys_application = enable,
                2 => {
                    // DECANM: leaving ANSI mode drops into VT52.
                    if !enable {
                        emu.enter_vt52_mode();
                    }
                }
                3 => {
                    // DECCOLM: the grid width is owned by the session, so
                    // only the mandated clear-and-home side effect runs.
                    let screen = emu.screen_mut();
                    screen.erase_display(EraseMode::All);
                    screen.move_to(0, 0);
                }
                5 => emu.screen_mut().reverse_video = enable,
                6 => {
                    let screen = emu.screen_mut();
                    screen.origin_mode = enable;
                    screen.move_to(0, 0);
                }
                7 => emu.screen_mut().autowrap = enable,
                25 => emu.set_cursor_visible(enable),
                66 => emu.screen_mut().keypad_application = enable,
                1000 => emu.set_mouse_mode(if enable { MouseMode::Normal } else { MouseMode::Off }),
                1002 => {
                    emu.set_mouse_mode(if enable {
                        MouseMode::ButtonEvent
                    } else {
                        MouseMode::Off
                    });
                }
                1006 => emu.set_sgr_mouse(enable),
                2004 => emu.set_bracketed_paste(enable),
                other => debug!("unhandled private mode {}", other),
            }
        } else {
            match param {
                4 => emu.screen_mut().insert_mode = enable,
                other => debug!("unhandled mode {}", other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::Emulation;

    fn emulator() -> Emulator {
        Emulator::new(Emulation::Vt100, 80, 24, 0)
    }

    fn responses(emu: &mut Emulator) -> Vec<Vec<u8>> {
        emu.drain_effects()
            .into_iter()
            .filter_map(|effect| match effect {
                EmulatorEffect::Response(bytes) => Some(bytes),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn primary_da_reports_vt220_superset() {
        let mut emu = emulator();
        emu.consume(b"\x1b[c");
        assert_eq!(responses(&mut emu), vec![PRIMARY_DA.to_vec()]);
    }

    #[test]
    fn dsr_six_reports_cursor() {
        let mut emu = emulator();
        emu.consume(b"\x1b[3;7H\x1b[6n");
        assert_eq!(responses(&mut emu), vec![b"\x1b[3;7R".to_vec()]);
    }

    #[test]
    fn dsr_six_is_origin_relative() {
        let mut emu = emulator();
        emu.consume(b"\x1b[5;20r\x1b[?6h\x1b[6n");
        assert_eq!(responses(&mut emu), vec![b"\x1b[1;1R".to_vec()]);
    }

    #[test]
    fn dsr_five_reports_ok() {
        let mut emu = emulator();
        emu.consume(b"\x1b[5n");
        assert_eq!(responses(&mut emu), vec![b"\x1b[0n".to_vec()]);
    }

    #[test]
    fn sgr_bright_foreground() {
        let mut emu = emulator();
        emu.consume(b"\x1b[95mx");
        let cell = emu.screen().rows()[0].cell(0);
        assert_eq!(cell.attr.foreground, 13);
    }

    #[test]
    fn sgr_cancel_codes() {
        let mut emu = emulator();
        emu.consume(b"\x1b[1;4;5;7m\x1b[22;24;25;27mx");
        let cell = emu.screen().rows()[0].cell(0);
        assert!(cell.attr.flags.is_empty());
    }

    #[test]
    fn sgr_extended_color_is_skipped_cleanly() {
        let mut emu = emulator();
        emu.consume(b"\x1b[38;5;196;1mx");
        let cell = emu.screen().rows()[0].cell(0);
        // The 256-color argument is skipped; bold still lands.
        assert!(cell.attr.flags.contains(CellFlags::BOLD));
    }

    #[test]
    fn decstbm_homes_cursor() {
        let mut emu = emulator();
        emu.consume(b"\x1b[10;5H\x1b[2;10r");
        assert_eq!(emu.screen().cursor_row(), 0);
        assert_eq!(emu.screen().scroll_top(), 1);
        assert_eq!(emu.screen().scroll_bottom(), 9);
    }

    #[test]
    fn decawm_off_disables_wrap() {
        let mut emu = emulator();
        emu.consume(b"\x1b[?7l");
        for _ in 0..100 {
            emu.consume(b"x");
        }
        assert_eq!(emu.screen().cursor_row(), 0);
        assert_eq!(emu.screen().cursor_col(), 79);
    }

    #[test]
    fn dec_graphics_charset_maps_line_drawing() {
        let mut emu = emulator();
        emu.consume(b"\x1b(0qqq\x1b(Bq");
        assert_eq!(emu.screen().rows()[0].text(), "───q");
    }

    #[test]
    fn shift_out_selects_g1() {
        let mut emu = emulator();
        emu.consume(b"\x1b)0\x0eq\x0fq");
        assert_eq!(emu.screen().rows()[0].text(), "─q");
    }

    #[test]
    fn decaln_fills_screen() {
        let mut emu = emulator();
        emu.consume(b"\x1b#8");
        assert!(emu.screen().rows().iter().all(|row| row
            .cells()
            .iter()
            .all(|cell| cell.glyph == 'E')));
    }

    #[test]
    fn xterm_modes_toggle() {
        let mut emu = Emulator::new(Emulation::Xterm, 80, 24, 0);
        emu.consume(b"\x1b[?1000h\x1b[?1006h\x1b[?2004h");
        assert_eq!(emu.mouse_mode(), MouseMode::Normal);
        assert!(emu.sgr_mouse());
        assert!(emu.bracketed_paste());
        emu.consume(b"\x1b[?1000l\x1b[?2004l");
        assert_eq!(emu.mouse_mode(), MouseMode::Off);
        assert!(!emu.bracketed_paste());
    }

    #[test]
    fn decanm_drops_to_vt52_and_back() {
        let mut emu = emulator();
        emu.consume(b"\x1b[?2l");
        assert_eq!(emu.emulation(), Emulation::Vt52);
        emu.consume(b"\x1b<");
        assert_eq!(emu.emulation(), Emulation::Vt100);
    }

    #[test]
    fn protected_cells_block_backspace() {
        let mut emu = Emulator::new(Emulation::Vt220, 80, 24, 0);
        emu.consume(b"\x1b[1\"qA\x1b[0\"qB");
        // BS must stop before the protected 'A'.
        emu.consume(b"\x08\x08");
        assert_eq!(emu.screen().cursor_col(), 1);
    }
}
