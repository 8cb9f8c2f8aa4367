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

//! # Qodem Terminal Emulation
//!
//! The display model and the per-emulation state machines: one
//! [`Emulator`] consumes the remote byte stream and mutates a cell grid,
//! producing side effects (bell, query responses, window titles, ANSI
//! music) the session dispatcher delivers onward.
//!
//! ## Layers
//!
//! - [`Cell`]/[`CellAttr`]: one glyph with its attribute word.
//! - [`Line`]/[`Scrollback`]: rows and the bounded retired-line history.
//! - [`Screen`]: the visible grid, cursor, scroll region, tab stops, and
//!   mode flags, exposing the primitive operations (print with deferred
//!   wrap, erase, insert/delete, region scroll) the emulations compose.
//! - [`Parser`]: the shared escape-sequence framing (ESC/CSI/OSC/DCS,
//!   UTF-8 assembly, ANSI music accumulation). One parser serves every
//!   emulation; only final-byte dispatch differs.
//! - [`Emulator`]: ties the above together per [`Emulation`], from bare
//!   TTY through VT220 and XTerm to PETSCII/ATASCII and a hex-dump DEBUG
//!   view.
//! - [`keyboard`]: the reverse path, keystrokes to wire bytes.
//!
//! ## Emulation fidelity
//!
//! The VT dispatch follows the DEC manuals for the subset BBS-era hosts
//! exercise: cursor addressing with origin mode, scroll regions, erase
//! and edit operations, SGR with bright colors, charset designation with
//! DEC special graphics, DA/DSR/CPR reports, and the deferred-wrap rule
//! (a printable at the right margin sets a pending flag rather than
//! moving the cursor).

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
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation
)]

mod atascii;
mod avatar;
mod cell;
mod emulator;
pub mod keyboard;
mod parser;
mod petscii;
mod scrollback;
mod screen;
mod vt;

pub use self::cell::{Cell, CellAttr, CellFlags, color};
pub use self::emulator::{Emulation, Emulator, EmulatorConfig, EmulatorEffect, MouseMode};
pub use self::parser::{CsiSequence, MAX_CSI_PARAMS, MAX_SEQUENCE_LENGTH, Parser, Sequence};
pub use self::scrollback::{DEFAULT_SCROLLBACK_MAX, Line, LineFlags, MAX_LINE_WIDTH, Scrollback};
pub use self::screen::{Charset, EraseMode, Screen};
