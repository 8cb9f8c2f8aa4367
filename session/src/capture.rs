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

//! Capture files, screen dumps and scrollback saves.
//!
//! `raw` records exactly the bytes that crossed the transport read path.
//! `normal` runs the stream through the shared sequence parser and keeps
//! only the text. `html` tracks SGR color runs and emits `<span>`s. The
//! capture file is owned by the session: writes are buffered and flushed
//! when dirty for more than five seconds, or on close.

use crate::config::CaptureType;
use qodem_emulation::{CellFlags, Line, Parser, Screen, Sequence, color};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

/// Dirty time after which the dispatcher flushes the capture.
pub const CAPTURE_FLUSH_AFTER: Duration = Duration::from_secs(5);

const HTML_HEADER: &str = "<html>\n<head>\n<meta charset=\"utf-8\">\n</head>\n\
                           <body bgcolor=\"black\">\n<pre style=\"color:#ababab\">";
const HTML_FOOTER: &str = "</pre>\n</body>\n</html>\n";

fn color_name(index: u8) -> &'static str {
    match index & 0x07 {
        color::BLACK => "black",
        color::RED => "red",
        color::GREEN => "green",
        color::YELLOW => "olive",
        color::BLUE => "navy",
        color::MAGENTA => "purple",
        color::CYAN => "teal",
        _ => "silver",
    }
}

///
/// An open capture file.
///
pub struct CaptureFile {
    format: CaptureType,
    writer: BufWriter<std::fs::File>,
    parser: Parser,
    dirty_since: Option<Instant>,
    html_span_open: bool,
    last_fg: u8,
}

impl CaptureFile {
    /// Opens a capture at `path` in the given format.
    pub fn open(path: &Path, format: CaptureType) -> std::io::Result<CaptureFile> {
        let file = std::fs::File::create(path)?;
        let mut capture = CaptureFile {
            format,
            writer: BufWriter::new(file),
            parser: Parser::new(false),
            dirty_since: None,
            html_span_open: false,
            last_fg: color::DEFAULT_FG,
        };
        if format == CaptureType::Html {
            capture.writer.write_all(HTML_HEADER.as_bytes())?;
        }
        Ok(capture)
    }

    /// The capture flavor.
    #[must_use]
    pub fn format(&self) -> CaptureType {
        self.format
    }

    /// Records received bytes.
    pub fn record(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        match self.format {
            CaptureType::Raw => {
                self.writer.write_all(bytes)?;
            }
            CaptureType::Normal | CaptureType::Ask => {
                for &byte in bytes {
                    match self.parser.next(byte) {
                        Some(Sequence::Print(ch)) => {
                            let mut encoded = [0u8; 4];
                            self.writer
                                .write_all(ch.encode_utf8(&mut encoded).as_bytes())?;
                        }
                        Some(Sequence::Control(0x0A)) => {
                            self.writer.write_all(b"\n")?;
                        }
                        _ => {}
                    }
                }
            }
            CaptureType::Html => {
                for &byte in bytes {
                    match self.parser.next(byte) {
                        Some(Sequence::Print(ch)) => {
                            let mut encoded = [0u8; 4];
                            write_html_escaped(
                                &mut self.writer,
                                ch.encode_utf8(&mut encoded),
                            )?;
                        }
                        Some(Sequence::Control(0x0A)) => {
                            self.writer.write_all(b"\n")?;
                        }
                        Some(Sequence::Csi(csi)) if csi.final_byte == b'm' => {
                            let fg = sgr_foreground(&csi.params, self.last_fg);
                            if fg != self.last_fg {
                                if self.html_span_open {
                                    self.writer.write_all(b"</span>")?;
                                }
                                write!(
                                    self.writer,
                                    "<span style=\"color:{}\">",
                                    color_name(fg)
                                )?;
                                self.html_span_open = true;
                                self.last_fg = fg;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
        if self.dirty_since.is_none() {
            self.dirty_since = Some(Instant::now());
        }
        Ok(())
    }

    /// Flushes when the buffer has been dirty long enough.
    pub fn flush_if_stale(&mut self) -> std::io::Result<()> {
        if self
            .dirty_since
            .is_some_and(|since| since.elapsed() >= CAPTURE_FLUSH_AFTER)
        {
            self.writer.flush()?;
            self.dirty_since = None;
        }
        Ok(())
    }

    /// Closes the capture, writing any format footer.
    pub fn close(mut self) -> std::io::Result<()> {
        if self.format == CaptureType::Html {
            if self.html_span_open {
                self.writer.write_all(b"</span>")?;
            }
            self.writer.write_all(HTML_FOOTER.as_bytes())?;
        }
        self.writer.flush()
    }
}

fn sgr_foreground(params: &[u16], current: u8) -> u8 {
    let mut fg = current;
    let params: &[u16] = if params.is_empty() { &[0] } else { params };
    for &param in params {
        match param {
            0 | 39 => fg = color::DEFAULT_FG,
            30..=37 => fg = (param - 30) as u8,
            90..=97 => fg = 8 + (param - 90) as u8,
            _ => {}
        }
    }
    fg
}

fn write_html_escaped<W: Write>(writer: &mut W, text: &str) -> std::io::Result<()> {
    for ch in text.chars() {
        match ch {
            '<' => writer.write_all(b"&lt;")?,
            '>' => writer.write_all(b"&gt;")?,
            '&' => writer.write_all(b"&amp;")?,
            other => {
                let mut encoded = [0u8; 4];
                writer.write_all(other.encode_utf8(&mut encoded).as_bytes())?;
            }
        }
    }
    Ok(())
}

/// Writes the visible screen to `path` in `normal` or `html` format.
pub fn screen_dump(screen: &Screen, format: CaptureType, path: &Path) -> std::io::Result<()> {
    write_lines(screen.rows().iter(), format, path)
}

/// Writes the scrollback plus the visible screen to `path`.
pub fn scrollback_save(screen: &Screen, format: CaptureType, path: &Path) -> std::io::Result<()> {
    write_lines(
        screen.scrollback().iter().chain(screen.rows().iter()),
        format,
        path,
    )
}

fn write_lines<'a, I: Iterator<Item = &'a Line>>(
    lines: I,
    format: CaptureType,
    path: &Path,
) -> std::io::Result<()> {
    let mut writer = BufWriter::new(std::fs::File::create(path)?);
    match format {
        CaptureType::Html => {
            writer.write_all(HTML_HEADER.as_bytes())?;
            for line in lines {
                let mut open = false;
                let mut last_fg = color::DEFAULT_FG;
                for cell in line.cells() {
                    let fg = if cell.attr.flags.contains(CellFlags::BOLD) {
                        cell.attr.foreground | 0x08
                    } else {
                        cell.attr.foreground
                    };
                    if fg != last_fg {
                        if open {
                            writer.write_all(b"</span>")?;
                        }
                        write!(writer, "<span style=\"color:{}\">", color_name(fg))?;
                        open = true;
                        last_fg = fg;
                    }
                    let mut encoded = [0u8; 4];
                    write_html_escaped(&mut writer, cell.glyph.encode_utf8(&mut encoded))?;
                }
                if open {
                    writer.write_all(b"</span>")?;
                }
                writer.write_all(b"\n")?;
            }
            writer.write_all(HTML_FOOTER.as_bytes())?;
        }
        _ => {
            for line in lines {
                writer.write_all(line.text().as_bytes())?;
                writer.write_all(b"\n")?;
            }
        }
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use qodem_emulation::{Emulation, Emulator};

    #[test]
    fn raw_capture_preserves_bytes_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cap.raw");
        let mut capture = CaptureFile::open(&path, CaptureType::Raw).unwrap();
        let bytes: Vec<u8> = (0u8..=255).collect();
        capture.record(&bytes).unwrap();
        capture.close().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn normal_capture_strips_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cap.txt");
        let mut capture = CaptureFile::open(&path, CaptureType::Normal).unwrap();
        capture.record(b"\x1b[1;31mhello\x1b[0m\r\nworld\r\n").unwrap();
        capture.close().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\nworld\n");
    }

    #[test]
    fn html_capture_colors_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cap.html");
        let mut capture = CaptureFile::open(&path, CaptureType::Html).unwrap();
        capture.record(b"\x1b[31mred\x1b[0m plain <tag>\r\n").unwrap();
        capture.close().unwrap();
        let html = std::fs::read_to_string(&path).unwrap();
        assert!(html.contains("<span style=\"color:red\">"));
        assert!(html.contains("&lt;tag&gt;"));
        assert!(html.ends_with(HTML_FOOTER));
    }

    #[test]
    fn scrollback_save_round_trips_text() {
        let mut emulator = Emulator::new(Emulation::Ansi, 40, 5, 100);
        for index in 0..12 {
            emulator.consume(format!("line {index}\r\n").as_bytes());
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scrollback.txt");
        scrollback_save(emulator.screen(), CaptureType::Normal, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        for index in 0..12 {
            assert!(text.contains(&format!("line {index}")), "line {index}");
        }
    }
}
