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

//! The options file. Unknown keys are ignored, a missing or broken file
//! logs a warning and every option falls back to its documented default,
//! so a half-written config never blocks a connect.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Capture / dump output flavors.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureType {
    /// Text after emulator extraction, line-terminated.
    #[default]
    Normal,
    /// Bytes exactly as they crossed the transport read path.
    Raw,
    /// HTML with color spans reflecting SGR attributes.
    Html,
    /// Prompt the operator each time.
    Ask,
}

/// The recognized options, one field per key.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct QodemConfig {
    /// Seconds to wait for a dial/connect attempt.
    pub dial_timeout_secs: u64,
    /// Pause between redial attempts.
    pub between_dial_secs: u64,
    /// Exit the process when the session disconnects.
    pub exit_on_disconnect: bool,
    /// Close the session after this much idle time (0 disables).
    pub idle_timeout_secs: u64,
    /// Scrollback cap in lines (0 = unlimited).
    pub scrollback_max_lines: usize,
    /// Send the keepalive payload after this much idle time (0 off).
    pub keepalive_timeout_secs: u64,
    /// Keepalive payload, `\xNN` hex escapes allowed, at most 128 bytes.
    pub keepalive_bytes: String,
    /// Force an 80-column grid regardless of the window.
    pub assume_80_columns: bool,
    /// ENQ answerback string.
    pub enq_answerback: String,
    /// Recognize `ESC [ M` music in the ANSI emulation.
    pub ansi_music: bool,
    /// Allow animated ANSI updates to repaint eagerly.
    pub ansi_animate: bool,
    /// Honor SGR color in AVATAR's ANSI fallback.
    pub avatar_ansi_color: bool,
    /// Honor SGR color while in VT52.
    pub vt52_ansi_color: bool,
    /// Honor SGR color in VT100.
    pub vt100_ansi_color: bool,
    /// Render DECDWL double-width lines under XTerm.
    pub xterm_double_width: bool,
    /// Use the system ssh client.
    pub use_external_ssh: bool,
    /// Use the system rlogin client.
    pub use_external_rlogin: bool,
    /// Use the system telnet client.
    pub use_external_telnet: bool,
    /// Watch the console stream for the ZMODEM autostart signature.
    pub zmodem_autostart: bool,
    /// Issue ZCHALLENGE before receiving.
    pub zmodem_zchallenge: bool,
    /// Escape all control characters in ZMODEM frames.
    pub zmodem_escape_ctrl: bool,
    /// Watch the console stream for a Kermit send-init.
    pub kermit_autostart: bool,
    /// Apply the robust-filename transform.
    pub kermit_robust_filename: bool,
    /// Stream Kermit data packets without per-packet acks.
    pub kermit_streaming: bool,
    /// Negotiate Kermit long packets.
    pub kermit_long_packets: bool,
    /// Skip the text heuristic; upload binary always.
    pub kermit_uploads_force_binary: bool,
    /// Convert received Kermit text files to local line endings.
    pub kermit_downloads_convert_text: bool,
    /// Ask the receiver to append (RESEND).
    pub kermit_resend: bool,
    /// LANG reported for 8-bit emulations.
    pub iso8859_lang: String,
    /// LANG reported for UTF-8 emulations.
    pub utf8_lang: String,
    /// ASCII upload CR policy: none, strip, add.
    pub ascii_upload_cr_policy: String,
    /// ASCII upload LF policy.
    pub ascii_upload_lf_policy: String,
    /// ASCII download CR policy.
    pub ascii_download_cr_policy: String,
    /// ASCII download LF policy.
    pub ascii_download_lf_policy: String,
    /// Capture file flavor.
    pub capture_type: CaptureType,
    /// Screen dump flavor.
    pub screen_dump_type: CaptureType,
    /// Scrollback save flavor.
    pub scrollback_save_type: CaptureType,
}

impl Default for QodemConfig {
    fn default() -> Self {
        QodemConfig {
            dial_timeout_secs: 60,
            between_dial_secs: 5,
            exit_on_disconnect: false,
            idle_timeout_secs: 0,
            scrollback_max_lines: 20_000,
            keepalive_timeout_secs: 0,
            keepalive_bytes: String::new(),
            assume_80_columns: true,
            enq_answerback: String::new(),
            ansi_music: true,
            ansi_animate: false,
            avatar_ansi_color: true,
            vt52_ansi_color: true,
            vt100_ansi_color: true,
            xterm_double_width: false,
            use_external_ssh: true,
            use_external_rlogin: false,
            use_external_telnet: false,
            zmodem_autostart: true,
            zmodem_zchallenge: false,
            zmodem_escape_ctrl: false,
            kermit_autostart: true,
            kermit_robust_filename: true,
            kermit_streaming: true,
            kermit_long_packets: true,
            kermit_uploads_force_binary: false,
            kermit_downloads_convert_text: true,
            kermit_resend: false,
            iso8859_lang: String::from("en"),
            utf8_lang: String::from("en_US.UTF-8"),
            ascii_upload_cr_policy: String::from("none"),
            ascii_upload_lf_policy: String::from("none"),
            ascii_download_cr_policy: String::from("none"),
            ascii_download_lf_policy: String::from("none"),
            capture_type: CaptureType::Normal,
            screen_dump_type: CaptureType::Normal,
            scrollback_save_type: CaptureType::Normal,
        }
    }
}

impl QodemConfig {
    /// Loads the options file, falling back to defaults on any failure.
    #[must_use]
    pub fn load(path: &Path) -> QodemConfig {
        match std::fs::read_to_string(path) {
            Ok(text) => match toml::from_str(&text) {
                Ok(config) => config,
                Err(error) => {
                    warn!("config {} is malformed ({error}), using defaults", path.display());
                    QodemConfig::default()
                }
            },
            Err(error) => {
                warn!("cannot read {} ({error}), using defaults", path.display());
                QodemConfig::default()
            }
        }
    }

    /// Writes a commented default options file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let body = toml::to_string_pretty(&QodemConfig::default())
            .map_err(|error| std::io::Error::new(std::io::ErrorKind::InvalidData, error))?;
        let mut text = String::from(
            "# Qodem options file. Every key is optional; omitted keys use the\n\
             # built-in default shown here.\n\n",
        );
        text.push_str(&body);
        std::fs::write(path, text)
    }

    /// The keepalive payload with hex escapes expanded, validated.
    pub fn keepalive_payload(&self) -> Result<Vec<u8>, String> {
        parse_hex_escapes(&self.keepalive_bytes)
    }
}

/// Expands `\xNN` escapes: exactly two hex digits, case-insensitive,
/// yielding 0-255. Anything else is rejected, and the whole payload is
/// capped at 128 bytes.
pub fn parse_hex_escapes(text: &str) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('x') | Some('X') => {
                    let high = chars
                        .next()
                        .and_then(|c| c.to_digit(16))
                        .ok_or_else(|| String::from("\\x needs two hex digits"))?;
                    let low = chars
                        .next()
                        .and_then(|c| c.to_digit(16))
                        .ok_or_else(|| String::from("\\x needs two hex digits"))?;
                    out.push((high * 16 + low) as u8);
                }
                Some('\\') => out.push(b'\\'),
                Some(other) => {
                    return Err(format!("unknown escape \\{other}"));
                }
                None => return Err(String::from("trailing backslash")),
            }
        } else if ch.is_ascii() {
            out.push(ch as u8);
        } else {
            return Err(format!("non-ASCII character {ch:?} in byte string"));
        }
        if out.len() > 128 {
            return Err(String::from("byte string longer than 128 bytes"));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_documented_values() {
        let config = QodemConfig::default();
        assert_eq!(config.dial_timeout_secs, 60);
        assert_eq!(config.scrollback_max_lines, 20_000);
        assert!(config.zmodem_autostart);
        assert_eq!(config.capture_type, CaptureType::Normal);
    }

    #[test]
    fn hex_escapes_parse_strictly() {
        assert_eq!(parse_hex_escapes("\\x00").unwrap(), vec![0x00]);
        assert_eq!(parse_hex_escapes("\\xff").unwrap(), vec![0xFF]);
        // Case-insensitive digits, letters contribute ten-and-up.
        assert_eq!(parse_hex_escapes("\\xAb").unwrap(), vec![0xAB]);
        assert_eq!(parse_hex_escapes("\\x0a").unwrap(), vec![0x0A]);
        assert_eq!(parse_hex_escapes("hi\\x0d").unwrap(), b"hi\x0d".to_vec());
        assert!(parse_hex_escapes("\\x1").is_err());
        assert!(parse_hex_escapes("\\q").is_err());
        assert!(parse_hex_escapes("\\xg0").is_err());
    }

    #[test]
    fn keepalive_cap_is_128_bytes() {
        let long = "a".repeat(129);
        assert!(parse_hex_escapes(&long).is_err());
        let exact = "b".repeat(128);
        assert_eq!(parse_hex_escapes(&exact).unwrap().len(), 128);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qodemrc");
        std::fs::write(&path, "idle-timeout-secs = \"not a number\"").unwrap();
        let config = QodemConfig::load(&path);
        assert_eq!(config.idle_timeout_secs, 0);
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qodemrc");
        QodemConfig::write_default(&path).unwrap();
        let loaded = QodemConfig::load(&path);
        assert_eq!(loaded.dial_timeout_secs, QodemConfig::default().dial_timeout_secs);
        assert_eq!(loaded.utf8_lang, QodemConfig::default().utf8_lang);
    }
}
