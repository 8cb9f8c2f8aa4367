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

//! The command-line surface.

use clap::Parser;
use std::path::PathBuf;

/// Process exit codes.
pub mod exit_code {
    /// Clean exit.
    pub const OK: i32 = 0;
    /// Help or version was shown.
    pub const HELP: i32 = 1;
    /// The command line did not parse.
    pub const COMMAND_LINE: i32 = 2;
    /// The event loop's selector failed permanently.
    pub const SELECT_FAILED: i32 = 3;
    /// A serial device could not be opened.
    pub const SERIAL_FAILED: i32 = 4;
    /// The locale could not be initialized.
    pub const SETLOCALE_FAILED: i32 = 5;
}

/// Qodem: BBS-era terminal emulator and connection manager.
#[derive(Debug, Parser)]
#[command(name = "qodem", version, about, disable_help_flag = false)]
pub struct CliArgs {
    /// Dial phonebook entry N on startup.
    #[arg(long, value_name = "N")]
    pub dial: Option<usize>,

    /// Connect to this host on startup.
    #[arg(long, value_name = "HOST")]
    pub connect: Option<String>,

    /// How to connect.
    #[arg(long, value_name = "METHOD", default_value = "telnet")]
    pub connect_method: String,

    /// Remote port; defaults per method.
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Login name for rlogin/ssh.
    #[arg(long, value_name = "USER", default_value = "")]
    pub username: String,

    /// Open a capture file immediately.
    #[arg(long, value_name = "FILE")]
    pub capfile: Option<PathBuf>,

    /// Write session log here.
    #[arg(long, value_name = "FILE")]
    pub logfile: Option<PathBuf>,

    /// Play this music sequence and continue.
    #[arg(long, value_name = "SEQ")]
    pub play: Option<String>,

    /// Exit after playing `--play`.
    #[arg(long)]
    pub play_exit: bool,

    /// Exit when the connection completes.
    #[arg(long)]
    pub exit_on_completion: bool,

    /// Doorway keystroke policy.
    #[arg(long, value_name = "MODE", default_value = "off")]
    pub doorway: String,

    /// Codepage for 8-bit emulations.
    #[arg(long, value_name = "CODEPAGE")]
    pub codepage: Option<String>,

    /// Terminal emulation.
    #[arg(long, value_name = "EMULATION", default_value = "ANSI")]
    pub emulation: String,

    /// Status line on or off.
    #[arg(long, value_name = "STATE", default_value = "on")]
    pub status_line: String,

    /// Initial geometry as COLSxROWS.
    #[arg(long, value_name = "COLSxROWS")]
    pub geometry: Option<String>,

    /// Options file path.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write a default options file and exit.
    #[arg(long, value_name = "FILE")]
    pub create_config: Option<PathBuf>,

    /// Download directory.
    #[arg(long, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,
}

/// Parses `COLSxROWS`.
#[must_use]
pub fn parse_geometry(text: &str) -> Option<(usize, usize)> {
    let (cols, rows) = text.split_once(['x', 'X'])?;
    let cols: usize = cols.parse().ok()?;
    let rows: usize = rows.parse().ok()?;
    if cols == 0 || rows == 0 {
        return None;
    }
    Some((cols, rows))
}

/// The default port for a connect method.
#[must_use]
pub fn default_port(method: &str) -> u16 {
    match method {
        "ssh" => 22,
        "rlogin" => 513,
        _ => 23,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_parses() {
        assert_eq!(parse_geometry("80x25"), Some((80, 25)));
        assert_eq!(parse_geometry("132X43"), Some((132, 43)));
        assert_eq!(parse_geometry("80"), None);
        assert_eq!(parse_geometry("0x25"), None);
    }

    #[test]
    fn connect_arguments_parse() {
        let args = CliArgs::parse_from([
            "qodem",
            "--connect",
            "bbs.example.com",
            "--connect-method",
            "ssh",
            "--username",
            "guest",
            "--emulation",
            "VT220",
            "--geometry",
            "132x43",
        ]);
        assert_eq!(args.connect.as_deref(), Some("bbs.example.com"));
        assert_eq!(args.connect_method, "ssh");
        assert_eq!(args.username, "guest");
        assert_eq!(args.emulation, "VT220");
        assert_eq!(parse_geometry(args.geometry.as_deref().unwrap()), Some((132, 43)));
    }

    #[test]
    fn default_ports_per_method() {
        assert_eq!(default_port("telnet"), 23);
        assert_eq!(default_port("ssh"), 22);
        assert_eq!(default_port("rlogin"), 513);
    }
}
