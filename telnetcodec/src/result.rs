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

/// Result type for codec operations.
pub type TelnetResult<T> = Result<T, TelnetError>;

/// Errors the telnet codec can produce. The decoder itself is resilient
/// (malformed sequences degrade to no-ops), so these surface only from
/// I/O adaptation and from subnegotiation payloads that cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetError {
    /// An I/O error occurred on the underlying stream.
    IoError {
        /// The kind of I/O error that occurred.
        kind: std::io::ErrorKind,
        /// Description of the operation that failed.
        operation: String,
    },
    /// A subnegotiation payload was malformed.
    Subnegotiation {
        /// The option being subnegotiated.
        option: u8,
        /// What was wrong with the payload.
        reason: String,
    },
}

impl std::error::Error for TelnetError {}

impl std::fmt::Display for TelnetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelnetError::IoError { kind, operation } => {
                write!(f, "I/O error during {operation}: {kind:?}")
            }
            TelnetError::Subnegotiation { option, reason } => {
                write!(f, "subnegotiation error for option {option}: {reason}")
            }
        }
    }
}

impl From<std::io::Error> for TelnetError {
    fn from(err: std::io::Error) -> Self {
        TelnetError::IoError {
            kind: err.kind(),
            operation: err.to_string(),
        }
    }
}
