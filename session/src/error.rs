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

use qodem_transport::TransportError;
use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors surfaced by the session layer. Transient I/O never appears
/// here, the dispatcher absorbs it; these are configuration,
/// connect-time, and file-handling failures.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Establishing the connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Capture / dump file handling failed.
    #[error("capture file error: {0}")]
    Capture(#[from] std::io::Error),

    /// A configuration value did not parse.
    #[error("bad value for {key}: {reason}")]
    BadOption {
        /// The option name.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A command arrived in a state that cannot serve it.
    #[error("command not valid while {mode}")]
    WrongMode {
        /// The current mode's name.
        mode: &'static str,
    },
}
