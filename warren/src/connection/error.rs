//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
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

//! Connection manager error types.

use crate::broker::{BrokerError, ErrorCode};
use thiserror::Error;

/// Errors surfaced by the [`ConnectionManager`](crate::ConnectionManager).
///
/// Connect failures with a known diagnostic code are humanized; every other
/// broker failure passes through unchanged as [`ConnectionError::Broker`].
/// The original code stays available through [`code`](Self::code).
///
/// # Examples
///
/// ```rust
/// use warren::broker::{BrokerError, ErrorCode};
/// use warren::connection::humanize_error;
///
/// let error = humanize_error(BrokerError::ConnectionRefused {
///     address: "10.0.0.7".to_string(),
///     port: 5672,
/// });
/// assert_eq!(error.to_string(), "10.0.0.7:5672 connection refused");
/// assert_eq!(error.code(), Some(ErrorCode::ConnectionRefused));
/// ```
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    /// The broker host name could not be resolved.
    #[error("host not found: {host}")]
    HostNotFound {
        /// The host that failed to resolve
        host: String,
    },

    /// The broker host refused the connection.
    #[error("{address}:{port} connection refused")]
    ConnectionRefused {
        /// Address that refused the connection
        address: String,
        /// Port that refused the connection
        port: u16,
    },

    /// The broker reset the connection after the handshake.
    #[error("invalid login or password")]
    InvalidCredentials,

    /// Any other broker failure, unchanged.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The manager was shut down while the caller was waiting.
    #[error("connection manager shut down")]
    Stopped,
}

impl ConnectionError {
    /// Returns the diagnostic code of the underlying failure.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::HostNotFound { .. } => Some(ErrorCode::HostNotFound),
            Self::ConnectionRefused { .. } => Some(ErrorCode::ConnectionRefused),
            Self::InvalidCredentials => Some(ErrorCode::ConnectionReset),
            Self::Broker(error) => error.code(),
            Self::Stopped => None,
        }
    }

    /// Returns `true` if the error was humanized from a known code.
    pub fn is_humanized(&self) -> bool {
        matches!(
            self,
            Self::HostNotFound { .. } | Self::ConnectionRefused { .. } | Self::InvalidCredentials
        )
    }

    /// Returns `true` if a later attempt may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::HostNotFound { .. } | Self::ConnectionRefused { .. } => true,
            Self::InvalidCredentials | Self::Stopped => false,
            Self::Broker(error) => error.is_recoverable(),
        }
    }
}

/// Maps a broker failure to its human readable form.
///
/// | Code | Message |
/// |------|---------|
/// | `ENOTFOUND` | `host not found: {host}` |
/// | `ECONNREFUSED` | `{address}:{port} connection refused` |
/// | `ECONNRESET` | `invalid login or password` |
///
/// Anything else is wrapped unchanged.
pub fn humanize_error(error: BrokerError) -> ConnectionError {
    match error {
        BrokerError::HostNotFound { host } => ConnectionError::HostNotFound { host },
        BrokerError::ConnectionRefused { address, port } => {
            ConnectionError::ConnectionRefused { address, port }
        }
        BrokerError::ConnectionReset => ConnectionError::InvalidCredentials,
        other => ConnectionError::Broker(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_humanize_host_not_found() {
        let error = humanize_error(BrokerError::HostNotFound {
            host: "rabbit.invalid".to_string(),
        });
        assert_eq!(error.to_string(), "host not found: rabbit.invalid");
        assert_eq!(error.code(), Some(ErrorCode::HostNotFound));
        assert!(error.is_humanized());
    }

    #[test]
    fn test_humanize_connection_reset() {
        let error = humanize_error(BrokerError::ConnectionReset);
        assert_eq!(error.to_string(), "invalid login or password");
        assert_eq!(error.code().unwrap().as_str(), "ECONNRESET");
        assert!(!error.is_recoverable());
    }

    #[test]
    fn test_unknown_codes_pass_through() {
        let original = BrokerError::Coded {
            code: "EHOSTUNREACH".to_string(),
            reason: "no route to host".to_string(),
        };
        let message = original.to_string();

        let error = humanize_error(original);
        assert!(!error.is_humanized());
        assert_eq!(error.to_string(), message);
        assert_eq!(error.code().unwrap().as_str(), "EHOSTUNREACH");
    }

    #[test]
    fn test_stopped_has_no_code() {
        assert!(ConnectionError::Stopped.code().is_none());
    }
}
