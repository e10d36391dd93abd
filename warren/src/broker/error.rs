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

//! Broker layer error types.
//!
//! Broker errors are the lowest level of the error hierarchy. They describe
//! failures reported by the broker collaborator: resolving and connecting to
//! the endpoint, losing an established connection, and channel-level
//! operations such as declaring queues or publishing.
//!
//! # Diagnostic codes
//!
//! Connect failures carry a diagnostic [`ErrorCode`] that the connection
//! manager uses to produce a human readable message:
//!
//! - `ENOTFOUND`: the host name could not be resolved
//! - `ECONNREFUSED`: the host was reached but refused the connection
//! - `ECONNRESET`: the connection was reset right after the handshake,
//!   which is how brokers reject bad credentials
//!
//! A failure without any code is *indeterminate*. Some client libraries
//! report such a failure before the real outcome of the same attempt, so the
//! backoff scheduler ignores it instead of counting it as an attempt.

use std::fmt;
use std::io;
use thiserror::Error;

/// Diagnostic code attached to a broker failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The host name could not be resolved (`ENOTFOUND`).
    HostNotFound,
    /// The host refused the connection (`ECONNREFUSED`).
    ConnectionRefused,
    /// The connection was reset by the peer (`ECONNRESET`).
    ConnectionReset,
    /// Any other code reported by the collaborator.
    Other(String),
}

impl ErrorCode {
    /// Returns the conventional code string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::HostNotFound => "ENOTFOUND",
            Self::ConnectionRefused => "ECONNREFUSED",
            Self::ConnectionReset => "ECONNRESET",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reported by the broker collaborator.
///
/// # Examples
///
/// ```rust
/// use warren::broker::{BrokerError, ErrorCode};
///
/// let error = BrokerError::ConnectionRefused {
///     address: "127.0.0.1".to_string(),
///     port: 5672,
/// };
/// assert_eq!(error.code(), Some(ErrorCode::ConnectionRefused));
/// assert!(error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The endpoint host name could not be resolved.
    #[error("getaddrinfo ENOTFOUND {host}")]
    HostNotFound {
        /// The host that failed to resolve
        host: String,
    },

    /// The endpoint was reachable but refused the connection.
    #[error("connect ECONNREFUSED {address}:{port}")]
    ConnectionRefused {
        /// Address that refused the connection
        address: String,
        /// Port that refused the connection
        port: u16,
    },

    /// The connection was reset immediately after the handshake.
    #[error("socket hang up (ECONNRESET)")]
    ConnectionReset,

    /// A failure carrying a code this crate does not interpret.
    #[error("{code}: {reason}")]
    Coded {
        /// Code reported by the collaborator
        code: String,
        /// Description of the failure
        reason: String,
    },

    /// A failure without any diagnosable code.
    #[error("indeterminate broker failure: {reason}")]
    Indeterminate {
        /// Description of the failure
        reason: String,
    },

    /// The connection is closed or was lost.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Why the connection closed
        reason: String,
    },

    /// The channel is closed.
    #[error("channel closed: {reason}")]
    ChannelClosed {
        /// Why the channel closed
        reason: String,
    },

    /// A queue or exchange referenced by an operation does not exist.
    #[error("no {kind} '{name}'")]
    NotFound {
        /// Kind of the missing entity (`queue` or `exchange`)
        kind: &'static str,
        /// Name of the missing entity
        name: String,
    },

    /// The broker rejected an operation.
    #[error("protocol error: {reason}")]
    Protocol {
        /// Description of the violation
        reason: String,
    },

    /// An unexpected I/O error occurred.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl BrokerError {
    /// Returns the diagnostic code of this error, if it has one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::HostNotFound { .. } => Some(ErrorCode::HostNotFound),
            Self::ConnectionRefused { .. } => Some(ErrorCode::ConnectionRefused),
            Self::ConnectionReset => Some(ErrorCode::ConnectionReset),
            Self::Coded { code, .. } => Some(ErrorCode::Other(code.clone())),
            Self::Io { source } => match source.kind() {
                io::ErrorKind::ConnectionRefused => Some(ErrorCode::ConnectionRefused),
                io::ErrorKind::ConnectionReset => Some(ErrorCode::ConnectionReset),
                kind => Some(ErrorCode::Other(format!("{kind:?}"))),
            },
            Self::Indeterminate { .. }
            | Self::ConnectionClosed { .. }
            | Self::ChannelClosed { .. }
            | Self::NotFound { .. }
            | Self::Protocol { .. } => None,
        }
    }

    /// Returns `false` when the failure carries nothing to diagnose.
    pub fn is_determinate(&self) -> bool {
        !matches!(self, Self::Indeterminate { .. })
    }

    /// Returns `true` if retrying the operation later may succeed.
    ///
    /// Resolution, refusal and reset failures are recoverable because the
    /// broker may come back; rejected operations on missing entities are not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::HostNotFound { .. }
            | Self::ConnectionRefused { .. }
            | Self::ConnectionReset
            | Self::Coded { .. }
            | Self::Indeterminate { .. }
            | Self::ConnectionClosed { .. }
            | Self::ChannelClosed { .. } => true,

            Self::Io { source } => !matches!(
                source.kind(),
                io::ErrorKind::InvalidInput | io::ErrorKind::PermissionDenied
            ),

            Self::NotFound { .. } | Self::Protocol { .. } => false,
        }
    }

    /// Shorthand for a closed-connection error.
    pub fn connection_closed(reason: impl Into<String>) -> Self {
        Self::ConnectionClosed {
            reason: reason.into(),
        }
    }

    /// Shorthand for a closed-channel error.
    pub fn channel_closed(reason: impl Into<String>) -> Self {
        Self::ChannelClosed {
            reason: reason.into(),
        }
    }
}

impl Clone for BrokerError {
    fn clone(&self) -> Self {
        match self {
            Self::HostNotFound { host } => Self::HostNotFound { host: host.clone() },
            Self::ConnectionRefused { address, port } => Self::ConnectionRefused {
                address: address.clone(),
                port: *port,
            },
            Self::ConnectionReset => Self::ConnectionReset,
            Self::Coded { code, reason } => Self::Coded {
                code: code.clone(),
                reason: reason.clone(),
            },
            Self::Indeterminate { reason } => Self::Indeterminate {
                reason: reason.clone(),
            },
            Self::ConnectionClosed { reason } => Self::ConnectionClosed {
                reason: reason.clone(),
            },
            Self::ChannelClosed { reason } => Self::ChannelClosed {
                reason: reason.clone(),
            },
            Self::NotFound { kind, name } => Self::NotFound {
                kind: *kind,
                name: name.clone(),
            },
            Self::Protocol { reason } => Self::Protocol {
                reason: reason.clone(),
            },
            // io::Error is not Clone; keep its kind and message.
            Self::Io { source } => Self::Io {
                source: io::Error::new(source.kind(), source.to_string()),
            },
        }
    }
}

impl From<io::Error> for BrokerError {
    fn from(error: io::Error) -> Self {
        BrokerError::Io { source: error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let error = BrokerError::HostNotFound {
            host: "rabbit.invalid".to_string(),
        };
        assert_eq!(error.code(), Some(ErrorCode::HostNotFound));
        assert_eq!(error.code().unwrap().as_str(), "ENOTFOUND");

        assert_eq!(
            BrokerError::ConnectionReset.code(),
            Some(ErrorCode::ConnectionReset)
        );

        let coded = BrokerError::Coded {
            code: "EHOSTUNREACH".to_string(),
            reason: "no route".to_string(),
        };
        assert_eq!(coded.code().unwrap().to_string(), "EHOSTUNREACH");
    }

    #[test]
    fn test_io_error_codes() {
        let refused: BrokerError = io::Error::new(io::ErrorKind::ConnectionRefused, "no").into();
        assert_eq!(refused.code(), Some(ErrorCode::ConnectionRefused));

        let reset: BrokerError = io::Error::new(io::ErrorKind::ConnectionReset, "reset").into();
        assert_eq!(reset.code(), Some(ErrorCode::ConnectionReset));
    }

    #[test]
    fn test_indeterminate_has_no_code() {
        let error = BrokerError::Indeterminate {
            reason: "callback without code".to_string(),
        };
        assert!(error.code().is_none());
        assert!(!error.is_determinate());
        assert!(BrokerError::ConnectionReset.is_determinate());
    }

    #[test]
    fn test_clone_keeps_io_kind() {
        let error: BrokerError = io::Error::new(io::ErrorKind::ConnectionReset, "reset").into();
        let copy = error.clone();
        assert_eq!(copy.code(), Some(ErrorCode::ConnectionReset));
        assert_eq!(copy.to_string(), error.to_string());
    }

    #[test]
    fn test_display_includes_offending_fields() {
        let error = BrokerError::ConnectionRefused {
            address: "127.0.0.1".to_string(),
            port: 5672,
        };
        assert_eq!(error.to_string(), "connect ECONNREFUSED 127.0.0.1:5672");

        let missing = BrokerError::NotFound {
            kind: "exchange",
            name: "events".to_string(),
        };
        assert_eq!(missing.to_string(), "no exchange 'events'");
        assert!(!missing.is_recoverable());
    }
}
