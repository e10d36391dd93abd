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

//! Top-level error type.
//!
//! [`WarrenError`] composes the error layers of the crate:
//!
//! 1. **Broker**: collaborator failures on a channel or connection ([`BrokerError`])
//! 2. **Connection**: humanized connect failures and shutdown ([`ConnectionError`])
//! 3. **Codec**: message bodies that cannot be encoded or decoded ([`CodecError`])
//! 4. **Handler**: errors raised by application message handlers
//!
//! # Examples
//!
//! ```rust
//! use warren::WarrenError;
//! use warren::connection::ConnectionError;
//!
//! let error: WarrenError = ConnectionError::InvalidCredentials.into();
//! assert!(error.is_connection_error());
//! assert!(!error.is_recoverable());
//! ```

use crate::broker::BrokerError;
use crate::connection::ConnectionError;
use crate::messaging::CodecError;
use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for messaging operations.
#[derive(Debug)]
pub enum WarrenError {
    /// No connection could be obtained.
    ///
    /// ```rust
    /// use warren::WarrenError;
    /// use warren::connection::ConnectionError;
    ///
    /// let error = WarrenError::Connection(ConnectionError::Stopped);
    /// assert_eq!(error.to_string(), "connection error: connection manager shut down");
    /// ```
    Connection(ConnectionError),

    /// A broker operation failed.
    Broker(BrokerError),

    /// A message body could not be encoded or decoded.
    Codec(CodecError),

    /// An application handler failed.
    Handler(Box<dyn StdError + Send + Sync>),
}

impl WarrenError {
    /// Returns `true` if this is a connection error.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns `true` if this is a broker error.
    #[must_use]
    pub const fn is_broker_error(&self) -> bool {
        matches!(self, Self::Broker(_))
    }

    /// Returns `true` if this is a codec error.
    #[must_use]
    pub const fn is_codec_error(&self) -> bool {
        matches!(self, Self::Codec(_))
    }

    /// Returns `true` if this is a handler error.
    #[must_use]
    pub const fn is_handler_error(&self) -> bool {
        matches!(self, Self::Handler(_))
    }

    /// Returns `true` if retrying the operation may succeed.
    ///
    /// Codec and handler errors are never recoverable at this level.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_recoverable(),
            Self::Broker(e) => e.is_recoverable(),
            Self::Codec(_) | Self::Handler(_) => false,
        }
    }
}

impl fmt::Display for WarrenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "connection error: {}", e),
            Self::Broker(e) => write!(f, "broker error: {}", e),
            Self::Codec(e) => write!(f, "codec error: {}", e),
            Self::Handler(e) => write!(f, "handler error: {}", e),
        }
    }
}

impl StdError for WarrenError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::Broker(e) => Some(e),
            Self::Codec(e) => Some(e),
            Self::Handler(e) => Some(e.as_ref()),
        }
    }
}

impl From<ConnectionError> for WarrenError {
    fn from(error: ConnectionError) -> Self {
        Self::Connection(error)
    }
}

impl From<BrokerError> for WarrenError {
    fn from(error: BrokerError) -> Self {
        Self::Broker(error)
    }
}

impl From<CodecError> for WarrenError {
    fn from(error: CodecError) -> Self {
        Self::Codec(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::JsonCodec;
    use std::io;

    fn codec_error() -> CodecError {
        JsonCodec::new().decode::<u32>(b"{").unwrap_err()
    }

    #[test]
    fn test_predicates() {
        let error = WarrenError::from(BrokerError::ConnectionReset);
        assert!(error.is_broker_error());
        assert!(!error.is_connection_error());

        let error = WarrenError::from(codec_error());
        assert!(error.is_codec_error());

        let error = WarrenError::Handler(Box::new(io::Error::other("boom")));
        assert!(error.is_handler_error());
    }

    #[test]
    fn test_is_recoverable() {
        let refused = WarrenError::from(ConnectionError::ConnectionRefused {
            address: "127.0.0.1".to_string(),
            port: 5672,
        });
        assert!(refused.is_recoverable());

        assert!(!WarrenError::from(ConnectionError::Stopped).is_recoverable());
        assert!(!WarrenError::from(codec_error()).is_recoverable());
    }

    #[test]
    fn test_display_and_source() {
        let error = WarrenError::from(ConnectionError::InvalidCredentials);
        assert_eq!(error.to_string(), "connection error: invalid login or password");
        assert!(error.source().is_some());

        let error = WarrenError::Handler(Box::new(io::Error::other("boom")));
        assert_eq!(error.to_string(), "handler error: boom");
        assert!(error.source().is_some());
    }
}
