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

//! Connection state and the live connection handle.

use crate::broker::{BrokerChannel, BrokerConnection, BrokerError};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A process-unique identifier for an established connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

/// Global counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    /// Creates a new unique connection ID.
    #[must_use]
    pub fn new() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the connection ID as a u64.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Connection({})", self.0)
    }
}

/// Handle to the connection currently held by the manager.
///
/// Handles are cheap to clone and are passed to waiters and keep-alive
/// subscribers. Once the connection reports a close the handle is stale:
/// [`open_channel`](Self::open_channel) fails and subscribers receive a new
/// handle on the next established connection.
#[derive(Clone)]
pub struct LiveConnection {
    id: ConnectionId,
    inner: Arc<dyn BrokerConnection>,
}

impl LiveConnection {
    pub(crate) fn new(inner: Arc<dyn BrokerConnection>) -> Self {
        Self {
            id: ConnectionId::new(),
            inner,
        }
    }

    /// Returns the identifier of this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Opens a channel on this connection.
    pub async fn open_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        self.inner.open_channel().await
    }

    /// Returns `true` while the underlying connection is usable.
    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    pub(crate) fn broker_connection(&self) -> &Arc<dyn BrokerConnection> {
        &self.inner
    }
}

impl PartialEq for LiveConnection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for LiveConnection {}

impl fmt::Debug for LiveConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveConnection")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .finish()
    }
}

/// State of a [`ConnectionManager`](crate::ConnectionManager).
///
/// `Connected` is the only state holding a connection, so a manager holds a
/// live connection exactly when it is connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no connect attempt in progress
    Disconnected,

    /// A connect attempt or the reconnect loop is in progress
    Connecting,

    /// Connected with the given live connection
    Connected(LiveConnection),
}

impl ConnectionState {
    /// Returns `true` in the `Connected` state.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }

    /// Returns the live connection in the `Connected` state.
    pub fn connection(&self) -> Option<&LiveConnection> {
        match self {
            Self::Connected(connection) => Some(connection),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected(connection) => write!(f, "Connected({})", connection.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Broker, MemoryBroker};
    use crate::config::ConnectionSettings;

    async fn live() -> LiveConnection {
        let broker = MemoryBroker::new();
        let connection = broker
            .connect(&ConnectionSettings::default().endpoint(30))
            .await
            .unwrap();
        LiveConnection::new(connection)
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[tokio::test]
    async fn test_state_display() {
        let connection = live().await;
        let id = connection.id();

        assert_eq!(ConnectionState::Disconnected.to_string(), "Disconnected");
        assert_eq!(ConnectionState::Connecting.to_string(), "Connecting");
        assert_eq!(
            ConnectionState::Connected(connection).to_string(),
            format!("Connected(Connection({}))", id.as_u64())
        );
    }

    #[tokio::test]
    async fn test_connected_holds_connection() {
        let connection = live().await;
        let state = ConnectionState::Connected(connection.clone());

        assert!(state.is_connected());
        assert_eq!(state.connection(), Some(&connection));
        assert!(ConnectionState::Connecting.connection().is_none());
    }

    #[tokio::test]
    async fn test_stale_handle_cannot_open_channels() {
        let connection = live().await;
        assert!(connection.open_channel().await.is_ok());

        connection.broker_connection().close().await.unwrap();
        assert!(!connection.is_open());
        assert!(connection.open_channel().await.is_err());
    }
}
