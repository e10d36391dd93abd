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

//! Connection lifecycle events.

use super::error::ConnectionError;
use super::state::LiveConnection;

/// A lifecycle transition of a connection manager.
///
/// Events are published in the order the transitions happen. An
/// `Established` event always follows the `Closed` event of the previous
/// connection.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A connection was established.
    Established(LiveConnection),

    /// The live connection closed, by `stop`, a restart or the broker.
    Closed,

    /// A connect attempt failed or the live connection failed.
    Error(ConnectionError),

    /// A retry is about to start; the first retry is attempt 1.
    Reconnect {
        /// Retry number
        attempt: u32,
    },
}

impl ConnectionEvent {
    /// Short name of the event, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Established(_) => "connection.established",
            Self::Closed => "connection.closed",
            Self::Error(_) => "connection.error",
            Self::Reconnect { .. } => "connection.reconnect",
        }
    }

    /// Invokes the matching callback of `handler`.
    pub fn dispatch(&self, handler: &dyn ConnectionEventHandler) {
        match self {
            Self::Established(connection) => handler.on_established(connection),
            Self::Closed => handler.on_closed(),
            Self::Error(error) => handler.on_error(error),
            Self::Reconnect { attempt } => handler.on_reconnect_attempt(*attempt),
        }
    }
}

/// Callbacks for connection lifecycle events.
///
/// Every method has an empty default, so handlers implement only what they
/// observe. Callbacks run on a dedicated task and must not block.
///
/// # Examples
///
/// ```rust
/// use warren::connection::{ConnectionError, ConnectionEventHandler, LiveConnection};
///
/// struct LogHandler;
///
/// impl ConnectionEventHandler for LogHandler {
///     fn on_established(&self, connection: &LiveConnection) {
///         println!("connected: {}", connection.id());
///     }
///
///     fn on_error(&self, error: &ConnectionError) {
///         eprintln!("broker error: {error}");
///     }
/// }
/// ```
pub trait ConnectionEventHandler: Send + Sync {
    /// Called when a connection is established.
    fn on_established(&self, _connection: &LiveConnection) {}

    /// Called when the live connection closes.
    fn on_closed(&self) {}

    /// Called when a connect attempt or the live connection fails.
    fn on_error(&self, _error: &ConnectionError) {}

    /// Called before each retry of the reconnect loop.
    fn on_reconnect_attempt(&self, _attempt: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl ConnectionEventHandler for Recorder {
        fn on_closed(&self) {
            self.seen.lock().unwrap().push("closed".to_string());
        }

        fn on_error(&self, error: &ConnectionError) {
            self.seen.lock().unwrap().push(format!("error: {error}"));
        }

        fn on_reconnect_attempt(&self, attempt: u32) {
            self.seen.lock().unwrap().push(format!("reconnect #{attempt}"));
        }
    }

    #[test]
    fn test_dispatch_routes_to_callbacks() {
        let recorder = Recorder::default();

        ConnectionEvent::Reconnect { attempt: 2 }.dispatch(&recorder);
        ConnectionEvent::Error(ConnectionError::InvalidCredentials).dispatch(&recorder);
        ConnectionEvent::Closed.dispatch(&recorder);

        assert_eq!(
            *recorder.seen.lock().unwrap(),
            vec![
                "reconnect #2".to_string(),
                "error: invalid login or password".to_string(),
                "closed".to_string(),
            ]
        );
    }

    #[test]
    fn test_event_names() {
        assert_eq!(ConnectionEvent::Closed.name(), "connection.closed");
        assert_eq!(
            ConnectionEvent::Reconnect { attempt: 1 }.name(),
            "connection.reconnect"
        );
    }
}
