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

//! Options for the messaging patterns.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of unacknowledged deliveries per queue consumer.
pub const DEFAULT_PREFETCH: u16 = 1;

/// Default reply collection window of a broadcast.
pub const DEFAULT_BROADCAST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Options for [`Messaging::on_queue`](super::Messaging::on_queue).
///
/// # Examples
///
/// ```rust
/// use warren::messaging::QueueOptions;
///
/// let options = QueueOptions::default().with_ack().with_prefetch(10);
/// assert!(options.ack);
/// assert_eq!(options.prefetch, 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueOptions {
    /// Deliveries must be acknowledged explicitly.
    pub ack: bool,

    /// Maximum number of unacknowledged deliveries.
    pub prefetch: u16,
}

impl QueueOptions {
    /// Turns on explicit acknowledgement.
    pub fn with_ack(mut self) -> Self {
        self.ack = true;
        self
    }

    /// Sets the prefetch limit.
    pub fn with_prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            ack: false,
            prefetch: DEFAULT_PREFETCH,
        }
    }
}

/// Options for [`Messaging::broadcast_collect`](super::Messaging::broadcast_collect).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastOptions {
    /// How long replies are collected after publishing.
    pub timeout: Duration,
}

impl BroadcastOptions {
    /// Collects replies for `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for BroadcastOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_BROADCAST_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = QueueOptions::default();
        assert!(!options.ack);
        assert_eq!(options.prefetch, 1);
        assert_eq!(BroadcastOptions::default().timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_queue_options_from_partial_json() {
        let options: QueueOptions = serde_json::from_str(r#"{"ack":true}"#).unwrap();
        assert_eq!(options, QueueOptions::default().with_ack());
    }
}
