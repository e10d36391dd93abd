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

//! Counters for the connection manager and the messaging façade.
//!
//! Metrics are collected using atomic counters for thread-safe operation and
//! are exported to the `metrics` crate when the `observability` feature is
//! enabled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Metrics of the connection lifecycle.
///
/// # Examples
///
/// ```rust
/// use warren::observability::ConnectionMetrics;
///
/// let metrics = ConnectionMetrics::new();
/// metrics.record_established();
/// metrics.record_reconnect_attempt();
///
/// assert!(metrics.is_connected());
/// assert_eq!(metrics.total_reconnect_attempts(), 1);
/// ```
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    /// Connections established
    established: AtomicU64,
    /// Connections closed
    closed: AtomicU64,
    /// Connect or connection errors
    errors: AtomicU64,
    /// Reconnect attempts announced
    reconnect_attempts: AtomicU64,
}

impl ConnectionMetrics {
    /// Creates a new connection metrics tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a connection becoming established.
    pub fn record_established(&self) {
        self.established.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        {
            ::metrics::counter!("warren.connection.established").increment(1);
            ::metrics::gauge!("warren.connection.active").set(1.0);
        }
    }

    /// Records the live connection closing.
    pub fn record_closed(&self) {
        self.closed.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        {
            ::metrics::counter!("warren.connection.closed").increment(1);
            ::metrics::gauge!("warren.connection.active").set(0.0);
        }
    }

    /// Records a connect failure or a connection error.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        ::metrics::counter!("warren.connection.errors").increment(1);
    }

    /// Records a reconnect attempt.
    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        ::metrics::counter!("warren.connection.reconnect_attempts").increment(1);
    }

    /// Returns `true` if more connections were established than closed.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.total_established() > self.total_closed()
    }

    /// Returns the number of connections established.
    #[must_use]
    pub fn total_established(&self) -> u64 {
        self.established.load(Ordering::Relaxed)
    }

    /// Returns the number of connections closed.
    #[must_use]
    pub fn total_closed(&self) -> u64 {
        self.closed.load(Ordering::Relaxed)
    }

    /// Returns the number of errors.
    #[must_use]
    pub fn total_errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Returns the number of reconnect attempts.
    #[must_use]
    pub fn total_reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Resets all counters to zero.
    pub fn reset(&self) {
        self.established.store(0, Ordering::Relaxed);
        self.closed.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.reconnect_attempts.store(0, Ordering::Relaxed);
    }
}

/// Metrics of the messaging patterns.
///
/// # Examples
///
/// ```rust
/// use warren::observability::MessagingMetrics;
/// use std::time::Duration;
///
/// let metrics = MessagingMetrics::new();
/// metrics.record_consumed();
/// metrics.record_handled(Duration::from_millis(4));
/// metrics.record_reply_sent();
///
/// assert_eq!(metrics.total_consumed(), 1);
/// assert_eq!(metrics.average_handler_latency_us(), 4000);
/// ```
#[derive(Debug, Default)]
pub struct MessagingMetrics {
    /// Messages taken off a queue by a handler consumer
    consumed: AtomicU64,
    /// Messages whose handler returned successfully
    handled: AtomicU64,
    /// Handler errors and panics
    handler_failures: AtomicU64,
    /// Messages that could not be decoded
    decode_failures: AtomicU64,
    /// Replies published to a reply target
    replies_sent: AtomicU64,
    /// Messages acknowledged
    acked: AtomicU64,
    /// Messages negatively acknowledged
    nacked: AtomicU64,
    /// Broadcasts published
    broadcasts_sent: AtomicU64,
    /// Responses gathered by collecting broadcasts
    responses_collected: AtomicU64,
    /// Total handler latency in microseconds
    total_handler_latency_us: AtomicU64,
}

impl MessagingMetrics {
    /// Creates a new messaging metrics tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message received by a handler consumer.
    pub fn record_consumed(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        ::metrics::counter!("warren.messaging.consumed").increment(1);
    }

    /// Records a handler completing successfully after `latency`.
    pub fn record_handled(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.handled.fetch_add(1, Ordering::Relaxed);
        self.total_handler_latency_us
            .fetch_add(micros, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        {
            ::metrics::counter!("warren.messaging.handled").increment(1);
            ::metrics::histogram!("warren.messaging.handler_latency_us").record(micros as f64);
        }
    }

    /// Records a handler error or panic.
    pub fn record_handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        ::metrics::counter!("warren.messaging.handler_failures").increment(1);
    }

    /// Records a payload that could not be decoded.
    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        ::metrics::counter!("warren.messaging.decode_failures").increment(1);
    }

    /// Records a reply published to a reply target.
    pub fn record_reply_sent(&self) {
        self.replies_sent.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        ::metrics::counter!("warren.messaging.replies_sent").increment(1);
    }

    /// Records an acknowledgement.
    pub fn record_ack(&self) {
        self.acked.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        ::metrics::counter!("warren.messaging.acked").increment(1);
    }

    /// Records a negative acknowledgement.
    pub fn record_nack(&self) {
        self.nacked.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        ::metrics::counter!("warren.messaging.nacked").increment(1);
    }

    /// Records a published broadcast.
    pub fn record_broadcast(&self) {
        self.broadcasts_sent.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        ::metrics::counter!("warren.messaging.broadcasts").increment(1);
    }

    /// Records `count` responses gathered by a collecting broadcast.
    pub fn record_responses_collected(&self, count: u64) {
        self.responses_collected.fetch_add(count, Ordering::Relaxed);
        #[cfg(feature = "observability")]
        ::metrics::counter!("warren.messaging.responses_collected").increment(count);
    }

    /// Returns the number of consumed messages.
    #[must_use]
    pub fn total_consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    /// Returns the number of successfully handled messages.
    #[must_use]
    pub fn total_handled(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }

    /// Returns the number of handler failures.
    #[must_use]
    pub fn total_handler_failures(&self) -> u64 {
        self.handler_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of undecodable payloads.
    #[must_use]
    pub fn total_decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    /// Returns the number of replies sent.
    #[must_use]
    pub fn total_replies_sent(&self) -> u64 {
        self.replies_sent.load(Ordering::Relaxed)
    }

    /// Returns the number of acknowledgements.
    #[must_use]
    pub fn total_acked(&self) -> u64 {
        self.acked.load(Ordering::Relaxed)
    }

    /// Returns the number of negative acknowledgements.
    #[must_use]
    pub fn total_nacked(&self) -> u64 {
        self.nacked.load(Ordering::Relaxed)
    }

    /// Returns the number of broadcasts published.
    #[must_use]
    pub fn total_broadcasts(&self) -> u64 {
        self.broadcasts_sent.load(Ordering::Relaxed)
    }

    /// Returns the number of collected responses.
    #[must_use]
    pub fn total_responses_collected(&self) -> u64 {
        self.responses_collected.load(Ordering::Relaxed)
    }

    /// Returns the average handler latency in microseconds.
    ///
    /// Returns 0 if no handler has completed yet.
    #[must_use]
    pub fn average_handler_latency_us(&self) -> u64 {
        let handled = self.handled.load(Ordering::Relaxed);
        if handled == 0 {
            return 0;
        }
        self.total_handler_latency_us.load(Ordering::Relaxed) / handled
    }

    /// Resets all counters to zero.
    pub fn reset(&self) {
        self.consumed.store(0, Ordering::Relaxed);
        self.handled.store(0, Ordering::Relaxed);
        self.handler_failures.store(0, Ordering::Relaxed);
        self.decode_failures.store(0, Ordering::Relaxed);
        self.replies_sent.store(0, Ordering::Relaxed);
        self.acked.store(0, Ordering::Relaxed);
        self.nacked.store(0, Ordering::Relaxed);
        self.broadcasts_sent.store(0, Ordering::Relaxed);
        self.responses_collected.store(0, Ordering::Relaxed);
        self.total_handler_latency_us.store(0, Ordering::Relaxed);
    }
}
