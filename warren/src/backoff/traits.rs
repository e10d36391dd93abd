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

//! Backoff strategy traits and types.

use async_trait::async_trait;
use std::error::Error as StdError;
use std::time::Duration;

/// A policy deciding whether and when a failed operation is retried.
///
/// Strategies are shared between scheduler runs through an `Arc`, so they
/// keep their bookkeeping behind interior mutability.
///
/// # Examples
///
/// ```
/// use warren::backoff::{BackoffStrategy, ExponentialBackoff};
/// use std::time::Duration;
///
/// # async fn example() {
/// let strategy = ExponentialBackoff::builder()
///     .initial_delay(Duration::from_millis(100))
///     .jitter(false)
///     .build();
///
/// assert_eq!(strategy.next_delay(0).await, Duration::from_millis(100));
/// assert_eq!(strategy.next_delay(1).await, Duration::from_millis(200));
/// # }
/// ```
#[async_trait]
pub trait BackoffStrategy: Send + Sync {
    /// Determine if another attempt should be made.
    ///
    /// # Arguments
    ///
    /// * `failures` - Number of determinate failures observed so far in
    ///   this run (at least 1)
    async fn should_retry(&self, failures: u32) -> bool;

    /// Calculate the delay before retry number `retry + 1`.
    ///
    /// # Arguments
    ///
    /// * `retry` - Number of retries already made (0 before the first retry)
    async fn next_delay(&self, retry: u32) -> Duration;

    /// Called for every attempt with a determinate outcome.
    fn on_attempt(&self) {}

    /// Called when an attempt succeeds.
    fn on_success(&self);

    /// Called when an attempt fails.
    fn on_failure(&self, error: &(dyn StdError + 'static));

    /// Reset the strategy's internal state.
    fn reset(&self);

    /// Snapshot of the strategy's bookkeeping.
    fn metrics(&self) -> BackoffMetrics;

    /// Human-readable name, used for logging.
    fn name(&self) -> &str;
}

/// Bookkeeping about retried attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackoffMetrics {
    /// Total number of determinate attempts
    pub total_attempts: u64,
    /// Number of successful attempts
    pub successes: u64,
    /// Number of failed attempts
    pub failures: u64,
    /// Current consecutive failures
    pub consecutive_failures: u32,
    /// Last error encountered
    pub last_error: Option<String>,
}

impl BackoffMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an attempt.
    pub fn record_attempt(&mut self) {
        self.total_attempts += 1;
    }

    /// Record a successful attempt.
    pub fn record_success(&mut self) {
        self.successes += 1;
        self.consecutive_failures = 0;
        self.last_error = None;
    }

    /// Record a failed attempt.
    pub fn record_failure(&mut self, error: &(dyn StdError + 'static)) {
        self.failures += 1;
        self.consecutive_failures += 1;
        self.last_error = Some(error.to_string());
    }

    /// Reset all metrics.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
