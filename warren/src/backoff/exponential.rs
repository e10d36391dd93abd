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

//! Exponential backoff strategy.
//!
//! The delay before retry `n` (0-indexed) is `initial_delay * multiplier^n`,
//! capped at `max_delay`. With the defaults the reconnect loop waits 100 ms,
//! 200 ms, 400 ms, ... up to 10 s between attempts.

use super::traits::{BackoffMetrics, BackoffStrategy};
use async_trait::async_trait;
use std::error::Error as StdError;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Exponential backoff strategy.
///
/// Jitter is off by default so that delays are deterministic; enable it when
/// many clients reconnect to the same broker at once.
///
/// # Examples
///
/// ```
/// use warren::backoff::ExponentialBackoff;
/// use std::time::Duration;
///
/// // Default configuration: 100 ms, doubling, capped at 10 s
/// let strategy = ExponentialBackoff::default();
///
/// // Custom configuration
/// let strategy = ExponentialBackoff::builder()
///     .initial_delay(Duration::from_millis(250))
///     .max_delay(Duration::from_secs(30))
///     .multiplier(1.5)
///     .jitter(true)
///     .max_attempts(Some(10))
///     .build();
/// ```
#[derive(Debug)]
pub struct ExponentialBackoff {
    /// Initial delay before first retry
    initial_delay: Duration,
    /// Maximum delay between retries
    max_delay: Duration,
    /// Multiplier for exponential growth
    multiplier: f64,
    /// Whether to add jitter to delays
    jitter: bool,
    /// Maximum number of attempts (None = unlimited)
    max_attempts: Option<u32>,
    /// Internal metrics
    metrics: Mutex<BackoffMetrics>,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        ExponentialBackoffBuilder::default().build()
    }
}

impl ExponentialBackoff {
    /// Create a new builder for configuring exponential backoff.
    pub fn builder() -> ExponentialBackoffBuilder {
        ExponentialBackoffBuilder::default()
    }

    fn lock_metrics(&self) -> MutexGuard<'_, BackoffMetrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Calculate delay with optional jitter.
    fn calculate_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let base_delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);

        let capped_ms = base_delay_ms.min(self.max_delay.as_millis() as f64);
        let capped_delay = Duration::from_millis(capped_ms as u64);

        if self.jitter {
            // Full jitter: uniformly between 0 and the capped delay
            let jitter_ms = (rand::random::<f64>() * capped_delay.as_millis() as f64) as u64;
            Duration::from_millis(jitter_ms)
        } else {
            capped_delay
        }
    }
}

#[async_trait]
impl BackoffStrategy for ExponentialBackoff {
    async fn should_retry(&self, failures: u32) -> bool {
        match self.max_attempts {
            Some(max) => failures < max,
            None => true,
        }
    }

    async fn next_delay(&self, retry: u32) -> Duration {
        self.calculate_delay(retry)
    }

    fn on_attempt(&self) {
        self.lock_metrics().record_attempt();
    }

    fn on_success(&self) {
        self.lock_metrics().record_success();
    }

    fn on_failure(&self, error: &(dyn StdError + 'static)) {
        self.lock_metrics().record_failure(error);
    }

    fn reset(&self) {
        self.lock_metrics().reset();
    }

    fn metrics(&self) -> BackoffMetrics {
        self.lock_metrics().clone()
    }

    fn name(&self) -> &str {
        "ExponentialBackoff"
    }
}

/// Builder for configuring exponential backoff.
#[derive(Debug)]
pub struct ExponentialBackoffBuilder {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
    max_attempts: Option<u32>,
}

impl Default for ExponentialBackoffBuilder {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: false,
            max_attempts: None,
        }
    }
}

impl ExponentialBackoffBuilder {
    /// Set the initial delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the multiplier for exponential growth.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enable or disable jitter.
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the maximum number of attempts, the first one included.
    pub fn max_attempts(mut self, max: Option<u32>) -> Self {
        self.max_attempts = max;
        self
    }

    /// Build the exponential backoff strategy.
    pub fn build(self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
            jitter: self.jitter,
            max_attempts: self.max_attempts,
            metrics: Mutex::new(BackoffMetrics::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn refused() -> io::Error {
        io::Error::new(io::ErrorKind::ConnectionRefused, "refused")
    }

    #[test]
    fn test_default() {
        let strategy = ExponentialBackoff::default();
        assert_eq!(strategy.initial_delay, Duration::from_millis(100));
        assert_eq!(strategy.max_delay, Duration::from_secs(10));
        assert_eq!(strategy.multiplier, 2.0);
        assert!(!strategy.jitter);
        assert!(strategy.max_attempts.is_none());
    }

    #[test]
    fn test_builder() {
        let strategy = ExponentialBackoff::builder()
            .initial_delay(Duration::from_millis(50))
            .max_delay(Duration::from_secs(30))
            .multiplier(3.0)
            .jitter(true)
            .max_attempts(Some(5))
            .build();

        assert_eq!(strategy.initial_delay, Duration::from_millis(50));
        assert_eq!(strategy.max_delay, Duration::from_secs(30));
        assert_eq!(strategy.multiplier, 3.0);
        assert!(strategy.jitter);
        assert_eq!(strategy.max_attempts, Some(5));
    }

    #[tokio::test]
    async fn test_should_retry_within_limit() {
        let strategy = ExponentialBackoff::builder().max_attempts(Some(3)).build();

        assert!(strategy.should_retry(1).await);
        assert!(strategy.should_retry(2).await);
        assert!(!strategy.should_retry(3).await);
    }

    #[tokio::test]
    async fn test_should_retry_unlimited() {
        let strategy = ExponentialBackoff::default();
        assert!(strategy.should_retry(1).await);
        assert!(strategy.should_retry(10_000).await);
    }

    #[tokio::test]
    async fn test_next_delay_exponential_growth() {
        let strategy = ExponentialBackoff::default();

        assert_eq!(strategy.next_delay(0).await, Duration::from_millis(100));
        assert_eq!(strategy.next_delay(1).await, Duration::from_millis(200));
        assert_eq!(strategy.next_delay(2).await, Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_next_delay_capped() {
        let strategy = ExponentialBackoff::builder()
            .max_delay(Duration::from_millis(500))
            .build();

        assert_eq!(strategy.next_delay(10).await, Duration::from_millis(500));
        assert_eq!(strategy.next_delay(u32::MAX).await, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_jitter_stays_below_cap() {
        let strategy = ExponentialBackoff::builder().jitter(true).build();
        for retry in 0..8 {
            let delay = strategy.next_delay(retry).await;
            assert!(delay <= Duration::from_millis(100 * 2u64.pow(retry)));
        }
    }

    #[test]
    fn test_success_resets_streak() {
        let strategy = ExponentialBackoff::default();

        strategy.on_attempt();
        strategy.on_failure(&refused());
        strategy.on_attempt();
        strategy.on_failure(&refused());
        assert_eq!(strategy.metrics().consecutive_failures, 2);

        strategy.on_attempt();
        strategy.on_success();

        let metrics = strategy.metrics();
        assert_eq!(metrics.total_attempts, 3);
        assert_eq!(metrics.consecutive_failures, 0);
        assert_eq!(metrics.successes, 1);
    }

    #[test]
    fn test_reset() {
        let strategy = ExponentialBackoff::default();
        strategy.on_failure(&refused());
        strategy.reset();
        assert_eq!(strategy.metrics(), BackoffMetrics::default());
    }

    #[test]
    fn test_name() {
        assert_eq!(ExponentialBackoff::default().name(), "ExponentialBackoff");
    }
}
