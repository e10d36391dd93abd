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

//! Single-attempt strategy.
//!
//! Used by `start` when `retry_on_error` is false: exactly one determinate
//! connect attempt is made and its failure is reported to the caller.

use super::traits::{BackoffMetrics, BackoffStrategy};
use async_trait::async_trait;
use std::error::Error as StdError;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// A strategy that never retries.
///
/// # Examples
///
/// ```
/// use warren::backoff::{BackoffStrategy, NoRetry};
///
/// # async fn example() {
/// let strategy = NoRetry::new();
/// assert!(!strategy.should_retry(1).await);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct NoRetry {
    metrics: Mutex<BackoffMetrics>,
}

impl NoRetry {
    /// Create a new single-attempt strategy.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_metrics<R>(&self, f: impl FnOnce(&mut BackoffMetrics) -> R) -> R {
        let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut metrics)
    }
}

#[async_trait]
impl BackoffStrategy for NoRetry {
    async fn should_retry(&self, _failures: u32) -> bool {
        false
    }

    async fn next_delay(&self, _retry: u32) -> Duration {
        Duration::ZERO
    }

    fn on_attempt(&self) {
        self.with_metrics(BackoffMetrics::record_attempt);
    }

    fn on_success(&self) {
        self.with_metrics(BackoffMetrics::record_success);
    }

    fn on_failure(&self, error: &(dyn StdError + 'static)) {
        self.with_metrics(|metrics| metrics.record_failure(error));
    }

    fn reset(&self) {
        self.with_metrics(BackoffMetrics::reset);
    }

    fn metrics(&self) -> BackoffMetrics {
        self.with_metrics(|metrics| metrics.clone())
    }

    fn name(&self) -> &str {
        "NoRetry"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[tokio::test]
    async fn test_never_retries() {
        let strategy = NoRetry::new();
        assert!(!strategy.should_retry(1).await);
        assert!(!strategy.should_retry(100).await);
        assert_eq!(strategy.next_delay(0).await, Duration::ZERO);
    }

    #[test]
    fn test_records_outcomes() {
        let strategy = NoRetry::new();
        let error = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");

        strategy.on_attempt();
        strategy.on_failure(&error);

        let metrics = strategy.metrics();
        assert_eq!(metrics.total_attempts, 1);
        assert_eq!(metrics.failures, 1);

        strategy.reset();
        assert_eq!(strategy.metrics().failures, 0);
    }

    #[test]
    fn test_name() {
        assert_eq!(NoRetry::new().name(), "NoRetry");
    }
}
