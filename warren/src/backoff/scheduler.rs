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

//! Retry driver.
//!
//! [`BackoffScheduler::run`] invokes an operation until it succeeds, the
//! strategy gives up, or the run is aborted. The first attempt happens
//! immediately; every retry waits for the strategy's delay first.

use super::traits::BackoffStrategy;
use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, trace};

/// Consecutive indeterminate outcomes tolerated before one counts as a failure.
pub const DEFAULT_MAX_INDETERMINATE: u32 = 3;

/// Outcome of a single invocation of a retried operation.
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// The operation succeeded.
    Succeeded(T),
    /// The operation failed and may be retried.
    Failed(E),
    /// The operation reported a failure with nothing to diagnose.
    ///
    /// The invocation is not counted as an attempt and is repeated without
    /// delay, up to the scheduler's indeterminate limit.
    Indeterminate(E),
}

/// Why a scheduler run ended without success.
#[derive(Debug, Error)]
pub enum BackoffError<E> {
    /// The run was aborted through its [`AbortHandle`].
    #[error("retry loop aborted")]
    Aborted,

    /// The strategy refused another attempt.
    #[error("gave up after {attempts} attempt(s): {last_error}")]
    Exhausted {
        /// Number of determinate attempts made
        attempts: u32,
        /// Error of the final attempt
        last_error: E,
    },
}

impl<E> BackoffError<E> {
    /// Returns `true` if the run was aborted.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Returns the final error if the strategy gave up.
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::Aborted => None,
            Self::Exhausted { last_error, .. } => Some(last_error),
        }
    }
}

/// Cancels a scheduler run from anywhere.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    aborted: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Stops the run: no further attempt starts and a pending one is dropped.
    pub fn abort(&self) {
        self.aborted.send_replace(true);
    }

    /// Returns `true` once [`abort`](Self::abort) was called.
    pub fn is_aborted(&self) -> bool {
        *self.aborted.borrow()
    }
}

/// Repeatedly invokes an operation with exponentially growing delays.
///
/// A scheduler is the cancellation scope of one run: once aborted, every
/// later `run` returns [`BackoffError::Aborted`] immediately. Create a new
/// scheduler for each independent retry loop.
///
/// # Examples
///
/// ```
/// use warren::backoff::{Attempt, BackoffScheduler, ExponentialBackoff};
/// use std::io;
/// use std::sync::Arc;
///
/// # async fn example() {
/// let scheduler = BackoffScheduler::new(Arc::new(ExponentialBackoff::default()));
///
/// let result = scheduler
///     .run(|attempt| async move {
///         if attempt < 2 {
///             Attempt::Failed(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
///         } else {
///             Attempt::Succeeded(attempt)
///         }
///     })
///     .await;
///
/// assert_eq!(result.unwrap(), 2);
/// # }
/// ```
pub struct BackoffScheduler {
    strategy: Arc<dyn BackoffStrategy>,
    aborted: Arc<watch::Sender<bool>>,
    max_indeterminate: u32,
}

impl BackoffScheduler {
    /// Creates a scheduler driven by `strategy`.
    pub fn new(strategy: Arc<dyn BackoffStrategy>) -> Self {
        let (aborted, _) = watch::channel(false);
        Self {
            strategy,
            aborted: Arc::new(aborted),
            max_indeterminate: DEFAULT_MAX_INDETERMINATE,
        }
    }

    /// Sets how many consecutive indeterminate outcomes are ignored.
    pub fn with_max_indeterminate(mut self, limit: u32) -> Self {
        self.max_indeterminate = limit;
        self
    }

    /// Returns a handle that aborts this scheduler's runs.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            aborted: Arc::clone(&self.aborted),
        }
    }

    /// Aborts the current and all future runs.
    pub fn abort(&self) {
        self.aborted.send_replace(true);
    }

    /// Returns the strategy driving this scheduler.
    pub fn strategy(&self) -> &Arc<dyn BackoffStrategy> {
        &self.strategy
    }

    /// Runs `operation` until it succeeds, is given up on, or is aborted.
    ///
    /// `operation` receives the number of retries made so far: 0 for the
    /// first attempt, 1 for the first retry, and so on. An indeterminate
    /// outcome repeats the call with the same number.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, BackoffError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
        E: StdError + 'static,
    {
        let mut aborted = self.aborted.subscribe();
        let mut failures = 0u32;
        let mut indeterminate = 0u32;

        loop {
            if *aborted.borrow_and_update() {
                return Err(BackoffError::Aborted);
            }

            let outcome = tokio::select! {
                biased;
                _ = wait_aborted(&mut aborted) => return Err(BackoffError::Aborted),
                outcome = operation(failures) => outcome,
            };

            let error = match outcome {
                Attempt::Succeeded(value) => {
                    self.strategy.on_attempt();
                    self.strategy.on_success();
                    return Ok(value);
                }
                Attempt::Failed(error) => error,
                Attempt::Indeterminate(error) => {
                    indeterminate += 1;
                    if indeterminate <= self.max_indeterminate {
                        trace!(attempt = failures, "ignoring indeterminate outcome: {}", error);
                        continue;
                    }
                    debug!(
                        attempt = failures,
                        "{} indeterminate outcomes in a row, counting as failure", indeterminate
                    );
                    error
                }
            };

            indeterminate = 0;
            self.strategy.on_attempt();
            self.strategy.on_failure(&error);
            failures = failures.saturating_add(1);

            if !self.strategy.should_retry(failures).await {
                return Err(BackoffError::Exhausted {
                    attempts: failures,
                    last_error: error,
                });
            }

            let delay = self.strategy.next_delay(failures - 1).await;
            debug!(
                strategy = self.strategy.name(),
                "attempt {} failed: {}; retrying in {:?}", failures, error, delay
            );

            tokio::select! {
                biased;
                _ = wait_aborted(&mut aborted) => return Err(BackoffError::Aborted),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl std::fmt::Debug for BackoffScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackoffScheduler")
            .field("strategy", &self.strategy.name())
            .field("aborted", &*self.aborted.borrow())
            .field("max_indeterminate", &self.max_indeterminate)
            .finish()
    }
}

async fn wait_aborted(aborted: &mut watch::Receiver<bool>) {
    loop {
        if *aborted.borrow_and_update() {
            return;
        }
        if aborted.changed().await.is_err() {
            // Sender gone: nobody can abort any more.
            std::future::pending::<()>().await;
        }
    }
}
