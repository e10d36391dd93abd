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

//! Retry scheduling with pluggable delay strategies.
//!
//! A [`BackoffStrategy`] decides whether a failed operation is retried and
//! how long to wait first. A [`BackoffScheduler`] drives an operation under a
//! strategy and can be aborted at any time through its [`AbortHandle`].
//!
//! # Strategies
//!
//! - [`ExponentialBackoff`]: doubling delays from 100 ms, the default for
//!   connection recovery
//! - [`NoRetry`]: a single attempt whose failure is final

mod exponential;
mod no_retry;
mod scheduler;
mod traits;

pub use exponential::{ExponentialBackoff, ExponentialBackoffBuilder};
pub use no_retry::NoRetry;
pub use scheduler::{AbortHandle, Attempt, BackoffError, BackoffScheduler, DEFAULT_MAX_INDETERMINATE};
pub use traits::{BackoffMetrics, BackoffStrategy};
