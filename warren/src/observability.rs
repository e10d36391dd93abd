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

//! Observability support for warren.
//!
//! Every [`ConnectionManager`](crate::ConnectionManager) keeps a
//! [`ConnectionMetrics`] and every [`Messaging`](crate::Messaging) façade a
//! [`MessagingMetrics`]. Both use atomic counters and can be read at any
//! time.
//!
//! # Metrics Integration
//!
//! With the `observability` feature enabled (the default), every counter is
//! also exported through the `metrics` crate facade, so any installed
//! recorder picks them up:
//!
//! ```rust,ignore
//! use metrics_exporter_prometheus::PrometheusBuilder;
//!
//! PrometheusBuilder::new().install()?;
//! // warren.connection.* and warren.messaging.* now appear in the exporter
//! ```
//!
//! # Logging
//!
//! Lifecycle transitions and handler failures are logged through `tracing`.
//! Install any subscriber to see them:
//!
//! ```rust,ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("warren=debug")
//!     .init();
//! ```

mod metrics;

pub use self::metrics::{ConnectionMetrics, MessagingMetrics};
