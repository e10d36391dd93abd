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

#![allow(clippy::module_inception)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

//! # Warren - Resilient AMQP Connections
//!
//! Warren keeps a single broker connection alive for a process and builds two
//! messaging patterns on top of it:
//!
//! - **Connection lifecycle**: a `Disconnected -> Connecting -> Connected`
//!   state machine with exponential backoff reconnects
//! - **Subscriptions**: one-shot waiters for the next connection and
//!   keep-alive subscribers notified on every connection
//! - **Request/reply**: consume a durable queue and answer on the reply-to
//!   queue of each request
//! - **Broadcast**: publish to a fanout exchange and optionally collect the
//!   replies for a fixed window
//! - **Observability**: lifecycle events, `tracing` logs and counters
//!   exported through `metrics`
//!
//! ## Architecture
//!
//! - **[`backoff`]**: retry scheduling with pluggable strategies
//! - **[`broker`]**: the broker collaborator seam, an in-process broker and
//!   an AMQP adapter
//! - **[`connection`]**: the [`ConnectionManager`] state machine
//! - **[`messaging`]**: the [`Messaging`] façade
//! - **[`observability`]**: connection and messaging metrics
//!
//! ## Quick Start
//!
//! ```rust
//! use warren::broker::MemoryBroker;
//! use warren::messaging::{BroadcastOptions, HandlerError, Responder};
//! use warren::{ConnectionManager, ConnectionSettings, ManagerConfig, Messaging};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConnectionManager::new(MemoryBroker::new(), ManagerConfig::default());
//! let messaging = Messaging::new(manager);
//!
//! // Retry in the background until the broker is reachable
//! messaging.connect(ConnectionSettings::new("localhost"), true).await?;
//!
//! let subscription = messaging.on_broadcast(
//!     "status",
//!     |_: String, responder: Option<Responder<String>>| async move {
//!         if let Some(responder) = responder {
//!             responder.respond(&"healthy".to_string(), true).await?;
//!         }
//!         Ok::<(), HandlerError>(())
//!     },
//! );
//! subscription.ready().await;
//!
//! let replies: Vec<String> = messaging
//!     .broadcast_collect(
//!         "status",
//!         BroadcastOptions::with_timeout(Duration::from_millis(100)),
//!         &"ping",
//!     )
//!     .await?;
//! assert_eq!(replies, vec!["healthy".to_string()]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **`observability`** (default): export counters through the `metrics` crate
//! - **`amqp`**: enable [`broker::AmqpBroker`] built on `lapin`
//!
//! ## Error Handling
//!
//! - [`BrokerError`](broker::BrokerError): collaborator failures
//! - [`ConnectionError`](connection::ConnectionError): humanized connect failures
//! - [`WarrenError`]: top-level composition used by the messaging façade
//!
//! ## Safety
//!
//! Warren is written in 100% safe Rust with `#![deny(unsafe_code)]`.

pub mod backoff;
pub mod broker;
pub mod config;
pub mod connection;
pub mod error;
pub mod messaging;
pub mod observability;

pub use backoff::{BackoffScheduler, BackoffStrategy, ExponentialBackoff, NoRetry};
pub use config::{ConnectionSettings, Endpoint, ManagerConfig};
pub use connection::{
    ConnectionError, ConnectionEvent, ConnectionEventHandler, ConnectionManager, ConnectionState,
    LiveConnection,
};
pub use error::WarrenError;
pub use messaging::{Messaging, Subscription};
pub use observability::{ConnectionMetrics, MessagingMetrics};
