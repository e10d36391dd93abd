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

//! Broker collaborator abstraction.
//!
//! The connection manager and the messaging façade never speak a wire
//! protocol themselves. They drive a [`Broker`] through the primitives
//! defined here: connect, open a channel, declare queues and exchanges,
//! publish, consume and acknowledge.
//!
//! # Implementations
//!
//! - [`MemoryBroker`]: in-process, with failure injection for tests
//! - `AmqpBroker`: AMQP 0-9-1 via `lapin` (requires the `amqp` feature)

mod error;
mod memory;
mod traits;

#[cfg(feature = "amqp")]
mod amqp;

pub use error::{BrokerError, ErrorCode};
pub use memory::{FailureMode, MemoryBroker, QueueStats};
pub use traits::{
    Broker, BrokerChannel, BrokerConnection, ConsumeOptions, Consumer, Delivery, ExchangeKind,
    PublishOptions, QueueDeclare,
};

#[cfg(feature = "amqp")]
pub use amqp::AmqpBroker;
