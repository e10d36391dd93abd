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

//! Messaging patterns.
//!
//! Two patterns are supported:
//!
//! - **Request/reply over a queue**: [`Messaging::on_queue`] consumes a
//!   durable queue; requests carrying a reply target are answered through a
//!   [`Responder`].
//! - **Broadcast**: [`Messaging::broadcast`] and
//!   [`Messaging::broadcast_collect`] publish to a fanout exchange, the
//!   latter collecting replies for a fixed window. [`Messaging::on_broadcast`]
//!   subscribes to such an exchange.
//!
//! Message bodies are JSON documents, see [`JsonCodec`].

mod codec;
mod envelope;
mod facade;
mod handler;
mod options;
mod subscription;

pub use codec::{CodecError, JsonCodec};
pub use envelope::Envelope;
pub use facade::Messaging;
pub use handler::{HandlerError, MessageHandler, Responder};
pub use options::{BroadcastOptions, DEFAULT_BROADCAST_TIMEOUT, DEFAULT_PREFETCH, QueueOptions};
pub use subscription::Subscription;
