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

//! Connection management.
//!
//! The [`ConnectionManager`] holds at most one broker connection and keeps it
//! alive:
//!
//! ```text
//!                 start()
//! Disconnected ─────────────> Connecting ──────> Connected
//!      ^                          ^                  │
//!      │ stop() / retries         │ connection lost  │
//!      │ exhausted                └──────────────────┤
//!      └─────────────────────────────────────────────┘
//!                                         stop()
//! ```
//!
//! Code that needs a connection either asks for it once with
//! [`ConnectionManager::connection`] or registers a keep-alive subscriber
//! with [`ConnectionManager::keep_alive`] to rebuild its channels on every
//! new connection.

mod error;
mod events;
mod manager;
mod registry;
mod state;

pub use error::{ConnectionError, humanize_error};
pub use events::{ConnectionEvent, ConnectionEventHandler};
pub use manager::ConnectionManager;
pub use registry::SubscriberId;
pub use state::{ConnectionId, ConnectionState, LiveConnection};
