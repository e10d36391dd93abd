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

//! Handles to long-lived consumers.

use crate::broker::BrokerChannel;
use crate::connection::{ConnectionManager, SubscriberId};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Shared between a [`Subscription`] and the consumer tasks it spawns.
pub(crate) struct SubscriptionState {
    name: String,
    cancelled: AtomicBool,
    subscriber: Mutex<Option<SubscriberId>>,
    channel: Mutex<Option<Arc<dyn BrokerChannel>>>,
    consuming: watch::Sender<bool>,
}

impl SubscriptionState {
    pub(crate) fn new(name: String) -> Arc<Self> {
        let (consuming, _) = watch::channel(false);
        Arc::new(Self {
            name,
            cancelled: AtomicBool::new(false),
            subscriber: Mutex::new(None),
            channel: Mutex::new(None),
            consuming,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn channel(&self) -> MutexGuard<'_, Option<Arc<dyn BrokerChannel>>> {
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the channel of the current connection.
    ///
    /// Returns `false` if the subscription was cancelled meanwhile; the
    /// caller then closes `channel` itself.
    pub(crate) fn attach(&self, channel: Arc<dyn BrokerChannel>) -> bool {
        let mut current = self.channel();
        if self.is_cancelled() {
            return false;
        }
        *current = Some(channel);
        true
    }

    /// Forgets `channel` if it is still the current one.
    pub(crate) fn detach(&self, channel: &Arc<dyn BrokerChannel>) {
        let mut current = self.channel();
        let same = current.as_ref().is_some_and(|attached| {
            Arc::as_ptr(attached) as *const () == Arc::as_ptr(channel) as *const ()
        });
        if same {
            *current = None;
        }
    }

    pub(crate) fn set_consuming(&self, consuming: bool) {
        self.consuming.send_replace(consuming);
    }

    pub(crate) fn set_subscriber(&self, id: SubscriberId) {
        *self.subscriber.lock().unwrap_or_else(PoisonError::into_inner) = Some(id);
    }
}

/// A long-lived consumer started by
/// [`Messaging::on_queue`](super::Messaging::on_queue) or
/// [`Messaging::on_broadcast`](super::Messaging::on_broadcast).
///
/// The consumer is rebuilt on a fresh channel every time the connection is
/// re-established. Dropping the handle leaves the consumer running; call
/// [`cancel`](Self::cancel) to stop it.
pub struct Subscription {
    state: Arc<SubscriptionState>,
    manager: ConnectionManager,
}

impl Subscription {
    pub(crate) fn new(state: Arc<SubscriptionState>, manager: ConnectionManager) -> Self {
        Self { state, manager }
    }

    /// Queue or exchange this subscription consumes from.
    pub fn name(&self) -> &str {
        self.state.name()
    }

    /// Returns `true` while a consumer is running on a live channel.
    pub fn is_consuming(&self) -> bool {
        *self.state.consuming.borrow()
    }

    /// Returns `true` once [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    /// Waits until the consumer is running.
    ///
    /// Returns immediately if it already is or if the subscription was
    /// cancelled.
    pub async fn ready(&self) {
        let mut consuming = self.state.consuming.subscribe();
        let state = &self.state;
        // The sender lives in `state`, so the wait cannot fail.
        let _ = consuming
            .wait_for(|consuming| *consuming || state.is_cancelled())
            .await;
    }

    /// Stops the consumer.
    ///
    /// The consumer is no longer rebuilt on reconnects and its channel is
    /// closed. Unacknowledged deliveries go back to the queue.
    pub async fn cancel(&self) {
        if self.state.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }

        let subscriber = self
            .state
            .subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(id) = subscriber {
            self.manager.cancel_keep_alive(id);
        }

        let channel = self.state.channel().take();
        if let Some(channel) = channel {
            if let Err(error) = channel.close().await {
                warn!(subscription = %self.state.name, "error while closing consumer channel: {}", error);
            }
        }
        self.state.set_consuming(false);
        debug!(subscription = %self.state.name, "subscription cancelled");
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.state.name)
            .field("consuming", &self.is_consuming())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
