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

//! Waiter and keep-alive subscriber registries.
//!
//! Waiters are one-shot: the whole queue is drained on each established
//! connection. Keep-alive subscribers persist and are notified on every
//! established connection until they are cancelled.

use super::error::ConnectionError;
use super::state::LiveConnection;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tracing::error;

/// Identifies a keep-alive subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

/// Global counter for generating unique subscriber IDs.
static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

impl SubscriberId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the subscriber ID as a u64.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subscriber({})", self.0)
    }
}

/// One-shot continuation waiting for the next established connection.
///
/// Consuming `self` in [`fire`](Self::fire) and [`release`](Self::release)
/// makes a waiter fire at most once.
pub(crate) struct Waiter {
    tx: oneshot::Sender<Result<LiveConnection, ConnectionError>>,
}

impl Waiter {
    pub(crate) fn new() -> (Self, oneshot::Receiver<Result<LiveConnection, ConnectionError>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Hands `connection` to the waiting caller.
    pub(crate) fn fire(self, connection: LiveConnection) {
        // The caller may have stopped waiting.
        let _ = self.tx.send(Ok(connection));
    }

    /// Wakes the waiting caller with `error`.
    pub(crate) fn release(self, error: ConnectionError) {
        let _ = self.tx.send(Err(error));
    }

    fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

type KeepAliveCallback = dyn Fn(LiveConnection) + Send + Sync;

/// Persistent callback notified on every established connection.
#[derive(Clone)]
pub(crate) struct KeepAliveSubscriber {
    id: SubscriberId,
    callback: Arc<KeepAliveCallback>,
}

impl KeepAliveSubscriber {
    pub(crate) fn new<F>(callback: F) -> Self
    where
        F: Fn(LiveConnection) + Send + Sync + 'static,
    {
        Self {
            id: SubscriberId::next(),
            callback: Arc::new(callback),
        }
    }

    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    /// Invokes the callback, containing any panic it raises.
    pub(crate) fn notify(&self, connection: LiveConnection) {
        let callback = Arc::clone(&self.callback);
        if catch_unwind(AssertUnwindSafe(move || callback(connection))).is_err() {
            error!(subscriber = %self.id, "keep-alive subscriber panicked");
        }
    }
}

impl fmt::Debug for KeepAliveSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeepAliveSubscriber")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// The two subscription registries of a connection manager.
#[derive(Default)]
pub(crate) struct Registry {
    waiters: Vec<Waiter>,
    subscribers: Vec<KeepAliveSubscriber>,
}

impl Registry {
    pub(crate) fn push_waiter(&mut self, waiter: Waiter) {
        // Drop waiters whose callers gave up so the queue cannot grow unbounded.
        self.waiters.retain(|waiter| !waiter.is_abandoned());
        self.waiters.push(waiter);
    }

    pub(crate) fn take_waiters(&mut self) -> Vec<Waiter> {
        std::mem::take(&mut self.waiters)
    }

    pub(crate) fn subscribe(&mut self, subscriber: KeepAliveSubscriber) {
        self.subscribers.push(subscriber);
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|subscriber| subscriber.id() != id);
        self.subscribers.len() != before
    }

    pub(crate) fn subscribers(&self) -> Vec<KeepAliveSubscriber> {
        self.subscribers.clone()
    }

    pub(crate) fn clear_subscribers(&mut self) {
        self.subscribers.clear();
    }

    pub(crate) fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Broker, MemoryBroker};
    use crate::config::ConnectionSettings;
    use std::sync::atomic::AtomicUsize;

    async fn live() -> LiveConnection {
        let connection = MemoryBroker::new()
            .connect(&ConnectionSettings::default().endpoint(30))
            .await
            .unwrap();
        LiveConnection::new(connection)
    }

    #[tokio::test]
    async fn test_waiters_drain_once() {
        let mut registry = Registry::default();
        let (first, first_rx) = Waiter::new();
        let (second, second_rx) = Waiter::new();
        registry.push_waiter(first);
        registry.push_waiter(second);

        let connection = live().await;
        for waiter in registry.take_waiters() {
            waiter.fire(connection.clone());
        }

        assert_eq!(first_rx.await.unwrap().unwrap(), connection);
        assert_eq!(second_rx.await.unwrap().unwrap(), connection);
        assert_eq!(registry.waiter_count(), 0);
    }

    #[tokio::test]
    async fn test_release_reports_error() {
        let (waiter, rx) = Waiter::new();
        waiter.release(ConnectionError::Stopped);
        assert!(matches!(rx.await.unwrap(), Err(ConnectionError::Stopped)));
    }

    #[test]
    fn test_abandoned_waiters_are_pruned() {
        let mut registry = Registry::default();
        let (abandoned, rx) = Waiter::new();
        drop(rx);
        registry.push_waiter(abandoned);

        let (kept, _rx) = Waiter::new();
        registry.push_waiter(kept);
        assert_eq!(registry.waiter_count(), 1);
    }

    #[tokio::test]
    async fn test_subscribers_persist_until_unsubscribed() {
        let mut registry = Registry::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let subscriber = KeepAliveSubscriber::new({
            let calls = Arc::clone(&calls);
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });
        let id = subscriber.id();
        registry.subscribe(subscriber);

        let connection = live().await;
        for _ in 0..3 {
            for subscriber in registry.subscribers() {
                subscriber.notify(connection.clone());
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        assert_eq!(registry.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_panicking_subscriber_is_contained() {
        let subscriber = KeepAliveSubscriber::new(|_| panic!("subscriber failure"));
        subscriber.notify(live().await);
    }
}
