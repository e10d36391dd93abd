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

//! The connection manager.
//!
//! [`ConnectionManager`] owns the single broker connection of a process and
//! drives the `Disconnected -> Connecting -> Connected` state machine.
//!
//! # Generations
//!
//! Every `start`, `stop` and automatic recovery bumps a generation counter.
//! Background tasks carry the generation they were spawned for and discard
//! their results once it is no longer current, so a connect that completes
//! after `stop` is closed instead of being installed.

use super::error::{ConnectionError, humanize_error};
use super::events::{ConnectionEvent, ConnectionEventHandler};
use super::registry::{KeepAliveSubscriber, Registry, SubscriberId, Waiter};
use super::state::{ConnectionState, LiveConnection};
use crate::backoff::{AbortHandle, Attempt, BackoffError, BackoffScheduler, NoRetry};
use crate::broker::{Broker, BrokerConnection, BrokerError};
use crate::config::{ConnectionSettings, Endpoint, ManagerConfig};
use crate::observability::ConnectionMetrics;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Owns the broker connection and recovers it after failures.
///
/// A manager is cheap to clone; clones share the same connection, state and
/// subscriptions.
///
/// # Examples
///
/// ```rust
/// use warren::broker::MemoryBroker;
/// use warren::{ConnectionManager, ConnectionSettings, ManagerConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = ConnectionManager::new(MemoryBroker::new(), ManagerConfig::default());
///
/// // Re-establish every channel whenever the connection cycles
/// manager.keep_alive(|connection| {
///     println!("connected: {}", connection.id());
/// });
///
/// manager.start(ConnectionSettings::new("localhost"), false).await?;
/// let connection = manager.connection().await?;
/// let channel = connection.open_channel().await?;
///
/// manager.stop().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    broker: Arc<dyn Broker>,
    config: ManagerConfig,
    shared: Mutex<Shared>,
    /// Serializes `start` and `stop`.
    lifecycle: tokio::sync::Mutex<()>,
    events: broadcast::Sender<ConnectionEvent>,
    metrics: ConnectionMetrics,
}

struct Shared {
    state: ConnectionState,
    endpoint: Option<Endpoint>,
    target: Option<String>,
    generation: u64,
    stopped: bool,
    shut_down: bool,
    registry: Registry,
    reconnect: Option<ReconnectTask>,
    watcher: Option<JoinHandle<()>>,
    handler_task: Option<JoinHandle<()>>,
    announced: u32,
}

struct ReconnectTask {
    abort: AbortHandle,
    task: JoinHandle<()>,
}

impl ConnectionManager {
    /// Creates a manager connecting through `broker`.
    pub fn new(broker: impl Broker, config: ManagerConfig) -> Self {
        Self::with_broker(Arc::new(broker), config)
    }

    /// Creates a manager from a shared broker.
    pub fn with_broker(broker: Arc<dyn Broker>, config: ManagerConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            inner: Arc::new(Inner {
                broker,
                config,
                shared: Mutex::new(Shared {
                    state: ConnectionState::Disconnected,
                    endpoint: None,
                    target: None,
                    generation: 0,
                    stopped: true,
                    shut_down: false,
                    registry: Registry::default(),
                    reconnect: None,
                    watcher: None,
                    handler_task: None,
                    announced: 0,
                }),
                lifecycle: tokio::sync::Mutex::new(()),
                events,
                metrics: ConnectionMetrics::new(),
            }),
        }
    }

    /// Connects to the broker described by `settings`.
    ///
    /// Starting with the settings of the current connection while connected
    /// is a no-op that succeeds immediately. Otherwise any previous
    /// connection is closed and a reconnect loop in progress is aborted.
    ///
    /// With `retry_on_error` the reconnect loop is spawned in the background
    /// and this returns `Ok(())` at once; failures only show up as
    /// [`ConnectionEvent::Error`] events. Without it exactly one connect
    /// attempt is made and its humanized failure is returned.
    pub async fn start(
        &self,
        settings: ConnectionSettings,
        retry_on_error: bool,
    ) -> Result<(), ConnectionError> {
        let lifecycle = self.inner.lifecycle.lock().await;
        let endpoint = settings.endpoint(self.inner.config.heartbeat);
        let target = endpoint.to_uri();

        let (generation, previous) = {
            let mut shared = self.inner.lock();
            if !shared.stopped
                && shared.state.is_connected()
                && shared.target.as_deref() == Some(target.as_str())
            {
                debug!(endpoint = %endpoint, "already connected, start is a no-op");
                return Ok(());
            }

            let generation = shared.supersede();
            shared.stopped = false;
            shared.shut_down = false;
            shared.endpoint = Some(endpoint.clone());
            shared.target = Some(target);
            (generation, shared.take_connection())
        };

        if let Some(previous) = previous {
            self.inner.close_connection(previous).await;
        }

        info!(endpoint = %endpoint, retry_on_error, "starting connection manager");
        if retry_on_error {
            let mut shared = self.inner.lock();
            if shared.generation == generation {
                self.inner.spawn_reconnect(&mut shared, generation, endpoint);
            }
            return Ok(());
        }

        {
            let mut shared = self.inner.lock();
            if shared.generation != generation {
                return Err(ConnectionError::Stopped);
            }
            shared.state = ConnectionState::Connecting;
        }
        // A stop during the attempt supersedes this generation without
        // waiting for the connect to finish.
        drop(lifecycle);

        let scheduler = BackoffScheduler::new(Arc::new(NoRetry::new()));
        let broker = Arc::clone(&self.inner.broker);
        let result = scheduler
            .run(|_| connect_once(Arc::clone(&broker), endpoint.clone()))
            .await;

        match result {
            Ok(connection) => {
                if self.inner.install(connection, generation) {
                    Ok(())
                } else {
                    Err(ConnectionError::Stopped)
                }
            }
            Err(error) => {
                let error = match error {
                    BackoffError::Exhausted { last_error, .. } => humanize_error(last_error),
                    BackoffError::Aborted => ConnectionError::Stopped,
                };
                let mut shared = self.inner.lock();
                if shared.generation != generation {
                    return Err(ConnectionError::Stopped);
                }
                shared.state = ConnectionState::Disconnected;
                self.inner.emit(ConnectionEvent::Error(error.clone()));
                Err(error)
            }
        }
    }

    /// Stops the manager.
    ///
    /// Aborts the reconnect loop, closes the live connection if there is one
    /// and returns once it is closed. Waiters stay registered and fire on
    /// the connection of the next `start`.
    pub async fn stop(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let previous = {
            let mut shared = self.inner.lock();
            shared.supersede();
            shared.stopped = true;
            shared.take_connection()
        };

        match previous {
            Some(connection) => self.inner.close_connection(connection).await,
            None => debug!("stop: no live connection"),
        }
    }

    /// Stops the manager and releases everything registered on it.
    ///
    /// Pending [`connection`](Self::connection) calls fail with
    /// [`ConnectionError::Stopped`], keep-alive subscribers are dropped and
    /// the event handler task ends.
    pub async fn shutdown(&self) {
        self.stop().await;

        let (waiters, handler_task) = {
            let mut shared = self.inner.lock();
            shared.shut_down = true;
            shared.registry.clear_subscribers();
            (shared.registry.take_waiters(), shared.handler_task.take())
        };
        for waiter in waiters {
            waiter.release(ConnectionError::Stopped);
        }
        if let Some(task) = handler_task {
            task.abort();
        }
        info!("connection manager shut down");
    }

    /// Returns the live connection, waiting for the next one if needed.
    ///
    /// When not connected a one-shot waiter is registered; it fires on the
    /// next established connection and never earlier.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::Stopped`] if the manager is shut down,
    /// or is shut down before a connection is established.
    pub async fn connection(&self) -> Result<LiveConnection, ConnectionError> {
        let rx = {
            let mut shared = self.inner.lock();
            if let Some(connection) = shared.state.connection() {
                return Ok(connection.clone());
            }
            if shared.shut_down {
                return Err(ConnectionError::Stopped);
            }
            let (waiter, rx) = Waiter::new();
            shared.registry.push_waiter(waiter);
            rx
        };
        rx.await.map_err(|_| ConnectionError::Stopped)?
    }

    /// Registers `callback` for every established connection.
    ///
    /// If connected, `callback` is also invoked right away with the current
    /// connection. A panicking callback is logged and stays registered.
    pub fn keep_alive<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(LiveConnection) + Send + Sync + 'static,
    {
        let subscriber = KeepAliveSubscriber::new(callback);
        let id = subscriber.id();
        let current = {
            let mut shared = self.inner.lock();
            shared.registry.subscribe(subscriber.clone());
            shared.state.connection().cloned()
        };
        debug!(subscriber = %id, "keep-alive subscriber registered");

        if let Some(connection) = current {
            subscriber.notify(connection);
        }
        id
    }

    /// Removes a keep-alive subscriber. Returns `false` if it was unknown.
    pub fn cancel_keep_alive(&self, id: SubscriberId) -> bool {
        self.inner.lock().registry.unsubscribe(id)
    }

    /// Subscribes to lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Forwards lifecycle events to `handler`, replacing any previous one.
    pub fn set_event_handler(&self, handler: Arc<dyn ConnectionEventHandler>) {
        let mut events = self.events();
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => event.dispatch(handler.as_ref()),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("event handler lagged, {} events skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        if let Some(previous) = self.inner.lock().handler_task.replace(task) {
            previous.abort();
        }
    }

    /// Returns a snapshot of the current state.
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state.clone()
    }

    /// Returns `true` while a connection is held.
    pub fn is_connected(&self) -> bool {
        self.inner.lock().state.is_connected()
    }

    /// Returns the endpoint of the last `start`.
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.inner.lock().endpoint.clone()
    }

    /// Returns the manager configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Returns the lifecycle metrics.
    pub fn metrics(&self) -> &ConnectionMetrics {
        &self.inner.metrics
    }

    /// Number of waiters not yet fired.
    pub fn pending_waiters(&self) -> usize {
        self.inner.lock().registry.waiter_count()
    }

    /// Number of keep-alive subscribers.
    pub fn keep_alive_subscribers(&self) -> usize {
        self.inner.lock().registry.subscriber_count()
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.inner.lock();
        f.debug_struct("ConnectionManager")
            .field("broker", &self.inner.broker.name())
            .field("state", &shared.state)
            .field("endpoint", &shared.endpoint)
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Shared {
    /// Invalidates all background work of the current generation.
    fn supersede(&mut self) -> u64 {
        self.generation += 1;
        if let Some(reconnect) = self.reconnect.take() {
            reconnect.abort.abort();
            reconnect.task.abort();
        }
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        self.generation
    }

    fn take_connection(&mut self) -> Option<LiveConnection> {
        match std::mem::replace(&mut self.state, ConnectionState::Disconnected) {
            ConnectionState::Connected(connection) => Some(connection),
            _ => None,
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes `event`. Callers hold the state lock so events keep
    /// transition order.
    fn emit(&self, event: ConnectionEvent) {
        match &event {
            ConnectionEvent::Established(connection) => {
                self.metrics.record_established();
                info!(connection = %connection.id(), "connection established");
            }
            ConnectionEvent::Closed => {
                self.metrics.record_closed();
                info!("connection closed");
            }
            ConnectionEvent::Error(error) => {
                self.metrics.record_error();
                warn!(code = ?error.code(), "connection error: {}", error);
            }
            ConnectionEvent::Reconnect { attempt } => {
                self.metrics.record_reconnect_attempt();
                warn!(attempt, "reconnecting to broker");
            }
        }
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    async fn close_connection(&self, connection: LiveConnection) {
        if let Err(error) = connection.broker_connection().close().await {
            warn!(connection = %connection.id(), "error while closing connection: {}", error);
        }
        let _shared = self.lock();
        self.emit(ConnectionEvent::Closed);
    }

    fn spawn_reconnect(self: &Arc<Self>, shared: &mut Shared, generation: u64, endpoint: Endpoint) {
        let scheduler = BackoffScheduler::new(Arc::clone(&self.config.reconnection_strategy));
        let abort = scheduler.abort_handle();
        shared.state = ConnectionState::Connecting;
        shared.announced = 0;

        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            inner.reconnect_loop(scheduler, generation, endpoint).await;
        });
        shared.reconnect = Some(ReconnectTask { abort, task });
    }

    async fn reconnect_loop(
        self: Arc<Self>,
        scheduler: BackoffScheduler,
        generation: u64,
        endpoint: Endpoint,
    ) {
        debug!(endpoint = %endpoint, strategy = scheduler.strategy().name(), "reconnect loop started");
        let result = scheduler
            .run(|attempt| {
                let inner = Arc::clone(&self);
                let endpoint = endpoint.clone();
                async move {
                    if attempt > 0 {
                        inner.announce_reconnect(generation, attempt);
                    }
                    let outcome = connect_once(Arc::clone(&inner.broker), endpoint).await;
                    if let Attempt::Failed(error) = &outcome {
                        inner.report_failure(generation, error);
                    }
                    outcome
                }
            })
            .await;

        match result {
            Ok(connection) => {
                self.install(connection, generation);
            }
            Err(BackoffError::Aborted) => debug!("reconnect loop aborted"),
            Err(BackoffError::Exhausted { attempts, .. }) => {
                warn!(endpoint = %endpoint, "giving up after {} connect attempts", attempts);
                let mut shared = self.lock();
                if shared.generation == generation {
                    shared.state = ConnectionState::Disconnected;
                    shared.reconnect = None;
                }
            }
        }
    }

    fn announce_reconnect(&self, generation: u64, attempt: u32) {
        let mut shared = self.lock();
        if shared.generation == generation && attempt > shared.announced {
            shared.announced = attempt;
            self.emit(ConnectionEvent::Reconnect { attempt });
        }
    }

    fn report_failure(&self, generation: u64, error: &BrokerError) {
        let shared = self.lock();
        if shared.generation == generation {
            self.emit(ConnectionEvent::Error(humanize_error(error.clone())));
        }
    }

    /// Makes `connection` the live connection if `generation` is current.
    fn install(self: &Arc<Self>, connection: Arc<dyn BrokerConnection>, generation: u64) -> bool {
        let live = LiveConnection::new(connection);
        let (waiters, subscribers) = {
            let mut shared = self.lock();
            if shared.stopped || shared.generation != generation {
                drop(shared);
                debug!(connection = %live.id(), "discarding connection of a superseded start");
                tokio::spawn(async move {
                    let _ = live.broker_connection().close().await;
                });
                return false;
            }

            shared.state = ConnectionState::Connected(live.clone());
            // The loop is finishing on its own; dropping the handle detaches it.
            shared.reconnect = None;
            self.emit(ConnectionEvent::Established(live.clone()));

            let inner = Arc::clone(self);
            let watched = live.clone();
            shared.watcher = Some(tokio::spawn(async move {
                inner.watch(watched, generation).await;
            }));

            (shared.registry.take_waiters(), shared.registry.subscribers())
        };

        for waiter in waiters {
            waiter.fire(live.clone());
        }
        for subscriber in subscribers {
            subscriber.notify(live.clone());
        }
        true
    }

    /// Waits for `live` to close and recovers unless stopped.
    async fn watch(self: Arc<Self>, live: LiveConnection, generation: u64) {
        let outcome = live.broker_connection().closed().await;

        let mut shared = self.lock();
        let current = shared.state.connection().map(LiveConnection::id);
        if shared.generation != generation || current != Some(live.id()) {
            return;
        }

        shared.state = ConnectionState::Disconnected;
        shared.watcher = None;
        if let Err(error) = outcome {
            self.emit(ConnectionEvent::Error(humanize_error(error)));
        }
        self.emit(ConnectionEvent::Closed);

        if shared.stopped {
            return;
        }
        let Some(endpoint) = shared.endpoint.clone() else {
            return;
        };
        shared.generation += 1;
        let generation = shared.generation;
        self.spawn_reconnect(&mut shared, generation, endpoint);
    }
}

async fn connect_once(
    broker: Arc<dyn Broker>,
    endpoint: Endpoint,
) -> Attempt<Arc<dyn BrokerConnection>, BrokerError> {
    match broker.connect(&endpoint).await {
        Ok(connection) => Attempt::Succeeded(connection),
        Err(error) if !error.is_determinate() => Attempt::Indeterminate(error),
        Err(error) => Attempt::Failed(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{FailureMode, MemoryBroker};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn manager(broker: &MemoryBroker) -> ConnectionManager {
        ConnectionManager::new(broker.clone(), ManagerConfig::default())
    }

    fn drain(events: &mut broadcast::Receiver<ConnectionEvent>) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.push(event.name());
        }
        names
    }

    #[tokio::test]
    async fn test_start_without_retry_connects() {
        let broker = MemoryBroker::new();
        let manager = manager(&broker);
        let mut events = manager.events();

        manager
            .start(ConnectionSettings::default(), false)
            .await
            .unwrap();

        assert!(manager.is_connected());
        assert_eq!(broker.open_connections(), 1);
        assert_eq!(drain(&mut events), vec!["connection.established"]);
    }

    #[tokio::test]
    async fn test_start_without_retry_reports_humanized_error() {
        let broker = MemoryBroker::new();
        broker.fail_host("localhost", FailureMode::ConnectionRefused);
        let manager = manager(&broker);
        let mut events = manager.events();

        let error = manager
            .start(ConnectionSettings::default(), false)
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), "localhost:5672 connection refused");
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(broker.connect_attempts(), 1);
        assert_eq!(drain(&mut events), vec!["connection.error"]);
    }

    #[tokio::test]
    async fn test_indeterminate_failure_is_ignored() {
        let broker = MemoryBroker::new();
        broker.push_failure(FailureMode::Indeterminate);
        let manager = manager(&broker);
        let mut events = manager.events();

        manager
            .start(ConnectionSettings::default(), false)
            .await
            .unwrap();

        assert_eq!(broker.connect_attempts(), 2);
        assert_eq!(drain(&mut events), vec!["connection.established"]);
    }

    #[tokio::test]
    async fn test_same_target_start_is_noop() {
        let broker = MemoryBroker::new();
        let manager = manager(&broker);
        let mut events = manager.events();

        manager.start(ConnectionSettings::default(), false).await.unwrap();
        manager.start(ConnectionSettings::default(), false).await.unwrap();
        manager.start(ConnectionSettings::default(), true).await.unwrap();

        assert_eq!(broker.connections_opened(), 1);
        assert_eq!(drain(&mut events), vec!["connection.established"]);
    }

    #[tokio::test]
    async fn test_new_target_replaces_connection() {
        let broker = MemoryBroker::new();
        let manager = manager(&broker);
        let mut events = manager.events();

        manager.start(ConnectionSettings::default(), false).await.unwrap();
        let first = manager.connection().await.unwrap();

        let other = ConnectionSettings::default().with_vhost("orders");
        manager.start(other, false).await.unwrap();
        let second = manager.connection().await.unwrap();

        assert_ne!(first, second);
        assert!(!first.is_open());
        assert_eq!(broker.open_connections(), 1);
        assert_eq!(
            drain(&mut events),
            vec![
                "connection.established",
                "connection.closed",
                "connection.established"
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_closes_once() {
        let broker = MemoryBroker::new();
        let manager = manager(&broker);
        manager.start(ConnectionSettings::default(), true).await.unwrap();
        manager.connection().await.unwrap();
        let mut events = manager.events();

        manager.stop().await;
        manager.stop().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(broker.open_connections(), 0);
        assert_eq!(drain(&mut events), vec!["connection.closed"]);
    }

    #[tokio::test]
    async fn test_waiter_fires_on_next_connection() {
        let broker = MemoryBroker::new();
        let manager = manager(&broker);

        let waiting = tokio::spawn({
            let manager = manager.clone();
            async move { manager.connection().await }
        });
        tokio::task::yield_now().await;
        assert_eq!(manager.pending_waiters(), 1);

        manager.start(ConnectionSettings::default(), true).await.unwrap();
        let connection = waiting.await.unwrap().unwrap();

        assert_eq!(manager.state().connection(), Some(&connection));
        assert_eq!(manager.pending_waiters(), 0);
    }

    #[tokio::test]
    async fn test_keep_alive_fires_immediately_when_connected() {
        let broker = MemoryBroker::new();
        let manager = manager(&broker);
        manager.start(ConnectionSettings::default(), false).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let id = manager.keep_alive({
            let calls = Arc::clone(&calls);
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(manager.cancel_keep_alive(id));
        assert_eq!(manager.keep_alive_subscribers(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_releases_waiters() {
        let broker = MemoryBroker::new();
        broker.fail_host("localhost", FailureMode::ConnectionRefused);
        let manager = manager(&broker);
        manager.start(ConnectionSettings::default(), true).await.unwrap();

        let waiting = tokio::spawn({
            let manager = manager.clone();
            async move { manager.connection().await }
        });
        tokio::task::yield_now().await;

        manager.keep_alive(|_| {});
        manager.shutdown().await;

        assert!(matches!(
            waiting.await.unwrap(),
            Err(ConnectionError::Stopped)
        ));
        assert_eq!(manager.keep_alive_subscribers(), 0);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(matches!(
            manager.connection().await,
            Err(ConnectionError::Stopped)
        ));
    }

    #[tokio::test]
    async fn test_event_handler_receives_events() {
        #[derive(Default)]
        struct Counter {
            established: AtomicUsize,
        }

        impl ConnectionEventHandler for Counter {
            fn on_established(&self, _connection: &LiveConnection) {
                self.established.fetch_add(1, Ordering::SeqCst);
            }
        }

        let broker = MemoryBroker::new();
        let manager = manager(&broker);
        let counter = Arc::new(Counter::default());
        manager.set_event_handler(counter.clone());

        manager.start(ConnectionSettings::default(), false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(counter.established.load(Ordering::SeqCst), 1);
        assert_eq!(manager.metrics().total_established(), 1);
    }
}
