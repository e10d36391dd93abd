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

//! Integration tests for the connection manager lifecycle.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use warren::broker::{Broker, BrokerConnection, BrokerError, ErrorCode, FailureMode, MemoryBroker};
use warren::connection::ConnectionError;
use warren::{
    ConnectionEvent, ConnectionManager, ConnectionSettings, ConnectionState, Endpoint,
    ManagerConfig,
};

fn manager(broker: &MemoryBroker) -> ConnectionManager {
    ConnectionManager::new(broker.clone(), ManagerConfig::default())
}

/// Waits for the next lifecycle event.
async fn next_event(events: &mut broadcast::Receiver<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a connection event")
        .expect("event stream closed")
}

/// Names of all events received so far.
fn drain(events: &mut broadcast::Receiver<ConnectionEvent>) -> Vec<&'static str> {
    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.name());
    }
    names
}

/// Delegates to a memory broker after a fixed delay.
struct SlowBroker {
    inner: MemoryBroker,
    delay: Duration,
}

#[async_trait]
impl Broker for SlowBroker {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        tokio::time::sleep(self.delay).await;
        self.inner.connect(endpoint).await
    }

    fn name(&self) -> &str {
        "slow"
    }
}

#[tokio::test]
async fn test_host_not_found_is_humanized() {
    let broker = MemoryBroker::new();
    broker.fail_host("rabbit.invalid", FailureMode::HostNotFound);
    let manager = manager(&broker);
    let mut events = manager.events();

    let error = manager
        .start(ConnectionSettings::new("rabbit.invalid"), false)
        .await
        .unwrap_err();

    assert_eq!(error.code(), Some(ErrorCode::HostNotFound));
    assert!(error.to_string().contains("rabbit.invalid"));
    match next_event(&mut events).await {
        ConnectionEvent::Error(emitted) => assert_eq!(emitted.to_string(), error.to_string()),
        other => panic!("expected an error event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_connection_refused_is_humanized() {
    let broker = MemoryBroker::new();
    broker.fail_host("rabbit.internal", FailureMode::ConnectionRefused);
    let manager = manager(&broker);

    let error = manager
        .start(ConnectionSettings::new("rabbit.internal:5673"), false)
        .await
        .unwrap_err();

    assert_eq!(error.code(), Some(ErrorCode::ConnectionRefused));
    assert_eq!(error.to_string(), "rabbit.internal:5673 connection refused");
    assert!(error.is_humanized());
}

#[tokio::test]
async fn test_rejected_login_is_humanized() {
    let broker = MemoryBroker::new();
    broker.fail_host("localhost", FailureMode::ConnectionReset);
    let manager = manager(&broker);

    let settings = ConnectionSettings::default().with_credentials("app", "wrong");
    let error = manager.start(settings, false).await.unwrap_err();

    assert!(matches!(error, ConnectionError::InvalidCredentials));
    assert_eq!(error.code(), Some(ErrorCode::ConnectionReset));
    assert_eq!(error.to_string(), "invalid login or password");
}

#[tokio::test]
async fn test_restart_with_same_settings_establishes_once() {
    let broker = MemoryBroker::new();
    let manager = manager(&broker);
    let mut events = manager.events();

    let first = manager.start(ConnectionSettings::default(), false).await;
    let second = manager.start(ConnectionSettings::default(), false).await;

    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(drain(&mut events), vec!["connection.established"]);
    assert_eq!(broker.connections_opened(), 1);
}

#[tokio::test]
async fn test_restart_with_new_credentials_reconnects() {
    let broker = MemoryBroker::new();
    let manager = manager(&broker);
    let mut events = manager.events();

    manager.start(ConnectionSettings::default(), false).await.unwrap();
    let settings = ConnectionSettings::default().with_credentials("app", "secret");
    manager.start(settings, false).await.unwrap();

    assert_eq!(
        drain(&mut events),
        vec![
            "connection.established",
            "connection.closed",
            "connection.established"
        ]
    );
    assert_eq!(broker.connections_opened(), 2);
    assert_eq!(broker.open_connections(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_emits_single_close_and_no_reconnects() {
    let broker = MemoryBroker::new();
    let manager = manager(&broker);
    manager.start(ConnectionSettings::default(), true).await.unwrap();
    manager.connection().await.unwrap();
    let mut events = manager.events();

    manager.stop().await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(drain(&mut events), vec!["connection.closed"]);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(broker.connections_opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_waiter_fires_on_next_established_only() {
    let broker = MemoryBroker::new();
    broker.fail_host("localhost", FailureMode::ConnectionRefused);
    let manager = manager(&broker);
    manager.start(ConnectionSettings::default(), true).await.unwrap();
    assert_eq!(manager.state(), ConnectionState::Connecting);

    let waiting = tokio::spawn({
        let manager = manager.clone();
        async move { manager.connection().await }
    });
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!waiting.is_finished());

    broker.clear_host("localhost");
    let connection = waiting.await.unwrap().unwrap();
    assert!(connection.is_open());
    assert_eq!(manager.state(), ConnectionState::Connected(connection));
}

#[tokio::test(start_paused = true)]
async fn test_connect_completing_after_stop_is_discarded() {
    let memory = MemoryBroker::new();
    let broker = SlowBroker {
        inner: memory.clone(),
        delay: Duration::from_millis(100),
    };
    let manager = ConnectionManager::new(broker, ManagerConfig::default());
    let mut events = manager.events();

    manager.start(ConnectionSettings::default(), true).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    manager.stop().await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(memory.open_connections(), 0);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_single_attempt_discards_connection() {
    let memory = MemoryBroker::new();
    let broker = SlowBroker {
        inner: memory.clone(),
        delay: Duration::from_millis(100),
    };
    let manager = ConnectionManager::new(broker, ManagerConfig::default());
    let mut events = manager.events();

    let starting = tokio::spawn({
        let manager = manager.clone();
        async move { manager.start(ConnectionSettings::default(), false).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stopped_at = tokio::time::Instant::now();
    manager.stop().await;
    assert!(stopped_at.elapsed() < Duration::from_millis(50));

    let result = starting.await.unwrap();
    assert!(matches!(result, Err(ConnectionError::Stopped)));
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(memory.open_connections(), 0);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_start_during_reconnect_loop_replaces_it() {
    let broker = MemoryBroker::new();
    broker.fail_host("primary", FailureMode::ConnectionRefused);
    let manager = manager(&broker);

    manager.start(ConnectionSettings::new("primary"), true).await.unwrap();
    tokio::time::sleep(Duration::from_millis(350)).await;
    manager.start(ConnectionSettings::new("secondary"), true).await.unwrap();

    let connection = manager.connection().await.unwrap();
    assert!(connection.is_open());
    assert_eq!(manager.endpoint().unwrap().hostname(), "secondary");

    let attempts = broker.connect_attempts();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(broker.connect_attempts(), attempts);
}

#[tokio::test]
async fn test_dropped_connection_recovers_without_retry_flag() {
    let broker = MemoryBroker::new();
    let manager = manager(&broker);
    manager.start(ConnectionSettings::default(), false).await.unwrap();
    let first = manager.connection().await.unwrap();
    let mut events = manager.events();

    broker.sever_connections();

    assert!(matches!(next_event(&mut events).await, ConnectionEvent::Error(_)));
    assert!(matches!(next_event(&mut events).await, ConnectionEvent::Closed));
    match next_event(&mut events).await {
        ConnectionEvent::Established(second) => {
            assert_ne!(first, second);
            assert!(!first.is_open());
            assert!(second.is_open());
        }
        other => panic!("expected a new connection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_shutdown_fails_pending_waiters() {
    let broker = MemoryBroker::new();
    broker.fail_host("localhost", FailureMode::HostNotFound);
    let manager = manager(&broker);
    manager.start(ConnectionSettings::default(), true).await.unwrap();

    let waiting = tokio::spawn({
        let manager = manager.clone();
        async move { manager.connection().await }
    });
    tokio::task::yield_now().await;

    manager.shutdown().await;

    assert!(matches!(waiting.await.unwrap(), Err(ConnectionError::Stopped)));
    assert_eq!(manager.pending_waiters(), 0);
}

#[tokio::test]
async fn test_stopped_manager_can_start_again() {
    let broker = MemoryBroker::new();
    let manager = manager(&broker);

    manager.start(ConnectionSettings::default(), false).await.unwrap();
    manager.stop().await;
    assert!(!manager.is_connected());

    manager.start(ConnectionSettings::default(), false).await.unwrap();
    assert!(manager.is_connected());
    assert_eq!(broker.connections_opened(), 2);
    assert_eq!(manager.metrics().total_established(), 2);
    assert_eq!(manager.metrics().total_closed(), 1);
}
