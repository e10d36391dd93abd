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

//! In-process broker implementation for testing.
//!
//! [`MemoryBroker`] keeps queues, exchanges and bindings in memory and
//! delivers messages over Tokio channels. It follows the broker semantics
//! the rest of the crate relies on: round-robin delivery, per-channel
//! prefetch, requeue on channel close, and deletion of exclusive queues when
//! their connection closes.
//!
//! Connect failures and connection drops can be injected to exercise the
//! connection manager's recovery paths.

use super::error::BrokerError;
use super::traits::{
    Broker, BrokerChannel, BrokerConnection, ConsumeOptions, Consumer, Delivery, ExchangeKind,
    PublishOptions, QueueDeclare,
};
use crate::config::Endpoint;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

/// A connect failure to inject into a [`MemoryBroker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// The host name does not resolve.
    HostNotFound,
    /// The host refuses the connection.
    ConnectionRefused,
    /// The connection is reset after the handshake (bad credentials).
    ConnectionReset,
    /// A failure without any diagnosable code.
    Indeterminate,
}

impl FailureMode {
    fn to_error(self, endpoint: &Endpoint) -> BrokerError {
        match self {
            Self::HostNotFound => BrokerError::HostNotFound {
                host: endpoint.hostname().to_string(),
            },
            Self::ConnectionRefused => BrokerError::ConnectionRefused {
                address: endpoint.hostname().to_string(),
                port: endpoint.port(),
            },
            Self::ConnectionReset => BrokerError::ConnectionReset,
            Self::Indeterminate => BrokerError::Indeterminate {
                reason: "connect callback without error code".to_string(),
            },
        }
    }
}

/// Snapshot of a queue's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Messages waiting for a consumer.
    pub ready: usize,
    /// Messages delivered but not yet acknowledged.
    pub unacked: usize,
    /// Messages delivered so far, redeliveries included.
    pub delivered: u64,
    /// Messages acknowledged.
    pub acked: u64,
    /// Messages negatively acknowledged.
    pub nacked: u64,
    /// Active consumers.
    pub consumers: usize,
}

/// In-process broker.
///
/// Cloning a `MemoryBroker` yields another handle to the same broker.
///
/// # Examples
///
/// ```rust
/// use warren::broker::{Broker, ConsumeOptions, MemoryBroker, PublishOptions, QueueDeclare};
/// use warren::ConnectionSettings;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = MemoryBroker::new();
/// let connection = broker.connect(&ConnectionSettings::default().endpoint(30)).await?;
/// let channel = connection.open_channel().await?;
///
/// channel.assert_queue("jobs", QueueDeclare::default()).await?;
/// let mut consumer = channel.consume("jobs", ConsumeOptions { no_ack: true }).await?;
///
/// channel.send_to_queue("jobs", b"hello".to_vec(), PublishOptions::default()).await?;
/// assert_eq!(consumer.next().await.unwrap().payload, b"hello");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        lock_state(&self.state)
    }

    /// Makes every connect to `host` fail with `mode` until cleared.
    pub fn fail_host(&self, host: impl Into<String>, mode: FailureMode) {
        self.lock().host_failures.insert(host.into(), mode);
    }

    /// Lets connects to `host` succeed again.
    pub fn clear_host(&self, host: &str) {
        self.lock().host_failures.remove(host);
    }

    /// Makes the next connect fail with `mode`, whatever its host.
    ///
    /// Queued failures are consumed in order before host failures apply.
    pub fn push_failure(&self, mode: FailureMode) {
        self.lock().pending_failures.push_back(mode);
    }

    /// Drops every open connection as if the broker went away.
    pub fn sever_connections(&self) {
        let mut state = self.lock();
        let ids: Vec<u64> = state.connections.keys().copied().collect();
        for id in ids {
            state.close_connection(id, LinkStatus::Severed("connection reset by broker".into()));
        }
    }

    /// Number of connect calls made, failed ones included.
    pub fn connect_attempts(&self) -> u64 {
        self.lock().connect_attempts
    }

    /// Number of connections successfully opened.
    pub fn connections_opened(&self) -> u64 {
        self.lock().connections_opened
    }

    /// Number of connections currently open.
    pub fn open_connections(&self) -> usize {
        self.lock().connections.len()
    }

    /// Number of channels currently open.
    pub fn open_channels(&self) -> usize {
        self.lock().channels.len()
    }

    /// Returns `true` if a queue named `name` exists.
    pub fn queue_exists(&self, name: &str) -> bool {
        self.lock().queues.contains_key(name)
    }

    /// Returns `true` if an exchange named `name` exists.
    pub fn exchange_exists(&self, name: &str) -> bool {
        self.lock().exchanges.contains_key(name)
    }

    /// Names of all queues, sorted.
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().queues.keys().cloned().collect();
        names.sort();
        names
    }

    /// Counters of the queue named `name`.
    pub fn queue_stats(&self, name: &str) -> Option<QueueStats> {
        let state = self.lock();
        let queue = state.queues.get(name)?;
        let unacked = state
            .channels
            .values()
            .flat_map(|channel| channel.unacked.values())
            .filter(|entry| entry.queue == name)
            .count();
        Some(QueueStats {
            ready: queue.ready.len(),
            unacked,
            delivered: queue.delivered,
            acked: queue.acked,
            nacked: queue.nacked,
            consumers: queue.consumers.len(),
        })
    }
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryBroker")
            .field("connections", &state.connections.len())
            .field("channels", &state.channels.len())
            .field("queues", &state.queues.len())
            .field("exchanges", &state.exchanges.len())
            .finish()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        let mut state = self.lock();
        state.connect_attempts += 1;

        let failure = state
            .pending_failures
            .pop_front()
            .or_else(|| state.host_failures.get(endpoint.hostname()).copied());
        if let Some(mode) = failure {
            trace!(endpoint = %endpoint, ?mode, "injected connect failure");
            return Err(mode.to_error(endpoint));
        }

        state.next_id += 1;
        let id = state.next_id;
        let (status, _) = watch::channel(LinkStatus::Open);
        let status = Arc::new(status);
        state.connections.insert(
            id,
            ConnectionEntry {
                status: Arc::clone(&status),
            },
        );
        state.connections_opened += 1;
        debug!(connection = id, endpoint = %endpoint, "memory connection opened");

        Ok(Arc::new(MemoryConnection {
            id,
            state: Arc::clone(&self.state),
            status,
        }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

fn lock_state(state: &Mutex<BrokerState>) -> MutexGuard<'_, BrokerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkStatus {
    Open,
    Closed,
    Severed(String),
}

#[derive(Default)]
struct BrokerState {
    next_id: u64,
    connect_attempts: u64,
    connections_opened: u64,
    host_failures: HashMap<String, FailureMode>,
    pending_failures: VecDeque<FailureMode>,
    connections: HashMap<u64, ConnectionEntry>,
    channels: HashMap<u64, ChannelEntry>,
    queues: HashMap<String, Queue>,
    exchanges: HashMap<String, Exchange>,
}

struct ConnectionEntry {
    status: Arc<watch::Sender<LinkStatus>>,
}

struct ChannelEntry {
    connection: u64,
    prefetch: u16,
    next_tag: u64,
    unacked: BTreeMap<u64, Unacked>,
}

struct Unacked {
    queue: String,
    message: Message,
}

#[derive(Clone)]
struct Message {
    payload: Vec<u8>,
    reply_to: Option<String>,
    redelivered: bool,
}

struct Queue {
    owner: Option<u64>,
    ready: VecDeque<Message>,
    consumers: Vec<ConsumerEntry>,
    cursor: usize,
    delivered: u64,
    acked: u64,
    nacked: u64,
}

struct ConsumerEntry {
    channel: u64,
    no_ack: bool,
    deliveries: mpsc::UnboundedSender<Delivery>,
}

struct Exchange {
    kind: ExchangeKind,
    bindings: Vec<(String, String)>,
}

impl BrokerState {
    fn channel(&mut self, id: u64) -> Result<&mut ChannelEntry, BrokerError> {
        self.channels
            .get_mut(&id)
            .ok_or_else(|| BrokerError::channel_closed(format!("channel {id} is closed")))
    }

    fn close_connection(&mut self, id: u64, status: LinkStatus) {
        let Some(entry) = self.connections.remove(&id) else {
            return;
        };

        let channels: Vec<u64> = self
            .channels
            .iter()
            .filter(|(_, channel)| channel.connection == id)
            .map(|(channel_id, _)| *channel_id)
            .collect();
        for channel in channels {
            self.close_channel(channel);
        }

        let exclusive: Vec<String> = self
            .queues
            .iter()
            .filter(|(_, queue)| queue.owner == Some(id))
            .map(|(name, _)| name.clone())
            .collect();
        for queue in exclusive {
            self.delete_queue(&queue);
        }

        debug!(connection = id, ?status, "memory connection closed");
        entry.status.send_replace(status);
    }

    fn close_channel(&mut self, id: u64) {
        let Some(channel) = self.channels.remove(&id) else {
            return;
        };

        let mut touched = HashSet::new();
        for (name, queue) in self.queues.iter_mut() {
            let before = queue.consumers.len();
            queue.consumers.retain(|consumer| consumer.channel != id);
            if queue.consumers.len() != before {
                touched.insert(name.clone());
            }
        }

        // Requeue in reverse so the oldest delivery ends up first.
        for (_, entry) in channel.unacked.into_iter().rev() {
            if let Some(queue) = self.queues.get_mut(&entry.queue) {
                let mut message = entry.message;
                message.redelivered = true;
                queue.ready.push_front(message);
                touched.insert(entry.queue);
            }
        }

        for name in touched {
            self.dispatch(&name);
        }
    }

    fn delete_queue(&mut self, name: &str) {
        if self.queues.remove(name).is_some() {
            for exchange in self.exchanges.values_mut() {
                exchange.bindings.retain(|(queue, _)| queue != name);
            }
            trace!(queue = name, "queue deleted");
        }
    }

    fn enqueue(&mut self, name: &str, message: Message) {
        if let Some(queue) = self.queues.get_mut(name) {
            queue.ready.push_back(message);
            self.dispatch(name);
        }
    }

    fn dispatch(&mut self, name: &str) {
        let BrokerState {
            queues, channels, ..
        } = self;
        let Some(queue) = queues.get_mut(name) else {
            return;
        };

        while !queue.ready.is_empty() && !queue.consumers.is_empty() {
            let count = queue.consumers.len();
            let chosen = (0..count)
                .map(|offset| (queue.cursor + offset) % count)
                .find(|&index| {
                    let consumer = &queue.consumers[index];
                    channels.get(&consumer.channel).is_some_and(|channel| {
                        consumer.no_ack
                            || channel.prefetch == 0
                            || channel.unacked.len() < usize::from(channel.prefetch)
                    })
                });
            let Some(index) = chosen else {
                break;
            };
            queue.cursor = index + 1;

            let Some(message) = queue.ready.pop_front() else {
                break;
            };
            let no_ack = queue.consumers[index].no_ack;
            let Some(channel) = channels.get_mut(&queue.consumers[index].channel) else {
                queue.ready.push_front(message);
                break;
            };

            channel.next_tag += 1;
            let delivery = Delivery {
                delivery_tag: channel.next_tag,
                payload: message.payload.clone(),
                reply_to: message.reply_to.clone(),
                redelivered: message.redelivered,
            };
            let tag = delivery.delivery_tag;

            if queue.consumers[index].deliveries.send(delivery).is_err() {
                // Receiver dropped: forget the consumer and retry the message.
                queue.ready.push_front(message);
                queue.consumers.remove(index);
                continue;
            }

            queue.delivered += 1;
            if !no_ack {
                channel.unacked.insert(
                    tag,
                    Unacked {
                        queue: name.to_string(),
                        message,
                    },
                );
            }
        }
    }
}

struct MemoryConnection {
    id: u64,
    state: Arc<Mutex<BrokerState>>,
    status: Arc<watch::Sender<LinkStatus>>,
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    async fn open_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        let mut state = lock_state(&self.state);
        if !state.connections.contains_key(&self.id) {
            return Err(BrokerError::connection_closed(format!(
                "connection {} is closed",
                self.id
            )));
        }

        state.next_id += 1;
        let id = state.next_id;
        state.channels.insert(
            id,
            ChannelEntry {
                connection: self.id,
                prefetch: 0,
                next_tag: 0,
                unacked: BTreeMap::new(),
            },
        );
        trace!(connection = self.id, channel = id, "channel opened");

        Ok(Arc::new(MemoryChannel {
            id,
            connection: self.id,
            state: Arc::clone(&self.state),
        }))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        lock_state(&self.state).close_connection(self.id, LinkStatus::Closed);
        Ok(())
    }

    async fn closed(&self) -> Result<(), BrokerError> {
        let mut status = self.status.subscribe();
        loop {
            let current = status.borrow_and_update().clone();
            match current {
                LinkStatus::Open => {}
                LinkStatus::Closed => return Ok(()),
                LinkStatus::Severed(reason) => return Err(BrokerError::connection_closed(reason)),
            }
            if status.changed().await.is_err() {
                return Ok(());
            }
        }
    }

    fn is_open(&self) -> bool {
        *self.status.borrow() == LinkStatus::Open
    }
}

struct MemoryChannel {
    id: u64,
    connection: u64,
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryChannel {
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        lock_state(&self.state)
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn assert_queue(&self, name: &str, options: QueueDeclare) -> Result<String, BrokerError> {
        let mut state = self.lock();
        state.channel(self.id)?;

        if let Some(queue) = state.queues.get(name) {
            if queue.owner.is_some_and(|owner| owner != self.connection) {
                return Err(BrokerError::Protocol {
                    reason: format!("RESOURCE_LOCKED - queue '{name}' is exclusive to another connection"),
                });
            }
            return Ok(name.to_string());
        }

        let name = if name.is_empty() {
            format!("amq.gen-{}", uuid::Uuid::new_v4().simple())
        } else {
            name.to_string()
        };
        state.queues.insert(
            name.clone(),
            Queue {
                owner: options.exclusive.then_some(self.connection),
                ready: VecDeque::new(),
                consumers: Vec::new(),
                cursor: 0,
                delivered: 0,
                acked: 0,
                nacked: 0,
            },
        );
        trace!(channel = self.id, queue = %name, ?options, "queue declared");
        Ok(name)
    }

    async fn assert_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        _durable: bool,
    ) -> Result<(), BrokerError> {
        let mut state = self.lock();
        state.channel(self.id)?;

        if name.is_empty() {
            return Err(BrokerError::Protocol {
                reason: "ACCESS_REFUSED - the default exchange cannot be declared".to_string(),
            });
        }
        match state.exchanges.get(name) {
            Some(existing) if existing.kind != kind => Err(BrokerError::Protocol {
                reason: format!(
                    "PRECONDITION_FAILED - exchange '{name}' is {}, not {}",
                    existing.kind.as_str(),
                    kind.as_str()
                ),
            }),
            Some(_) => Ok(()),
            None => {
                state.exchanges.insert(
                    name.to_string(),
                    Exchange {
                        kind,
                        bindings: Vec::new(),
                    },
                );
                trace!(channel = self.id, exchange = name, kind = kind.as_str(), "exchange declared");
                Ok(())
            }
        }
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        let mut state = self.lock();
        state.channel(self.id)?;

        if !state.queues.contains_key(queue) {
            return Err(BrokerError::NotFound {
                kind: "queue",
                name: queue.to_string(),
            });
        }
        let Some(target) = state.exchanges.get_mut(exchange) else {
            return Err(BrokerError::NotFound {
                kind: "exchange",
                name: exchange.to_string(),
            });
        };

        let binding = (queue.to_string(), routing_key.to_string());
        if !target.bindings.contains(&binding) {
            target.bindings.push(binding);
        }
        Ok(())
    }

    async fn delete_queue(&self, name: &str) -> Result<(), BrokerError> {
        let mut state = self.lock();
        state.channel(self.id)?;
        state.delete_queue(name);
        Ok(())
    }

    async fn prefetch(&self, count: u16) -> Result<(), BrokerError> {
        let mut state = self.lock();
        state.channel(self.id)?.prefetch = count;

        let names: Vec<String> = state.queues.keys().cloned().collect();
        for name in names {
            state.dispatch(&name);
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
        options: PublishOptions,
    ) -> Result<(), BrokerError> {
        let mut state = self.lock();
        state.channel(self.id)?;

        let targets: Vec<String> = if exchange.is_empty() {
            vec![routing_key.to_string()]
        } else {
            let Some(target) = state.exchanges.get(exchange) else {
                return Err(BrokerError::NotFound {
                    kind: "exchange",
                    name: exchange.to_string(),
                });
            };
            target
                .bindings
                .iter()
                .filter(|(_, key)| target.kind == ExchangeKind::Fanout || key == routing_key)
                .map(|(queue, _)| queue.clone())
                .collect()
        };

        let message = Message {
            payload,
            reply_to: options.reply_to,
            redelivered: false,
        };
        for queue in targets {
            state.enqueue(&queue, message.clone());
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, options: ConsumeOptions) -> Result<Consumer, BrokerError> {
        let mut state = self.lock();
        state.channel(self.id)?;

        let Some(target) = state.queues.get_mut(queue) else {
            return Err(BrokerError::NotFound {
                kind: "queue",
                name: queue.to_string(),
            });
        };
        if target.owner.is_some_and(|owner| owner != self.connection) {
            return Err(BrokerError::Protocol {
                reason: format!("RESOURCE_LOCKED - queue '{queue}' is exclusive to another connection"),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        target.consumers.push(ConsumerEntry {
            channel: self.id,
            no_ack: options.no_ack,
            deliveries: tx,
        });
        state.next_id += 1;
        let tag = format!("ctag-{}", state.next_id);
        trace!(channel = self.id, queue, tag = %tag, "consumer started");

        state.dispatch(queue);
        Ok(Consumer::new(tag, rx))
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        let mut state = self.lock();
        let Some(entry) = state.channel(self.id)?.unacked.remove(&delivery_tag) else {
            return Err(BrokerError::Protocol {
                reason: format!("PRECONDITION_FAILED - unknown delivery tag {delivery_tag}"),
            });
        };

        if let Some(queue) = state.queues.get_mut(&entry.queue) {
            queue.acked += 1;
        }
        state.dispatch(&entry.queue);
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError> {
        let mut state = self.lock();
        let Some(entry) = state.channel(self.id)?.unacked.remove(&delivery_tag) else {
            return Err(BrokerError::Protocol {
                reason: format!("PRECONDITION_FAILED - unknown delivery tag {delivery_tag}"),
            });
        };

        if let Some(queue) = state.queues.get_mut(&entry.queue) {
            queue.nacked += 1;
            if requeue {
                let mut message = entry.message;
                message.redelivered = true;
                queue.ready.push_front(message);
            }
        }
        state.dispatch(&entry.queue);
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.lock().close_channel(self.id);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.lock().channels.contains_key(&self.id)
    }
}
