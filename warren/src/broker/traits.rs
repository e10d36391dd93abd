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

use super::error::BrokerError;
use crate::config::Endpoint;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Entry point of a broker implementation.
///
/// A broker turns an [`Endpoint`] into an open [`BrokerConnection`]. The
/// connection manager is the only caller; it owns every connection it
/// obtains and never reuses one after it reported a close.
///
/// # Implementations
///
/// - [`MemoryBroker`](crate::broker::MemoryBroker): in-process broker for
///   tests and examples
/// - `AmqpBroker`: AMQP 0-9-1 over the network (feature `amqp`)
///
/// # Examples
///
/// ```rust
/// use warren::broker::{Broker, MemoryBroker};
/// use warren::ConnectionSettings;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = MemoryBroker::new();
/// let endpoint = ConnectionSettings::new("localhost").endpoint(30);
///
/// let connection = broker.connect(&endpoint).await?;
/// assert!(connection.is_open());
/// connection.close().await?;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Opens a connection to `endpoint`.
    ///
    /// # Errors
    ///
    /// Resolution, refusal and authentication failures are reported as the
    /// matching [`BrokerError`] variant. A failure the implementation cannot
    /// diagnose is reported as [`BrokerError::Indeterminate`].
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn BrokerConnection>, BrokerError>;

    /// Human-readable name, used for logging.
    fn name(&self) -> &str;
}

/// An open connection to the broker.
#[async_trait]
pub trait BrokerConnection: Send + Sync + 'static {
    /// Opens a new channel on this connection.
    async fn open_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError>;

    /// Closes the connection and every channel on it.
    ///
    /// Closing an already closed connection succeeds.
    async fn close(&self) -> Result<(), BrokerError>;

    /// Resolves once the connection is no longer usable.
    ///
    /// Returns `Ok(())` for an orderly close and the failure that ended the
    /// connection otherwise. Resolves immediately if already closed.
    async fn closed(&self) -> Result<(), BrokerError>;

    /// Returns `true` while the connection is usable.
    fn is_open(&self) -> bool;
}

/// A logical channel multiplexed over a broker connection.
///
/// Operations mirror the broker's native primitives. Consumers started on a
/// channel stop when the channel closes; deliveries still unacknowledged at
/// that point are requeued by the broker.
#[async_trait]
pub trait BrokerChannel: Send + Sync + 'static {
    /// Declares a queue and returns its name.
    ///
    /// An empty `name` together with `options.exclusive` asks the broker to
    /// generate a unique name.
    async fn assert_queue(&self, name: &str, options: QueueDeclare) -> Result<String, BrokerError>;

    /// Declares an exchange.
    async fn assert_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> Result<(), BrokerError>;

    /// Binds `queue` to `exchange`.
    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError>;

    /// Deletes a queue together with any messages still in it.
    async fn delete_queue(&self, name: &str) -> Result<(), BrokerError>;

    /// Limits the number of unacknowledged deliveries on this channel.
    async fn prefetch(&self, count: u16) -> Result<(), BrokerError>;

    /// Publishes `payload` to `exchange`.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
        options: PublishOptions,
    ) -> Result<(), BrokerError>;

    /// Sends `payload` directly to `queue` through the default exchange.
    async fn send_to_queue(
        &self,
        queue: &str,
        payload: Vec<u8>,
        options: PublishOptions,
    ) -> Result<(), BrokerError> {
        self.publish("", queue, payload, options).await
    }

    /// Starts consuming from `queue`.
    async fn consume(&self, queue: &str, options: ConsumeOptions) -> Result<Consumer, BrokerError>;

    /// Acknowledges a delivery.
    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError>;

    /// Rejects a delivery, optionally putting it back on its queue.
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError>;

    /// Closes the channel. Closing an already closed channel succeeds.
    async fn close(&self) -> Result<(), BrokerError>;

    /// Returns `true` while the channel is usable.
    fn is_open(&self) -> bool;
}

/// Flags for [`BrokerChannel::assert_queue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueDeclare {
    /// Survive broker restarts.
    pub durable: bool,
    /// Owned by the declaring connection and deleted when it closes.
    pub exclusive: bool,
    /// Deleted once its last consumer goes away.
    pub auto_delete: bool,
}

impl QueueDeclare {
    /// Flags of an exclusive, broker-named reply or subscription queue.
    pub fn exclusive() -> Self {
        Self {
            durable: false,
            exclusive: true,
            auto_delete: false,
        }
    }
}

impl Default for QueueDeclare {
    fn default() -> Self {
        Self {
            durable: true,
            exclusive: false,
            auto_delete: false,
        }
    }
}

/// Exchange routing kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    /// Every bound queue receives every message.
    Fanout,
    /// Messages go to queues bound with an equal routing key.
    Direct,
}

impl ExchangeKind {
    /// Returns the protocol name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fanout => "fanout",
            Self::Direct => "direct",
        }
    }
}

/// Message properties set on publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Queue the receiver should reply to.
    pub reply_to: Option<String>,
}

impl PublishOptions {
    /// Options carrying a reply target.
    pub fn reply_to(queue: impl Into<String>) -> Self {
        Self {
            reply_to: Some(queue.into()),
        }
    }
}

/// Flags for [`BrokerChannel::consume`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeOptions {
    /// Deliveries count as acknowledged as soon as they are sent.
    pub no_ack: bool,
}

/// A message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Channel-scoped tag used to acknowledge the delivery.
    pub delivery_tag: u64,
    /// Serialized message body.
    pub payload: Vec<u8>,
    /// Reply target set by the publisher.
    pub reply_to: Option<String>,
    /// Whether the message was delivered before and requeued.
    pub redelivered: bool,
}

/// Stream of deliveries from one consumer.
///
/// The stream ends when the consumer's channel or connection closes.
#[derive(Debug)]
pub struct Consumer {
    tag: String,
    deliveries: mpsc::UnboundedReceiver<Delivery>,
}

impl Consumer {
    /// Wraps a receiving end fed by a broker implementation.
    pub fn new(tag: impl Into<String>, deliveries: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self {
            tag: tag.into(),
            deliveries,
        }
    }

    /// Returns the consumer tag.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Waits for the next delivery, `None` once the consumer has ended.
    pub async fn next(&mut self) -> Option<Delivery> {
        self.deliveries.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_declare_defaults() {
        let declare = QueueDeclare::default();
        assert!(declare.durable);
        assert!(!declare.exclusive);

        let exclusive = QueueDeclare::exclusive();
        assert!(exclusive.exclusive);
        assert!(!exclusive.durable);
    }

    #[test]
    fn test_exchange_kind_names() {
        assert_eq!(ExchangeKind::Fanout.as_str(), "fanout");
        assert_eq!(ExchangeKind::Direct.as_str(), "direct");
    }

    #[tokio::test]
    async fn test_consumer_ends_with_sender() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut consumer = Consumer::new("ctag-1", rx);

        tx.send(Delivery {
            delivery_tag: 1,
            payload: b"{}".to_vec(),
            reply_to: None,
            redelivered: false,
        })
        .unwrap();
        drop(tx);

        assert_eq!(consumer.tag(), "ctag-1");
        assert_eq!(consumer.next().await.unwrap().delivery_tag, 1);
        assert!(consumer.next().await.is_none());
    }
}
