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

//! AMQP 0-9-1 broker over the network, built on `lapin`.
//!
//! Connect failures are classified into the crate's error taxonomy:
//! refused and reset sockets keep their codes, resolver failures become
//! [`BrokerError::HostNotFound`], and an `ACCESS_REFUSED` close during the
//! handshake is reported as [`BrokerError::ConnectionReset`], which is how
//! RabbitMQ rejects bad credentials.

use super::error::BrokerError;
use super::traits::{
    Broker, BrokerChannel, BrokerConnection, ConsumeOptions, Consumer, Delivery, ExchangeKind,
    PublishOptions, QueueDeclare,
};
use crate::config::Endpoint;
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions, QueueDeleteOptions,
};
use lapin::types::{FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::io;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

/// Broker reached over TCP with the AMQP 0-9-1 protocol.
///
/// # Examples
///
/// ```rust,no_run
/// use warren::broker::AmqpBroker;
/// use warren::{ConnectionManager, ConnectionSettings, ManagerConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = ConnectionManager::new(AmqpBroker::new(), ManagerConfig::default());
/// manager.start(ConnectionSettings::new("rabbit.local"), true).await?;
/// let connection = manager.connection().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct AmqpBroker {
    properties: ConnectionProperties,
}

impl std::fmt::Debug for AmqpBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpBroker").finish_non_exhaustive()
    }
}

impl AmqpBroker {
    /// Creates a broker with default connection properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a broker that connects with `properties`.
    pub fn with_properties(properties: ConnectionProperties) -> Self {
        Self { properties }
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        let connection = Connection::connect(&endpoint.to_uri(), self.properties.clone())
            .await
            .map_err(|error| classify_connect_error(error, endpoint))?;

        let (status, _) = watch::channel(Link::Open);
        let status = Arc::new(status);
        let on_error = Arc::clone(&status);
        connection.on_error(move |error| {
            warn!("amqp connection error: {}", error);
            on_error.send_replace(Link::Failed(error.to_string()));
        });

        debug!(endpoint = %endpoint, "amqp connection opened");
        Ok(Arc::new(AmqpConnection { connection, status }))
    }

    fn name(&self) -> &str {
        "amqp"
    }
}

fn classify_connect_error(error: lapin::Error, endpoint: &Endpoint) -> BrokerError {
    match &error {
        lapin::Error::IOError(source) => match source.kind() {
            io::ErrorKind::ConnectionRefused => BrokerError::ConnectionRefused {
                address: endpoint.hostname().to_string(),
                port: endpoint.port(),
            },
            io::ErrorKind::ConnectionReset | io::ErrorKind::UnexpectedEof => {
                BrokerError::ConnectionReset
            }
            _ if is_resolution_failure(&source.to_string()) => BrokerError::HostNotFound {
                host: endpoint.hostname().to_string(),
            },
            kind => BrokerError::Coded {
                code: format!("{kind:?}"),
                reason: source.to_string(),
            },
        },
        lapin::Error::ProtocolError(_) if error.to_string().contains("ACCESS_REFUSED") => {
            BrokerError::ConnectionReset
        }
        lapin::Error::ProtocolError(_) => BrokerError::Protocol {
            reason: error.to_string(),
        },
        _ => BrokerError::Indeterminate {
            reason: error.to_string(),
        },
    }
}

fn is_resolution_failure(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("lookup")
        || message.contains("name or service not known")
        || message.contains("nodename nor servname")
        || message.contains("no such host")
}

fn channel_error(error: lapin::Error) -> BrokerError {
    match &error {
        lapin::Error::IOError(source) => BrokerError::Io {
            source: io::Error::new(source.kind(), source.to_string()),
        },
        lapin::Error::ProtocolError(_) => BrokerError::Protocol {
            reason: error.to_string(),
        },
        lapin::Error::InvalidChannelState(_) => BrokerError::channel_closed(error.to_string()),
        lapin::Error::InvalidConnectionState(_) => {
            BrokerError::connection_closed(error.to_string())
        }
        _ => BrokerError::Protocol {
            reason: error.to_string(),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Link {
    Open,
    Closed,
    Failed(String),
}

struct AmqpConnection {
    connection: Connection,
    status: Arc<watch::Sender<Link>>,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    async fn open_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        let channel = self.connection.create_channel().await.map_err(channel_error)?;
        trace!(channel = channel.id(), "amqp channel opened");
        Ok(Arc::new(AmqpChannel { channel }))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.connection.status().connected() {
            self.connection
                .close(200, "OK")
                .await
                .map_err(channel_error)?;
        }
        self.status.send_if_modified(|link| {
            if *link == Link::Open {
                *link = Link::Closed;
                true
            } else {
                false
            }
        });
        Ok(())
    }

    async fn closed(&self) -> Result<(), BrokerError> {
        let mut status = self.status.subscribe();
        loop {
            let current = status.borrow_and_update().clone();
            match current {
                Link::Open => {}
                Link::Closed => return Ok(()),
                Link::Failed(reason) => return Err(BrokerError::connection_closed(reason)),
            }
            if status.changed().await.is_err() {
                return Ok(());
            }
        }
    }

    fn is_open(&self) -> bool {
        *self.status.borrow() == Link::Open && self.connection.status().connected()
    }
}

struct AmqpChannel {
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn assert_queue(&self, name: &str, options: QueueDeclare) -> Result<String, BrokerError> {
        let queue = self
            .channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: options.durable,
                    exclusive: options.exclusive,
                    auto_delete: options.auto_delete,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(channel_error)?;
        Ok(queue.name().as_str().to_string())
    }

    async fn assert_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> Result<(), BrokerError> {
        let kind = match kind {
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
        };
        self.channel
            .exchange_declare(
                name,
                kind,
                ExchangeDeclareOptions {
                    durable,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(channel_error)
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(channel_error)
    }

    async fn delete_queue(&self, name: &str) -> Result<(), BrokerError> {
        self.channel
            .queue_delete(name, QueueDeleteOptions::default())
            .await
            .map_err(channel_error)?;
        Ok(())
    }

    async fn prefetch(&self, count: u16) -> Result<(), BrokerError> {
        self.channel
            .basic_qos(count, BasicQosOptions::default())
            .await
            .map_err(channel_error)
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
        options: PublishOptions,
    ) -> Result<(), BrokerError> {
        let mut properties = BasicProperties::default();
        if let Some(reply_to) = options.reply_to {
            properties = properties.with_reply_to(ShortString::from(reply_to));
        }
        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(channel_error)?;
        Ok(())
    }

    async fn consume(&self, queue: &str, options: ConsumeOptions) -> Result<Consumer, BrokerError> {
        let tag = format!("warren-{}", uuid::Uuid::new_v4().simple());
        let mut deliveries = self
            .channel
            .basic_consume(
                queue,
                &tag,
                BasicConsumeOptions {
                    no_ack: options.no_ack,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(channel_error)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let consumer_tag = tag.clone();
        tokio::spawn(async move {
            while let Some(next) = deliveries.next().await {
                let delivery = match next {
                    Ok(delivery) => delivery,
                    Err(error) => {
                        debug!(tag = %consumer_tag, "amqp consumer ended: {}", error);
                        break;
                    }
                };
                let forwarded = Delivery {
                    delivery_tag: delivery.delivery_tag,
                    reply_to: delivery
                        .properties
                        .reply_to()
                        .as_ref()
                        .map(|queue| queue.as_str().to_string()),
                    redelivered: delivery.redelivered,
                    payload: delivery.data,
                };
                if tx.send(forwarded).is_err() {
                    break;
                }
            }
        });

        Ok(Consumer::new(tag, rx))
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(channel_error)
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), BrokerError> {
        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    requeue,
                    ..BasicNackOptions::default()
                },
            )
            .await
            .map_err(channel_error)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.channel.status().connected() {
            self.channel.close(200, "OK").await.map_err(channel_error)?;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.channel.status().connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionSettings;

    #[test]
    fn test_resolution_failures_detected() {
        assert!(is_resolution_failure(
            "failed to lookup address information: Name or service not known"
        ));
        assert!(is_resolution_failure("No such host is known."));
        assert!(!is_resolution_failure("connection refused"));
    }

    #[test]
    fn test_refused_socket_keeps_address_and_port() {
        let endpoint = ConnectionSettings::new("10.1.2.3:5673").endpoint(30);
        let error = lapin::Error::IOError(Arc::new(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "refused",
        )));

        match classify_connect_error(error, &endpoint) {
            BrokerError::ConnectionRefused { address, port } => {
                assert_eq!(address, "10.1.2.3");
                assert_eq!(port, 5673);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_reset_socket_is_credential_failure() {
        let endpoint = ConnectionSettings::new("rabbit").endpoint(30);
        let error = lapin::Error::IOError(Arc::new(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "reset",
        )));
        assert!(matches!(
            classify_connect_error(error, &endpoint),
            BrokerError::ConnectionReset
        ));
    }
}
