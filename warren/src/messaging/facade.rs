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

//! The messaging façade.

use super::codec::JsonCodec;
use super::envelope::Envelope;
use super::handler::{MessageHandler, Responder, Settlement};
use super::options::{BroadcastOptions, QueueOptions};
use super::subscription::{Subscription, SubscriptionState};
use crate::broker::{
    BrokerChannel, BrokerError, ConsumeOptions, Consumer, Delivery, ExchangeKind,
    PublishOptions, QueueDeclare,
};
use crate::config::ConnectionSettings;
use crate::connection::{ConnectionError, ConnectionManager, LiveConnection};
use crate::error::WarrenError;
use crate::observability::MessagingMetrics;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Request/reply and broadcast messaging on top of a [`ConnectionManager`].
///
/// Long-lived consumers ([`on_queue`](Self::on_queue),
/// [`on_broadcast`](Self::on_broadcast)) are registered as keep-alive
/// subscribers and rebuild their channel on every new connection. One-off
/// operations ([`broadcast`](Self::broadcast),
/// [`broadcast_collect`](Self::broadcast_collect)) wait for the next
/// connection and use a channel of their own that is closed afterwards.
///
/// # Examples
///
/// ```rust
/// use warren::broker::MemoryBroker;
/// use warren::messaging::{HandlerError, Messaging, QueueOptions, Responder};
/// use warren::{ConnectionManager, ConnectionSettings, ManagerConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = ConnectionManager::new(MemoryBroker::new(), ManagerConfig::default());
/// let messaging = Messaging::new(manager);
/// messaging.connect(ConnectionSettings::new("localhost"), false).await?;
///
/// let subscription = messaging.on_queue(
///     "sum",
///     QueueOptions::default().with_ack(),
///     |numbers: Vec<i64>, responder: Option<Responder<i64>>| async move {
///         if let Some(responder) = responder {
///             responder.respond(&numbers.iter().sum(), true).await?;
///         }
///         Ok::<(), HandlerError>(())
///     },
/// );
/// subscription.ready().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Messaging {
    manager: ConnectionManager,
    codec: JsonCodec,
    metrics: Arc<MessagingMetrics>,
}

/// What a long-lived consumer reads from.
#[derive(Debug, Clone)]
enum Source {
    Queue { name: String, options: QueueOptions },
    Broadcast { exchange: String },
}

impl Source {
    fn name(&self) -> &str {
        match self {
            Self::Queue { name, .. } => name,
            Self::Broadcast { exchange } => exchange,
        }
    }

    fn ack(&self) -> bool {
        match self {
            Self::Queue { options, .. } => options.ack,
            Self::Broadcast { .. } => false,
        }
    }
}

/// Everything a consumer task needs, shared across reconnects.
struct ConsumerContext<Req, Res, H> {
    source: Source,
    handler: Arc<H>,
    state: Arc<SubscriptionState>,
    codec: JsonCodec,
    metrics: Arc<MessagingMetrics>,
    _messages: PhantomData<fn(Req) -> Res>,
}

impl Messaging {
    /// Creates a façade over `manager`.
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            manager,
            codec: JsonCodec::new(),
            metrics: Arc::new(MessagingMetrics::new()),
        }
    }

    /// Replaces the message codec.
    pub fn with_codec(mut self, codec: JsonCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Starts the underlying connection manager.
    ///
    /// See [`ConnectionManager::start`].
    pub async fn connect(
        &self,
        settings: ConnectionSettings,
        retry_on_error: bool,
    ) -> Result<(), ConnectionError> {
        self.manager.start(settings, retry_on_error).await
    }

    /// Returns the underlying connection manager.
    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Returns the messaging metrics.
    pub fn metrics(&self) -> &MessagingMetrics {
        &self.metrics
    }

    /// Consumes requests from the durable queue `queue`.
    ///
    /// On every established connection a channel is opened, the queue is
    /// declared, the prefetch limit applied and a consumer started. Requests
    /// carrying a reply target reach `handler` with a [`Responder`]; all
    /// others without one.
    ///
    /// With `options.ack` deliveries are settled explicitly: by the
    /// responder, or after the handler returns (acknowledged on success,
    /// rejected without requeue on failure).
    pub fn on_queue<Req, Res, H>(
        &self,
        queue: impl Into<String>,
        options: QueueOptions,
        handler: H,
    ) -> Subscription
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + Sync + 'static,
        H: MessageHandler<Req, Res>,
    {
        let name = queue.into();
        self.subscribe(Source::Queue { name, options }, handler)
    }

    /// Answers broadcasts published to the fanout exchange `exchange`.
    ///
    /// Every established connection gets an exclusive queue bound to the
    /// exchange, consumed without acknowledgements.
    pub fn on_broadcast<Req, Res, H>(&self, exchange: impl Into<String>, handler: H) -> Subscription
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + Sync + 'static,
        H: MessageHandler<Req, Res>,
    {
        let exchange = exchange.into();
        self.subscribe(Source::Broadcast { exchange }, handler)
    }

    /// Publishes `request` to the fanout exchange `exchange` without
    /// waiting for replies.
    pub async fn broadcast<Req>(&self, exchange: &str, request: &Req) -> Result<(), WarrenError>
    where
        Req: Serialize + ?Sized,
    {
        let body = self.codec.encode(request)?;
        let connection = self.manager.connection().await?;
        let channel = connection.open_channel().await?;

        let result: Result<(), BrokerError> = async {
            channel
                .assert_exchange(exchange, ExchangeKind::Fanout, false)
                .await?;
            channel
                .publish(exchange, "", body, PublishOptions::default())
                .await
        }
        .await;
        close_channel(channel.as_ref()).await;

        result?;
        self.metrics.record_broadcast();
        debug!(exchange, "broadcast published");
        Ok(())
    }

    /// Publishes `request` to the fanout exchange `exchange` and collects
    /// the replies that arrive within `options.timeout`.
    ///
    /// Replies go to an exclusive queue created for this call, which is
    /// deleted once the window has passed. Replies that cannot be decoded
    /// are skipped.
    pub async fn broadcast_collect<Req, Res>(
        &self,
        exchange: &str,
        options: BroadcastOptions,
        request: &Req,
    ) -> Result<Vec<Res>, WarrenError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let connection = self.manager.connection().await?;
        let channel = connection.open_channel().await?;

        let mut reply_queue = None;
        let result = self
            .collect_replies(channel.as_ref(), exchange, options, request, &mut reply_queue)
            .await;

        if let Some(queue) = reply_queue {
            if let Err(error) = channel.delete_queue(&queue).await {
                warn!(queue = %queue, "failed to delete reply queue: {}", error);
            }
        }
        close_channel(channel.as_ref()).await;

        let replies = result?;
        self.metrics.record_responses_collected(replies.len() as u64);
        Ok(replies)
    }

    async fn collect_replies<Req, Res>(
        &self,
        channel: &dyn BrokerChannel,
        exchange: &str,
        options: BroadcastOptions,
        request: &Req,
        reply_queue: &mut Option<String>,
    ) -> Result<Vec<Res>, WarrenError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        channel
            .assert_exchange(exchange, ExchangeKind::Fanout, false)
            .await?;
        let queue = channel.assert_queue("", QueueDeclare::exclusive()).await?;
        *reply_queue = Some(queue.clone());
        let mut consumer = channel
            .consume(&queue, ConsumeOptions { no_ack: true })
            .await?;

        let (body, publish) = Envelope::outgoing(request, Some(queue.clone())).encode(&self.codec)?;
        channel.publish(exchange, "", body, publish).await?;
        self.metrics.record_broadcast();

        let deadline = tokio::time::Instant::now() + options.timeout;
        let mut replies = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, consumer.next()).await {
                Ok(Some(delivery)) => match self.codec.decode::<Res>(&delivery.payload) {
                    Ok(reply) => replies.push(reply),
                    Err(error) => {
                        self.metrics.record_decode_failure();
                        warn!(exchange, "skipping undecodable reply: {}", error);
                    }
                },
                Ok(None) => {
                    warn!(exchange, replies = replies.len(), "reply consumer ended before the timeout");
                    return Err(BrokerError::connection_closed(
                        "reply consumer ended before the broadcast window closed",
                    )
                    .into());
                }
                Err(_) => break,
            }
        }
        debug!(exchange, replies = replies.len(), "broadcast replies collected");
        Ok(replies)
    }

    fn subscribe<Req, Res, H>(&self, source: Source, handler: H) -> Subscription
    where
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + Send + Sync + 'static,
        H: MessageHandler<Req, Res>,
    {
        let state = SubscriptionState::new(source.name().to_string());
        let context = Arc::new(ConsumerContext {
            source,
            handler: Arc::new(handler),
            state: Arc::clone(&state),
            codec: self.codec,
            metrics: Arc::clone(&self.metrics),
            _messages: PhantomData,
        });

        let id = self.manager.keep_alive(move |connection| {
            let context = Arc::clone(&context);
            tokio::spawn(async move {
                if let Err(error) = context.serve(connection).await {
                    warn!(subscription = %context.source.name(), "consumer setup failed: {}", error);
                }
            });
        });
        state.set_subscriber(id);
        Subscription::new(state, self.manager.clone())
    }
}

impl std::fmt::Debug for Messaging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messaging")
            .field("manager", &self.manager)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

impl<Req, Res, H> ConsumerContext<Req, Res, H>
where
    Req: DeserializeOwned + Send + 'static,
    Res: Serialize + Send + Sync + 'static,
    H: MessageHandler<Req, Res>,
{
    /// Declares the source on a fresh channel and consumes until the channel
    /// closes.
    async fn serve(self: &Arc<Self>, connection: LiveConnection) -> Result<(), BrokerError> {
        if self.state.is_cancelled() {
            return Ok(());
        }
        let channel = connection.open_channel().await?;
        if !self.state.attach(Arc::clone(&channel)) {
            close_channel(channel.as_ref()).await;
            return Ok(());
        }

        let (queue, mut consumer) = match self.declare(channel.as_ref()).await {
            Ok(declared) => declared,
            Err(error) => {
                self.state.detach(&channel);
                close_channel(channel.as_ref()).await;
                return Err(error);
            }
        };
        debug!(
            subscription = %self.source.name(),
            queue = %queue,
            consumer = consumer.tag(),
            connection = %connection.id(),
            "consumer started"
        );
        self.state.set_consuming(true);

        while let Some(delivery) = consumer.next().await {
            let context = Arc::clone(self);
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { context.dispatch(channel, delivery).await });
        }

        self.state.set_consuming(false);
        debug!(subscription = %self.source.name(), "consumer ended");
        Ok(())
    }

    /// Declares the source topology on `channel` and starts consuming.
    async fn declare(&self, channel: &dyn BrokerChannel) -> Result<(String, Consumer), BrokerError> {
        let (queue, no_ack) = match &self.source {
            Source::Queue { name, options } => {
                channel.assert_queue(name, QueueDeclare::default()).await?;
                channel.prefetch(options.prefetch).await?;
                (name.clone(), !options.ack)
            }
            Source::Broadcast { exchange } => {
                channel
                    .assert_exchange(exchange, ExchangeKind::Fanout, false)
                    .await?;
                let queue = channel.assert_queue("", QueueDeclare::exclusive()).await?;
                channel.bind_queue(&queue, exchange, "").await?;
                (queue, true)
            }
        };
        let consumer = channel.consume(&queue, ConsumeOptions { no_ack }).await?;
        Ok((queue, consumer))
    }

    /// Runs the handler for one delivery and settles it if the handler did
    /// not.
    async fn dispatch(self: Arc<Self>, channel: Arc<dyn BrokerChannel>, delivery: Delivery) {
        self.metrics.record_consumed();
        let ack = self.source.ack();
        let tag = delivery.delivery_tag;

        let envelope = match Envelope::<Req>::decode(&self.codec, &delivery, ack) {
            Ok(envelope) => envelope,
            Err(error) => {
                self.metrics.record_decode_failure();
                warn!(subscription = %self.source.name(), "dropping undecodable message: {}", error);
                if ack {
                    self.settle(channel.as_ref(), tag, false).await;
                }
                return;
            }
        };

        let settlement = Arc::new(Settlement::default());
        let responder = envelope.reply_to.map(|reply_to| {
            Responder::new(
                Arc::clone(&channel),
                reply_to,
                tag,
                ack,
                Arc::clone(&settlement),
                self.codec,
                Arc::clone(&self.metrics),
            )
        });

        let started = Instant::now();
        let handler = Arc::clone(&self.handler);
        let request = envelope.payload;
        let outcome = tokio::spawn(async move { handler.handle(request, responder).await }).await;

        let succeeded = match outcome {
            Ok(Ok(())) => {
                self.metrics.record_handled(started.elapsed());
                true
            }
            Ok(Err(failure)) => {
                self.metrics.record_handler_failure();
                error!(subscription = %self.source.name(), "message handler failed: {}", failure);
                false
            }
            Err(join_error) => {
                self.metrics.record_handler_failure();
                error!(subscription = %self.source.name(), "message handler panicked: {}", join_error);
                false
            }
        };

        if ack && settlement.claim() {
            self.settle(channel.as_ref(), tag, succeeded).await;
        }
    }

    async fn settle(&self, channel: &dyn BrokerChannel, tag: u64, ack: bool) {
        let result = if ack {
            self.metrics.record_ack();
            channel.ack(tag).await
        } else {
            self.metrics.record_nack();
            channel.nack(tag, false).await
        };
        if let Err(error) = result {
            warn!(subscription = %self.source.name(), "failed to settle delivery {}: {}", tag, error);
        }
    }
}

async fn close_channel(channel: &dyn BrokerChannel) {
    if let Err(error) = channel.close().await {
        debug!("error while closing channel: {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManagerConfig;
    use crate::broker::MemoryBroker;
    use crate::messaging::HandlerError;
    use std::time::Duration;

    async fn connected(broker: &MemoryBroker) -> Messaging {
        let manager = ConnectionManager::new(broker.clone(), ManagerConfig::default());
        let messaging = Messaging::new(manager);
        messaging
            .connect(ConnectionSettings::default(), false)
            .await
            .unwrap();
        messaging
    }

    #[tokio::test]
    async fn test_on_queue_declares_queue_with_prefetch() {
        let broker = MemoryBroker::new();
        let messaging = connected(&broker).await;

        let subscription = messaging.on_queue(
            "jobs",
            QueueOptions::default(),
            |_: String, _: Option<Responder<String>>| async { Ok::<(), HandlerError>(()) },
        );
        subscription.ready().await;

        assert!(broker.queue_exists("jobs"));
        assert_eq!(broker.queue_stats("jobs").unwrap().consumers, 1);
        assert_eq!(subscription.name(), "jobs");
        assert!(subscription.is_consuming());
    }

    #[tokio::test]
    async fn test_message_without_reply_target_is_acked_after_handler() {
        let broker = MemoryBroker::new();
        let messaging = connected(&broker).await;
        let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();

        let subscription = messaging.on_queue(
            "events",
            QueueOptions::default().with_ack(),
            move |event: u32, responder: Option<Responder<()>>| {
                let seen_tx = seen_tx.clone();
                async move {
                    assert!(responder.is_none());
                    let _ = seen_tx.send(event);
                    Ok::<(), HandlerError>(())
                }
            },
        );
        subscription.ready().await;

        let channel = messaging
            .manager()
            .connection()
            .await
            .unwrap()
            .open_channel()
            .await
            .unwrap();
        channel
            .send_to_queue("events", b"17".to_vec(), PublishOptions::default())
            .await
            .unwrap();

        assert_eq!(seen_rx.recv().await, Some(17));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(broker.queue_stats("events").unwrap().acked, 1);
        assert_eq!(messaging.metrics().total_consumed(), 1);
    }

    #[tokio::test]
    async fn test_cancel_stops_consumer() {
        let broker = MemoryBroker::new();
        let messaging = connected(&broker).await;

        let subscription = messaging.on_queue(
            "jobs",
            QueueOptions::default(),
            |_: String, _: Option<Responder<String>>| async { Ok::<(), HandlerError>(()) },
        );
        subscription.ready().await;
        subscription.cancel().await;

        assert!(subscription.is_cancelled());
        assert!(!subscription.is_consuming());
        assert_eq!(broker.queue_stats("jobs").unwrap().consumers, 0);
        assert_eq!(messaging.manager().keep_alive_subscribers(), 0);
    }

    #[tokio::test]
    async fn test_failed_consumer_setup_closes_its_channel() {
        let broker = MemoryBroker::new();
        let messaging = connected(&broker).await;
        let channel = messaging
            .manager()
            .connection()
            .await
            .unwrap()
            .open_channel()
            .await
            .unwrap();
        channel
            .assert_exchange("audit", ExchangeKind::Direct, false)
            .await
            .unwrap();
        channel.close().await.unwrap();
        assert_eq!(broker.open_channels(), 0);

        let subscription = messaging.on_broadcast(
            "audit",
            |_: String, _: Option<Responder<String>>| async { Ok::<(), HandlerError>(()) },
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!subscription.is_consuming());
        assert_eq!(broker.open_channels(), 0);
    }

    #[tokio::test]
    async fn test_ready_returns_once_cancelled() {
        let manager = ConnectionManager::new(MemoryBroker::new(), ManagerConfig::default());
        let messaging = Messaging::new(manager);

        let subscription = messaging.on_queue(
            "idle",
            QueueOptions::default(),
            |_: String, _: Option<Responder<String>>| async { Ok::<(), HandlerError>(()) },
        );
        let waiting = tokio::time::timeout(Duration::from_millis(20), subscription.ready()).await;
        assert!(waiting.is_err());

        subscription.cancel().await;
        tokio::time::timeout(Duration::from_secs(1), subscription.ready())
            .await
            .unwrap();
        assert!(!subscription.is_consuming());
    }

    #[tokio::test]
    async fn test_broadcast_without_listeners_succeeds() {
        let broker = MemoryBroker::new();
        let messaging = connected(&broker).await;

        messaging.broadcast("news", &"hello").await.unwrap();

        assert!(broker.exchange_exists("news"));
        assert_eq!(broker.open_channels(), 0);
        assert_eq!(messaging.metrics().total_broadcasts(), 1);
    }
}
