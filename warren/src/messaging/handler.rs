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

//! Message handlers and the reply path.

use super::codec::JsonCodec;
use crate::broker::{BrokerChannel, PublishOptions};
use crate::error::WarrenError;
use crate::observability::MessagingMetrics;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Error type returned by message handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Processes the messages of a queue or broadcast consumer.
///
/// `responder` is `Some` only when the sender asked for a reply. A handler
/// returning an error, or panicking, is logged and counted; the consumer
/// keeps running either way.
///
/// Closures of the shape `Fn(Req, Option<Responder<Res>>) -> impl Future`
/// implement this trait, so most handlers are written inline:
///
/// ```rust
/// use warren::messaging::{HandlerError, Responder};
///
/// let handler = |request: String, responder: Option<Responder<String>>| async move {
///     if let Some(responder) = responder {
///         responder.respond(&request.to_uppercase(), true).await?;
///     }
///     Ok::<(), HandlerError>(())
/// };
/// # let _ = handler;
/// ```
#[async_trait]
pub trait MessageHandler<Req, Res>: Send + Sync + 'static
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    /// Handles one request.
    async fn handle(&self, request: Req, responder: Option<Responder<Res>>)
    -> Result<(), HandlerError>;
}

#[async_trait]
impl<Req, Res, F, Fut> MessageHandler<Req, Res> for F
where
    Req: Send + 'static,
    Res: Send + 'static,
    F: Fn(Req, Option<Responder<Res>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(
        &self,
        request: Req,
        responder: Option<Responder<Res>>,
    ) -> Result<(), HandlerError> {
        (self)(request, responder).await
    }
}

/// Tracks whether a delivery has been acknowledged or rejected.
#[derive(Debug, Default)]
pub(crate) struct Settlement(AtomicBool);

impl Settlement {
    /// Returns `true` for the first caller only.
    pub(crate) fn claim(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

/// Sends the reply to a request and settles the original delivery.
///
/// A responder is consumed by [`respond`](Self::respond), so each request is
/// answered at most once.
pub struct Responder<Res> {
    channel: Arc<dyn BrokerChannel>,
    reply_to: String,
    delivery_tag: u64,
    ack_enabled: bool,
    settlement: Arc<Settlement>,
    codec: JsonCodec,
    metrics: Arc<MessagingMetrics>,
    _response: PhantomData<fn(&Res)>,
}

impl<Res> Responder<Res> {
    pub(crate) fn new(
        channel: Arc<dyn BrokerChannel>,
        reply_to: String,
        delivery_tag: u64,
        ack_enabled: bool,
        settlement: Arc<Settlement>,
        codec: JsonCodec,
        metrics: Arc<MessagingMetrics>,
    ) -> Self {
        Self {
            channel,
            reply_to,
            delivery_tag,
            ack_enabled,
            settlement,
            codec,
            metrics,
            _response: PhantomData,
        }
    }

    /// Queue the reply is sent to.
    pub fn reply_to(&self) -> &str {
        &self.reply_to
    }

    /// Publishes `response` to the reply target.
    ///
    /// When the consumer acknowledges explicitly, the original delivery is
    /// then acknowledged if `ack` is true and rejected without requeue
    /// otherwise. The reply is always published first.
    pub async fn respond(self, response: &Res, ack: bool) -> Result<(), WarrenError>
    where
        Res: serde::Serialize,
    {
        let body = self.codec.encode(response)?;
        self.channel
            .send_to_queue(&self.reply_to, body, PublishOptions::default())
            .await?;
        self.metrics.record_reply_sent();
        debug!(reply_to = %self.reply_to, "reply sent");

        if self.ack_enabled && self.settlement.claim() {
            if ack {
                self.channel.ack(self.delivery_tag).await?;
                self.metrics.record_ack();
            } else {
                self.channel.nack(self.delivery_tag, false).await?;
                self.metrics.record_nack();
            }
        }
        Ok(())
    }
}

impl<Res> fmt::Debug for Responder<Res> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("reply_to", &self.reply_to)
            .field("delivery_tag", &self.delivery_tag)
            .field("ack_enabled", &self.ack_enabled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{Broker, ConsumeOptions, MemoryBroker, QueueDeclare};
    use crate::config::ConnectionSettings;

    #[test]
    fn test_settlement_is_claimed_once() {
        let settlement = Settlement::default();
        assert!(settlement.claim());
        assert!(!settlement.claim());
    }

    #[tokio::test]
    async fn test_respond_publishes_then_acks() {
        let broker = MemoryBroker::new();
        let connection = broker
            .connect(&ConnectionSettings::default().endpoint(30))
            .await
            .unwrap();
        let channel = connection.open_channel().await.unwrap();
        channel.assert_queue("work", QueueDeclare::default()).await.unwrap();
        channel.assert_queue("replies", QueueDeclare::default()).await.unwrap();
        let mut consumer = channel
            .consume("work", ConsumeOptions { no_ack: false })
            .await
            .unwrap();
        channel
            .send_to_queue("work", b"1".to_vec(), PublishOptions::reply_to("replies"))
            .await
            .unwrap();
        let delivery = consumer.next().await.unwrap();

        let metrics = Arc::new(MessagingMetrics::new());
        let responder: Responder<u32> = Responder::new(
            Arc::clone(&channel),
            "replies".to_string(),
            delivery.delivery_tag,
            true,
            Arc::new(Settlement::default()),
            JsonCodec::new(),
            Arc::clone(&metrics),
        );
        responder.respond(&2, true).await.unwrap();

        assert_eq!(broker.queue_stats("replies").unwrap().ready, 1);
        let work = broker.queue_stats("work").unwrap();
        assert_eq!(work.acked, 1);
        assert_eq!(work.unacked, 0);
        assert_eq!(metrics.total_replies_sent(), 1);
        assert_eq!(metrics.total_acked(), 1);
    }
}
