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

//! Request/reply over a durable queue.
//!
//! A worker consumes the `pricing` queue with explicit acknowledgements and
//! answers each request on its reply-to queue. Halfway through, the broker
//! drops every connection; the manager reconnects and the worker rebuilds its
//! consumer on the new connection without any help from the application.
//!
//! # Features Demonstrated
//! - `on_queue` with acknowledgements and prefetch
//! - Replying through a `Responder`
//! - Keep-alive consumers surviving a reconnect
//! - Lifecycle events through a `ConnectionEventHandler`
//!
//! # Running the Example
//! ```bash
//! RUST_LOG=warren=debug cargo run --example request_reply
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use warren::broker::{ConsumeOptions, MemoryBroker, PublishOptions, QueueDeclare};
use warren::connection::{ConnectionError, ConnectionEventHandler, LiveConnection};
use warren::messaging::{HandlerError, QueueOptions, Responder};
use warren::{ConnectionManager, ConnectionSettings, ManagerConfig, Messaging};

#[derive(Debug, Serialize, Deserialize)]
struct PriceRequest {
    sku: String,
    quantity: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct PriceQuote {
    sku: String,
    total_cents: u64,
}

/// Logs lifecycle transitions.
struct Lifecycle;

impl ConnectionEventHandler for Lifecycle {
    fn on_established(&self, connection: &LiveConnection) {
        info!("established {}", connection.id());
    }

    fn on_closed(&self) {
        info!("connection closed");
    }

    fn on_error(&self, error: &ConnectionError) {
        info!("connection error: {}", error);
    }

    fn on_reconnect_attempt(&self, attempt: u32) {
        info!("reconnect attempt #{}", attempt);
    }
}

fn unit_price(sku: &str) -> u64 {
    sku.bytes().map(u64::from).sum()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let broker = MemoryBroker::new();
    let manager = ConnectionManager::new(broker.clone(), ManagerConfig::default());
    manager.set_event_handler(Arc::new(Lifecycle));

    let messaging = Messaging::new(manager.clone());
    messaging
        .connect(ConnectionSettings::new("localhost"), true)
        .await?;

    let worker = messaging.on_queue(
        "pricing",
        QueueOptions::default().with_ack().with_prefetch(4),
        |request: PriceRequest, responder: Option<Responder<PriceQuote>>| async move {
            let quote = PriceQuote {
                total_cents: unit_price(&request.sku) * u64::from(request.quantity),
                sku: request.sku,
            };
            match responder {
                Some(responder) => responder.respond(&quote, true).await?,
                None => info!("no reply requested for {}", quote.sku),
            }
            Ok::<(), HandlerError>(())
        },
    );
    worker.ready().await;

    // A requester with an exclusive reply queue
    let connection = manager.connection().await?;
    let channel = connection.open_channel().await?;
    let replies = channel.assert_queue("", QueueDeclare::exclusive()).await?;
    let mut consumer = channel
        .consume(&replies, ConsumeOptions { no_ack: true })
        .await?;

    for (round, sku) in ["apple", "pear", "plum"].iter().enumerate() {
        let request = PriceRequest {
            sku: (*sku).to_string(),
            quantity: round as u32 + 1,
        };
        channel
            .send_to_queue(
                "pricing",
                serde_json::to_vec(&request)?,
                PublishOptions::reply_to(&replies),
            )
            .await?;

        if let Some(delivery) = consumer.next().await {
            let quote: PriceQuote = serde_json::from_slice(&delivery.payload)?;
            info!("quote: {:?}", quote);
        }
    }

    info!("severing all broker connections");
    broker.sever_connections();
    tokio::time::sleep(Duration::from_millis(200)).await;
    worker.ready().await;

    // The old requester channel died with its connection
    let connection = manager.connection().await?;
    let channel = connection.open_channel().await?;
    let replies = channel.assert_queue("", QueueDeclare::exclusive()).await?;
    let mut consumer = channel
        .consume(&replies, ConsumeOptions { no_ack: true })
        .await?;
    let request = PriceRequest {
        sku: "quince".to_string(),
        quantity: 2,
    };
    channel
        .send_to_queue(
            "pricing",
            serde_json::to_vec(&request)?,
            PublishOptions::reply_to(&replies),
        )
        .await?;
    if let Some(delivery) = consumer.next().await {
        let quote: PriceQuote = serde_json::from_slice(&delivery.payload)?;
        info!("quote after reconnect: {:?}", quote);
    }

    info!(
        "handled {} requests, {} replies sent",
        messaging.metrics().total_handled(),
        messaging.metrics().total_replies_sent()
    );

    worker.cancel().await;
    manager.shutdown().await;
    Ok(())
}
