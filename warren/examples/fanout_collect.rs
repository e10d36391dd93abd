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

//! Fanout broadcast with reply collection.
//!
//! Three nodes subscribe to the `health` exchange. A coordinator broadcasts a
//! probe and collects whatever replies arrive within 250 ms, then announces a
//! new configuration version without waiting for replies.
//!
//! # Features Demonstrated
//! - `on_broadcast` subscribers on exclusive queues
//! - `broadcast_collect` with a reply window
//! - Fire-and-forget `broadcast`
//! - Reading lifecycle events from the event stream
//!
//! # Running the Example
//! ```bash
//! RUST_LOG=info cargo run --example fanout_collect
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use warren::broker::MemoryBroker;
use warren::messaging::{BroadcastOptions, HandlerError, Responder};
use warren::{ConnectionEvent, ConnectionManager, ConnectionSettings, ManagerConfig, Messaging};

#[derive(Debug, Serialize, Deserialize)]
enum Probe {
    Health,
    Config { version: u64 },
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeHealth {
    node: String,
    load: f32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let manager = ConnectionManager::new(MemoryBroker::new(), ManagerConfig::default());
    let mut events = manager.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let ConnectionEvent::Error(error) = &event {
                warn!("broker error: {}", error);
            } else {
                info!("lifecycle event: {}", event.name());
            }
        }
    });

    let messaging = Messaging::new(manager.clone());
    messaging
        .connect(ConnectionSettings::new("localhost"), false)
        .await?;

    let mut nodes = Vec::new();
    for (index, load) in [0.25f32, 0.5, 0.75].into_iter().enumerate() {
        let node = format!("node-{index}");
        let subscription = messaging.on_broadcast(
            "health",
            move |probe: Probe, responder: Option<Responder<NodeHealth>>| {
                let node = node.clone();
                async move {
                    match (probe, responder) {
                        (Probe::Health, Some(responder)) => {
                            responder.respond(&NodeHealth { node, load }, true).await?;
                        }
                        (Probe::Config { version }, _) => {
                            info!("{} applying config version {}", node, version);
                        }
                        (Probe::Health, None) => {}
                    }
                    Ok::<(), HandlerError>(())
                }
            },
        );
        subscription.ready().await;
        nodes.push(subscription);
    }

    let options = BroadcastOptions::with_timeout(Duration::from_millis(250));
    let replies: Vec<NodeHealth> = messaging
        .broadcast_collect("health", options, &Probe::Health)
        .await?;
    for reply in &replies {
        info!("{} reports load {:.2}", reply.node, reply.load);
    }
    info!("{} nodes answered", replies.len());

    messaging
        .broadcast("health", &Probe::Config { version: 42 })
        .await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    for node in &nodes {
        node.cancel().await;
    }
    manager.shutdown().await;
    Ok(())
}
