// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Test utility for RFCOMM sessions against a real adapter.
//!
//! Usage: cargo run --features bluetooth --bin serial_probe -- [list|<address> [text]]

use anyhow::Result;
use btserial::{bluetooth, Config, SessionEvent, SessionInterface};
use std::env;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long to wait for a reply line.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("btserial=info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let target = args.get(1).map(|s| s.as_str()).unwrap_or("list");

    let config = Config::load()?;
    info!("Configuration loaded");

    let (registry, connector) =
        bluetooth::open_registry(&config.bluetooth, config.session.encoding).await?;

    if target == "list" {
        let devices = registry.list_candidates().await?;
        if devices.is_empty() {
            println!("No paired devices.");
        }
        for device in devices {
            println!("{}", device);
        }
        return Ok(());
    }

    let session = registry.open(target, connector).await?;
    println!("Connected to {} ({})", session.id(), session.encoding());

    let (interface, mut events) = SessionInterface::spawn_with_config(session, &config.session);
    if let Some(text) = args.get(2) {
        interface.send_message(text).await?;
    }

    let deadline = tokio::time::sleep(REPLY_TIMEOUT);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::MessageSent(text)) => println!("> {}", text),
                Some(SessionEvent::MessageReceived(line)) => {
                    println!("< {}", line);
                    break;
                }
                Some(SessionEvent::Error(e)) => println!("Error: {}", e),
                Some(SessionEvent::Disconnected) | None => {
                    println!("Remote closed the connection.");
                    break;
                }
            },
            _ = &mut deadline => {
                println!("No reply within {:?}.", REPLY_TIMEOUT);
                break;
            }
        }
    }

    drop(interface);
    registry.close_all().await;
    Ok(())
}
