//! Quick live-feed test against a running realtime backend.
//!
//! Subscribes to chat message inserts and room presence, prints everything
//! that arrives, then cleans up on Ctrl+C.

use std::sync::Arc;

use anyhow::Result;
use common::Config;
use realtime::{
    PresenceHooks, RowEvent, RowFilter, SubscriptionRegistry, WsTransport, WsTransportConfig,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    println!("Connecting to realtime backend at {}", config.realtime_url);

    let transport = Arc::new(WsTransport::connect(WsTransportConfig::from_config(
        &config,
    ))?);
    let registry = SubscriptionRegistry::new(transport.clone());

    let room_id = std::env::args().nth(1).unwrap_or_else(|| "demo".to_string());
    println!("Watching room {room_id}");

    let messages = registry
        .subscribe_to_table(
            "chat_messages",
            RowEvent::Insert,
            Some(RowFilter::eq("room_id", room_id.clone())),
            |change| println!("message: {:?}", change.after),
        )
        .await?;

    let presence = registry
        .subscribe_to_presence(
            &room_id,
            PresenceHooks::new()
                .on_sync(|state| println!("present: {} participants", state.len()))
                .on_join(|key, _payload| println!("joined: {key}"))
                .on_leave(|key, _payload| println!("left: {key}")),
        )
        .await?;

    tokio::signal::ctrl_c().await?;

    messages.dispose();
    presence.dispose();
    registry.cleanup();
    transport.shutdown();
    println!("Done");
    Ok(())
}
