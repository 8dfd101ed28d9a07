//! Transport capability interface for the pub/sub backend.
//!
//! The registry depends only on these traits, so it can run against a fake
//! transport in tests and is not tied to one vendor's client. The
//! production implementation is [`WsTransport`](crate::ws::WsTransport).

use std::sync::Arc;

use async_trait::async_trait;
use common::Result;
use serde_json::Value;

use crate::events::{InboundEvent, RowEvent, RowFilter};

/// What a channel listens for, declared at bind time so the backend can
/// filter server-side where it supports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerBinding {
    /// Row changes on a table.
    RowChanges {
        table: String,
        event: RowEvent,
        filter: Option<RowFilter>,
    },
    /// Presence sync/join/leave for the channel's room.
    Presence,
    /// Every broadcast event on the channel; labels are filtered at
    /// dispatch.
    Broadcast,
}

/// Handler invoked for each inbound event on a channel.
pub type EventHandler = Box<dyn Fn(InboundEvent) + Send + Sync>;

/// Factory for transport channels.
#[async_trait]
pub trait ChannelTransport: Send + Sync + 'static {
    /// Open (but do not yet join) the named channel.
    async fn open(&self, name: &str) -> Result<Arc<dyn TransportChannel>>;
}

/// One named channel on the pub/sub backend.
#[async_trait]
pub trait TransportChannel: Send + Sync {
    /// Attach a listener. Must be called before [`subscribe`] so the join
    /// request can carry the listener configuration.
    ///
    /// [`subscribe`]: TransportChannel::subscribe
    fn bind(&self, binding: ListenerBinding, handler: EventHandler);

    /// Join the channel on the backend. Setup-time failures propagate to
    /// the caller.
    async fn subscribe(&self) -> Result<()>;

    /// Leave the channel. Fire-and-forget so disposers stay synchronous;
    /// implementations tolerate repeated calls and calls before a join.
    fn leave(&self);

    /// Send a broadcast payload to the channel. No delivery guarantee
    /// beyond currently connected subscribers.
    async fn send(&self, event: &str, payload: Value) -> Result<()>;

    /// Publish the local participant's presence payload into the room.
    async fn track(&self, payload: Value) -> Result<()>;
}
