//! Realtime subscription layer for the marketplace application.
//!
//! Multiplexes logical subscriptions (row-change feeds, presence rooms,
//! broadcast channels) over shared transport channels.
//!
//! ## Architecture
//!
//! ```text
//! WebSocket backend (Phoenix-style frames)
//!         ↓
//! WsTransport (one multiplexed connection, reconnect + heartbeat)
//!         ↓
//! SubscriptionRegistry (one channel per topic, callback fan-out)
//!         ↓
//! caller callbacks
//! ```
//!
//! The registry guarantees one live channel per topic: subscribing twice to
//! the same topic reuses the connection, and the channel is torn down when
//! the last callback unregisters. Dispatch preserves per-topic arrival
//! order and iterates a snapshot, so callbacks may subscribe or dispose
//! reentrantly.
//!
//! ```ignore
//! let transport = Arc::new(WsTransport::connect(WsTransportConfig::from_config(&config))?);
//! let registry = SubscriptionRegistry::new(transport);
//!
//! let disposer = registry
//!     .subscribe_to_table(
//!         "chat_messages",
//!         RowEvent::Insert,
//!         Some(RowFilter::eq("room_id", room_id)),
//!         |change| println!("new message: {:?}", change.after),
//!     )
//!     .await?;
//! // ...
//! disposer.dispose();
//! ```

pub mod events;
pub mod registry;
pub mod topic;
pub mod transport;
pub mod ws;

pub use events::{
    BroadcastMessage, InboundEvent, PresenceHooks, PresenceState, RowChange, RowEvent, RowFilter,
};
pub use registry::{Disposer, SubscriptionRegistry};
pub use topic::Topic;
pub use transport::{ChannelTransport, EventHandler, ListenerBinding, TransportChannel};
pub use ws::{WsTransport, WsTransportConfig};
