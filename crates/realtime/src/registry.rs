//! Subscription registry: multiplexes logical subscriptions over shared
//! transport channels.
//!
//! One channel per topic, created lazily on the first registration and torn
//! down when the last callback unregisters. Dispatch iterates a snapshot of
//! the callback list, so callbacks may subscribe or dispose reentrantly
//! while an event is being delivered.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use common::{Error, Result};
use dashmap::DashMap;
use metrics::{counter, gauge};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::events::{
    BroadcastMessage, InboundEvent, PresenceHooks, RowChange, RowEvent, RowFilter,
};
use crate::topic::Topic;
use crate::transport::{ChannelTransport, EventHandler, ListenerBinding, TransportChannel};

/// Callback sink for one registration, typed per subscription kind.
#[derive(Clone)]
enum EventSink {
    Row(Arc<dyn Fn(&RowChange) + Send + Sync>),
    Presence(Arc<PresenceHooks>),
    Broadcast {
        event: String,
        callback: Arc<dyn Fn(&BroadcastMessage) + Send + Sync>,
    },
}

impl EventSink {
    /// Deliver an inbound event to this sink if it matches the sink's kind
    /// (and event label, for broadcast sinks).
    fn deliver(&self, event: &InboundEvent) {
        match (self, event) {
            (EventSink::Row(callback), InboundEvent::Row(change)) => callback(change),
            (EventSink::Presence(hooks), InboundEvent::PresenceSync(state)) => {
                if let Some(on_sync) = &hooks.on_sync {
                    on_sync(state);
                }
            }
            (EventSink::Presence(hooks), InboundEvent::PresenceJoin { key, payload }) => {
                if let Some(on_join) = &hooks.on_join {
                    on_join(key, payload);
                }
            }
            (EventSink::Presence(hooks), InboundEvent::PresenceLeave { key, payload }) => {
                if let Some(on_leave) = &hooks.on_leave {
                    on_leave(key, payload);
                }
            }
            (EventSink::Broadcast { event, callback }, InboundEvent::Broadcast(message)) => {
                if *event == message.event {
                    callback(message);
                }
            }
            _ => {}
        }
    }
}

/// Registered callbacks for one channel. The tear-down flag lives under the
/// same lock so registration and removal are atomic with respect to it.
#[derive(Default)]
struct CallbackSet {
    /// (registration id, sink) in registration order.
    entries: Vec<(u64, EventSink)>,
    /// Set when the channel has been torn down; a racing subscribe must
    /// open a fresh channel instead of joining this one.
    closed: bool,
}

/// One live channel with its registered callbacks.
struct ChannelEntry {
    name: String,
    channel: Arc<dyn TransportChannel>,
    callbacks: Arc<Mutex<CallbackSet>>,
    next_id: AtomicU64,
}

impl ChannelEntry {
    fn new(name: String, channel: Arc<dyn TransportChannel>) -> Self {
        Self {
            name,
            channel,
            callbacks: Arc::new(Mutex::new(CallbackSet::default())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Add a sink unless the channel is being torn down. Returns the
    /// registration id.
    fn push(&self, sink: EventSink) -> Option<u64> {
        let mut set = self.callbacks.lock().expect("callback set poisoned");
        if set.closed {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        set.entries.push((id, sink));
        Some(id)
    }
}

/// Dispatch an inbound event to every sink registered on a channel.
///
/// Snapshots the sink list before invoking anything: a callback that
/// subscribes or disposes during its own invocation mutates the live set,
/// not the sequence being iterated.
fn dispatch(name: &str, callbacks: &Arc<Mutex<CallbackSet>>, event: &InboundEvent) {
    let snapshot: Vec<EventSink> = {
        let set = callbacks.lock().expect("callback set poisoned");
        set.entries.iter().map(|(_, sink)| sink.clone()).collect()
    };
    counter!("realtime_events_dispatched_total").increment(1);
    debug!("dispatching event on {} to {} callbacks", name, snapshot.len());
    for sink in snapshot {
        sink.deliver(event);
    }
}

/// Idempotent unregister capability returned by every `subscribe_*` call.
///
/// Owned by the caller that registered the callback; calling
/// [`dispose`](Disposer::dispose) more than once has no effect beyond the
/// first call.
pub struct Disposer {
    channels: Arc<DashMap<String, Arc<ChannelEntry>>>,
    entry: Arc<ChannelEntry>,
    id: u64,
    disposed: AtomicBool,
}

impl Disposer {
    /// Unregister the callback; tears the channel down when it was the last
    /// one.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let became_empty = {
            let mut set = self.entry.callbacks.lock().expect("callback set poisoned");
            set.entries.retain(|(id, _)| *id != self.id);
            if set.entries.is_empty() && !set.closed {
                set.closed = true;
                true
            } else {
                false
            }
        };

        if became_empty {
            self.channels
                .remove_if(&self.entry.name, |_, entry| Arc::ptr_eq(entry, &self.entry));
            self.entry.channel.leave();
            gauge!("realtime_active_channels").decrement(1.0);
            debug!("closed channel {}", self.entry.name);
        }
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer")
            .field("channel", &self.entry.name)
            .field("id", &self.id)
            .field("disposed", &self.disposed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Registry of live subscriptions, keyed by channel name.
///
/// Constructed per application (or per test) and passed by reference;
/// multiple independent registries are fine.
pub struct SubscriptionRegistry {
    transport: Arc<dyn ChannelTransport>,
    channels: Arc<DashMap<String, Arc<ChannelEntry>>>,
}

impl SubscriptionRegistry {
    /// Create a registry over the given transport.
    pub fn new(transport: Arc<dyn ChannelTransport>) -> Self {
        Self {
            transport,
            channels: Arc::new(DashMap::new()),
        }
    }

    /// Subscribe to row changes on a table.
    ///
    /// # Errors
    ///
    /// Propagates channel-open/join failures from the transport.
    pub async fn subscribe_to_table(
        &self,
        table: &str,
        event: RowEvent,
        filter: Option<RowFilter>,
        callback: impl Fn(&RowChange) + Send + Sync + 'static,
    ) -> Result<Disposer> {
        let topic = Topic::table(table, event, filter.clone());
        let binding = ListenerBinding::RowChanges {
            table: table.to_string(),
            event,
            filter,
        };
        self.subscribe_with(&topic, binding, EventSink::Row(Arc::new(callback)))
            .await
    }

    /// Subscribe to presence for a room.
    pub async fn subscribe_to_presence(
        &self,
        room_id: &str,
        hooks: PresenceHooks,
    ) -> Result<Disposer> {
        let topic = Topic::presence(room_id);
        self.subscribe_with(
            &topic,
            ListenerBinding::Presence,
            EventSink::Presence(Arc::new(hooks)),
        )
        .await
    }

    /// Subscribe to one broadcast event label on a named channel.
    pub async fn subscribe_to_broadcast(
        &self,
        channel: &str,
        event: &str,
        callback: impl Fn(&BroadcastMessage) + Send + Sync + 'static,
    ) -> Result<Disposer> {
        let topic = Topic::broadcast(channel);
        self.subscribe_with(
            &topic,
            ListenerBinding::Broadcast,
            EventSink::Broadcast {
                event: event.to_string(),
                callback: Arc::new(callback),
            },
        )
        .await
    }

    /// Send a broadcast payload to a named channel.
    ///
    /// Reuses the live channel when one is subscribed; otherwise joins
    /// briefly, sends, and leaves.
    pub async fn broadcast(&self, channel: &str, event: &str, payload: Value) -> Result<()> {
        let name = Topic::broadcast(channel).channel_name();

        if let Some(entry) = self.live_entry(&name) {
            return entry.channel.send(event, payload).await;
        }

        let transient = self.transport.open(&name).await?;
        transient.subscribe().await?;
        let result = transient.send(event, payload).await;
        transient.leave();
        result
    }

    /// Publish the local participant's presence payload into a room.
    ///
    /// Requires an active presence subscription for the room.
    pub async fn track_presence(&self, room_id: &str, payload: Value) -> Result<()> {
        let name = Topic::presence(room_id).channel_name();
        let Some(entry) = self.live_entry(&name) else {
            return Err(Error::SubscriptionFailed(format!(
                "no active presence subscription for room {room_id}"
            )));
        };
        entry.channel.track(payload).await
    }

    /// Tear down every tracked channel, regardless of outstanding
    /// disposers. Used at application teardown or logout.
    pub fn cleanup(&self) {
        let entries: Vec<Arc<ChannelEntry>> = self
            .channels
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.channels.clear();

        for entry in &entries {
            let already_closed = {
                let mut set = entry.callbacks.lock().expect("callback set poisoned");
                let was = set.closed;
                set.closed = true;
                set.entries.clear();
                was
            };
            if !already_closed {
                entry.channel.leave();
            }
        }

        gauge!("realtime_active_channels").set(0.0);
        info!("realtime registry cleaned up ({} channels)", entries.len());
    }

    /// Number of live channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn live_entry(&self, name: &str) -> Option<Arc<ChannelEntry>> {
        let entry = self.channels.get(name).map(|e| e.value().clone())?;
        let closed = entry.callbacks.lock().expect("callback set poisoned").closed;
        (!closed).then_some(entry)
    }

    /// Add a sink to the live channel for `name`, when there is one.
    fn try_reuse(&self, name: &str, sink: &EventSink) -> Option<Disposer> {
        let entry = self.channels.get(name).map(|e| e.value().clone())?;
        let id = entry.push(sink.clone())?;
        debug!("reusing channel {}", name);
        Some(Disposer {
            channels: self.channels.clone(),
            entry,
            id,
            disposed: AtomicBool::new(false),
        })
    }

    async fn subscribe_with(
        &self,
        topic: &Topic,
        binding: ListenerBinding,
        sink: EventSink,
    ) -> Result<Disposer> {
        let name = topic.channel_name();

        // Reuse the live channel when this topic is already active.
        if let Some(disposer) = self.try_reuse(&name, &sink) {
            return Ok(disposer);
        }

        // First registration for this topic: open and join a fresh channel.
        let channel = self.transport.open(&name).await?;
        let entry = Arc::new(ChannelEntry::new(name.clone(), channel));

        let handler_name = name.clone();
        let handler_callbacks = entry.callbacks.clone();
        let handler: EventHandler = Box::new(move |event| {
            dispatch(&handler_name, &handler_callbacks, &event);
        });
        entry.channel.bind(binding, handler);

        // Register before joining so no event arriving right after the join
        // can miss the first callback.
        let id = entry
            .push(sink.clone())
            .expect("freshly created channel cannot be closed");

        use dashmap::mapref::entry::Entry;
        match self.channels.entry(name.clone()) {
            Entry::Occupied(occupied) => {
                // Another subscribe for this topic won while we were opening.
                let winner = occupied.get().clone();
                drop(occupied);
                entry.channel.leave();
                if let Some(winner_id) = winner.push(sink) {
                    debug!("joining concurrently opened channel {}", name);
                    return Ok(Disposer {
                        channels: self.channels.clone(),
                        entry: winner,
                        id: winner_id,
                        disposed: AtomicBool::new(false),
                    });
                }
                return Err(Error::SubscriptionFailed(format!(
                    "channel {name} was torn down during subscribe"
                )));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry.clone());
            }
        }

        if let Err(e) = entry.channel.subscribe().await {
            // Roll back; nothing may stay registered after a failed join.
            warn!("join failed for channel {}: {}", name, e);
            {
                let mut set = entry.callbacks.lock().expect("callback set poisoned");
                set.entries.clear();
                set.closed = true;
            }
            self.channels
                .remove_if(&name, |_, existing| Arc::ptr_eq(existing, &entry));
            entry.channel.leave();
            return Err(e);
        }

        counter!("realtime_channels_opened_total").increment(1);
        gauge!("realtime_active_channels").increment(1.0);
        info!("opened channel {}", name);

        Ok(Disposer {
            channels: self.channels.clone(),
            entry,
            id,
            disposed: AtomicBool::new(false),
        })
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("channels", &self.channels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// Recording transport for registry tests.
    #[derive(Default)]
    struct FakeTransport {
        opens: AtomicUsize,
        fail_subscribe: AtomicBool,
        channels: Mutex<Vec<Arc<FakeChannel>>>,
    }

    impl FakeTransport {
        fn arc() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn open_count(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }

        fn channel(&self, name: &str) -> Arc<FakeChannel> {
            self.channels
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|c| c.name == name)
                .cloned()
                .expect("channel opened")
        }
    }

    #[derive(Default)]
    struct FakeChannel {
        name: String,
        handlers: Mutex<Vec<EventHandler>>,
        subscribes: AtomicUsize,
        leaves: AtomicUsize,
        sent: Mutex<Vec<(String, Value)>>,
        tracked: Mutex<Vec<Value>>,
        fail_subscribe: bool,
    }

    impl FakeChannel {
        fn emit(&self, event: InboundEvent) {
            let handlers = self.handlers.lock().unwrap();
            for handler in handlers.iter() {
                handler(event.clone());
            }
        }

        fn leave_count(&self) -> usize {
            self.leaves.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChannelTransport for FakeTransport {
        async fn open(&self, name: &str) -> Result<Arc<dyn TransportChannel>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let channel = Arc::new(FakeChannel {
                name: name.to_string(),
                fail_subscribe: self.fail_subscribe.load(Ordering::SeqCst),
                ..FakeChannel::default()
            });
            self.channels.lock().unwrap().push(channel.clone());
            Ok(channel)
        }
    }

    #[async_trait]
    impl TransportChannel for FakeChannel {
        fn bind(&self, _binding: ListenerBinding, handler: EventHandler) {
            self.handlers.lock().unwrap().push(handler);
        }

        async fn subscribe(&self) -> Result<()> {
            if self.fail_subscribe {
                return Err(Error::SubscriptionFailed("backend rejected join".into()));
            }
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn leave(&self) {
            self.leaves.fetch_add(1, Ordering::SeqCst);
        }

        async fn send(&self, event: &str, payload: Value) -> Result<()> {
            self.sent.lock().unwrap().push((event.to_string(), payload));
            Ok(())
        }

        async fn track(&self, payload: Value) -> Result<()> {
            self.tracked.lock().unwrap().push(payload);
            Ok(())
        }
    }

    fn row_change(table: &str) -> InboundEvent {
        InboundEvent::Row(RowChange {
            table: table.to_string(),
            event: RowEvent::Insert,
            before: None,
            after: Some(json!({ "id": 1 })),
        })
    }

    type Seen = Arc<Mutex<Vec<String>>>;

    fn recorder(seen: &Seen, label: &str) -> impl Fn(&RowChange) + Send + Sync + 'static {
        let seen = seen.clone();
        let label = label.to_string();
        move |_change| seen.lock().unwrap().push(label.clone())
    }

    #[tokio::test]
    async fn same_topic_shares_one_channel() {
        let transport = FakeTransport::arc();
        let registry = SubscriptionRegistry::new(transport.clone());
        let seen: Seen = Arc::default();

        let _a = registry
            .subscribe_to_table("chat_messages", RowEvent::Insert, None, recorder(&seen, "a"))
            .await
            .unwrap();
        let _b = registry
            .subscribe_to_table("chat_messages", RowEvent::Insert, None, recorder(&seen, "b"))
            .await
            .unwrap();

        assert_eq!(transport.open_count(), 1);
        let channel = transport.channel("table:chat_messages:insert");
        assert_eq!(channel.subscribes.load(Ordering::SeqCst), 1);

        channel.emit(row_change("chat_messages"));
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn last_disposer_closes_the_channel_exactly_once() {
        let transport = FakeTransport::arc();
        let registry = SubscriptionRegistry::new(transport.clone());
        let seen: Seen = Arc::default();

        let a = registry
            .subscribe_to_table("orders", RowEvent::Update, None, recorder(&seen, "a"))
            .await
            .unwrap();
        let b = registry
            .subscribe_to_table("orders", RowEvent::Update, None, recorder(&seen, "b"))
            .await
            .unwrap();

        let channel = transport.channel("table:orders:update");

        a.dispose();
        assert_eq!(channel.leave_count(), 0);
        assert_eq!(registry.channel_count(), 1);

        // The remaining callback still receives events.
        channel.emit(row_change("orders"));
        assert_eq!(*seen.lock().unwrap(), vec!["b"]);

        b.dispose();
        assert_eq!(channel.leave_count(), 1);
        assert_eq!(registry.channel_count(), 0);
    }

    #[tokio::test]
    async fn disposer_is_idempotent() {
        let transport = FakeTransport::arc();
        let registry = SubscriptionRegistry::new(transport.clone());

        let disposer = registry
            .subscribe_to_table("orders", RowEvent::Any, None, |_change| {})
            .await
            .unwrap();

        disposer.dispose();
        disposer.dispose();
        disposer.dispose();

        let channel = transport.channel("table:orders:*");
        assert_eq!(channel.leave_count(), 1);
    }

    #[tokio::test]
    async fn reentrant_subscribe_does_not_disturb_sibling_delivery() {
        let transport = FakeTransport::arc();
        let registry = Arc::new(SubscriptionRegistry::new(transport.clone()));
        let seen: Seen = Arc::default();

        // First callback subscribes to a different topic mid-dispatch.
        let reentrant_registry = registry.clone();
        let reentrant_seen = seen.clone();
        let _a = registry
            .subscribe_to_table("chat_messages", RowEvent::Insert, None, move |_change| {
                reentrant_seen.lock().unwrap().push("a".to_string());
                let registry = reentrant_registry.clone();
                // The fake transport completes immediately, so the nested
                // subscribe can be driven to completion inline.
                futures::executor::block_on(async {
                    registry
                        .subscribe_to_broadcast("order:42", "status", |_msg| {})
                        .await
                        .unwrap();
                });
            })
            .await
            .unwrap();
        let _b = registry
            .subscribe_to_table("chat_messages", RowEvent::Insert, None, recorder(&seen, "b"))
            .await
            .unwrap();

        let channel = transport.channel("table:chat_messages:insert");
        channel.emit(row_change("chat_messages"));

        // Sibling delivery is neither skipped nor duplicated.
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(registry.channel_count(), 2);
    }

    #[tokio::test]
    async fn cleanup_closes_everything_and_allows_fresh_subscribes() {
        let transport = FakeTransport::arc();
        let registry = SubscriptionRegistry::new(transport.clone());
        let seen: Seen = Arc::default();

        // One disposer kept, one deliberately leaked.
        let kept = registry
            .subscribe_to_table("orders", RowEvent::Update, None, recorder(&seen, "old"))
            .await
            .unwrap();
        let _leaked = registry
            .subscribe_to_presence("room-1", PresenceHooks::new())
            .await
            .unwrap();

        registry.cleanup();
        assert_eq!(registry.channel_count(), 0);
        assert_eq!(transport.channel("table:orders:update").leave_count(), 1);
        assert_eq!(transport.channel("presence:room-1").leave_count(), 1);

        // A disposer surviving cleanup must not close anything twice.
        kept.dispose();
        assert_eq!(transport.channel("table:orders:update").leave_count(), 1);

        // A previously active topic reopens a fresh channel.
        let _fresh = registry
            .subscribe_to_table("orders", RowEvent::Update, None, recorder(&seen, "new"))
            .await
            .unwrap();
        assert_eq!(transport.open_count(), 3);

        transport.channel("table:orders:update").emit(row_change("orders"));
        assert_eq!(*seen.lock().unwrap(), vec!["new"]);
    }

    #[tokio::test]
    async fn failed_join_propagates_and_leaves_no_channel_behind() {
        let transport = FakeTransport::arc();
        transport.fail_subscribe.store(true, Ordering::SeqCst);
        let registry = SubscriptionRegistry::new(transport.clone());

        let result = registry
            .subscribe_to_table("orders", RowEvent::Insert, None, |_change| {})
            .await;

        assert!(result.is_err());
        assert_eq!(registry.channel_count(), 0);
        assert_eq!(transport.channel("table:orders:insert").leave_count(), 1);

        // Setup failures do not poison the topic.
        transport.fail_subscribe.store(false, Ordering::SeqCst);
        let retry = registry
            .subscribe_to_table("orders", RowEvent::Insert, None, |_change| {})
            .await;
        assert!(retry.is_ok());
        assert_eq!(registry.channel_count(), 1);
    }

    #[tokio::test]
    async fn presence_hooks_receive_sync_join_leave_in_order() {
        let transport = FakeTransport::arc();
        let registry = SubscriptionRegistry::new(transport.clone());
        let seen: Seen = Arc::default();

        let sync_seen = seen.clone();
        let join_seen = seen.clone();
        let leave_seen = seen.clone();
        let hooks = PresenceHooks::new()
            .on_sync(move |state| {
                sync_seen.lock().unwrap().push(format!("sync:{}", state.len()));
            })
            .on_join(move |key, _payload| {
                join_seen.lock().unwrap().push(format!("join:{key}"));
            })
            .on_leave(move |key, _payload| {
                leave_seen.lock().unwrap().push(format!("leave:{key}"));
            });

        let _d = registry.subscribe_to_presence("room-9", hooks).await.unwrap();
        let channel = transport.channel("presence:room-9");

        let mut state = crate::events::PresenceState::new();
        state.insert("u1".to_string(), json!({ "online": true }));
        channel.emit(InboundEvent::PresenceSync(state));
        channel.emit(InboundEvent::PresenceJoin {
            key: "u2".to_string(),
            payload: json!({}),
        });
        channel.emit(InboundEvent::PresenceLeave {
            key: "u1".to_string(),
            payload: json!({}),
        });

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["sync:1", "join:u2", "leave:u1"]
        );
    }

    #[tokio::test]
    async fn broadcast_labels_filter_locally_on_a_shared_channel() {
        let transport = FakeTransport::arc();
        let registry = SubscriptionRegistry::new(transport.clone());
        let seen: Seen = Arc::default();

        let likes_seen = seen.clone();
        let _likes = registry
            .subscribe_to_broadcast("reel:7", "likes", move |msg| {
                likes_seen.lock().unwrap().push(format!("likes:{}", msg.payload));
            })
            .await
            .unwrap();
        let comments_seen = seen.clone();
        let _comments = registry
            .subscribe_to_broadcast("reel:7", "comments", move |_msg| {
                comments_seen.lock().unwrap().push("comments".to_string());
            })
            .await
            .unwrap();

        // Both labels share one underlying channel.
        assert_eq!(transport.open_count(), 1);

        let channel = transport.channel("broadcast:reel:7");
        channel.emit(InboundEvent::Broadcast(BroadcastMessage {
            channel: "reel:7".to_string(),
            event: "likes".to_string(),
            payload: json!(3),
        }));

        assert_eq!(*seen.lock().unwrap(), vec!["likes:3"]);
    }

    #[tokio::test]
    async fn broadcast_send_reuses_live_channel_or_joins_briefly() {
        let transport = FakeTransport::arc();
        let registry = SubscriptionRegistry::new(transport.clone());

        // No live subscription: transient join, send, leave.
        registry
            .broadcast("order:1", "status", json!({ "state": "shipped" }))
            .await
            .unwrap();
        let transient = transport.channel("broadcast:order:1");
        assert_eq!(transient.sent.lock().unwrap().len(), 1);
        assert_eq!(transient.leave_count(), 1);

        // Live subscription: reuse, no extra open.
        let _d = registry
            .subscribe_to_broadcast("order:2", "status", |_msg| {})
            .await
            .unwrap();
        let opens_before = transport.open_count();
        registry
            .broadcast("order:2", "status", json!({ "state": "packed" }))
            .await
            .unwrap();
        assert_eq!(transport.open_count(), opens_before);
        let live = transport.channel("broadcast:order:2");
        assert_eq!(live.sent.lock().unwrap().len(), 1);
        assert_eq!(live.leave_count(), 0);
    }

    #[tokio::test]
    async fn track_presence_requires_an_active_subscription() {
        let transport = FakeTransport::arc();
        let registry = SubscriptionRegistry::new(transport.clone());

        let missing = registry.track_presence("room-3", json!({ "typing": true })).await;
        assert!(missing.is_err());

        let _d = registry
            .subscribe_to_presence("room-3", PresenceHooks::new())
            .await
            .unwrap();
        registry
            .track_presence("room-3", json!({ "typing": true }))
            .await
            .unwrap();

        let channel = transport.channel("presence:room-3");
        assert_eq!(channel.tracked.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dispatch_preserves_arrival_order_per_topic() {
        let transport = FakeTransport::arc();
        let registry = SubscriptionRegistry::new(transport.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let order_seen = seen.clone();
        let _d = registry
            .subscribe_to_broadcast("room:5", "msg", move |msg| {
                order_seen.lock().unwrap().push(msg.payload.clone());
            })
            .await
            .unwrap();

        let channel = transport.channel("broadcast:room:5");
        for i in 0..3 {
            channel.emit(InboundEvent::Broadcast(BroadcastMessage {
                channel: "room:5".to_string(),
                event: "msg".to_string(),
                payload: json!(i),
            }));
        }

        assert_eq!(*seen.lock().unwrap(), vec![json!(0), json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn callback_disposing_itself_mid_dispatch_is_safe() {
        let transport = FakeTransport::arc();
        let registry = SubscriptionRegistry::new(transport.clone());
        let seen: Seen = Arc::default();

        let slot: Arc<Mutex<Option<Disposer>>> = Arc::default();
        let self_slot = slot.clone();
        let self_seen = seen.clone();
        let a = registry
            .subscribe_to_table("chat_messages", RowEvent::Insert, None, move |_change| {
                self_seen.lock().unwrap().push("a".to_string());
                if let Some(disposer) = self_slot.lock().unwrap().as_ref() {
                    disposer.dispose();
                }
            })
            .await
            .unwrap();
        *slot.lock().unwrap() = Some(a);
        let _b = registry
            .subscribe_to_table("chat_messages", RowEvent::Insert, None, recorder(&seen, "b"))
            .await
            .unwrap();

        let channel = transport.channel("table:chat_messages:insert");
        channel.emit(row_change("chat_messages"));
        // Second event no longer reaches the disposed callback.
        channel.emit(row_change("chat_messages"));

        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "b"]);
    }
}
