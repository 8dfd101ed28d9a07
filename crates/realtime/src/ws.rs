//! WebSocket transport for the realtime backend.
//!
//! Speaks Phoenix-style frames `{topic, event, payload, ref}` over a single
//! multiplexed connection. Owns the connection lifecycle: heartbeat,
//! reconnection with capped exponential backoff, and rejoin of joined
//! topics after a reconnect. The registry above never resubscribes on its
//! own; this layer is where reconnect policy lives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{Config, Error, Result};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::events::{BroadcastMessage, InboundEvent, PresenceState, RowChange, RowEvent};
use crate::transport::{ChannelTransport, EventHandler, ListenerBinding, TransportChannel};

type WsSink = futures::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Configuration for the WebSocket transport.
#[derive(Debug, Clone)]
pub struct WsTransportConfig {
    /// WebSocket URL of the realtime backend.
    pub url: String,
    /// Access token appended to the connection URL, when the backend
    /// requires one.
    pub token: Option<String>,
    /// Interval between heartbeat frames.
    pub heartbeat_interval: Duration,
    /// Initial delay before a reconnection attempt.
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay (for exponential backoff).
    pub max_reconnect_delay: Duration,
}

impl Default for WsTransportConfig {
    fn default() -> Self {
        Self {
            url: common::config::DEFAULT_REALTIME_URL.to_string(),
            token: None,
            heartbeat_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

impl WsTransportConfig {
    /// Derive a transport config from the shared configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.realtime_url.clone(),
            ..Self::default()
        }
    }

    /// Attach an access token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Phoenix-style wire frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Frame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    reference: Option<String>,
}

/// Commands from channel handles to the connection task.
enum WsCommand {
    Join {
        topic: String,
        payload: Value,
        reply: oneshot::Sender<Result<()>>,
    },
    Leave {
        topic: String,
    },
    Send {
        topic: String,
        event: String,
        payload: Value,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

/// Per-topic state shared between channel handles and the connection task.
#[derive(Default)]
struct TopicState {
    /// Listener bindings and handlers in bind order.
    handlers: Mutex<Vec<(ListenerBinding, EventHandler)>>,
    /// Join payload, kept for rejoin after a reconnect.
    join_payload: Mutex<Value>,
    /// Whether the topic is currently joined on the backend.
    joined: AtomicBool,
}

/// WebSocket implementation of the channel transport capability.
///
/// All channels share one connection; the connection task multiplexes
/// frames by topic.
pub struct WsTransport {
    command_tx: mpsc::UnboundedSender<WsCommand>,
    topics: Arc<DashMap<String, Arc<TopicState>>>,
}

impl WsTransport {
    /// Validate the URL, spawn the connection task and return the handle.
    pub fn connect(config: WsTransportConfig) -> Result<Self> {
        Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("invalid realtime URL: {e}")))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let topics: Arc<DashMap<String, Arc<TopicState>>> = Arc::new(DashMap::new());
        tokio::spawn(run_connection(config, command_rx, topics.clone()));

        Ok(Self { command_tx, topics })
    }

    /// Close the connection and stop the task.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(WsCommand::Shutdown);
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("topics", &self.topics.len())
            .finish()
    }
}

#[async_trait]
impl ChannelTransport for WsTransport {
    async fn open(&self, name: &str) -> Result<Arc<dyn TransportChannel>> {
        let state = Arc::new(TopicState::default());
        self.topics.insert(name.to_string(), state.clone());
        Ok(Arc::new(WsChannel {
            topic: name.to_string(),
            command_tx: self.command_tx.clone(),
            topics: self.topics.clone(),
            state,
        }))
    }
}

/// Handle for one topic on the shared connection.
struct WsChannel {
    topic: String,
    command_tx: mpsc::UnboundedSender<WsCommand>,
    topics: Arc<DashMap<String, Arc<TopicState>>>,
    state: Arc<TopicState>,
}

impl WsChannel {
    async fn push(&self, event: &str, payload: Value) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(WsCommand::Send {
                topic: self.topic.clone(),
                event: event.to_string(),
                payload,
                reply: reply_tx,
            })
            .map_err(|_| Error::ChannelClosed)?;
        reply_rx.await.map_err(|_| Error::ChannelClosed)?
    }
}

#[async_trait]
impl TransportChannel for WsChannel {
    fn bind(&self, binding: ListenerBinding, handler: EventHandler) {
        self.state
            .handlers
            .lock()
            .expect("handler list poisoned")
            .push((binding, handler));
    }

    async fn subscribe(&self) -> Result<()> {
        let payload = join_payload(&self.state);
        *self.state.join_payload.lock().expect("join payload poisoned") = payload.clone();

        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(WsCommand::Join {
                topic: self.topic.clone(),
                payload,
                reply: reply_tx,
            })
            .map_err(|_| Error::ChannelClosed)?;
        reply_rx.await.map_err(|_| Error::ChannelClosed)?
    }

    fn leave(&self) {
        self.topics
            .remove_if(&self.topic, |_, state| Arc::ptr_eq(state, &self.state));
        let _ = self.command_tx.send(WsCommand::Leave {
            topic: self.topic.clone(),
        });
    }

    async fn send(&self, event: &str, payload: Value) -> Result<()> {
        self.push("broadcast", json!({ "event": event, "payload": payload }))
            .await
    }

    async fn track(&self, payload: Value) -> Result<()> {
        self.push("presence", json!({ "event": "track", "payload": payload }))
            .await
    }
}

/// Build the join payload advertising the channel's listener bindings so
/// the backend can filter server-side.
fn join_payload(state: &TopicState) -> Value {
    let handlers = state.handlers.lock().expect("handler list poisoned");
    let mut postgres_changes = Vec::new();
    let mut presence = false;
    let mut broadcast = false;

    for (binding, _) in handlers.iter() {
        match binding {
            ListenerBinding::RowChanges {
                table,
                event,
                filter,
            } => postgres_changes.push(json!({
                "event": row_event_wire(*event),
                "schema": "public",
                "table": table,
                "filter": filter.as_ref().map(|f| f.to_string()),
            })),
            ListenerBinding::Presence => presence = true,
            ListenerBinding::Broadcast => broadcast = true,
        }
    }

    json!({
        "config": {
            "postgres_changes": postgres_changes,
            "presence": { "enabled": presence },
            "broadcast": { "enabled": broadcast, "self": false },
        }
    })
}

fn row_event_wire(event: RowEvent) -> &'static str {
    match event {
        RowEvent::Insert => "INSERT",
        RowEvent::Update => "UPDATE",
        RowEvent::Delete => "DELETE",
        RowEvent::Any => "*",
    }
}

fn connection_url(config: &WsTransportConfig) -> Result<Url> {
    let mut url = Url::parse(&config.url)
        .map_err(|e| Error::Config(format!("invalid realtime URL: {e}")))?;
    url.query_pairs_mut().append_pair("vsn", "1.0.0");
    if let Some(token) = &config.token {
        url.query_pairs_mut().append_pair("token", token);
    }
    Ok(url)
}

/// Run the connection until shutdown, reconnecting on disconnection.
async fn run_connection(
    config: WsTransportConfig,
    mut command_rx: mpsc::UnboundedReceiver<WsCommand>,
    topics: Arc<DashMap<String, Arc<TopicState>>>,
) {
    let mut reconnect_delay = config.reconnect_delay;

    loop {
        match connect_and_run(&config, &mut command_rx, &topics).await {
            Ok(()) => {
                info!("realtime connection closed");
                break;
            }
            Err(e) => {
                counter!("realtime_disconnects_total").increment(1);
                warn!(
                    "realtime connection lost: {}, reconnecting in {:?}",
                    e, reconnect_delay
                );
                tokio::time::sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay);
            }
        }
    }

    gauge!("realtime_connected").set(0.0);
}

async fn connect_and_run(
    config: &WsTransportConfig,
    command_rx: &mut mpsc::UnboundedReceiver<WsCommand>,
    topics: &DashMap<String, Arc<TopicState>>,
) -> Result<()> {
    let url = connection_url(config)?;
    info!("connecting to realtime backend at {}", config.url);

    let (ws_stream, response) = connect_async(url.as_str())
        .await
        .map_err(|e| Error::Transport(format!("connect failed: {e}")))?;
    debug!("realtime handshake complete, status: {:?}", response.status());

    let (mut write, mut read) = ws_stream.split();
    gauge!("realtime_connected").set(1.0);

    let mut ref_counter: u64 = 0;
    // ref → (topic, reply) for in-flight joins.
    let mut pending: HashMap<String, (String, oneshot::Sender<Result<()>>)> = HashMap::new();

    // Rejoin topics that were joined before the connection dropped.
    // Collected first so no map guard is held across the sends.
    let rejoin: Vec<(String, Value)> = topics
        .iter()
        .filter(|entry| entry.value().joined.load(Ordering::SeqCst))
        .map(|entry| {
            let payload = entry
                .value()
                .join_payload
                .lock()
                .expect("join payload poisoned")
                .clone();
            (entry.key().clone(), payload)
        })
        .collect();
    for (topic, payload) in rejoin {
        let frame = Frame {
            topic: topic.clone(),
            event: "phx_join".to_string(),
            payload,
            reference: Some(next_ref(&mut ref_counter)),
        };
        send_frame(&mut write, &frame).await?;
        debug!("rejoined {}", topic);
    }

    let mut heartbeat = interval(config.heartbeat_interval);
    heartbeat.reset(); // Don't fire immediately

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        counter!("realtime_frames_received_total").increment(1);
                        match serde_json::from_str::<Frame>(&text) {
                            Ok(frame) => handle_frame(frame, topics, &mut pending),
                            Err(e) => warn!("unparsable realtime frame: {}", e),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write
                            .send(Message::Pong(data))
                            .await
                            .map_err(|e| Error::Transport(e.to_string()))?;
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        info!("realtime backend sent close frame: {:?}", frame);
                        return Err(Error::ChannelClosed);
                    }
                    Some(Ok(_)) => {
                        // Binary and raw frames are not part of the protocol.
                    }
                    Some(Err(e)) => return Err(Error::Transport(e.to_string())),
                    None => return Err(Error::ChannelClosed),
                }
            }

            cmd = command_rx.recv() => {
                match cmd {
                    Some(WsCommand::Join { topic, payload, reply }) => {
                        let reference = next_ref(&mut ref_counter);
                        pending.insert(reference.clone(), (topic.clone(), reply));
                        let frame = Frame {
                            topic,
                            event: "phx_join".to_string(),
                            payload,
                            reference: Some(reference),
                        };
                        send_frame(&mut write, &frame).await?;
                    }
                    Some(WsCommand::Leave { topic }) => {
                        if let Some(state) = topics.get(&topic) {
                            state.joined.store(false, Ordering::SeqCst);
                        }
                        let frame = Frame {
                            topic,
                            event: "phx_leave".to_string(),
                            payload: json!({}),
                            reference: Some(next_ref(&mut ref_counter)),
                        };
                        send_frame(&mut write, &frame).await?;
                    }
                    Some(WsCommand::Send { topic, event, payload, reply }) => {
                        let frame = Frame {
                            topic,
                            event,
                            payload,
                            reference: Some(next_ref(&mut ref_counter)),
                        };
                        match send_frame(&mut write, &frame).await {
                            Ok(()) => {
                                let _ = reply.send(Ok(()));
                            }
                            Err(e) => {
                                let _ = reply.send(Err(Error::ChannelClosed));
                                return Err(e);
                            }
                        }
                    }
                    Some(WsCommand::Shutdown) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
            }

            _ = heartbeat.tick() => {
                let frame = Frame {
                    topic: "phoenix".to_string(),
                    event: "heartbeat".to_string(),
                    payload: json!({}),
                    reference: Some(next_ref(&mut ref_counter)),
                };
                send_frame(&mut write, &frame).await?;
            }
        }
    }
}

fn next_ref(counter: &mut u64) -> String {
    *counter += 1;
    counter.to_string()
}

async fn send_frame(write: &mut WsSink, frame: &Frame) -> Result<()> {
    let text = serde_json::to_string(frame)?;
    counter!("realtime_frames_sent_total").increment(1);
    write
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| Error::Transport(e.to_string()))
}

/// Route an inbound frame: join replies resolve pending subscriptions,
/// everything else is converted to [`InboundEvent`]s and handed to the
/// topic's handlers.
fn handle_frame(
    frame: Frame,
    topics: &DashMap<String, Arc<TopicState>>,
    pending: &mut HashMap<String, (String, oneshot::Sender<Result<()>>)>,
) {
    if frame.event == "phx_reply" {
        if let Some(reference) = &frame.reference {
            if let Some((topic, reply)) = pending.remove(reference) {
                let status = frame
                    .payload
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("error");
                if status == "ok" {
                    if let Some(state) = topics.get(&topic) {
                        state.joined.store(true, Ordering::SeqCst);
                    }
                    let _ = reply.send(Ok(()));
                } else {
                    let _ = reply.send(Err(Error::SubscriptionFailed(format!(
                        "join rejected for {topic}"
                    ))));
                }
            }
        }
        return;
    }

    let Some(state) = topics.get(&frame.topic).map(|s| s.value().clone()) else {
        debug!("frame for unknown topic {}", frame.topic);
        return;
    };

    let events = parse_inbound(&frame);
    if events.is_empty() {
        return;
    }

    let handlers = state.handlers.lock().expect("handler list poisoned");
    for event in events {
        for (_binding, handler) in handlers.iter() {
            handler(event.clone());
        }
    }
}

/// Convert a wire frame into zero or more inbound events.
fn parse_inbound(frame: &Frame) -> Vec<InboundEvent> {
    match frame.event.as_str() {
        "postgres_changes" => parse_row_change(&frame.payload).into_iter().collect(),
        "presence_state" => {
            let state: PresenceState =
                serde_json::from_value(frame.payload.clone()).unwrap_or_default();
            vec![InboundEvent::PresenceSync(state)]
        }
        "presence_diff" => {
            let mut events = Vec::new();
            if let Some(joins) = frame.payload.get("joins").and_then(Value::as_object) {
                for (key, payload) in joins {
                    events.push(InboundEvent::PresenceJoin {
                        key: key.clone(),
                        payload: payload.clone(),
                    });
                }
            }
            if let Some(leaves) = frame.payload.get("leaves").and_then(Value::as_object) {
                for (key, payload) in leaves {
                    events.push(InboundEvent::PresenceLeave {
                        key: key.clone(),
                        payload: payload.clone(),
                    });
                }
            }
            events
        }
        "broadcast" => {
            let event = frame
                .payload
                .get("event")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let payload = frame.payload.get("payload").cloned().unwrap_or(Value::Null);
            let channel = frame
                .topic
                .strip_prefix("broadcast:")
                .unwrap_or(&frame.topic)
                .to_string();
            vec![InboundEvent::Broadcast(BroadcastMessage {
                channel,
                event,
                payload,
            })]
        }
        _ => Vec::new(),
    }
}

/// Parse a `postgres_changes` payload into a row change.
///
/// The payload nests the change under `data`; both nestings are tolerated.
fn parse_row_change(payload: &Value) -> Option<InboundEvent> {
    let data = payload.get("data").unwrap_or(payload);
    let event = match data.get("type").and_then(Value::as_str)? {
        "INSERT" => RowEvent::Insert,
        "UPDATE" => RowEvent::Update,
        "DELETE" => RowEvent::Delete,
        other => {
            debug!("unknown row change type {}", other);
            return None;
        }
    };
    let table = data
        .get("table")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let after = data.get("record").filter(|v| !v.is_null()).cloned();
    let before = data.get("old_record").filter(|v| !v.is_null()).cloned();

    Some(InboundEvent::Row(RowChange {
        table,
        event,
        before,
        after,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RowFilter;

    #[test]
    fn test_frame_serde_renames_ref() {
        let frame = Frame {
            topic: "presence:room-1".to_string(),
            event: "phx_join".to_string(),
            payload: json!({}),
            reference: Some("7".to_string()),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["ref"], "7");

        let unref = Frame {
            reference: None,
            ..frame
        };
        let json = serde_json::to_value(&unref).unwrap();
        assert!(json.get("ref").is_none());
    }

    #[test]
    fn test_parse_row_change_insert_and_delete() {
        let frame = Frame {
            topic: "table:orders:*".to_string(),
            event: "postgres_changes".to_string(),
            payload: json!({
                "data": {
                    "type": "INSERT",
                    "table": "orders",
                    "record": { "id": 1 },
                    "old_record": null
                }
            }),
            reference: None,
        };
        let events = parse_inbound(&frame);
        assert_eq!(events.len(), 1);
        let InboundEvent::Row(change) = &events[0] else {
            panic!("expected row event");
        };
        assert_eq!(change.event, RowEvent::Insert);
        assert_eq!(change.after, Some(json!({ "id": 1 })));
        assert!(change.before.is_none());

        let frame = Frame {
            topic: "table:orders:*".to_string(),
            event: "postgres_changes".to_string(),
            payload: json!({
                "data": {
                    "type": "DELETE",
                    "table": "orders",
                    "old_record": { "id": 1 }
                }
            }),
            reference: None,
        };
        let events = parse_inbound(&frame);
        let InboundEvent::Row(change) = &events[0] else {
            panic!("expected row event");
        };
        assert_eq!(change.event, RowEvent::Delete);
        assert_eq!(change.before, Some(json!({ "id": 1 })));
        assert!(change.after.is_none());
    }

    #[test]
    fn test_parse_presence_diff() {
        let frame = Frame {
            topic: "presence:room-1".to_string(),
            event: "presence_diff".to_string(),
            payload: json!({
                "joins": { "u1": { "online": true } },
                "leaves": { "u2": {} }
            }),
            reference: None,
        };
        let events = parse_inbound(&frame);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            InboundEvent::PresenceJoin { key, .. } if key == "u1"
        ));
        assert!(matches!(
            &events[1],
            InboundEvent::PresenceLeave { key, .. } if key == "u2"
        ));
    }

    #[test]
    fn test_parse_broadcast_strips_channel_prefix() {
        let frame = Frame {
            topic: "broadcast:reel:7".to_string(),
            event: "broadcast".to_string(),
            payload: json!({ "event": "likes", "payload": 3 }),
            reference: None,
        };
        let events = parse_inbound(&frame);
        let InboundEvent::Broadcast(message) = &events[0] else {
            panic!("expected broadcast event");
        };
        assert_eq!(message.channel, "reel:7");
        assert_eq!(message.event, "likes");
        assert_eq!(message.payload, json!(3));
    }

    #[test]
    fn test_join_payload_reflects_bindings() {
        let state = TopicState::default();
        state.handlers.lock().unwrap().push((
            ListenerBinding::RowChanges {
                table: "chat_messages".to_string(),
                event: RowEvent::Insert,
                filter: Some(RowFilter::eq("room_id", "42")),
            },
            Box::new(|_event| {}),
        ));
        state
            .handlers
            .lock()
            .unwrap()
            .push((ListenerBinding::Broadcast, Box::new(|_event| {})));

        let payload = join_payload(&state);
        let changes = &payload["config"]["postgres_changes"];
        assert_eq!(changes[0]["event"], "INSERT");
        assert_eq!(changes[0]["table"], "chat_messages");
        assert_eq!(changes[0]["filter"], "room_id=eq.42");
        assert_eq!(payload["config"]["broadcast"]["enabled"], true);
        assert_eq!(payload["config"]["presence"]["enabled"], false);
    }

    #[test]
    fn test_connection_url_carries_version_and_token() {
        let config = WsTransportConfig {
            url: "wss://realtime.example.com/socket/websocket".to_string(),
            token: Some("tok-9".to_string()),
            ..WsTransportConfig::default()
        };
        let url = connection_url(&config).unwrap();
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(query.contains(&("vsn".to_string(), "1.0.0".to_string())));
        assert!(query.contains(&("token".to_string(), "tok-9".to_string())));
    }

    #[test]
    fn test_invalid_url_is_a_config_error() {
        let config = WsTransportConfig {
            url: "not a url".to_string(),
            ..WsTransportConfig::default()
        };
        assert!(connection_url(&config).is_err());
    }
}
