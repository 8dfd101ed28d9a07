//! Event payloads delivered to subscription callbacks.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Row-change event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowEvent {
    Insert,
    Update,
    Delete,
    /// Matches every event kind.
    #[serde(rename = "*")]
    Any,
}

impl fmt::Display for RowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowEvent::Insert => write!(f, "insert"),
            RowEvent::Update => write!(f, "update"),
            RowEvent::Delete => write!(f, "delete"),
            RowEvent::Any => write!(f, "*"),
        }
    }
}

/// Equality filter on one column of a row-change feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowFilter {
    pub column: String,
    pub value: String,
}

impl RowFilter {
    /// Filter rows where `column` equals `value`.
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=eq.{}", self.column, self.value)
    }
}

/// A row change delivered by a row-change feed.
///
/// `after` is always populated for insert/update, `before` for
/// update/delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowChange {
    pub table: String,
    /// The concrete event kind (never [`RowEvent::Any`]).
    pub event: RowEvent,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Membership snapshot of a presence room: participant key to payload.
pub type PresenceState = HashMap<String, Value>;

/// Caller hooks for a presence subscription; unset hooks are skipped.
#[derive(Default)]
pub struct PresenceHooks {
    pub on_sync: Option<Box<dyn Fn(&PresenceState) + Send + Sync>>,
    pub on_join: Option<Box<dyn Fn(&str, &Value) + Send + Sync>>,
    pub on_leave: Option<Box<dyn Fn(&str, &Value) + Send + Sync>>,
}

impl PresenceHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the full membership snapshot after (re)sync.
    pub fn on_sync(mut self, f: impl Fn(&PresenceState) + Send + Sync + 'static) -> Self {
        self.on_sync = Some(Box::new(f));
        self
    }

    /// Called with (participant key, payload) when someone joins.
    pub fn on_join(mut self, f: impl Fn(&str, &Value) + Send + Sync + 'static) -> Self {
        self.on_join = Some(Box::new(f));
        self
    }

    /// Called with (participant key, payload) when someone leaves.
    pub fn on_leave(mut self, f: impl Fn(&str, &Value) + Send + Sync + 'static) -> Self {
        self.on_leave = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for PresenceHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceHooks")
            .field("on_sync", &self.on_sync.is_some())
            .field("on_join", &self.on_join.is_some())
            .field("on_leave", &self.on_leave.is_some())
            .finish()
    }
}

/// A broadcast payload received on a named channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub channel: String,
    pub event: String,
    pub payload: Value,
}

/// Any inbound event a transport channel can deliver.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Row(RowChange),
    PresenceSync(PresenceState),
    PresenceJoin { key: String, payload: Value },
    PresenceLeave { key: String, payload: Value },
    Broadcast(BroadcastMessage),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_event_serde() {
        assert_eq!(serde_json::to_string(&RowEvent::Insert).unwrap(), "\"insert\"");
        assert_eq!(serde_json::to_string(&RowEvent::Any).unwrap(), "\"*\"");
        let parsed: RowEvent = serde_json::from_str("\"*\"").unwrap();
        assert_eq!(parsed, RowEvent::Any);
    }

    #[test]
    fn test_row_filter_display() {
        let filter = RowFilter::eq("room_id", "42");
        assert_eq!(filter.to_string(), "room_id=eq.42");
    }
}
