//! Topic keys for realtime subscriptions.
//!
//! A topic is the logical identity of one live subscription; the registry
//! dedupes channels by the topic's channel name, so two subscriptions with
//! the same topic always share one underlying connection.

use std::fmt;

use crate::events::{RowEvent, RowFilter};

/// Logical identity of one live subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Row-change feed over one table, event kind and optional filter.
    Table {
        table: String,
        event: RowEvent,
        filter: Option<RowFilter>,
    },
    /// Presence room.
    Presence { room_id: String },
    /// Named broadcast channel. Event labels are not part of the identity;
    /// they are filtered at dispatch so one channel serves all labels.
    Broadcast { channel: String },
}

impl Topic {
    /// Row-change topic for a table.
    pub fn table(table: impl Into<String>, event: RowEvent, filter: Option<RowFilter>) -> Self {
        Topic::Table {
            table: table.into(),
            event,
            filter,
        }
    }

    /// Presence topic for a room.
    pub fn presence(room_id: impl Into<String>) -> Self {
        Topic::Presence {
            room_id: room_id.into(),
        }
    }

    /// Broadcast topic for a named channel.
    pub fn broadcast(channel: impl Into<String>) -> Self {
        Topic::Broadcast {
            channel: channel.into(),
        }
    }

    /// Stable channel name backing this topic.
    pub fn channel_name(&self) -> String {
        match self {
            Topic::Table {
                table,
                event,
                filter,
            } => match filter {
                Some(filter) => format!("table:{table}:{event}:{filter}"),
                None => format!("table:{table}:{event}"),
            },
            Topic::Presence { room_id } => format!("presence:{room_id}"),
            Topic::Broadcast { channel } => format!("broadcast:{channel}"),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.channel_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names_are_stable() {
        let topic = Topic::table("chat_messages", RowEvent::Insert, Some(RowFilter::eq("room_id", "42")));
        assert_eq!(topic.channel_name(), "table:chat_messages:insert:room_id=eq.42");

        assert_eq!(Topic::presence("room-7").channel_name(), "presence:room-7");
        assert_eq!(Topic::broadcast("reel:9").channel_name(), "broadcast:reel:9");
    }

    #[test]
    fn test_same_topic_same_key() {
        let a = Topic::table("orders", RowEvent::Update, None);
        let b = Topic::table("orders", RowEvent::Update, None);
        assert_eq!(a, b);
        assert_eq!(a.channel_name(), b.channel_name());
    }

    #[test]
    fn test_filter_distinguishes_topics() {
        let a = Topic::table("orders", RowEvent::Update, Some(RowFilter::eq("id", "1")));
        let b = Topic::table("orders", RowEvent::Update, Some(RowFilter::eq("id", "2")));
        assert_ne!(a.channel_name(), b.channel_name());
    }
}
