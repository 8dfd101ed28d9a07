//! Chat endpoints.
//!
//! Message history and room management go through the REST API; live
//! delivery is the realtime registry's concern.

use common::Envelope;
use serde_json::json;

use crate::client::ApiClient;
use crate::models::{ChatMessage, ChatRoom};
use crate::query::Query;

/// Chat method group.
pub struct ChatApi<'a> {
    client: &'a ApiClient,
}

impl<'a> ChatApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// List the authenticated user's chat rooms, most recent first.
    pub async fn rooms(&self, page: Option<u32>, limit: Option<u32>) -> Envelope<Vec<ChatRoom>> {
        let query = Query::new().set_opt("page", page).set_opt("limit", limit);
        self.client.get("/chat/rooms", query).await
    }

    /// Fetch a single room.
    pub async fn room(&self, room_id: &str) -> Envelope<ChatRoom> {
        self.client
            .get(&format!("/chat/rooms/{room_id}"), Query::new())
            .await
    }

    /// Create a room with the given participants.
    pub async fn create_room(
        &self,
        participant_ids: &[&str],
        title: Option<&str>,
    ) -> Envelope<ChatRoom> {
        self.client
            .post(
                "/chat/rooms",
                json!({ "participantIds": participant_ids, "title": title }),
            )
            .await
    }

    /// Fetch a page of messages, newest first. `before` is a message id
    /// cursor for loading older history.
    pub async fn messages(
        &self,
        room_id: &str,
        before: Option<&str>,
        limit: Option<u32>,
    ) -> Envelope<Vec<ChatMessage>> {
        let query = Query::new()
            .set_opt("before", before)
            .set_opt("limit", limit);
        self.client
            .get(&format!("/chat/rooms/{room_id}/messages"), query)
            .await
    }

    /// Send a message to a room.
    pub async fn send(&self, room_id: &str, body: &str) -> Envelope<ChatMessage> {
        self.client
            .post(
                &format!("/chat/rooms/{room_id}/messages"),
                json!({ "body": body }),
            )
            .await
    }

    /// Mark every message in a room as read.
    pub async fn mark_read(&self, room_id: &str) -> Envelope<serde_json::Value> {
        self.client
            .post(&format!("/chat/rooms/{room_id}/read"), json!({}))
            .await
    }
}
