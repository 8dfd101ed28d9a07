//! Short-video feed endpoints.

use common::Envelope;
use serde_json::json;

use crate::client::ApiClient;
use crate::models::{Reel, ReelComment};
use crate::query::Query;

/// Filters and pagination for the reel feed.
#[derive(Debug, Clone, Default)]
pub struct ReelFeedParams {
    pub seller_id: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ReelFeedParams {
    fn to_query(&self) -> Query {
        Query::new()
            .set_opt("sellerId", self.seller_id.as_deref())
            .set_opt("page", self.page)
            .set_opt("limit", self.limit)
    }
}

/// Reel feed method group.
pub struct ReelsApi<'a> {
    client: &'a ApiClient,
}

impl<'a> ReelsApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Fetch a page of the reel feed.
    pub async fn feed(&self, params: &ReelFeedParams) -> Envelope<Vec<Reel>> {
        self.client.get("/reels", params.to_query()).await
    }

    /// Fetch a single reel.
    pub async fn get(&self, reel_id: &str) -> Envelope<Reel> {
        self.client.get(&format!("/reels/{reel_id}"), Query::new()).await
    }

    /// Like a reel as the authenticated user.
    pub async fn like(&self, reel_id: &str) -> Envelope<Reel> {
        self.client
            .post(&format!("/reels/{reel_id}/like"), json!({}))
            .await
    }

    /// Remove the authenticated user's like.
    pub async fn unlike(&self, reel_id: &str) -> Envelope<Reel> {
        self.client.delete(&format!("/reels/{reel_id}/like")).await
    }

    /// List comments on a reel.
    pub async fn comments(
        &self,
        reel_id: &str,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Envelope<Vec<ReelComment>> {
        let query = Query::new().set_opt("page", page).set_opt("limit", limit);
        self.client
            .get(&format!("/reels/{reel_id}/comments"), query)
            .await
    }

    /// Add a comment to a reel.
    pub async fn comment(&self, reel_id: &str, body: &str) -> Envelope<ReelComment> {
        self.client
            .post(&format!("/reels/{reel_id}/comments"), json!({ "body": body }))
            .await
    }

    /// Record a view of a reel (fire-and-forget counter increment).
    pub async fn record_view(&self, reel_id: &str) -> Envelope<serde_json::Value> {
        self.client
            .post(&format!("/reels/{reel_id}/view"), json!({}))
            .await
    }
}
