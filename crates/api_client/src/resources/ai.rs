//! AI-assisted endpoints.
//!
//! Inference runs on an external model endpoint; this group only shapes the
//! calls and decodes the results.

use common::Envelope;
use serde_json::json;

use crate::client::ApiClient;
use crate::models::{GeneratedDescription, Product, Recommendation};
use crate::query::Query;

/// AI method group.
pub struct AiApi<'a> {
    client: &'a ApiClient,
}

impl<'a> AiApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Personalized product recommendations for the authenticated user.
    pub async fn recommendations(&self, limit: Option<u32>) -> Envelope<Vec<Recommendation>> {
        let query = Query::new().set_opt("limit", limit);
        self.client.get("/ai/recommendations", query).await
    }

    /// Find products visually similar to the given image.
    pub async fn visual_search(&self, image_url: &str) -> Envelope<Vec<Product>> {
        self.client
            .post("/ai/visual-search", json!({ "imageUrl": image_url }))
            .await
    }

    /// Generate a listing description from a title and keywords.
    pub async fn generate_description(
        &self,
        title: &str,
        keywords: &[&str],
    ) -> Envelope<GeneratedDescription> {
        self.client
            .post(
                "/ai/describe",
                json!({ "title": title, "keywords": keywords }),
            )
            .await
    }
}
