//! Product catalog endpoints.

use common::Envelope;
use rust_decimal::Decimal;
use serde_json::json;

use crate::client::ApiClient;
use crate::models::{NewProduct, NewReview, Product, ProductUpdate, Review};
use crate::query::Query;

/// Filters and pagination for product listings.
#[derive(Debug, Clone, Default)]
pub struct ProductListParams {
    pub category: Option<String>,
    pub seller_id: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    /// Sort key, e.g. "price_asc", "newest".
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ProductListParams {
    fn to_query(&self) -> Query {
        Query::new()
            .set_opt("category", self.category.as_deref())
            .set_opt("sellerId", self.seller_id.as_deref())
            .set_opt("minPrice", self.min_price)
            .set_opt("maxPrice", self.max_price)
            .set_opt("sort", self.sort.as_deref())
            .set_opt("page", self.page)
            .set_opt("limit", self.limit)
    }
}

/// Product catalog method group.
pub struct ProductsApi<'a> {
    client: &'a ApiClient,
}

impl<'a> ProductsApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// List products matching the given filters.
    pub async fn list(&self, params: &ProductListParams) -> Envelope<Vec<Product>> {
        self.client.get("/products", params.to_query()).await
    }

    /// Fetch a single product.
    pub async fn get(&self, product_id: &str) -> Envelope<Product> {
        self.client
            .get(&format!("/products/{product_id}"), Query::new())
            .await
    }

    /// Create a product listing (seller only).
    pub async fn create(&self, product: &NewProduct) -> Envelope<Product> {
        self.client.post("/products", json!(product)).await
    }

    /// Apply a partial update to a product.
    pub async fn update(&self, product_id: &str, changes: &ProductUpdate) -> Envelope<Product> {
        self.client
            .patch(&format!("/products/{product_id}"), json!(changes))
            .await
    }

    /// Delete a product listing.
    pub async fn delete(&self, product_id: &str) -> Envelope<serde_json::Value> {
        self.client.delete(&format!("/products/{product_id}")).await
    }

    /// List reviews for a product.
    pub async fn reviews(
        &self,
        product_id: &str,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Envelope<Vec<Review>> {
        let query = Query::new().set_opt("page", page).set_opt("limit", limit);
        self.client
            .get(&format!("/products/{product_id}/reviews"), query)
            .await
    }

    /// Add a review to a product.
    pub async fn add_review(&self, product_id: &str, review: &NewReview) -> Envelope<Review> {
        self.client
            .post(&format!("/products/{product_id}/reviews"), json!(review))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_params_omit_unset_filters() {
        let params = ProductListParams {
            category: Some("shoes".to_string()),
            page: Some(2),
            ..Default::default()
        };
        let query = params.to_query();
        let keys: Vec<&str> = query.pairs().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["category", "page"]);
    }
}
