//! Unified search endpoints.

use common::Envelope;
use std::fmt;

use crate::client::ApiClient;
use crate::models::SearchResults;
use crate::query::Query;

/// Restrict a search to one resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Products,
    Sellers,
    Reels,
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchKind::Products => write!(f, "products"),
            SearchKind::Sellers => write!(f, "sellers"),
            SearchKind::Reels => write!(f, "reels"),
        }
    }
}

/// Search query and pagination.
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub q: String,
    /// When unset, all kinds are searched.
    pub kind: Option<SearchKind>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl SearchParams {
    /// Search all kinds for the given text.
    pub fn all(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            ..Self::default()
        }
    }

    fn to_query(&self) -> Query {
        Query::new()
            .set("q", &self.q)
            .set_opt("kind", self.kind)
            .set_opt("page", self.page)
            .set_opt("limit", self.limit)
    }
}

/// Search method group.
pub struct SearchApi<'a> {
    client: &'a ApiClient,
}

impl<'a> SearchApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Run a unified search across products, sellers and reels.
    pub async fn query(&self, params: &SearchParams) -> Envelope<SearchResults> {
        self.client.get("/search", params.to_query()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_filter_is_optional() {
        let query = SearchParams::all("lamp").to_query();
        let keys: Vec<&str> = query.pairs().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["q"]);

        let params = SearchParams {
            kind: Some(SearchKind::Sellers),
            ..SearchParams::all("lamp")
        };
        assert!(params
            .to_query()
            .pairs()
            .iter()
            .any(|(k, v)| k == "kind" && v == "sellers"));
    }
}
