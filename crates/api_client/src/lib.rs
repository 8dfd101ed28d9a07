//! Typed HTTP client for the marketplace REST API.
//!
//! This crate turns resource-level method calls into authenticated,
//! timeout-bounded HTTP requests and normalizes every outcome into a
//! uniform [`Envelope`](common::Envelope):
//!
//! - URL: `{base}/api/{version}{path}?{query}`
//! - Headers: JSON content headers, `X-Client-Id`, and `Authorization:
//!   Bearer {token}` only when the injected [`TokenProvider`] supplies one
//! - Non-2xx, timeout, network failure and unparsable bodies all fold into
//!   the envelope; callers check `success` instead of handling errors
//! - Exactly one attempt per call; retries belong to the caller
//!
//! Resource groups are stateless namespaces over the same primitive:
//!
//! ```ignore
//! let client = ApiClient::new(&Config::from_env(), Arc::new(session))?;
//! let products = client.products().list(&ProductListParams::default()).await;
//! if products.success {
//!     render(products.data.unwrap_or_default());
//! }
//! ```

pub mod auth;
pub mod client;
pub mod models;
pub mod query;
pub mod resources;

pub use auth::{NoAuth, StaticToken, TokenProvider};
pub use client::{ApiClient, RequestOptions, CLIENT_ID_HEADER, NETWORK_ERROR, TIMEOUT_ERROR};
pub use query::Query;
