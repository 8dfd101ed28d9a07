//! HTTP gateway client.
//!
//! Turns a resource-level method call into an HTTP request against the
//! versioned REST API and normalizes the outcome into an [`Envelope`].
//! Expected failure modes (HTTP error status, timeout, network failure,
//! unparsable body) never surface as `Err` — callers branch on
//! `Envelope::success` only.

use std::sync::Arc;
use std::time::Duration;

use common::{Config, Envelope, Error, PageMeta, Result};
use metrics::counter;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{NoAuth, TokenProvider};
use crate::query::Query;
use crate::resources::{
    AiApi, BookingsApi, ChatApi, GeoApi, ProductsApi, ReelsApi, SearchApi, WalletApi,
};

/// Error text for calls that exceeded their deadline.
pub const TIMEOUT_ERROR: &str = "request timed out";

/// Error text for transport-level failures (DNS, refused connection, abort).
pub const NETWORK_ERROR: &str = "network request failed";

/// Header carrying the client identifier.
pub const CLIENT_ID_HEADER: &str = "X-Client-Id";

/// Per-call request options.
///
/// Immutable once passed to [`ApiClient::request`]. Defaults: GET, no body,
/// no query, client-default timeout.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// HTTP method.
    pub method: Method,
    /// Optional JSON body.
    pub body: Option<Value>,
    /// Query parameters (unique keys, absent values omitted).
    pub query: Query,
    /// Extra headers for this call.
    pub headers: Vec<(String, String)>,
    /// Per-call timeout override.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Options for a GET request with the given query.
    pub fn get(query: Query) -> Self {
        Self {
            query,
            ..Self::default()
        }
    }

    /// Options for a request with a method and JSON body.
    pub fn with_body(method: Method, body: Value) -> Self {
        Self {
            method,
            body: Some(body),
            ..Self::default()
        }
    }

    /// Options for a bodyless request with the given method.
    pub fn method(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }
}

/// Typed client for the marketplace REST API.
///
/// Resource groups (products, reels, bookings, wallet, search, geo, ai,
/// chat) are stateless namespaces over the same request primitive.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_version: String,
    client_id: String,
    tokens: Arc<dyn TokenProvider>,
    default_timeout: Duration,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("client_id", &self.client_id)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl ApiClient {
    /// Create a client from configuration and a token provider.
    pub fn new(config: &Config, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            client_id: config.client_id.clone(),
            tokens,
            default_timeout: config.request_timeout,
        })
    }

    /// Create an anonymous client from environment configuration.
    pub fn from_env() -> Result<Self> {
        Self::new(&Config::from_env(), Arc::new(NoAuth))
    }

    /// The configured base URL (without the `/api/{version}` suffix).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue a request and normalize the outcome into an [`Envelope`].
    ///
    /// Exactly one attempt is made; retry policy belongs to the caller. The
    /// call is bounded by the configured timeout — when the deadline passes
    /// the in-flight request future is dropped, which aborts the underlying
    /// connection.
    pub async fn request<T: DeserializeOwned>(
        &self,
        path: &str,
        opts: RequestOptions,
    ) -> Envelope<T> {
        let url = format!("{}/api/{}{}", self.base_url, self.api_version, path);
        let timeout = opts.timeout.unwrap_or(self.default_timeout);

        let mut req = self
            .http
            .request(opts.method.clone(), &url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header(CLIENT_ID_HEADER, &self.client_id);

        if !opts.query.is_empty() {
            req = req.query(opts.query.pairs());
        }
        if let Some(token) = self.tokens.token() {
            req = req.bearer_auth(token);
        }
        for (key, value) in &opts.headers {
            req = req.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &opts.body {
            req = req.json(body);
        }

        counter!("api_client_requests_total").increment(1);
        debug!("{} {}", opts.method, url);

        let outcome = tokio::time::timeout(timeout, async {
            let response = req.send().await?;
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Ok::<_, reqwest::Error>((status, body))
        })
        .await;

        match outcome {
            Err(_) => {
                counter!("api_client_timeouts_total").increment(1);
                warn!("{} {} timed out after {:?}", opts.method, url, timeout);
                Envelope::err(TIMEOUT_ERROR)
            }
            Ok(Err(e)) => {
                counter!("api_client_network_errors_total").increment(1);
                warn!("{} {} failed: {}", opts.method, url, e);
                Envelope::err(NETWORK_ERROR)
            }
            Ok(Ok((status, body))) => normalize_response(status, &body),
        }
    }

    /// GET with query parameters.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: Query) -> Envelope<T> {
        self.request(path, RequestOptions::get(query)).await
    }

    /// POST with a JSON body.
    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Envelope<T> {
        self.request(path, RequestOptions::with_body(Method::POST, body))
            .await
    }

    /// PUT with a JSON body.
    pub async fn put<T: DeserializeOwned>(&self, path: &str, body: Value) -> Envelope<T> {
        self.request(path, RequestOptions::with_body(Method::PUT, body))
            .await
    }

    /// PATCH with a JSON body.
    pub async fn patch<T: DeserializeOwned>(&self, path: &str, body: Value) -> Envelope<T> {
        self.request(path, RequestOptions::with_body(Method::PATCH, body))
            .await
    }

    /// DELETE with no body.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Envelope<T> {
        self.request(path, RequestOptions::method(Method::DELETE))
            .await
    }

    /// Product catalog endpoints.
    pub fn products(&self) -> ProductsApi<'_> {
        ProductsApi::new(self)
    }

    /// Short-video feed endpoints.
    pub fn reels(&self) -> ReelsApi<'_> {
        ReelsApi::new(self)
    }

    /// Service booking endpoints.
    pub fn bookings(&self) -> BookingsApi<'_> {
        BookingsApi::new(self)
    }

    /// Wallet and payment endpoints.
    pub fn wallet(&self) -> WalletApi<'_> {
        WalletApi::new(self)
    }

    /// Unified search endpoints.
    pub fn search(&self) -> SearchApi<'_> {
        SearchApi::new(self)
    }

    /// Location-based endpoints.
    pub fn geo(&self) -> GeoApi<'_> {
        GeoApi::new(self)
    }

    /// AI-assisted endpoints (recommendations, visual search).
    pub fn ai(&self) -> AiApi<'_> {
        AiApi::new(self)
    }

    /// Chat endpoints.
    pub fn chat(&self) -> ChatApi<'_> {
        ChatApi::new(self)
    }
}

/// Fold an HTTP status and body into an [`Envelope`].
///
/// 2xx bodies are expected as JSON objects optionally carrying `data`,
/// `message` and `meta`; a body that is not a JSON object is treated as the
/// payload itself, and an unparsable body as empty data. Non-2xx bodies
/// supply the error text via `message` or `detail`, with a generic fallback.
fn normalize_response<T: DeserializeOwned>(status: StatusCode, body: &str) -> Envelope<T> {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    if status.is_success() {
        let Some(value) = parsed else {
            return Envelope::ok_empty();
        };

        let message = value
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string);
        let meta: Option<PageMeta> = value
            .get("meta")
            .and_then(|m| serde_json::from_value(m.clone()).ok());

        let data = match value.get("data").cloned() {
            // An explicit null is absent data, not a payload.
            Some(Value::Null) => None,
            Some(data) => serde_json::from_value::<T>(data).ok(),
            // Unwrapped responses: the whole body is the payload.
            None => serde_json::from_value::<T>(value).ok(),
        };

        Envelope {
            data,
            success: true,
            message,
            error: None,
            meta,
        }
    } else {
        counter!("api_client_request_failures_total").increment(1);
        let error = parsed
            .as_ref()
            .and_then(|v| v.get("message").or_else(|| v.get("detail")))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()));
        Envelope::err(error)
    }
}
