//! Environment configuration for backend endpoints.

use std::env;
use std::time::Duration;

/// Default REST API base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default REST API version segment.
pub const DEFAULT_API_VERSION: &str = "v1";

/// Default client identifier sent with every request.
pub const DEFAULT_CLIENT_ID: &str = "marketplace-rust";

/// Default realtime WebSocket URL.
pub const DEFAULT_REALTIME_URL: &str = "ws://localhost:4000/socket/websocket";

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Backend endpoint configuration, read from the environment with defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// REST API base URL (no trailing slash, no `/api/{version}` suffix).
    pub api_url: String,
    /// API version segment (e.g. "v1").
    pub api_version: String,
    /// Client identifier sent in the `X-Client-Id` header.
    pub client_id: String,
    /// Realtime WebSocket URL.
    pub realtime_url: String,
    /// Per-request timeout for gateway calls.
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            realtime_url: DEFAULT_REALTIME_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Read configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    ///
    /// Variables: `MARKET_API_URL`, `MARKET_API_VERSION`, `MARKET_CLIENT_ID`,
    /// `MARKET_REALTIME_URL`, `MARKET_REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let timeout_secs = env::var("MARKET_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            api_url: env::var("MARKET_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            api_version: env::var("MARKET_API_VERSION")
                .unwrap_or_else(|_| DEFAULT_API_VERSION.to_string()),
            client_id: env::var("MARKET_CLIENT_ID")
                .unwrap_or_else(|_| DEFAULT_CLIENT_ID.to_string()),
            realtime_url: env::var("MARKET_REALTIME_URL")
                .unwrap_or_else(|_| DEFAULT_REALTIME_URL.to_string()),
            request_timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Override the API base URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Override the realtime WebSocket URL.
    pub fn with_realtime_url(mut self, url: impl Into<String>) -> Self {
        self.realtime_url = url.into();
        self
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.api_version, "v1");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builders() {
        let config = Config::default()
            .with_api_url("https://api.example.com")
            .with_request_timeout(Duration::from_secs(5));
        assert_eq!(config.api_url, "https://api.example.com");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }
}
