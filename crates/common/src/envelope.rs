//! Uniform result envelope returned by every gateway call.
//!
//! Every request resolves to an [`Envelope`]: on success `data` is populated
//! and `success` is true, on failure `error` carries the reason and `data` is
//! absent. Callers branch on `success` instead of catching errors.

use serde::{Deserialize, Serialize};

/// Pagination metadata attached to list responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    /// Current page number (1-based).
    pub page: u32,
    /// Page size requested.
    pub limit: u32,
    /// Total number of records across all pages.
    pub total: u64,
    /// Whether more pages are available after this one.
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

/// Uniform success/data/error wrapper for gateway responses.
///
/// Exactly one of `data` (success) or `error` (failure) is meaningfully
/// populated; `success` is always consistent with which branch it is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Response payload, present on success.
    pub data: Option<T>,
    /// Whether the call succeeded.
    pub success: bool,
    /// Informational message from the server (success responses).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error text (failure responses).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Pagination metadata (list responses).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

impl<T> Envelope<T> {
    /// Successful envelope with a payload.
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            success: true,
            message: None,
            error: None,
            meta: None,
        }
    }

    /// Successful envelope with no payload (e.g. 204 or unparsable body).
    pub fn ok_empty() -> Self {
        Self {
            data: None,
            success: true,
            message: None,
            error: None,
            meta: None,
        }
    }

    /// Failed envelope with an error message.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            data: None,
            success: false,
            message: None,
            error: Some(error.into()),
            meta: None,
        }
    }

    /// Attach pagination metadata.
    pub fn with_meta(mut self, meta: PageMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Attach a server-supplied informational message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Consume the envelope, returning the payload if the call succeeded.
    pub fn into_data(self) -> Option<T> {
        self.data
    }

    /// Map the payload type while keeping the rest of the envelope.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            data: self.data.map(f),
            success: self.success,
            message: self.message,
            error: self.error,
            meta: self.meta,
        }
    }
}
