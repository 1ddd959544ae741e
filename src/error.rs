use serde::Serialize;
use thiserror::Error;

/// Maximum characters to include in error message body for debugging.
pub(crate) const MAX_ERROR_BODY_CHARS: usize = 200;

/// Upstream error code used when a page keeps failing after every retry.
pub const RETRIES_EXHAUSTED: &str = "RetriesExhausted";

/// Errors that can occur when signing requests or talking to the catalog API.
#[derive(Debug, Error)]
pub enum PaapiError {
    /// Missing or invalid credentials, configuration or signing headers.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invalid search input supplied by the caller.
    #[error("validation error: {0}")]
    Validation(String),

    /// Upstream throttled the request.
    #[error("rate limited: [{code}] {message}")]
    RateLimited { code: String, message: String },

    /// Upstream rejected the request or the retry budget ran out.
    #[error("upstream error: [{code}] {message}")]
    Upstream { code: String, message: String },

    /// Unexpected HTTP response (non-JSON error body).
    #[error("HTTP error: {0}")]
    Http(String),

    /// HTTP/network layer error from reqwest.
    #[error("HTTP request failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Response deserialization error.
    #[error("deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),

    /// The caller abandoned the operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl PaapiError {
    /// Returns `true` if the failed call may be retried on the same page.
    ///
    /// Throttling responses and transport timeouts are retryable. Everything
    /// else, including upstream validation errors, is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            PaapiError::RateLimited { .. } => true,
            PaapiError::HttpClient(e) => e.is_timeout(),
            PaapiError::Configuration(_)
            | PaapiError::Validation(_)
            | PaapiError::Upstream { .. }
            | PaapiError::Http(_)
            | PaapiError::Deserialize(_)
            | PaapiError::Cancelled => false,
        }
    }

    /// Returns the upstream error code, if any.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            PaapiError::RateLimited { code, .. } | PaapiError::Upstream { code, .. } => Some(code),
            _ => None,
        }
    }

    /// HTTP status an inbound handler should answer with for this failure.
    pub fn http_status(&self) -> u16 {
        match self {
            PaapiError::Validation(_) => 400,
            _ => 500,
        }
    }

    /// JSON error payload for the inbound surface.
    ///
    /// The payload only carries the display message, which never contains
    /// credentials.
    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
            code: self.error_code().map(str::to_string),
        }
    }

    /// Escalates a retryable failure once the attempt ceiling is reached.
    pub(crate) fn exhausted(page: u32, attempts: u32, last: &PaapiError) -> Self {
        PaapiError::Upstream {
            code: RETRIES_EXHAUSTED.to_string(),
            message: format!("page {page} failed after {attempts} attempts: {last}"),
        }
    }
}

/// JSON body returned to inbound callers on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// A specialized Result type for catalog operations.
pub type Result<T> = std::result::Result<T, PaapiError>;

/// Truncates a string to at most `max_chars` characters on a valid UTF-8 boundary.
pub(crate) fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
