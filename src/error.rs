//! Request-level errors and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Everything that can end a proxied request early.
///
/// The `Display` text is the exact response body sent to the caller.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// No `url` query parameter, or an empty one.
    #[error("Error: The \"url\" query parameter is required.")]
    MissingParameter,

    /// `url` is present but is not an absolute URL.
    #[error("Error: Invalid \"url\" query parameter provided.")]
    InvalidParameter {
        value: String,
        #[source]
        source: url::ParseError,
    },

    /// The upstream request could not be completed.
    #[error("Error fetching or rewriting the target URL: {0}")]
    UpstreamFetch(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MissingParameter | ProxyError::InvalidParameter { .. } => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::UpstreamFetch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::MissingParameter => "missing_parameter",
            ProxyError::InvalidParameter { .. } => "invalid_parameter",
            ProxyError::UpstreamFetch(_) => "upstream_fetch",
        }
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        ProxyError::UpstreamFetch(e.to_string())
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

/// Result type for request handling.
pub type ProxyResult<T> = Result<T, ProxyError>;
