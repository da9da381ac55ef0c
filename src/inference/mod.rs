//! Inference passthrough boundary.
//!
//! # Data Flow
//! ```text
//! POST {inference.path}  { model?, messages?, prompt? }
//!     → handler.rs (method, bearer token, payload checks)
//!     → InferenceRequest::into_messages (messages verbatim, or prompt wrapped)
//!     → backend.rs (hosted model call)
//!     → { response } or { error }
//! ```
//!
//! # Design Decisions
//! - The model itself is an external collaborator behind `InferenceBackend`
//! - Errors always answer with a JSON `{ error }` payload

pub mod backend;
pub mod handler;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use backend::HttpInferenceBackend;
pub use handler::{inference_handler, InferenceService};

/// One chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Caller payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InferenceRequest {
    pub model: Option<String>,
    pub messages: Option<Vec<ChatMessage>>,
    pub prompt: Option<String>,
}

impl InferenceRequest {
    /// `messages` verbatim when present, otherwise `prompt` as a single user turn.
    pub fn into_messages(self) -> Result<Vec<ChatMessage>, InferenceError> {
        match (self.messages, self.prompt) {
            (Some(messages), _) => Ok(messages),
            (None, Some(prompt)) if !prompt.is_empty() => Ok(vec![ChatMessage::user(prompt)]),
            _ => Err(InferenceError::MissingInput),
        }
    }
}

/// Successful reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceReply {
    pub response: String,
}

/// Error reply body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
}

/// Errors at the inference boundary.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Either \"messages\" or \"prompt\" must be provided")]
    MissingInput,

    #[error("Inference backend error: {0}")]
    Backend(String),
}

impl InferenceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            InferenceError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            InferenceError::Unauthorized => StatusCode::UNAUTHORIZED,
            InferenceError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            InferenceError::MissingInput | InferenceError::Backend(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for InferenceError {
    fn into_response(self) -> Response {
        let payload = ErrorPayload {
            error: self.to_string(),
        };
        (self.status_code(), Json(payload)).into_response()
    }
}

/// A hosted model that turns a conversation into a text reply.
pub trait InferenceBackend: Send + Sync {
    fn complete<'a>(
        &'a self,
        model: &'a str,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'a, Result<String, InferenceError>>;
}
