//! HTTP handler enforcing the inference boundary contract.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::config::InferenceConfig;
use crate::http::request::request_id;
use crate::http::server::AppState;
use crate::inference::{InferenceBackend, InferenceError, InferenceReply, InferenceRequest};
use crate::observability::metrics;

/// Authenticated front door to an `InferenceBackend`.
#[derive(Clone)]
pub struct InferenceService {
    backend: Arc<dyn InferenceBackend>,
    api_token: String,
    default_model: String,
    max_body_size: usize,
}

impl InferenceService {
    pub fn new(backend: Arc<dyn InferenceBackend>, config: &InferenceConfig, max_body_size: usize) -> Self {
        Self {
            backend,
            api_token: config.api_token.clone(),
            default_model: config.default_model.clone(),
            max_body_size,
        }
    }

    /// Require `Authorization: Bearer <api_token>`.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), InferenceError> {
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match presented {
            Some(token) if token == self.api_token => Ok(()),
            _ => Err(InferenceError::Unauthorized),
        }
    }

    pub async fn handle(&self, request: Request<Body>) -> Result<InferenceReply, InferenceError> {
        if request.method() != Method::POST {
            return Err(InferenceError::MethodNotAllowed);
        }
        self.authorize(request.headers())?;

        let bytes = axum::body::to_bytes(request.into_body(), self.max_body_size)
            .await
            .map_err(|e| InferenceError::InvalidBody(e.to_string()))?;
        let payload: InferenceRequest =
            serde_json::from_slice(&bytes).map_err(|e| InferenceError::InvalidBody(e.to_string()))?;

        let model = payload
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let messages = payload.into_messages()?;

        let response = self.backend.complete(&model, messages).await?;
        Ok(InferenceReply { response })
    }
}

/// Route handler. Preflight is answered here so browsers can reach the POST.
pub async fn inference_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request_id(request.headers());
    let method = request.method().clone();

    let Some(service) = state.inference.clone() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if method == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }

    let response = match service.handle(request).await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Inference request rejected");
            e.into_response()
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), "inference", start);
    response
}
