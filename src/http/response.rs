//! Response boundary.
//!
//! # Responsibilities
//! - Overlay CORS headers on every response leaving the router
//! - Build the preflight response
//! - Turn handler panics into a well-formed 500
//!
//! # Design Decisions
//! - CORS is applied once, outside timeout and panic handling, so even
//!   408s and panics are readable by browser callers
//! - The live configuration snapshot is read per response

use std::any::Any;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ProxyError;
use crate::http::server::SharedRuntime;

/// Middleware adding the CORS header set to whatever the inner service produced.
pub async fn cors_boundary(
    State(runtime): State<SharedRuntime>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    runtime.load().cors.overlay(response.headers_mut());
    response
}

/// Empty 200 answering a CORS preflight.
pub fn preflight() -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    response
}

/// `CatchPanicLayer` hook mapping a panic to the upstream-failure response.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "internal error".to_string()
    };

    tracing::error!(panic = %message, "Request handler panicked");
    ProxyError::UpstreamFetch(message).into_response()
}
