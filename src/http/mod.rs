//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request gate: preflight, `url` parameter, proxy origin)
//!     → rewrite engine (fetch, relay or rewrite)
//!     → response.rs (CORS overlay on every response)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{GateDecision, OriginPolicy, ProxyOrigin, TargetUrl, X_REQUEST_ID};
pub use server::{AppState, HttpServer, Runtime, SharedRuntime};
