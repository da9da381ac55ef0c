//! Edge rewriting CORS proxy.
//!
//! Fetches `?url=<target>`, relays non-HTML bodies untouched, rewrites link
//! attributes in HTML so navigation stays behind the proxy, and attaches a
//! permissive CORS header set to every response.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod rewrite;

// Optional services
pub mod inference;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::ProxyConfig;
pub use error::{ProxyError, ProxyResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
