//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → tokio TcpListener (bound by lifecycle::startup)
//!     → tls.rs (optional TLS handshake via axum-server)
//!     → Hand off to HTTP layer
//! ```

pub mod tls;
