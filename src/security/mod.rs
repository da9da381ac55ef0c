//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream response:
//!     → headers.rs (drop hop-by-hop and framing-blocking headers)
//!     → Pass to client
//!
//! Every response:
//!     → headers.rs (overlay CORS header set)
//! ```
//!
//! # Design Decisions
//! - Upstream CORS headers never reach the client; the proxy's set wins
//! - Request size limits are applied by the router's body limit layer

pub mod headers;

pub use headers::{strip_hop_by_hop, CorsPolicy, StripPolicy};
