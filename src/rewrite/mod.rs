//! Rewrite engine subsystem.
//!
//! # Data Flow
//! ```text
//! TargetUrl + ProxyOrigin
//!     → fetch.rs (single GET, redirects followed)
//!     → engine.rs (content-type branch, header assembly)
//!         non-HTML → body relayed as-is
//!         HTML     → html.rs (streaming scanner)
//!                      → link.rs (resolve + proxied URL per attribute)
//!     → Response (CORS added at the boundary)
//! ```
//!
//! # Design Decisions
//! - Bodies are streams end to end, never collected
//! - Links resolve against the requested URL, not the post-redirect URL
//! - One upstream attempt per request, failures are not retried

pub mod engine;
pub mod fetch;
pub mod html;
pub mod link;

pub use engine::{Branch, Relayed, RewriteEngine};
pub use fetch::{Fetcher, UpstreamResponse};
pub use html::{RewriteRules, RewriteStreamError};
pub use link::{AttributeResolutionError, LinkRewriter};
