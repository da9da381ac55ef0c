//! Fetch, branch on content type, assemble the response.

use std::sync::Arc;

use axum::body::Body;
use axum::http::header;
use axum::response::Response;

use crate::config::{ConfigError, ProxyConfig};
use crate::error::ProxyResult;
use crate::http::request::{ProxyOrigin, TargetUrl};
use crate::rewrite::fetch::{Fetcher, UpstreamResponse};
use crate::rewrite::html::{rewrite_stream, RewriteRules};
use crate::rewrite::link::LinkRewriter;
use crate::security::headers::{strip_hop_by_hop, StripPolicy};

/// Which way the engine handled a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// Body relayed byte for byte.
    Relayed,
    /// HTML body streamed through the attribute rewriter.
    Rewritten,
}

impl Branch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Relayed => "relayed",
            Branch::Rewritten => "rewritten",
        }
    }
}

/// Outcome of a successful relay.
pub struct Relayed {
    pub branch: Branch,
    pub response: Response,
}

/// Everything the engine needs, compiled from configuration.
#[derive(Debug, Clone)]
pub struct RewriteEngine {
    fetcher: Fetcher,
    rules: Arc<RewriteRules>,
    strip: StripPolicy,
    channel_capacity: usize,
}

impl RewriteEngine {
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            fetcher: Fetcher::new(&config.upstream, &config.timeouts)?,
            rules: Arc::new(RewriteRules::from_config(&config.rewrite)),
            strip: StripPolicy::from_config(&config.rewrite)
                .map_err(|e| ConfigError::Validation(vec![e]))?,
            channel_capacity: config.rewrite.channel_capacity,
        })
    }

    /// Fetch `target` and build the response relayed to the caller.
    ///
    /// CORS headers are not added here; the response boundary does that for
    /// every response, errors included.
    pub async fn relay(
        &self,
        target: &TargetUrl,
        origin: ProxyOrigin,
        request_id: &str,
    ) -> ProxyResult<Relayed> {
        let upstream = self.fetcher.fetch(target).await?;
        if upstream.final_url != *target.as_url() {
            tracing::debug!(
                request_id = %request_id,
                target = %target,
                final_url = %upstream.final_url,
                "Followed upstream redirects"
            );
        }

        let branch = if upstream.is_html() {
            Branch::Rewritten
        } else {
            Branch::Relayed
        };
        let UpstreamResponse {
            status,
            mut headers,
            body,
            ..
        } = upstream;

        strip_hop_by_hop(&mut headers);
        self.strip.apply(&mut headers);

        let body = match branch {
            Branch::Relayed => Body::from_stream(body),
            Branch::Rewritten => {
                // Rewritten length differs from upstream
                headers.remove(header::CONTENT_LENGTH);
                let links = LinkRewriter::new(origin, target.as_url().clone());
                Body::from_stream(rewrite_stream(
                    body,
                    links,
                    Arc::clone(&self.rules),
                    self.channel_capacity,
                    request_id.to_string(),
                ))
            }
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;

        tracing::debug!(
            request_id = %request_id,
            status = %status,
            branch = branch.as_str(),
            "Relaying upstream response"
        );

        Ok(Relayed { branch, response })
    }
}
