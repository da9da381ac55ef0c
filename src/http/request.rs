//! Request gate: validation of the inbound request.
//!
//! # Responsibilities
//! - Answer CORS preflight (`OPTIONS`) without touching the network
//! - Extract and validate the `url` query parameter
//! - Work out the origin the proxy is reachable at
//! - Generate a request ID for every request
//!
//! # Design Decisions
//! - The first `url` occurrence wins; an empty value counts as missing
//! - Only absolute URLs are accepted, relative input never reaches the fetcher
//! - Validation failures are terminal, nothing is retried

use std::fmt;

use axum::http::{header, HeaderMap, HeaderValue, Method, Request, Uri};
use tower_http::request_id::{MakeRequestId, RequestId};
use url::Url;
use uuid::Uuid;

use crate::config::ListenerConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::rewrite::link::encode_uri_component;

/// Name of the query parameter carrying the target.
pub const TARGET_PARAM: &str = "url";

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Validated absolute URL of the resource to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUrl(Url);

impl TargetUrl {
    /// Parse an absolute URL. Relative input is rejected.
    pub fn parse(value: &str) -> ProxyResult<Self> {
        Url::parse(value)
            .map(Self)
            .map_err(|source| ProxyError::InvalidParameter {
                value: value.to_string(),
                source,
            })
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }
}

impl fmt::Display for TargetUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Scheme and host the proxy itself is reached at, e.g. `https://proxy.test`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyOrigin(String);

impl ProxyOrigin {
    /// Build an origin from `scheme://host[:port]`, normalized like a
    /// browser origin (lowercase host, default port dropped).
    pub fn new(scheme: &str, host: &str) -> Self {
        let raw = format!("{}://{}", scheme, host);
        match Url::parse(&raw) {
            Ok(url) if url.origin().is_tuple() => Self(url.origin().ascii_serialization()),
            _ => Self(raw.trim_end_matches('/').to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The URL that routes `absolute` back through this proxy.
    pub fn proxied(&self, absolute: &Url) -> String {
        format!(
            "{}/?{}={}",
            self.0,
            TARGET_PARAM,
            encode_uri_component(absolute.as_str())
        )
    }
}

impl fmt::Display for ProxyOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the proxy origin is derived for a request.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    public_origin: Option<ProxyOrigin>,
    default_scheme: &'static str,
    fallback_host: String,
}

impl OriginPolicy {
    pub fn from_config(listener: &ListenerConfig) -> Self {
        Self {
            public_origin: listener
                .public_origin
                .as_deref()
                .and_then(|origin| Url::parse(origin).ok())
                .map(|url| ProxyOrigin(url.origin().ascii_serialization())),
            default_scheme: if listener.tls.is_some() { "https" } else { "http" },
            fallback_host: listener.bind_address.clone(),
        }
    }

    /// Configured origin first, then forwarding headers, then the request itself.
    pub fn resolve(&self, headers: &HeaderMap, uri: &Uri) -> ProxyOrigin {
        if let Some(origin) = &self.public_origin {
            return origin.clone();
        }

        let scheme = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or_else(|| uri.scheme_str())
            .unwrap_or(self.default_scheme);

        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| uri.authority().map(|a| a.as_str()))
            .unwrap_or(&self.fallback_host);

        ProxyOrigin::new(scheme, host)
    }
}

/// What the gate decided to do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Answer with CORS headers only.
    Preflight,
    /// Fetch `target` and relay it, rewriting links against `origin`.
    Forward { target: TargetUrl, origin: ProxyOrigin },
}

/// Validate an inbound request.
pub fn inspect<B>(request: &Request<B>, origins: &OriginPolicy) -> ProxyResult<GateDecision> {
    if request.method() == Method::OPTIONS {
        return Ok(GateDecision::Preflight);
    }

    let target = target_from_query(request.uri().query())?;
    let origin = origins.resolve(request.headers(), request.uri());
    Ok(GateDecision::Forward { target, origin })
}

/// Pull the `url` parameter out of a raw query string.
pub fn target_from_query(query: Option<&str>) -> ProxyResult<TargetUrl> {
    let value = query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(key, _)| key == TARGET_PARAM)
            .map(|(_, value)| value.into_owned())
    });

    match value {
        Some(value) if !value.is_empty() => TargetUrl::parse(&value),
        _ => Err(ProxyError::MissingParameter),
    }
}

/// Request ID of a request, or "unknown" when the layer did not run.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Generates UUID v4 request IDs for `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}
