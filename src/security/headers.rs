//! Header manipulation and CORS policy.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers from relayed responses
//! - Strip headers that block framing or cross-origin use
//! - Overlay the configured CORS header set on every response
//!
//! # Design Decisions
//! - Overlay replaces any CORS header the upstream already sent
//! - `allow_credentials = false` removes the header instead of sending "false"

use axum::http::header::{
    self, HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::HeaderMap;

use crate::config::{CorsConfig, RewriteConfig, ValidationError};

/// Connection-scoped headers that must not be forwarded (RFC 9110 §7.6.1).
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Response headers dropped before relaying (CSP, X-Frame-Options, ...).
#[derive(Debug, Clone)]
pub struct StripPolicy {
    names: Vec<HeaderName>,
}

impl StripPolicy {
    pub fn from_config(config: &RewriteConfig) -> Result<Self, ValidationError> {
        let names = config
            .strip_headers
            .iter()
            .map(|name| {
                HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| ValidationError::InvalidHeaderName(name.clone()))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { names })
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        for name in &self.names {
            headers.remove(name);
        }
    }
}

/// The CORS header set attached to every response.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    headers: Vec<(HeaderName, HeaderValue)>,
    allow_credentials: bool,
}

impl CorsPolicy {
    pub fn from_config(config: &CorsConfig) -> Result<Self, ValidationError> {
        let value = |field: &'static str, raw: &str| {
            HeaderValue::from_str(raw).map_err(|_| ValidationError::InvalidHeaderValue { field })
        };

        Ok(Self {
            headers: vec![
                (ACCESS_CONTROL_ALLOW_ORIGIN, value("allow_origin", &config.allow_origin)?),
                (ACCESS_CONTROL_ALLOW_METHODS, value("allow_methods", &config.allow_methods)?),
                (ACCESS_CONTROL_ALLOW_HEADERS, value("allow_headers", &config.allow_headers)?),
            ],
            allow_credentials: config.allow_credentials,
        })
    }

    /// Set every CORS header, replacing upstream values.
    pub fn overlay(&self, headers: &mut HeaderMap) {
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }
        if self.allow_credentials {
            headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        } else {
            headers.remove(ACCESS_CONTROL_ALLOW_CREDENTIALS);
        }
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            headers: vec![
                (ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
                (
                    ACCESS_CONTROL_ALLOW_METHODS,
                    HeaderValue::from_static("GET, HEAD, POST, OPTIONS"),
                ),
                (
                    ACCESS_CONTROL_ALLOW_HEADERS,
                    HeaderValue::from_static("Content-Type, Authorization"),
                ),
            ],
            allow_credentials: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_overlay_sets_four_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("https://upstream.test"));
        CorsPolicy::default().overlay(&mut headers);

        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_METHODS], "GET, HEAD, POST, OPTIONS");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type, Authorization");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers.len(), 4);
    }

    #[test]
    fn test_config_matches_default_policy() {
        let mut from_config = HeaderMap::new();
        CorsPolicy::from_config(&CorsConfig::default())
            .unwrap()
            .overlay(&mut from_config);
        let mut built_in = HeaderMap::new();
        CorsPolicy::default().overlay(&mut built_in);
        assert_eq!(from_config, built_in);
    }

    #[test]
    fn test_credentials_disabled_removes_header() {
        let config = CorsConfig {
            allow_origin: "https://app.test".into(),
            allow_credentials: false,
            ..CorsConfig::default()
        };
        let mut headers = HeaderMap::new();
        headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        CorsPolicy::from_config(&config).unwrap().overlay(&mut headers);

        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "https://app.test");
        assert!(headers.get(ACCESS_CONTROL_ALLOW_CREDENTIALS).is_none());
    }

    #[test]
    fn test_strip_policy_is_case_insensitive() {
        let policy = StripPolicy::from_config(&RewriteConfig::default()).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("content-security-policy", HeaderValue::from_static("default-src 'self'"));
        headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
        headers.insert("cache-control", HeaderValue::from_static("no-cache"));
        policy.apply(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("cache-control"));
    }

    #[test]
    fn test_hop_by_hop_and_connection_listed() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive, x-internal"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("x-internal", HeaderValue::from_static("1"));
        headers.insert("content-type", HeaderValue::from_static("image/png"));
        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers["content-type"], "image/png");
    }
}
