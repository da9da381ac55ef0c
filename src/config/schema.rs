//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the rewriting proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, public origin, TLS).
    pub listener: ListenerConfig,

    /// Outbound fetch settings.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Which elements and attributes get rewritten, and which headers are dropped.
    pub rewrite: RewriteConfig,

    /// CORS header set overlaid on every response.
    pub cors: CorsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    /// Inference passthrough boundary.
    #[serde(default)]
    pub inference: InferenceConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Externally visible origin used as the prefix of rewritten links
    /// (e.g., "https://proxy.example.com"). Derived per request when unset.
    pub public_origin: Option<String>,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            public_origin: None,
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Outbound request settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// `User-Agent` sent with every upstream request.
    pub user_agent: String,

    /// Redirect hops followed before giving up.
    pub max_redirects: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("rewrite-proxy/", env!("CARGO_PKG_VERSION")).to_string(),
            max_redirects: 10,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for the upstream response head, in seconds. Expiry is an
    /// upstream fetch failure (500). The router's own deadline sits
    /// `ROUTER_TIMEOUT_GRACE_SECS` beyond this.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            request_secs: 30,
        }
    }
}

/// Attribute rewriting rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Element names whose link attributes are rewritten.
    pub tags: Vec<String>,

    /// Attributes attempted on every matching element, in order.
    pub attributes: Vec<String>,

    /// Response headers removed before relaying.
    pub strip_headers: Vec<String>,

    /// Chunks buffered between the upstream body, the scanner and the client.
    pub channel_capacity: usize,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            tags: ["a", "link", "img", "script", "iframe", "form"]
                .into_iter()
                .map(String::from)
                .collect(),
            attributes: ["href", "src", "action"]
                .into_iter()
                .map(String::from)
                .collect(),
            strip_headers: vec![
                "Content-Security-Policy".to_string(),
                "X-Frame-Options".to_string(),
            ],
            channel_capacity: 16,
        }
    }
}

/// CORS headers attached to every response.
///
/// The defaults pair a wildcard origin with `allow_credentials = true`.
/// Browsers refuse credentialed requests against a wildcard, so deployments
/// that need cookies must set a concrete `allow_origin`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allow_origin: String,
    pub allow_methods: String,
    pub allow_headers: String,
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: "GET, HEAD, POST, OPTIONS".to_string(),
            allow_headers: "Content-Type, Authorization".to_string(),
            allow_credentials: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Inference passthrough configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Mount the inference route.
    pub enabled: bool,

    /// Route path (must not be "/").
    ///
    /// Requests to exactly this path never reach the proxy, even with a
    /// `url` parameter, so it must not be a path proxied pages rely on.
    pub path: String,

    /// Bearer token callers must present.
    pub api_token: String,

    /// Hosted model endpoint receiving `{ model, messages }`.
    pub endpoint: String,

    /// Credential sent to the hosted model endpoint.
    pub api_key: Option<String>,

    /// Model used when the caller does not name one.
    pub default_model: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: "/ai".to_string(),
            // WARNING: This is a placeholder! Change this in production.
            api_token: "CHANGE_ME_IN_PRODUCTION".to_string(),
            endpoint: "http://127.0.0.1:11434/v1/chat".to_string(),
            api_key: None,
            default_model: "llama-3-8b-instruct".to_string(),
        }
    }
}
