//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, capacities > 0)
//! - Check that tags form a valid selector and header names/values are legal
//! - Surface policy warnings that are legal but probably unintended
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};
use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid {field} address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("invalid public origin {0:?}: expected scheme://host[:port]")]
    InvalidPublicOrigin(String),

    #[error("rewrite.tags must not be empty")]
    NoTags,

    #[error("rewrite.tags entry {0:?} is not a valid element selector")]
    InvalidTag(String),

    #[error("rewrite.attributes must not be empty")]
    NoAttributes,

    #[error("rewrite.attributes entry {0:?} is not a valid attribute name")]
    InvalidAttribute(String),

    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),

    #[error("cors.{field} is not a valid header value")]
    InvalidHeaderValue { field: &'static str },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("inference.path {0:?} must start with '/' and must not be '/'")]
    InvalidInferencePath(String),

    #[error("inference.api_token must not be empty when inference is enabled")]
    MissingInferenceToken,

    #[error("inference.endpoint {0:?} is not an absolute URL")]
    InvalidInferenceEndpoint(String),
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if let Some(origin) = &config.listener.public_origin {
        if !is_bare_origin(origin) {
            errors.push(ValidationError::InvalidPublicOrigin(origin.clone()));
        }
    }

    validate_rewrite(config, &mut errors);
    validate_cors(config, &mut errors);

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::Zero("security.max_body_size"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if config.inference.enabled {
        let path = &config.inference.path;
        if !path.starts_with('/') || path == "/" || path.contains(['{', '}', '*']) {
            errors.push(ValidationError::InvalidInferencePath(path.clone()));
        }
        if config.inference.api_token.is_empty() {
            errors.push(ValidationError::MissingInferenceToken);
        }
        if Url::parse(&config.inference.endpoint).is_err() {
            errors.push(ValidationError::InvalidInferenceEndpoint(
                config.inference.endpoint.clone(),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_rewrite(config: &ProxyConfig, errors: &mut Vec<ValidationError>) {
    let rewrite = &config.rewrite;

    if rewrite.tags.is_empty() {
        errors.push(ValidationError::NoTags);
    }
    for tag in &rewrite.tags {
        let plain = !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !plain || tag.parse::<lol_html::Selector>().is_err() {
            errors.push(ValidationError::InvalidTag(tag.clone()));
        }
    }

    if rewrite.attributes.is_empty() {
        errors.push(ValidationError::NoAttributes);
    }
    for attribute in &rewrite.attributes {
        let valid = !attribute.is_empty()
            && attribute
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':'));
        if !valid {
            errors.push(ValidationError::InvalidAttribute(attribute.clone()));
        }
    }

    for name in &rewrite.strip_headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidHeaderName(name.clone()));
        }
    }

    if rewrite.channel_capacity == 0 {
        errors.push(ValidationError::Zero("rewrite.channel_capacity"));
    }
}

fn validate_cors(config: &ProxyConfig, errors: &mut Vec<ValidationError>) {
    let fields = [
        ("allow_origin", &config.cors.allow_origin),
        ("allow_methods", &config.cors.allow_methods),
        ("allow_headers", &config.cors.allow_headers),
    ];
    for (field, value) in fields {
        if HeaderValue::from_str(value).is_err() {
            errors.push(ValidationError::InvalidHeaderValue { field });
        }
    }
}

/// Scheme and host only: no path beyond "/", no query, no fragment.
fn is_bare_origin(value: &str) -> bool {
    match Url::parse(value) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host().is_some()
                && url.path() == "/"
                && url.query().is_none()
                && url.fragment().is_none()
                && !value.ends_with('/')
        }
        Err(_) => false,
    }
}

/// Settings that are accepted but likely not what the operator wants.
pub fn policy_warnings(config: &ProxyConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.cors.allow_origin.trim() == "*" && config.cors.allow_credentials {
        warnings.push(
            "cors.allow_origin is \"*\" while cors.allow_credentials is true; \
             browsers reject credentialed requests against a wildcard origin"
                .to_string(),
        );
    }
    if config.inference.enabled {
        if config.inference.api_token == "CHANGE_ME_IN_PRODUCTION" {
            warnings.push("inference.api_token is still the placeholder value".to_string());
        }
        warnings.push(format!(
            "inference.path {:?} is served by the inference route; \
             requests to exactly that path are never proxied, even with a url parameter",
            config.inference.path
        ));
    }

    warnings
}
