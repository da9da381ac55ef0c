//! Link resolution and proxied-URL construction.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;
use url::Url;

use crate::http::request::ProxyOrigin;

/// Bytes left untouched by `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encode a full URL so it survives as a single query value.
pub fn encode_uri_component(input: &str) -> String {
    utf8_percent_encode(input, URI_COMPONENT).to_string()
}

/// An attribute value that cannot be resolved to an absolute URL.
#[derive(Debug, Error)]
#[error("cannot resolve {value:?} against {base}: {source}")]
pub struct AttributeResolutionError {
    pub value: String,
    pub base: String,
    #[source]
    pub source: url::ParseError,
}

/// Rewrites attribute values of one document.
#[derive(Debug, Clone)]
pub struct LinkRewriter {
    origin: ProxyOrigin,
    base: Url,
}

impl LinkRewriter {
    pub fn new(origin: ProxyOrigin, base: Url) -> Self {
        Self { origin, base }
    }

    /// Resolve a (possibly relative) reference against the document URL.
    pub fn resolve(&self, value: &str) -> Result<Url, AttributeResolutionError> {
        self.base
            .join(value)
            .map_err(|source| AttributeResolutionError {
                value: value.to_string(),
                base: self.base.to_string(),
                source,
            })
    }

    /// The value that replaces `value` in the rewritten document.
    pub fn rewrite(&self, value: &str) -> Result<String, AttributeResolutionError> {
        self.resolve(value).map(|absolute| self.origin.proxied(&absolute))
    }
}
