//! Upstream fetch.

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, StatusCode};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::redirect::Policy;
use url::Url;

use crate::config::{TimeoutConfig, UpstreamConfig};
use crate::error::{ProxyError, ProxyResult};
use crate::http::request::TargetUrl;

/// Media type that switches the engine to the rewriting branch.
pub const HTML_MEDIA_TYPE: &str = "text/html";

/// Case-insensitive substring match against `text/html`.
pub fn is_html_content_type(value: &str) -> bool {
    value.to_ascii_lowercase().contains(HTML_MEDIA_TYPE)
}

/// The final upstream response after redirects. The body is never buffered.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub final_url: Url,
    pub body: BoxStream<'static, Result<Bytes, reqwest::Error>>,
}

impl UpstreamResponse {
    pub fn content_type(&self) -> &str {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    pub fn is_html(&self) -> bool {
        is_html_content_type(self.content_type())
    }
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("final_url", &self.final_url.as_str())
            .field("content_type", &self.content_type())
            .finish_non_exhaustive()
    }
}

/// Issues exactly one upstream request per proxied request; no retries.
///
/// `head_timeout` bounds the wait for the response head only; a slow body is
/// streamed for as long as the upstream keeps it open.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    head_timeout: Duration,
}

impl Fetcher {
    pub fn new(upstream: &UpstreamConfig, timeouts: &TimeoutConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(upstream.user_agent.as_str())
            .redirect(Policy::limited(upstream.max_redirects))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()?;
        Ok(Self {
            client,
            head_timeout: Duration::from_secs(timeouts.request_secs),
        })
    }

    /// `GET` the target, following redirects.
    ///
    /// gzip, brotli and deflate bodies are decoded before they reach the
    /// engine, and their `Content-Encoding` is dropped.
    pub async fn fetch(&self, target: &TargetUrl) -> ProxyResult<UpstreamResponse> {
        let send = self.client.get(target.as_url().clone()).send();
        let response = tokio::time::timeout(self.head_timeout, send)
            .await
            .map_err(|_| {
                ProxyError::UpstreamFetch(format!(
                    "upstream did not respond within {}s",
                    self.head_timeout.as_secs()
                ))
            })??;

        Ok(UpstreamResponse {
            status: response.status(),
            headers: response.headers().clone(),
            final_url: response.url().clone(),
            body: response.bytes_stream().boxed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_detection() {
        assert!(is_html_content_type("text/html"));
        assert!(is_html_content_type("text/html; charset=utf-8"));
        assert!(is_html_content_type("TEXT/HTML"));
        assert!(!is_html_content_type("image/png"));
        assert!(!is_html_content_type("application/xhtml+xml"));
        assert!(!is_html_content_type(""));
    }

    #[tokio::test]
    async fn test_unsupported_scheme_is_fetch_error() {
        let fetcher = Fetcher::new(&UpstreamConfig::default(), &TimeoutConfig::default()).unwrap();
        let target = TargetUrl::parse("ftp://example.com/file").unwrap();
        let err = fetcher.fetch(&target).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_connection_refused_is_fetch_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = Fetcher::new(&UpstreamConfig::default(), &TimeoutConfig::default()).unwrap();
        let target = TargetUrl::parse(&format!("http://{}/", addr)).unwrap();
        let err = fetcher.fetch(&target).await.unwrap_err();
        assert!(err.to_string().starts_with("Error fetching or rewriting the target URL: "));
    }

    /// Serve one canned response per connection, after `head_delay`.
    async fn serve_raw(head: Vec<u8>, body: Vec<u8>, head_delay: Duration, body_delay: Duration) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let (head, body) = (head.clone(), body.clone());
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    tokio::time::sleep(head_delay).await;
                    let _ = socket.write_all(&head).await;
                    tokio::time::sleep(body_delay).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{}/", addr)
    }

    fn one_second() -> TimeoutConfig {
        TimeoutConfig {
            request_secs: 1,
            ..TimeoutConfig::default()
        }
    }

    #[tokio::test]
    async fn test_silent_upstream_is_fetch_error() {
        let url = serve_raw(Vec::new(), Vec::new(), Duration::from_secs(30), Duration::ZERO).await;
        let fetcher = Fetcher::new(&UpstreamConfig::default(), &one_second()).unwrap();

        let started = std::time::Instant::now();
        let err = fetcher.fetch(&TargetUrl::parse(&url).unwrap()).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_string(),
            "Error fetching or rewriting the target URL: upstream did not respond within 1s"
        );
    }

    #[tokio::test]
    async fn test_slow_body_is_not_cut_off() {
        let head = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 4\r\nConnection: close\r\n\r\n".to_vec();
        let url = serve_raw(head, b"late".to_vec(), Duration::ZERO, Duration::from_millis(1500)).await;
        let fetcher = Fetcher::new(&UpstreamConfig::default(), &one_second()).unwrap();

        let response = fetcher.fetch(&TargetUrl::parse(&url).unwrap()).await.unwrap();
        let mut body = Vec::new();
        let mut stream = response.body;
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(body, b"late");
    }

    #[tokio::test]
    async fn test_gzip_body_is_decoded() {
        use flate2::{write::GzEncoder, Compression};
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"<a href=\"/x\">x</a>").unwrap();
        let body = encoder.finish().unwrap();
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Encoding: gzip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let url = serve_raw(head.into_bytes(), body, Duration::ZERO, Duration::ZERO).await;
        let fetcher = Fetcher::new(&UpstreamConfig::default(), &TimeoutConfig::default()).unwrap();

        let response = fetcher.fetch(&TargetUrl::parse(&url).unwrap()).await.unwrap();
        assert!(response.is_html());
        assert!(response.headers.get(header::CONTENT_ENCODING).is_none());
        assert!(response.headers.get(header::CONTENT_LENGTH).is_none());

        let mut decoded = Vec::new();
        let mut stream = response.body;
        while let Some(chunk) = stream.next().await {
            decoded.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(decoded, b"<a href=\"/x\">x</a>");
    }
}
