//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use rewrite_proxy::config::ProxyConfig;
use rewrite_proxy::http::HttpServer;
use rewrite_proxy::lifecycle::Shutdown;

/// A canned upstream response.
#[derive(Clone)]
pub struct MockResponse {
    pub status: &'static str,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl MockResponse {
    pub fn new(status: &'static str, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type", content_type.to_string())],
            body: body.into(),
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// Page with every kind of link the proxy rewrites, plus framing headers.
pub const PAGE_HTML: &str = concat!(
    "<html><head><link rel=\"stylesheet\" href=\"style.css\">",
    "<script src=\"//cdn.test/app.js\"></script></head><body>",
    "<a href=\"/about\">About</a>",
    "<img src=\"img/logo.png\">",
    "<form action=\"search?q=1\"></form>",
    "<a href=\"#top\">Top</a>",
    "<a href=\"http://[[[\">Broken</a>",
    "<div data-src=\"/untouched\">Div</div>",
    "</body></html>"
);

/// 1x1 PNG header bytes; not valid UTF-8.
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0xff, 0xfe];

/// Routes served by [`start_default_upstream`].
pub fn default_routes() -> HashMap<&'static str, MockResponse> {
    let mut routes = HashMap::new();
    routes.insert(
        "/page.html",
        MockResponse::new("200 OK", "text/html; charset=utf-8", PAGE_HTML)
            .header("Content-Security-Policy", "default-src 'self'")
            .header("X-Frame-Options", "DENY")
            .header("Access-Control-Allow-Origin", "https://upstream.test"),
    );
    routes.insert(
        "/logo.png",
        MockResponse::new("200 OK", "image/png", PNG_BYTES)
            .header("X-Frame-Options", "SAMEORIGIN")
            .header("Cache-Control", "max-age=60"),
    );
    routes.insert(
        "/data.json",
        MockResponse::new("200 OK", "application/json", r#"{"href":"/about"}"#),
    );
    routes.insert(
        "/missing",
        MockResponse::new("404 Not Found", "text/html", "<a href=\"/\">home</a>"),
    );
    routes.insert(
        "/redirect",
        MockResponse::new("302 Found", "text/plain", "").header("Location", "/page.html"),
    );
    routes
}

/// Start a mock upstream on an ephemeral port serving `routes` by path.
///
/// Unknown paths answer 404 with an empty body.
pub async fn start_mock_upstream(routes: HashMap<&'static str, MockResponse>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes = Arc::new(routes);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let routes = routes.clone();
                    tokio::spawn(async move {
                        let Some(path) = read_request_path(&mut socket).await else {
                            return;
                        };
                        let path = path.split('?').next().unwrap_or("/").to_string();
                        let response = routes
                            .get(path.as_str())
                            .cloned()
                            .unwrap_or_else(|| MockResponse::new("404 Not Found", "text/plain", ""));

                        let mut head = format!("HTTP/1.1 {}\r\n", response.status);
                        for (name, value) in &response.headers {
                            head.push_str(&format!("{}: {}\r\n", name, value));
                        }
                        head.push_str(&format!(
                            "Content-Length: {}\r\nConnection: close\r\n\r\n",
                            response.body.len()
                        ));

                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.write_all(&response.body).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start an upstream that sends the head and `first` body bytes, then holds
/// the connection open without finishing the body.
pub async fn start_stalling_upstream(content_type: &'static str, first: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if read_request_path(&mut socket).await.is_none() {
                    return;
                }
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: 1000000\r\n\r\n",
                    content_type
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(first).await;
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });

    addr
}

pub async fn start_default_upstream() -> SocketAddr {
    start_mock_upstream(default_routes()).await
}

/// Read the request head and return the request-target.
async fn read_request_path(socket: &mut tokio::net::TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let head = String::from_utf8_lossy(&buf);
    head.lines().next()?.split_whitespace().nth(1).map(str::to_string)
}

/// Start the proxy on an ephemeral port.
pub async fn start_proxy(config: ProxyConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (_, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(config).unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    // Wait for server to start
    tokio::time::sleep(Duration::from_millis(100)).await;
    (addr, shutdown)
}

/// Client that never goes through an environment proxy and never follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// `http://<proxy>/?url=<encoded target>`
pub fn proxied(proxy: SocketAddr, target: &str) -> String {
    format!("http://{}/?url={}", proxy, encode(target))
}

/// `encodeURIComponent`, as browsers would send it.
pub fn encode(value: &str) -> String {
    const KEEP: &[u8] = b"-_.!~*'()";
    let mut out = String::new();
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || KEEP.contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}
