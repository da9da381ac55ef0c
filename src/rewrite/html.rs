//! Streaming HTML attribute rewriting.
//!
//! # Responsibilities
//! - Scan an HTML byte stream for configured elements
//! - Rewrite link attributes in place as elements stream past
//! - Never hold the whole document in memory
//!
//! # Design Decisions
//! - `lol_html` rewriters are `!Send`, so each document gets its own
//!   blocking task that owns the rewriter for its whole life
//! - Chunks travel through two bounded channels (upstream → scanner →
//!   client); a slow client applies backpressure all the way upstream
//! - A bad attribute is logged and skipped, it never fails the document

use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt::Display;
use std::io;
use std::rc::Rc;
use std::sync::Arc;

use axum::body::Bytes;
use futures_util::{Stream, StreamExt};
use lol_html::errors::{RewritingError, SelectorError};
use lol_html::html_content::Element;
use lol_html::{ElementContentHandlers, HandlerResult, HtmlRewriter, Selector, Settings};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::RewriteConfig;
use crate::observability::metrics;
use crate::rewrite::link::LinkRewriter;

/// Which elements and attributes get rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRules {
    selector: String,
    attributes: Vec<String>,
}

impl RewriteRules {
    pub fn new<T: AsRef<str>, A: AsRef<str>>(tags: &[T], attributes: &[A]) -> Self {
        Self {
            selector: tags.iter().map(|t| t.as_ref()).collect::<Vec<&str>>().join(", "),
            attributes: attributes.iter().map(|a| a.as_ref().to_string()).collect(),
        }
    }

    pub fn from_config(config: &RewriteConfig) -> Self {
        Self::new(config.tags.as_slice(), config.attributes.as_slice())
    }

    /// Element selector, e.g. `a, link, img`.
    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }
}

/// Failures inside the rewriting task.
#[derive(Debug, Error)]
pub enum RewriteStreamError {
    #[error("upstream body error: {0}")]
    Upstream(String),

    #[error("invalid element selector: {0}")]
    Selector(#[from] SelectorError),

    #[error("html rewriting failed: {0}")]
    Rewriting(#[from] RewritingError),

    #[error("client disconnected")]
    ClientGone,
}

/// Rewrite an HTML body stream.
///
/// The returned stream yields rewritten chunks as soon as the scanner emits
/// them. Upstream or scanner failures end the stream with an `io::Error`.
pub fn rewrite_stream<S, E>(
    upstream: S,
    links: LinkRewriter,
    rules: Arc<RewriteRules>,
    capacity: usize,
    request_id: String,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let capacity = capacity.max(1);
    let (input_tx, input_rx) = mpsc::channel::<Result<Bytes, String>>(capacity);
    let (output_tx, output_rx) = mpsc::channel::<io::Result<Bytes>>(capacity);

    tokio::spawn(pump_upstream(upstream, input_tx));

    tokio::task::spawn_blocking(move || {
        match run_rewriter(input_rx, &output_tx, &links, &rules, &request_id) {
            Ok(()) => {}
            Err(RewriteStreamError::ClientGone) => {
                tracing::debug!(request_id = %request_id, "Client went away mid-document");
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Rewriting stream aborted");
                let _ = output_tx.blocking_send(Err(io::Error::other(e.to_string())));
            }
        }
    });

    futures_util::stream::unfold(output_rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
}

async fn pump_upstream<S, E>(upstream: S, input: mpsc::Sender<Result<Bytes, String>>)
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let mut upstream = Box::pin(upstream);
    while let Some(chunk) = upstream.next().await {
        let failed = chunk.is_err();
        if input.send(chunk.map_err(|e| e.to_string())).await.is_err() || failed {
            break;
        }
    }
}

fn run_rewriter(
    mut input: mpsc::Receiver<Result<Bytes, String>>,
    output: &mpsc::Sender<io::Result<Bytes>>,
    links: &LinkRewriter,
    rules: &RewriteRules,
    request_id: &str,
) -> Result<(), RewriteStreamError> {
    let selector: Selector = rules.selector().parse()?;
    let pending = Rc::new(RefCell::new(Vec::new()));

    let sink = {
        let pending = Rc::clone(&pending);
        move |chunk: &[u8]| pending.borrow_mut().extend_from_slice(chunk)
    };
    let handler = element_handler(|el| rewrite_element(el, links, rules.attributes(), request_id));

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![(
                Cow::Owned(selector),
                ElementContentHandlers::default().element(handler),
            )],
            ..Settings::new()
        },
        sink,
    );

    while let Some(chunk) = input.blocking_recv() {
        let chunk = chunk.map_err(RewriteStreamError::Upstream)?;
        rewriter.write(&chunk)?;
        flush(&pending, output)?;
    }

    rewriter.end()?;
    flush(&pending, output)
}

/// Pins the closure signature the same way `lol_html::element!` does.
fn element_handler<'h, F>(handler: F) -> F
where
    F: FnMut(&mut Element<'_, '_>) -> HandlerResult + 'h,
{
    handler
}

fn rewrite_element(
    el: &mut Element<'_, '_>,
    links: &LinkRewriter,
    attributes: &[String],
    request_id: &str,
) -> HandlerResult {
    for name in attributes {
        let Some(value) = el.get_attribute(name) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }

        match links.rewrite(&value) {
            Ok(proxied) => el.set_attribute(name, &proxied)?,
            Err(e) => {
                metrics::record_rewrite_failure();
                tracing::warn!(
                    request_id = %request_id,
                    tag = %el.tag_name(),
                    attribute = %name,
                    error = %e,
                    "Failed to rewrite URL, leaving attribute untouched"
                );
            }
        }
    }
    Ok(())
}

fn flush(
    pending: &RefCell<Vec<u8>>,
    output: &mpsc::Sender<io::Result<Bytes>>,
) -> Result<(), RewriteStreamError> {
    let chunk = std::mem::take(&mut *pending.borrow_mut());
    if chunk.is_empty() {
        return Ok(());
    }
    output
        .blocking_send(Ok(Bytes::from(chunk)))
        .map_err(|_| RewriteStreamError::ClientGone)
}
