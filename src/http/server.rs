//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, CORS boundary, timeout, panics, limits)
//! - Bind server to listener, plain or TLS
//! - Dispatch requests through the gate into the rewrite engine
//! - Apply configuration reloads to the live runtime snapshot

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{policy_warnings, ConfigError, ProxyConfig, ValidationError};
use crate::http::request::{self, GateDecision, OriginPolicy, UuidRequestId};
use crate::http::response::{cors_boundary, panic_response, preflight};
use crate::inference::{inference_handler, HttpInferenceBackend, InferenceBackend, InferenceService};
use crate::net::tls::load_tls_config;
use crate::observability::metrics;
use crate::rewrite::RewriteEngine;
use crate::security::headers::CorsPolicy;

/// Extra time the router allows beyond `timeouts.request_secs`, so an
/// unresponsive upstream is reported by the fetcher as a 500 first.
pub const ROUTER_TIMEOUT_GRACE_SECS: u64 = 5;

/// Per-configuration state every request reads from.
#[derive(Debug)]
pub struct Runtime {
    pub engine: RewriteEngine,
    pub cors: CorsPolicy,
    pub origin: OriginPolicy,
}

impl Runtime {
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            engine: RewriteEngine::from_config(config)?,
            cors: CorsPolicy::from_config(&config.cors)
                .map_err(|e| ConfigError::Validation(vec![e]))?,
            origin: OriginPolicy::from_config(&config.listener),
        })
    }
}

/// Live runtime, swapped atomically on reload.
pub type SharedRuntime = Arc<ArcSwap<Runtime>>;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub runtime: SharedRuntime,
    pub inference: Option<InferenceService>,
}

/// HTTP server for the rewriting proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    runtime: SharedRuntime,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ConfigError> {
        let backend: Option<Arc<dyn InferenceBackend>> = if config.inference.enabled {
            let backend = HttpInferenceBackend::from_config(&config.inference).map_err(|_| {
                ConfigError::Validation(vec![ValidationError::InvalidInferenceEndpoint(
                    config.inference.endpoint.clone(),
                )])
            })?;
            Some(Arc::new(backend))
        } else {
            None
        };
        Self::build(config, backend)
    }

    /// Like [`HttpServer::new`] but with a caller-supplied inference backend.
    pub fn with_inference_backend(
        config: ProxyConfig,
        backend: Arc<dyn InferenceBackend>,
    ) -> Result<Self, ConfigError> {
        Self::build(config, Some(backend))
    }

    fn build(config: ProxyConfig, backend: Option<Arc<dyn InferenceBackend>>) -> Result<Self, ConfigError> {
        let runtime: SharedRuntime = Arc::new(ArcSwap::from_pointee(Runtime::from_config(&config)?));
        let inference = backend.map(|backend| {
            InferenceService::new(backend, &config.inference, config.security.max_body_size)
        });

        let state = AppState {
            runtime: Arc::clone(&runtime),
            inference,
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            config,
            runtime,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler));

        if state.inference.is_some() {
            router = router.route(&config.inference.path, any(inference_handler));
        }

        // Last layer added runs first
        router
            .with_state(state.clone())
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs.saturating_add(ROUTER_TIMEOUT_GRACE_SECS),
            )))
            .layer(middleware::from_fn_with_state(state.runtime, cors_boundary))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// The fully layered router, for serving or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires, applying `config_updates` as they arrive.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tokio::spawn(apply_config_updates(Arc::clone(&self.runtime), config_updates));

        match self.config.listener.tls.clone() {
            None => {
                tracing::info!(address = %addr, "HTTP server starting");
                axum::serve(listener, self.router.into_make_service())
                    .with_graceful_shutdown(wait_for_shutdown(shutdown))
                    .await?;
            }
            Some(tls) => {
                tracing::info!(address = %addr, "HTTPS server starting");
                let rustls = load_tls_config(&tls).await?;
                let handle = axum_server::Handle::new();
                let shutdown_handle = handle.clone();
                tokio::spawn(async move {
                    wait_for_shutdown(shutdown).await;
                    shutdown_handle.graceful_shutdown(Some(Duration::from_secs(10)));
                });

                axum_server::from_tcp_rustls(listener.into_std()?, rustls)
                    .handle(handle)
                    .serve(self.router.into_make_service())
                    .await?;
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Swap in every valid configuration received on `updates`.
async fn apply_config_updates(runtime: SharedRuntime, mut updates: mpsc::UnboundedReceiver<ProxyConfig>) {
    while let Some(config) = updates.recv().await {
        match Runtime::from_config(&config) {
            Ok(next) => {
                for warning in policy_warnings(&config) {
                    tracing::warn!(%warning, "Configuration policy warning");
                }
                runtime.store(Arc::new(next));
                tracing::info!("New configuration applied");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to apply configuration, keeping current one");
            }
        }
    }
}

/// Main proxy handler: gate, then engine.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request::request_id(request.headers());
    let method = request.method().clone();
    let runtime = state.runtime.load_full();

    // 1. Validate
    let (target, origin) = match request::inspect(&request, &runtime.origin) {
        Ok(GateDecision::Preflight) => {
            metrics::record_request(method.as_str(), 200, "preflight", start_time);
            return preflight();
        }
        Ok(GateDecision::Forward { target, origin }) => (target, origin),
        Err(e) => {
            tracing::debug!(request_id = %request_id, reason = e.kind(), "Rejected request");
            let response = e.into_response();
            metrics::record_request(method.as_str(), response.status().as_u16(), "rejected", start_time);
            return response;
        }
    };

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        target = %target,
        origin = %origin,
        "Proxying request"
    );

    // 2. Fetch and relay
    match runtime.engine.relay(&target, origin, &request_id).await {
        Ok(relayed) => {
            metrics::record_request(
                method.as_str(),
                relayed.response.status().as_u16(),
                relayed.branch.as_str(),
                start_time,
            );
            relayed.response
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, target = %target, error = %e, "Upstream error");
            metrics::record_upstream_error();
            let response = e.into_response();
            metrics::record_request(method.as_str(), response.status().as_u16(), "failed", start_time);
            response
        }
    }
}

/// Resolve once the shutdown broadcast fires (or its sender is gone).
async fn wait_for_shutdown(mut shutdown: broadcast::Receiver<()>) {
    let _ = shutdown.recv().await;
    tracing::info!("Shutdown signal received");
}
