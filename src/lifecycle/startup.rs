//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging and metrics
//! - Build the server, bind the listener, start the config watcher
//! - Run until a termination signal arrives
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener binds last (traffic only when ready)

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::{
    load_config, policy_warnings, validate_config, watcher::ConfigWatcher, ConfigError, ProxyConfig,
};
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::{logging, metrics};

/// Command-line overrides.
#[derive(Debug, Clone, Default)]
pub struct StartupOptions {
    /// TOML config file; defaults apply when absent.
    pub config_path: Option<PathBuf>,
    /// Overrides `listener.bind_address`.
    pub bind: Option<String>,
    /// Reload the config file when it changes.
    pub watch: bool,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid metrics address: {0}")]
    MetricsAddress(String),

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to watch config file: {0}")]
    Watch(#[from] notify::Error),

    #[error("server error: {0}")]
    Server(#[source] std::io::Error),
}

/// Resolve the effective configuration from file and overrides.
pub fn resolve_config(options: &StartupOptions) -> Result<ProxyConfig, ConfigError> {
    let mut config = match &options.config_path {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    if let Some(bind) = &options.bind {
        config.listener.bind_address = bind.clone();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Start the proxy and block until shutdown completes.
pub async fn run(options: StartupOptions) -> Result<(), StartupError> {
    // 1. Configuration
    let config = resolve_config(&options)?;

    // 2. Logging
    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rewrite-proxy starting");
    for warning in policy_warnings(&config) {
        tracing::warn!(%warning, "Configuration policy warning");
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        request_timeout_secs = config.timeouts.request_secs,
        inference = config.inference.enabled,
        "Configuration loaded"
    );

    // 3. Metrics
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    // 4. Server
    let bind_address = config.listener.bind_address.clone();
    let server = HttpServer::new(config)?;

    // 5. Listener
    let listener = TcpListener::bind(&bind_address)
        .await
        .map_err(|source| StartupError::Bind {
            address: bind_address.clone(),
            source,
        })?;
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "Listening for connections");
    }

    // 6. Hot reload
    let (_watcher, config_updates) = match (&options.config_path, options.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        (None, true) => {
            tracing::warn!("--watch ignored: no config file given");
            (None, mpsc::unbounded_channel().1)
        }
        _ => (None, mpsc::unbounded_channel().1),
    };

    // 7. Signals
    let shutdown = Shutdown::new();
    signals::install(shutdown.clone());

    server
        .run(listener, config_updates, shutdown.subscribe())
        .await
        .map_err(StartupError::Server)?;

    tracing::info!("Shutdown complete");
    Ok(())
}
