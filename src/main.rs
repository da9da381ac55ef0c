//! Edge rewriting CORS proxy
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request           ┌───────────────────────────────────────────────────┐
//!     ─────────────────────────┼─▶ http::server ─▶ http::request (gate)            │
//!                              │                         │                         │
//!                              │              OPTIONS ◀──┤──▶ ?url=<target>        │
//!                              │                                 │                 │
//!                              │                                 ▼                 │
//!                              │                          rewrite::fetch ──────────┼──▶ Upstream
//!                              │                                 │                 │
//!                              │                  not HTML ◀─────┴────▶ HTML       │
//!                              │                   relay          rewrite::html    │
//!     Client Response          │                     │                   │         │
//!     ◀────────────────────────┼── http::response (CORS) ◀───────────────┘         │
//!                              └───────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use rewrite_proxy::lifecycle::{self, StartupOptions};

#[derive(Parser)]
#[command(name = "rewrite-proxy")]
#[command(version, about = "Rewriting CORS proxy", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding `listener.bind_address`
    #[arg(short, long)]
    bind: Option<String>,

    /// Reload the configuration file when it changes
    #[arg(short, long)]
    watch: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let options = StartupOptions {
        config_path: cli.config,
        bind: cli.bind,
        watch: cli.watch,
    };

    if let Err(e) = lifecycle::run(options).await {
        eprintln!("rewrite-proxy: {e}");
        std::process::exit(1);
    }
}
