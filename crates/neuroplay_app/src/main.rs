// SPDX-License-Identifier: MIT OR Apache-2.0
//! `NeuroPlay` session runner.
//!
//! Loads a session file, builds its graph from the built-in plugin registry
//! (optionally overlaid with a plugin manifest) and drives the graph clock
//! until Ctrl+C or the configured run length.
//!
//! ```text
//! neuroplay [session.ron]
//! ```

mod config;
mod error;
mod session;

use config::{SessionConfig, DEFAULT_LOG_FILTER};
use error::AppError;
use session::Session;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn init_tracing(fallback: &str) {
    // RUST_LOG wins over the session's filter
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn run(config: SessionConfig) -> Result<(), AppError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(AppError::Runtime)?;

    runtime.block_on(async {
        let mut session = Session::open(config).await?;
        let graph = session.graph();
        tracing::info!(graph = %graph.name, nodes = graph.node_count(), edges = graph.edge_count(), "Session ready");
        session.run().await
    })
}

fn main() {
    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let loaded = match &path {
        Some(path) => SessionConfig::load(path),
        None => Ok(SessionConfig::default()),
    };
    init_tracing(loaded.as_ref().map_or(DEFAULT_LOG_FILTER, |config| config.log_filter.as_str()));

    tracing::info!("Starting NeuroPlay v{}", env!("CARGO_PKG_VERSION"));
    let result = loaded.and_then(run);

    if let Err(e) = result {
        tracing::error!("Session failed: {e}");
        std::process::exit(1);
    }
}
