//! `TaskHub` server -- project management backend for humans and AI agents.
//!
//! An axum HTTP/WebSocket server exposing entities, projects, kanban
//! stages, tasks, and comments over REST, with live change notifications
//! pushed to WebSocket subscribers.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:8000
//! cargo run --bin taskhub-server
//!
//! # Run on custom address
//! cargo run --bin taskhub-server -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! TASKHUB_ADDR=127.0.0.1:8080 cargo run --bin taskhub-server
//! ```

use std::sync::Arc;

use clap::Parser;
use taskhub_server::config::{ServerCliArgs, ServerConfig};
use taskhub_server::server::{self, AppState};

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting taskhub server");

    let state = Arc::new(AppState::new());

    match server::start_server_with_state(&config.bind_addr, Arc::clone(&state)).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "taskhub server listening");
            tokio::select! {
                result = handle => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "server task failed");
                    }
                }
                _ = shutdown_signal() => {
                    tracing::info!("shutting down, closing websocket connections");
                    state.registry.shutdown().await;
                }
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("failed to listen for shutdown signal");
    }
}
