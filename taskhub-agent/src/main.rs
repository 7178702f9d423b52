//! `TaskHub` agent watcher -- tails a server's notification feed.
//!
//! Connects to a `TaskHub` server's WebSocket feed (global, or one
//! project's) and logs every notification envelope as it arrives. Useful
//! for driving automation and for watching a board change live.
//!
//! # Usage
//!
//! ```bash
//! # Watch the global feed
//! cargo run --bin taskhub-agent -- --server ws://127.0.0.1:8000
//!
//! # Watch one project
//! cargo run --bin taskhub-agent -- --server ws://127.0.0.1:8000 --project 3
//! ```

use std::time::Duration;

use clap::Parser;
use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use taskhub_proto::event;

/// Delay between reconnection attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// CLI arguments for the agent watcher.
#[derive(clap::Parser, Debug)]
#[command(version, about = "TaskHub event watcher")]
struct CliArgs {
    /// Server WebSocket base URL (e.g. ws://127.0.0.1:8000).
    #[arg(short, long, env = "TASKHUB_SERVER")]
    server: String,

    /// Watch a single project instead of the global feed.
    #[arg(short, long)]
    project: Option<u64>,

    /// Exit after the connection closes instead of reconnecting.
    #[arg(long)]
    once: bool,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKHUB_LOG")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let url = match feed_url(&cli.server, cli.project) {
        Ok(u) => u,
        Err(e) => {
            eprintln!("Invalid server URL: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(url = %url, "watching notification feed");

    loop {
        match watch(&url).await {
            Ok(()) => tracing::info!("connection closed"),
            Err(e) => tracing::warn!(error = %e, "connection failed"),
        }
        if cli.once {
            break;
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
        tracing::info!("reconnecting");
    }
}

/// Builds the feed URL for the global or a project-scoped subscription.
fn feed_url(server: &str, project: Option<u64>) -> Result<Url, url::ParseError> {
    let base = Url::parse(server)?;
    match project {
        Some(id) => base.join(&format!("/ws/projects/{id}")),
        None => base.join("/ws"),
    }
}

/// Reads envelopes off one connection until it closes.
async fn watch(url: &Url) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    let (_, mut read) = ws.split();

    while let Some(msg) = read.next().await {
        match msg? {
            Message::Text(text) => match event::decode(&text) {
                Ok(envelope) => {
                    tracing::info!(
                        event = %envelope.event_type(),
                        project = ?envelope.project_id(),
                        data = %envelope.data(),
                        "event"
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "undecodable frame");
                }
            },
            Message::Close(_) => break,
            _ => {
                // Ignore binary, ping, pong frames.
            }
        }
    }
    Ok(())
}
