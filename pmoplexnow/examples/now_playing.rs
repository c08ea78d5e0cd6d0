//! Example: print what a Plex server is playing
//!
//! Run with: cargo run -p pmoplexnow --example now_playing -- plexnow.yaml
//!
//! The YAML file needs at least `server_url` and `x_plex_token`. Each
//! publication is printed as one JSON line. Ctrl-C stops the poller.

use anyhow::Context;
use pmoplexnow::{NowPlayingConfig, NowPlayingPoller, PublishCallback, SessionUpdate};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let path = std::env::args()
        .nth(1)
        .context("usage: now_playing <config.yaml>")?;
    let config = NowPlayingConfig::load_from_path(&path)
        .with_context(|| format!("cannot load {}", path))?;

    let publish: PublishCallback = Arc::new(|update: SessionUpdate| {
        match serde_json::to_string(&update) {
            Ok(line) => println!("{}", line),
            Err(err) => eprintln!("cannot serialize update: {}", err),
        }
    });

    let poller = NowPlayingPoller::start(&config, publish)?;
    info!("Polling, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    poller.stop().await?;
    Ok(())
}
