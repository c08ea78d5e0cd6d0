//! # pmoplexnow - Plex "Now Playing" poller
//!
//! `pmoplexnow` watches a Plex Media Server and reports what is being played
//! on it. It periodically queries the `/status/sessions` endpoint, turns the
//! XML answer into typed [`Session`] records, filters them, and hands the
//! result to a callback supplied by the host (a dashboard, a UPnP bridge, a
//! notifier...).
//!
//! ## Features
//!
//! - **Resilient polling**: periodic ticks, up to three attempts per cycle with
//!   a retry delay, suspend/resume with catch-up
//! - **Tolerant parsing**: movies, episodes, tracks, photos, trailers, live TV
//!   and other clips, with optional user, player and transcode sub-records
//! - **Declarative filtering**: allow/deny lists on users, kinds and libraries,
//!   plus locality and play-state criteria
//! - **YAML configuration** with sensible defaults
//!
//! ## Quick Start
//!
//! ```no_run
//! use pmoplexnow::{NowPlayingConfig, NowPlayingPoller, PublishCallback};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NowPlayingConfig::new("plex.lan", "my-token");
//!
//!     let publish: PublishCallback = Arc::new(|update| {
//!         for session in &update.sessions {
//!             println!("{} [{}] {:?}", session.title, session.kind(), session.user_title());
//!         }
//!     });
//!
//!     let poller = NowPlayingPoller::start(&config, publish)?;
//!     tokio::signal::ctrl_c().await?;
//!     poller.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```yaml
//! server_url: plex.lan
//! server_port: 32400
//! x_plex_token: my-token
//! update_interval_secs: 30
//! retry_delay_secs: 5
//! filter:
//!   users:
//!     deny: [guest]
//!   kinds:
//!     allow: [movie, episode, livetv]
//!   network: both
//!   play_state: playing
//!   user_aliases:
//!     jdoe: John
//! ```
//!
//! ## Architecture
//!
//! - [`address`]: request URL construction
//! - [`transport`]: the [`Transport`] seam and its reqwest implementation
//! - [`parser`]: XML payload → [`Session`] list
//! - [`filter`]: allow/deny filtering
//! - [`scheduler`]: the background poll worker and its handle
//! - [`config`]: YAML configuration and validation
//! - [`error`]: Error types and result aliases

pub mod address;
pub mod config;
pub mod constants;
pub mod error;
pub mod filter;
pub mod model;
pub mod parser;
pub mod scheduler;
pub mod transport;

// Re-exports for convenience
pub use address::{build_url, normalize_path, ServerAddress};
pub use config::{NowPlayingConfig, PollerSettings};
pub use error::{Error, Result};
pub use filter::{filter_sessions, AllowDeny, FilterConfig, NetworkFilter, PlayStateFilter};
pub use model::{
    MediaDetails, Player, PlayerState, PollOutcome, Session, SessionKind, SessionUpdate,
    TranscodeSession, User,
};
pub use parser::SessionParser;
pub use scheduler::{NowPlayingPoller, PollerStatus, PublishCallback, SchedulerState};
pub use transport::{HttpTransport, HttpTransportBuilder, Transport, TransportResponse};
