//! Constants for the now-playing poller.
//!
//! Timing defaults mirror what a Plex dashboard expects: a refresh every half
//! minute and a short back-off between failed attempts.

use std::time::Duration;

// ============================================================================
// Server
// ============================================================================

/// Default Plex Media Server port
pub const DEFAULT_PORT: u16 = 32400;

/// Endpoint listing the sessions currently playing
pub const DEFAULT_ENDPOINT: &str = "status/sessions/";

/// Default User-Agent
pub const DEFAULT_USER_AGENT: &str = "pmoplexnow/0.1.0";

/// Default timeout for one sessions request (seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Polling
// ============================================================================

/// Attempts per poll cycle before an empty list is published
pub const MAX_DATA_ATTEMPTS: u32 = 3;

/// Default period between two scheduled polls (seconds)
pub const DEFAULT_UPDATE_INTERVAL_SECS: f64 = 30.0;

/// Default delay before retrying a failed attempt (seconds)
pub const DEFAULT_RETRY_DELAY_SECS: f64 = 5.0;

/// Default delay before the very first poll (seconds)
pub const DEFAULT_INITIAL_LOAD_DELAY_SECS: f64 = 0.0;

/// Shortest accepted update interval
pub const MIN_UPDATE_INTERVAL: Duration = Duration::from_millis(30);

/// Longest delay the scheduler arms; longer timings are clamped to it
pub const MAX_TIMER_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);
