//! Configuration for the now-playing poller.
//!
//! [`NowPlayingConfig`] is the loosely typed shape read from YAML (or built by
//! a host). [`NowPlayingConfig::validate`] turns it into the [`PollerSettings`]
//! the scheduler runs on, rejecting what cannot work and replacing unusable
//! timing values with defaults.

use crate::address::{ServerAddress, DEFAULT_PROTOCOL};
use crate::constants::{
    DEFAULT_ENDPOINT, DEFAULT_INITIAL_LOAD_DELAY_SECS, DEFAULT_PORT,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RETRY_DELAY_SECS, DEFAULT_UPDATE_INTERVAL_SECS,
    MAX_TIMER_DURATION, MIN_UPDATE_INTERVAL,
};
use crate::error::{Error, Result};
use crate::filter::FilterConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Top-level configuration block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NowPlayingConfig {
    /// Host name or URL of the Plex server (`plex.lan`, `https://10.0.0.5`)
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default = "NowPlayingConfig::default_port")]
    pub server_port: Option<u16>,
    /// Used when `server_url` carries no scheme
    #[serde(default = "NowPlayingConfig::default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub x_plex_token: Option<String>,
    #[serde(default = "NowPlayingConfig::default_endpoint")]
    pub endpoint: String,
    #[serde(default = "NowPlayingConfig::default_update_interval")]
    pub update_interval_secs: f64,
    #[serde(default = "NowPlayingConfig::default_retry_delay")]
    pub retry_delay_secs: f64,
    #[serde(default = "NowPlayingConfig::default_initial_load_delay")]
    pub initial_load_delay_secs: f64,
    #[serde(default = "NowPlayingConfig::default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub filter: FilterConfig,
}

impl NowPlayingConfig {
    fn default_port() -> Option<u16> {
        Some(DEFAULT_PORT)
    }

    fn default_protocol() -> String {
        DEFAULT_PROTOCOL.to_string()
    }

    fn default_endpoint() -> String {
        DEFAULT_ENDPOINT.to_string()
    }

    const fn default_update_interval() -> f64 {
        DEFAULT_UPDATE_INTERVAL_SECS
    }

    const fn default_retry_delay() -> f64 {
        DEFAULT_RETRY_DELAY_SECS
    }

    const fn default_initial_load_delay() -> f64 {
        DEFAULT_INITIAL_LOAD_DELAY_SECS
    }

    const fn default_request_timeout() -> u64 {
        DEFAULT_REQUEST_TIMEOUT_SECS
    }

    /// Configuration pointing at `server_url` with `token`, defaults elsewhere
    pub fn new(server_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            server_url: Some(server_url.into()),
            x_plex_token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Check the configuration and resolve it into scheduler settings.
    ///
    /// A missing server address or token is fatal. Timing values that are
    /// negative, not finite, or (for the interval) shorter than
    /// [`MIN_UPDATE_INTERVAL`] are replaced by their defaults. Timings longer
    /// than [`MAX_TIMER_DURATION`] are clamped to it.
    pub fn validate(&self) -> Result<PollerSettings> {
        let server_url = non_blank(self.server_url.as_deref())
            .ok_or_else(|| Error::config("Plex server URL is not configured"))?;
        let token = non_blank(self.x_plex_token.as_deref())
            .ok_or_else(|| Error::config("X-Plex-Token is not configured"))?;

        let interval = match seconds("update_interval_secs", self.update_interval_secs) {
            Some(interval)
                if self.update_interval_secs >= MIN_UPDATE_INTERVAL.as_secs_f64() =>
            {
                interval
            }
            Some(interval) => {
                warn!(
                    ?interval,
                    minimum = ?MIN_UPDATE_INTERVAL,
                    "Update interval too short, using default"
                );
                Duration::from_secs_f64(DEFAULT_UPDATE_INTERVAL_SECS)
            }
            None => Duration::from_secs_f64(DEFAULT_UPDATE_INTERVAL_SECS),
        };
        let retry_delay = seconds("retry_delay_secs", self.retry_delay_secs)
            .unwrap_or_else(|| Duration::from_secs_f64(DEFAULT_RETRY_DELAY_SECS));
        let initial_delay = seconds("initial_load_delay_secs", self.initial_load_delay_secs)
            .unwrap_or_else(|| Duration::from_secs_f64(DEFAULT_INITIAL_LOAD_DELAY_SECS));

        Ok(PollerSettings {
            address: ServerAddress::new(server_url, &self.protocol, self.server_port, token),
            endpoint: self.endpoint.clone(),
            initial_delay,
            interval,
            retry_delay,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            filter: self.filter.clone(),
        })
    }
}

impl Default for NowPlayingConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            server_port: Self::default_port(),
            protocol: Self::default_protocol(),
            x_plex_token: None,
            endpoint: Self::default_endpoint(),
            update_interval_secs: Self::default_update_interval(),
            retry_delay_secs: Self::default_retry_delay(),
            initial_load_delay_secs: Self::default_initial_load_delay(),
            request_timeout_secs: Self::default_request_timeout(),
            filter: FilterConfig::default(),
        }
    }
}

/// Validated settings the scheduler runs on.
#[derive(Debug, Clone, PartialEq)]
pub struct PollerSettings {
    pub address: ServerAddress,
    pub endpoint: String,
    pub initial_delay: Duration,
    pub interval: Duration,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
    pub filter: FilterConfig,
}

impl PollerSettings {
    /// Settings for `address` with default endpoint and timing
    pub fn new(address: ServerAddress) -> Self {
        Self {
            address,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            initial_delay: Duration::from_secs_f64(DEFAULT_INITIAL_LOAD_DELAY_SECS),
            interval: Duration::from_secs_f64(DEFAULT_UPDATE_INTERVAL_SECS),
            retry_delay: Duration::from_secs_f64(DEFAULT_RETRY_DELAY_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            filter: FilterConfig::default(),
        }
    }

    /// Full URL of the sessions endpoint, token included
    pub fn sessions_url(&self) -> String {
        self.address.url_for(&self.endpoint)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn seconds(field: &'static str, value: f64) -> Option<Duration> {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if duration > MAX_TIMER_DURATION => {
            warn!(field, value, "Duration too long, clamping");
            Some(MAX_TIMER_DURATION)
        }
        Ok(duration) => Some(duration),
        Err(_) => {
            warn!(field, value, "Invalid duration, using default");
            None
        }
    }
}
