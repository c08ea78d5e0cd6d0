//! Error types for the Plex now-playing poller

/// Result type alias for poller operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or running the poller
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Required configuration is missing or unusable (fatal at start)
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Transport failure reported by a non-HTTP transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// Server answered with something other than 200 OK
    #[error("Unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Session payload could not be parsed
    #[error("Malformed sessions payload: {0}")]
    Parse(String),

    /// YAML configuration could not be read
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The background worker is gone
    #[error("Poller is no longer running")]
    PollerStopped,

    /// The background worker panicked
    #[error("Poller worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
