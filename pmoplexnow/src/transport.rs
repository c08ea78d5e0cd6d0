//! Transport for the sessions endpoint
//!
//! One call to [`Transport::fetch`] is one poll attempt. Any HTTP answer is a
//! [`TransportResponse`]; only failures to get an answer at all are errors.

use crate::constants::{DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Raw answer of the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Only `200 OK` counts as a successful attempt
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Turn anything but `200 OK` into [`Error::UnexpectedStatus`]
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(Error::UnexpectedStatus(self.status))
        }
    }
}

/// Performs a single GET against a fully built URL
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<TransportResponse>;
}

/// [`Transport`] backed by `reqwest`
///
/// # Example
///
/// ```no_run
/// use pmoplexnow::{HttpTransport, Transport};
/// use std::time::Duration;
///
/// # async fn demo() -> pmoplexnow::Result<()> {
/// let transport = HttpTransport::builder()
///     .timeout(Duration::from_secs(10))
///     .build()?;
/// let response = transport
///     .fetch("http://plex.local:32400/status/sessions/?X-Plex-Token=abc")
///     .await?;
/// println!("{} bytes, status {}", response.body.len(), response.status);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Transport with default timeout and User-Agent
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::default()
    }

    /// Wrap an existing client, keeping the default request timeout
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn http_client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str) -> Result<TransportResponse> {
        let url = Url::parse(url)?;

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/xml")
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status, bytes = body.len(), "Sessions response received");

        Ok(TransportResponse { status, body })
    }
}

/// Builder for configuring an [`HttpTransport`]
#[derive(Debug)]
pub struct HttpTransportBuilder {
    client: Option<Client>,
    request_timeout: Duration,
    user_agent: String,
}

impl Default for HttpTransportBuilder {
    fn default() -> Self {
        Self {
            client: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpTransportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom HTTP client
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set a custom User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn build(self) -> Result<HttpTransport> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .user_agent(&self.user_agent)
                .timeout(self.request_timeout)
                .build()?,
        };

        Ok(HttpTransport {
            client,
            request_timeout: self.request_timeout,
        })
    }
}
