//! Request URL construction for the Plex server
//!
//! Every request carries the pre-shared `X-Plex-Token` as a query parameter.
//! Relative endpoints are normalised to exactly one leading and one trailing
//! slash; endpoints that are already absolute URLs are used as-is.

use serde::{Deserialize, Serialize};

/// Query parameter carrying the authentication token
pub const TOKEN_PARAM: &str = "X-Plex-Token";

/// Protocol used when the base address carries no scheme
pub const DEFAULT_PROTOCOL: &str = "http";

/// Where the Plex server lives and how to authenticate against it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAddress {
    pub base: String,
    pub protocol: String,
    pub port: Option<u16>,
    pub token: String,
}

impl ServerAddress {
    pub fn new(
        base: impl Into<String>,
        protocol: impl Into<String>,
        port: Option<u16>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            base: base.into(),
            protocol: protocol.into(),
            port,
            token: token.into(),
        }
    }

    /// Full request URL for `path` on this server
    pub fn url_for(&self, path: &str) -> String {
        build_url(&self.base, &self.protocol, self.port, path, &self.token)
    }

    /// Server root without token, suitable for log output
    pub fn display_root(&self) -> String {
        server_root(&self.base, &self.protocol, self.port)
    }
}

/// Compose base address, protocol, port, path and token into a request URL.
///
/// `base` may already carry a scheme (`https://plex.lan`), in which case
/// `protocol` is ignored. Trailing slashes on `base` are dropped.
pub fn build_url(base: &str, protocol: &str, port: Option<u16>, path: &str, token: &str) -> String {
    let target = if is_absolute_url(path) {
        path.to_string()
    } else {
        format!("{}{}", server_root(base, protocol, port), normalize_path(path))
    };

    append_token(&target, token)
}

/// Make sure `path` has exactly one leading and one trailing slash.
///
/// `normalize_path(normalize_path(x)) == normalize_path(x)` for every input.
pub fn normalize_path(path: &str) -> String {
    let inner = path.trim_matches('/');
    if inner.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", inner)
    }
}

/// Whether `value` starts with a URL scheme (`http://`, `https://`, ...)
pub fn is_absolute_url(value: &str) -> bool {
    let Some((scheme, _)) = value.split_once("://") else {
        return false;
    };

    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        _ => false,
    }
}

fn server_root(base: &str, protocol: &str, port: Option<u16>) -> String {
    let base = base.trim().trim_end_matches('/');

    let mut root = if is_absolute_url(base) {
        base.to_string()
    } else {
        let protocol = protocol.trim().trim_end_matches("://");
        let protocol = if protocol.is_empty() {
            DEFAULT_PROTOCOL
        } else {
            protocol
        };
        format!("{}://{}", protocol, base)
    };

    if let Some(port) = port {
        root.push(':');
        root.push_str(&port.to_string());
    }

    root
}

fn append_token(target: &str, token: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(token.as_bytes()).collect();
    let separator = if target.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", target, separator, TOKEN_PARAM, encoded)
}
