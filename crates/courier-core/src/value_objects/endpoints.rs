//! Endpoint value objects - egress proxy and webhook target

use serde::{Deserialize, Serialize};
use std::fmt;

/// Egress proxy configuration for a session's protocol connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    /// Proxy URL (`http://`, `https://` or `socks5://`)
    pub url: String,
    /// Skip TLS certificate verification for the proxy hop
    #[serde(default)]
    pub insecure: bool,
}

impl ProxyEndpoint {
    /// Supported proxy URL schemes
    pub const SCHEMES: [&'static str; 3] = ["http://", "https://", "socks5://"];

    /// Create a proxy endpoint, rejecting unsupported schemes
    pub fn new(url: impl Into<String>) -> Option<Self> {
        let url = url.into();
        Self::SCHEMES
            .iter()
            .any(|scheme| url.starts_with(scheme))
            .then_some(Self {
                url,
                insecure: false,
            })
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Outbound notification endpoint for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebhookTarget(String);

impl WebhookTarget {
    /// Create a webhook target; only http(s) URLs are accepted
    pub fn new(url: impl Into<String>) -> Option<Self> {
        let url = url.into();
        (url.starts_with("http://") || url.starts_with("https://")).then_some(Self(url))
    }

    /// Borrow the URL
    #[inline]
    pub fn url(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WebhookTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
