//! Client key derivation.

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};

/// Key shared by every client whose address cannot be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Header carrying the proxy chain's client addresses.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Identifies one rate-limited client.
///
/// The key is opaque to the limiter; it is derived here from connection
/// metadata, preferring the direct peer address over forwarded headers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    /// Derive a key from a peer address and an `X-Forwarded-For` value.
    pub fn derive(remote: Option<IpAddr>, forwarded_for: Option<&str>) -> Self {
        if let Some(ip) = remote {
            return Self(ip.to_string());
        }

        let forwarded = forwarded_for
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|first| !first.is_empty());

        match forwarded {
            Some(first) => Self(first.to_string()),
            None => Self(UNKNOWN_CLIENT.to_string()),
        }
    }

    /// Derive a key from an HTTP request.
    ///
    /// The peer address is only available when the server was started with
    /// connect info.
    pub fn from_request<B>(req: &Request<B>) -> Self {
        let remote = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        Self::derive(remote, forwarded_for(req.headers()))
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the shared fallback key.
    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_CLIENT
    }
}

/// Read `X-Forwarded-For`, ignoring values that are not valid UTF-8.
fn forwarded_for(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|value| value.to_str().ok())
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ClientKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
