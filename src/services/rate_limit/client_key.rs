//! Client key derivation for rate limiting.
//!
//! Trust boundary: `X-Forwarded-For` is written by the client unless a reverse
//! proxy overwrites it. `ForwardedFor` must only be enabled behind such a proxy
//! (`TRUST_FORWARDED_FOR=true`); otherwise every spoofed address gets a fresh bucket.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName};

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

// Requests with no usable address share one bucket.
const UNKNOWN_CLIENT: &str = "unknown";

pub trait ClientKeyExtractor: Send + Sync + 'static {
    fn client_key(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String;
}

/// Transport-level peer address only.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerAddr;

impl ClientKeyExtractor for PeerAddr {
    fn client_key(&self, _headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        peer_key(peer)
    }
}

/// Left-most `X-Forwarded-For` address when it parses as an IP, else the peer address.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardedFor;

impl ClientKeyExtractor for ForwardedFor {
    fn client_key(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        leftmost_forwarded(headers)
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| peer_key(peer))
    }
}

pub fn from_config(trust_forwarded_for: bool) -> Arc<dyn ClientKeyExtractor> {
    if trust_forwarded_for {
        Arc::new(ForwardedFor)
    } else {
        Arc::new(PeerAddr)
    }
}

fn peer_key(peer: Option<SocketAddr>) -> String {
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn leftmost_forwarded(headers: &HeaderMap) -> Option<IpAddr> {
    let raw = headers.get(X_FORWARDED_FOR)?.to_str().ok()?;
    let first = raw.split(',').next()?.trim();
    first.parse::<IpAddr>().ok()
}
