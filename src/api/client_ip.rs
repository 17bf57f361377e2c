use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use super::AppState;

/// Address recorded as `created_by_ip` / `revoked_by_ip`.
///
/// The socket peer, unless the peer is a configured trusted proxy, in which
/// case the first `X-Forwarded-For` entry is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl FromRequestParts<Arc<AppState>> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        Ok(Self(resolve(
            peer,
            &parts.headers,
            &state.shared.config.server.trusted_proxy_ips,
        )))
    }
}

fn resolve(peer: Option<IpAddr>, headers: &HeaderMap, trusted_proxies: &[String]) -> String {
    let Some(peer) = peer else {
        return "unknown".to_string();
    };

    let peer_is_trusted = trusted_proxies
        .iter()
        .filter_map(|p| p.parse::<IpAddr>().ok())
        .any(|p| p == peer);

    if peer_is_trusted
        && let Some(forwarded) = headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .and_then(|v| v.parse::<IpAddr>().ok())
    {
        return forwarded.to_string();
    }

    peer.to_string()
}
