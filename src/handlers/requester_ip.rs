//! Extractor for the IP address recorded in the audit trail.

use crate::state::AppState;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use std::{
    convert::Infallible,
    net::{IpAddr, SocketAddr},
};

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const UNKNOWN_IP: &str = "unknown";

/// The requester's IP as text.
///
/// The TCP peer address, or with `trust_proxy` the right-most
/// `X-Forwarded-For` hop. Never rejects; falls back to `unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequesterIp(pub String);

impl FromRequestParts<AppState> for RequesterIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(Self(resolve_requester_ip(
            &parts.headers,
            peer,
            state.trust_proxy,
        )))
    }
}

pub fn resolve_requester_ip(headers: &HeaderMap, peer: Option<IpAddr>, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get_all(X_FORWARDED_FOR)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
            .last();
        if let Some(hop) = forwarded {
            return hop
                .parse::<IpAddr>()
                .map(|ip| ip.to_canonical().to_string())
                .unwrap_or_else(|_| hop.to_string());
        }
    }

    peer.map(|ip| ip.to_canonical().to_string())
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}
