//! Request rate limiting middleware

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use kiwi_core::services::{RateLimitDecision, RateLimitGroup};
use kiwi_core::Error;

use super::extract::bearer_token;
use crate::{error::ApiError, AppState};

pub const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Key the request was counted under, for handlers that apply further limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerKey(pub String);

/// Address of the client behind this request.
///
/// `x-forwarded-for` is only believed when the connecting peer is one of
/// `trusted_proxies`; otherwise the peer address itself is used.
pub fn client_address(trusted_proxies: &[IpAddr], headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let Some(peer) = peer else {
        return "unknown".to_string();
    };

    if trusted_proxies.contains(&peer.ip()) {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|hop| hop.trim().parse::<IpAddr>().ok());
        if let Some(client) = forwarded {
            return client.to_string();
        }
    }

    peer.ip().to_string()
}

/// Who the limiter counts this request against: the token subject when one
/// verifies, else the client address
pub fn caller_identity(state: &AppState, headers: &HeaderMap, client: &str) -> String {
    bearer_token(headers)
        .and_then(|token| state.keys.verify_token(token).ok())
        .map(|claims| format!("user:{}", claims.sub))
        .unwrap_or_else(|| client.to_string())
}

/// Count one request against `group`, failing with 429 when over budget
pub fn enforce(state: &AppState, group: RateLimitGroup, identity: &str) -> Result<RateLimitDecision, ApiError> {
    let decision = state.limiters.check(group, identity);
    if decision.success {
        Ok(decision)
    } else {
        log::warn!("[rate_limit] {} exceeded the {} budget", identity, group);
        Err(ApiError(Error::rate_limited(
            "Too many requests. Please try again in a minute.",
        )))
    }
}

fn with_remaining(mut response: Response, remaining: u32) -> Response {
    response
        .headers_mut()
        .insert(REMAINING_HEADER, HeaderValue::from(remaining));
    response
}

/// Global budget per client address, then the general budget per caller
pub async fn limit_requests(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_address(&state.config.trusted_proxies, req.headers(), peer);
    let identity = caller_identity(&state, req.headers(), &client);

    let decision = enforce(&state, RateLimitGroup::Global, &client)
        .and_then(|_| enforce(&state, RateLimitGroup::General, &identity));

    match decision {
        Ok(decision) => {
            req.extensions_mut().insert(CallerKey(identity));
            with_remaining(next.run(req).await, decision.remaining)
        }
        Err(err) => with_remaining(err.into_response(), 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(ip: &str) -> Option<SocketAddr> {
        Some(SocketAddr::new(ip.parse().unwrap(), 51234))
    }

    #[test]
    fn test_client_address_uses_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));

        assert_eq!(client_address(&[], &headers, peer("198.51.100.2")), "198.51.100.2");
        assert_eq!(client_address(&[], &headers, None), "unknown");
    }

    #[test]
    fn test_forwarded_for_only_from_trusted_proxy() {
        let proxy: IpAddr = "10.0.0.1".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));

        assert_eq!(client_address(&[proxy], &headers, peer("10.0.0.1")), "203.0.113.7");
        assert_eq!(client_address(&[proxy], &headers, peer("10.0.0.9")), "10.0.0.9");

        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));
        assert_eq!(client_address(&[proxy], &headers, peer("10.0.0.1")), "10.0.0.1");
    }

    #[test]
    fn test_port_is_not_part_of_the_key() {
        let a = Some(SocketAddr::new("198.51.100.2".parse().unwrap(), 1000));
        let b = Some(SocketAddr::new("198.51.100.2".parse().unwrap(), 2000));
        assert_eq!(client_address(&[], &HeaderMap::new(), a), client_address(&[], &HeaderMap::new(), b));
    }
}
