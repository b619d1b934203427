//! Client identification utilities
//!
//! Header parsing shared by HTTP adapters.

use http::{HeaderMap, header};
use std::net::IpAddr;

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The scheme is matched case-insensitively. Anything else (missing header,
/// other scheme, empty token) yields `None`.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_bearer)
}

/// Parse a raw `Authorization` header value.
pub fn parse_bearer(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Resolve the client IP for a request.
///
/// `X-Forwarded-For` is only read when the socket peer is one of
/// `trusted_proxies`. The list is walked from the right, skipping trusted
/// hops, so a client cannot pick its own address by prepending entries.
/// Otherwise the socket peer is the answer.
pub fn extract_client_ip(
    headers: &HeaderMap,
    direct_ip: Option<IpAddr>,
    trusted_proxies: &[IpAddr],
) -> Option<IpAddr> {
    let peer = direct_ip?;
    if !trusted_proxies.contains(&peer) {
        return Some(peer);
    }

    let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) else {
        return Some(peer);
    };
    for hop in xff.rsplit(',') {
        let Ok(ip) = hop.trim().parse::<IpAddr>() else {
            break;
        };
        if !trusted_proxies.contains(&ip) {
            return Some(ip);
        }
    }
    Some(peer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(extract_bearer_token(&headers), Some("abc.def.ghi"));
    }

    #[test]
    fn test_extract_bearer_token_missing_or_wrong_scheme() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        assert_eq!(parse_bearer("Basic dXNlcjpwYXNz"), None);
        assert_eq!(parse_bearer("Bearer"), None);
        assert_eq!(parse_bearer("Bearer    "), None);
        assert_eq!(parse_bearer("bearer token"), Some("token"));
    }

    fn xff(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_extract_client_ip_ignores_xff_from_untrusted_peer() {
        let peer: IpAddr = "203.0.113.7".parse().unwrap();
        let headers = xff("192.168.1.1, 10.0.0.1");

        assert_eq!(extract_client_ip(&headers, Some(peer), &[]), Some(peer));
        // No peer address at all: the header alone is never trusted.
        assert_eq!(extract_client_ip(&headers, None, &[]), None);
    }

    #[test]
    fn test_extract_client_ip_behind_trusted_proxy() {
        let proxy: IpAddr = "10.0.0.1".parse().unwrap();
        let trusted = [proxy];

        let ip = extract_client_ip(&xff("198.51.100.4"), Some(proxy), &trusted);
        assert_eq!(ip, Some("198.51.100.4".parse().unwrap()));

        // Spoofed leftmost entry is skipped; the hop the proxy appended wins.
        let ip = extract_client_ip(&xff("1.2.3.4, 198.51.100.4"), Some(proxy), &trusted);
        assert_eq!(ip, Some("198.51.100.4".parse().unwrap()));

        // Chained trusted hops are walked past.
        let ip = extract_client_ip(&xff("198.51.100.4, 10.0.0.1"), Some(proxy), &trusted);
        assert_eq!(ip, Some("198.51.100.4".parse().unwrap()));

        assert_eq!(
            extract_client_ip(&xff("garbage"), Some(proxy), &trusted),
            Some(proxy)
        );
        assert_eq!(
            extract_client_ip(&HeaderMap::new(), Some(proxy), &trusted),
            Some(proxy)
        );
    }

    #[test]
    fn test_extract_client_ip_direct() {
        let headers = HeaderMap::new();
        let direct: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(extract_client_ip(&headers, Some(direct), &[]), Some(direct));
    }
}
