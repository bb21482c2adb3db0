pub mod click_window;
pub mod idempotency;
pub mod rate_limit;

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::net::IpAddr;
use subtle::ConstantTimeEq;

/// Resolve the client IP: first X-Forwarded-For entry when present
/// (the gateway normally sits behind a proxy), else the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: IpAddr) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(peer)
}

/// Country hint injected by edge proxies (Cloudflare / Vercel style).
pub fn client_country(headers: &HeaderMap) -> Option<String> {
    headers
        .get("cf-ipcountry")
        .or_else(|| headers.get("x-vercel-ip-country"))
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && *v != "XX")
        .map(str::to_uppercase)
}

/// Constant-time string comparison for admin keys and signatures.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// HMAC-SHA256 of `payload`, formatted as "sha256=<hex>" — the signature
/// scheme shared by inbound webhook verification and outbound event signing.
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify an inbound X-AdParcel-Signature header against the shared secret.
pub fn verify_signature(secret: &str, payload: &[u8], header: &str) -> bool {
    constant_time_eq(&sign_payload(secret, payload), header.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        let peer: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(client_ip(&headers, peer), "203.0.113.7".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        let headers = HeaderMap::new();
        let peer: IpAddr = "192.0.2.1".parse().unwrap();
        assert_eq!(client_ip(&headers, peer), peer);
    }

    #[test]
    fn test_client_ip_ignores_garbage_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));
        let peer: IpAddr = "192.0.2.1".parse().unwrap();
        assert_eq!(client_ip(&headers, peer), peer);
    }

    #[test]
    fn test_country_hint_normalized() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-ipcountry", HeaderValue::from_static("fr"));
        assert_eq!(client_country(&headers), Some("FR".into()));
    }

    #[test]
    fn test_country_unknown_is_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-ipcountry", HeaderValue::from_static("XX"));
        assert_eq!(client_country(&headers), None);
    }

    #[test]
    fn test_signature_round_trip() {
        let sig = sign_payload("secret", b"{\"uuid\":\"x\"}");
        assert!(sig.starts_with("sha256="));
        assert!(verify_signature("secret", b"{\"uuid\":\"x\"}", &sig));
        assert!(!verify_signature("other", b"{\"uuid\":\"x\"}", &sig));
        assert!(!verify_signature("secret", b"{}", &sig));
    }
}
