//! Caller identities used as quota keys.

use crate::error::{QuotaError, Result};
use axum::extract::{ConnectInfo, Request};
use axum::http::HeaderMap;
use std::fmt;
use std::net::SocketAddr;

/// Opaque, non-empty key naming the caller being rate limited.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(QuotaError::Identifier("identifier cannot be empty".to_string()));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives the quota identifier for a request.
///
/// Only called once a policy applies, and must be deterministic for a given
/// request.
pub trait IdentifierResolver: Send + Sync {
    fn from_request(&self, request: &Request) -> Result<Identifier>;
}

impl<F> IdentifierResolver for F
where
    F: Fn(&Request) -> Result<Identifier> + Send + Sync,
{
    fn from_request(&self, request: &Request) -> Result<Identifier> {
        self(request)
    }
}

/// Strategy for deriving identifiers from request metadata
#[derive(Debug, Clone, PartialEq)]
pub enum KeyStrategy {
    /// Client IP address
    IpAddress,
    /// API key from the `x-api-key` header
    ApiKey,
    /// User id from the `x-user-id` header
    UserId,
    /// Several strategies joined together
    Composite(Vec<KeyStrategy>),
}

impl Default for KeyStrategy {
    fn default() -> Self {
        KeyStrategy::IpAddress
    }
}

impl KeyStrategy {
    fn part(&self, request: &Request) -> Result<String> {
        match self {
            KeyStrategy::IpAddress => Ok(client_ip(request)),
            KeyStrategy::ApiKey => header_value(request.headers(), "x-api-key"),
            KeyStrategy::UserId => header_value(request.headers(), "x-user-id"),
            KeyStrategy::Composite(_) => Err(QuotaError::Identifier(
                "Nested composite keys not supported".to_string(),
            )),
        }
    }
}

impl IdentifierResolver for KeyStrategy {
    fn from_request(&self, request: &Request) -> Result<Identifier> {
        match self {
            KeyStrategy::IpAddress => Identifier::new(format!("ip:{}", self.part(request)?)),
            KeyStrategy::ApiKey => Identifier::new(format!("key:{}", self.part(request)?)),
            KeyStrategy::UserId => Identifier::new(format!("user:{}", self.part(request)?)),
            KeyStrategy::Composite(strategies) => {
                let parts = strategies
                    .iter()
                    .map(|s| s.part(request))
                    .collect::<Result<Vec<_>>>()?;
                Identifier::new(format!("composite:{}", parts.join(":")))
            }
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Result<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| QuotaError::Identifier(format!("missing {} header", name)))
}

/// Best-effort client address: proxy headers first, then the peer address.
pub fn client_ip(request: &Request) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return first_ip.to_string();
                }
            }
        }
    }

    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            let ip_str = ip_str.trim();
            if !ip_str.is_empty() {
                return ip_str.to_string();
            }
        }
    }

    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        addr.ip().to_string()
    } else if let Some(addr) = request.extensions().get::<SocketAddr>() {
        addr.ip().to_string()
    } else {
        "unknown".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::HeaderValue;

    fn create_test_request() -> Request {
        Request::builder()
            .uri("/api/test")
            .header("x-api-key", "test-api-key")
            .header("x-user-id", "user123")
            .header("x-forwarded-for", "192.168.1.1, 10.0.0.1")
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_identifier_rejects_empty() {
        assert!(Identifier::new("").is_err());
        assert_eq!(Identifier::new("ip:1.2.3.4").unwrap().as_str(), "ip:1.2.3.4");
    }

    #[test]
    fn test_ip_address_strategy() {
        let id = KeyStrategy::IpAddress.from_request(&create_test_request()).unwrap();
        assert_eq!(id.as_str(), "ip:192.168.1.1");
    }

    #[test]
    fn test_api_key_strategy() {
        let id = KeyStrategy::ApiKey.from_request(&create_test_request()).unwrap();
        assert_eq!(id.as_str(), "key:test-api-key");
    }

    #[test]
    fn test_user_id_strategy() {
        let id = KeyStrategy::UserId.from_request(&create_test_request()).unwrap();
        assert_eq!(id.as_str(), "user:user123");
    }

    #[test]
    fn test_composite_strategy() {
        let strategy = KeyStrategy::Composite(vec![KeyStrategy::UserId, KeyStrategy::IpAddress]);
        let id = strategy.from_request(&create_test_request()).unwrap();
        assert_eq!(id.as_str(), "composite:user123:192.168.1.1");
    }

    #[test]
    fn test_nested_composite_rejected() {
        let strategy = KeyStrategy::Composite(vec![KeyStrategy::Composite(vec![])]);
        assert!(strategy.from_request(&create_test_request()).is_err());
    }

    #[test]
    fn test_missing_api_key() {
        let request = Request::new(Body::empty());
        let err = KeyStrategy::ApiKey.from_request(&request).unwrap_err();
        assert!(matches!(err, QuotaError::Identifier(_)));
    }

    #[test]
    fn test_client_ip_with_real_ip_header() {
        let mut request = Request::new(Body::empty());
        request
            .headers_mut()
            .insert("x-real-ip", HeaderValue::from_static("203.0.113.1"));
        assert_eq!(client_ip(&request), "203.0.113.1");
    }

    #[test]
    fn test_blank_proxy_headers_fall_through() {
        let mut request = Request::new(Body::empty());
        request
            .headers_mut()
            .insert("x-forwarded-for", HeaderValue::from_static(" "));
        request
            .headers_mut()
            .insert("x-real-ip", HeaderValue::from_static("  "));
        let addr: SocketAddr = "198.51.100.9:4000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));

        assert_eq!(client_ip(&request), "198.51.100.9");
        let id = KeyStrategy::IpAddress.from_request(&request).unwrap();
        assert_eq!(id.as_str(), "ip:198.51.100.9");
    }

    #[test]
    fn test_client_ip_from_connect_info() {
        let mut request = Request::new(Body::empty());
        let addr: SocketAddr = "198.51.100.7:4000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(client_ip(&request), "198.51.100.7");
    }

    #[test]
    fn test_client_ip_fallback() {
        let request = Request::new(Body::empty());
        assert_eq!(client_ip(&request), "unknown");
    }
}
