//! Reserved metadata keys shared by the gateway and the RPC handlers.
//!
//! The gateway injects the attributes of the originating HTTP request under
//! the reserved `portico-` prefix, and forwards a selected set of request
//! headers either under the same prefix (explicitly configured headers) or
//! under `gateway-` (standard permanent headers). Handlers read them through
//! [`CallMetadata`] and talk back by writing the override status code and
//! extra response headers into the response metadata.

use std::str::FromStr;

use http::StatusCode;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};

use crate::error::RpcError;

/// Prefix of every value injected by the gateway.
pub const RESERVED_PREFIX: &str = "portico-";

/// Prefix of standard permanent HTTP headers forwarded by the gateway.
pub const PERMANENT_HEADER_PREFIX: &str = "gateway-";

/// Originating HTTP method.
pub const HTTP_METHOD: &str = "portico-http-method";

/// Raw request URI (path and query).
pub const HTTP_REQUEST_URI: &str = "portico-http-request-uri";

/// Route pattern resolved by the gateway, empty when unknown.
pub const HTTP_ROUTE: &str = "portico-http-route";

/// Caller's real IP.
pub const HTTP_REAL_IP: &str = "portico-http-real-ip";

/// Caller's user agent.
pub const HTTP_USER_AGENT: &str = "portico-http-user-agent";

/// HTTP status code a handler wants the gateway to answer with.
pub const HTTP_CODE: &str = "portico-http-code";

/// Forwarded `Authorization` header.
pub const AUTHORIZATION: &str = "portico-authorization";

/// Response header carrying the matched route pattern back to the gateway.
pub const PATH_PATTERN: &str = "path-pattern";

/// Read-only view over the metadata of one call.
///
/// Keys are case-insensitive; when a key carries several values the last
/// one wins.
#[derive(Debug, Clone, Copy)]
pub struct CallMetadata<'a> {
    metadata: &'a MetadataMap,
}

impl<'a> CallMetadata<'a> {
    /// Wraps a metadata map.
    pub fn new(metadata: &'a MetadataMap) -> Self {
        Self { metadata }
    }

    /// Last value stored under `key`, if it is valid ASCII.
    pub fn get(&self, key: &str) -> Option<&'a str> {
        let key = key.to_ascii_lowercase();
        self.metadata
            .get_all(key.as_str())
            .iter()
            .last()
            .and_then(|value| value.to_str().ok())
    }

    fn reserved(&self, key: &str) -> &'a str {
        self.get(key).unwrap_or_default()
    }

    /// Originating HTTP method.
    pub fn method(&self) -> &'a str {
        self.reserved(HTTP_METHOD)
    }

    /// Raw request URI.
    pub fn request_uri(&self) -> &'a str {
        self.reserved(HTTP_REQUEST_URI)
    }

    /// Route pattern, empty when the gateway could not resolve one.
    pub fn route(&self) -> &'a str {
        self.reserved(HTTP_ROUTE)
    }

    /// Caller's real IP.
    pub fn real_ip(&self) -> &'a str {
        self.reserved(HTTP_REAL_IP)
    }

    /// Caller's user agent.
    pub fn user_agent(&self) -> &'a str {
        self.reserved(HTTP_USER_AGENT)
    }

    /// Forwarded `Authorization` header.
    pub fn authorization(&self) -> &'a str {
        self.reserved(AUTHORIZATION)
    }

    /// A forwarded request header, looked up under the reserved prefix first
    /// and the permanent-header prefix second.
    pub fn header(&self, name: &str) -> Option<&'a str> {
        let name = name.to_ascii_lowercase();
        self.get(&format!("{RESERVED_PREFIX}{name}"))
            .or_else(|| self.get(&format!("{PERMANENT_HEADER_PREFIX}{name}")))
    }
}

/// Asks the gateway to answer with `code`.
///
/// Fails with [`RpcError::InvalidStatusCode`] when `code` has no standard
/// status text or is informational (1xx).
pub fn inject_http_code(metadata: &mut MetadataMap, code: u16) -> Result<(), RpcError> {
    let status = StatusCode::from_u16(code).map_err(|_| RpcError::InvalidStatusCode(code))?;
    if !is_final_status(status) {
        return Err(RpcError::InvalidStatusCode(code));
    }
    metadata.insert(HTTP_CODE, AsciiMetadataValue::from(code));
    Ok(())
}

/// Adds a response header for the gateway to pass back to the client.
pub fn inject_http_header(
    metadata: &mut MetadataMap,
    key: &str,
    value: &str,
) -> Result<(), RpcError> {
    let name = AsciiMetadataKey::from_str(&key.to_ascii_lowercase())
        .map_err(|e| RpcError::invalid_metadata(key, e))?;
    let value = AsciiMetadataValue::from_str(value).map_err(|e| RpcError::invalid_metadata(key, e))?;
    metadata.insert(name, value);
    Ok(())
}

/// Reads a valid override status code from response metadata.
pub fn http_code(metadata: &MetadataMap) -> Option<StatusCode> {
    CallMetadata::new(metadata)
        .get(HTTP_CODE)
        .and_then(|raw| raw.trim().parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .filter(|status| is_final_status(*status))
}

/// A registered status that can end an HTTP exchange; 1xx codes cannot.
fn is_final_status(status: StatusCode) -> bool {
    !status.is_informational() && status.canonical_reason().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(entries: &[(&'static str, &'static str)]) -> MetadataMap {
        let mut map = MetadataMap::new();
        for (key, value) in entries {
            map.append(*key, AsciiMetadataValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_reserved_accessors() {
        let map = metadata(&[
            (HTTP_METHOD, "POST"),
            (HTTP_REQUEST_URI, "/v1/login?debug=1"),
            (HTTP_ROUTE, "/v1/login"),
            (HTTP_REAL_IP, "203.0.113.9"),
            (HTTP_USER_AGENT, "curl/8.0"),
        ]);
        let md = CallMetadata::new(&map);

        assert_eq!(md.method(), "POST");
        assert_eq!(md.request_uri(), "/v1/login?debug=1");
        assert_eq!(md.route(), "/v1/login");
        assert_eq!(md.real_ip(), "203.0.113.9");
        assert_eq!(md.user_agent(), "curl/8.0");
        assert_eq!(md.authorization(), "");
    }

    #[test]
    fn test_lookup_is_case_insensitive_and_last_value_wins() {
        let map = metadata(&[("portico-x-tenant", "a"), ("portico-x-tenant", "b")]);
        let md = CallMetadata::new(&map);

        assert_eq!(md.get("Portico-X-Tenant"), Some("b"));
        assert_eq!(md.header("X-Tenant"), Some("b"));
    }

    #[test]
    fn test_header_falls_back_to_permanent_prefix() {
        let map = metadata(&[("gateway-accept-language", "fr")]);
        let md = CallMetadata::new(&map);

        assert_eq!(md.header("Accept-Language"), Some("fr"));
        assert_eq!(md.header("X-Missing"), None);
    }

    #[test]
    fn test_inject_http_code() {
        let mut map = MetadataMap::new();
        inject_http_code(&mut map, 201).unwrap();
        assert_eq!(http_code(&map), Some(StatusCode::CREATED));

        assert!(matches!(
            inject_http_code(&mut map, 299),
            Err(RpcError::InvalidStatusCode(299))
        ));
        assert!(matches!(
            inject_http_code(&mut map, 1000),
            Err(RpcError::InvalidStatusCode(1000))
        ));
    }

    #[test]
    fn test_informational_codes_rejected() {
        let mut map = MetadataMap::new();
        for code in [100, 101, 103] {
            assert!(matches!(
                inject_http_code(&mut map, code),
                Err(RpcError::InvalidStatusCode(c)) if c == code
            ));
        }
        assert!(map.get(HTTP_CODE).is_none());
        assert_eq!(http_code(&metadata(&[(HTTP_CODE, "101")])), None);
        assert_eq!(http_code(&metadata(&[(HTTP_CODE, "200")])), Some(StatusCode::OK));
    }

    #[test]
    fn test_http_code_ignores_unknown_values() {
        assert_eq!(http_code(&metadata(&[(HTTP_CODE, "299")])), None);
        assert_eq!(http_code(&metadata(&[(HTTP_CODE, "abc")])), None);
        assert_eq!(http_code(&MetadataMap::new()), None);
    }

    #[test]
    fn test_inject_http_header() {
        let mut map = MetadataMap::new();
        inject_http_header(&mut map, "X-Request-Cost", "7").unwrap();
        assert_eq!(CallMetadata::new(&map).get("x-request-cost"), Some("7"));

        assert!(inject_http_header(&mut map, "bad key", "v").is_err());
        assert!(inject_http_header(&mut map, "x-ok", "line\nbreak").is_err());
    }
}
