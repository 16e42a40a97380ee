//! Translation of HTTP request attributes into call metadata and back.
//!
//! Inbound, every call carries the originating method, URI, route pattern,
//! real IP and user agent under the reserved prefix. Headers named in the
//! configuration travel under the same prefix; standard permanent headers
//! travel under the permanent-header prefix; everything else is dropped.
//!
//! Outbound, the override status code is consumed and never shown to the
//! client. Configured keys become raw response headers and the remaining
//! metadata is exposed as `Grpc-Metadata-<key>`.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use portico_rpc::metadata::{
    self, HTTP_CODE, HTTP_METHOD, HTTP_REAL_IP, HTTP_REQUEST_URI, HTTP_ROUTE, HTTP_USER_AGENT,
    PERMANENT_HEADER_PREFIX, RESERVED_PREFIX,
};
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, KeyAndValueRef, MetadataMap};

/// Prefix of response headers built from call metadata, and of request
/// headers whose remainder is forwarded as a metadata key.
pub const METADATA_HEADER_PREFIX: &str = "grpc-metadata-";

/// Permanent request headers from the IANA message header registry.
const PERMANENT_HEADERS: &[&str] = &[
    "accept",
    "accept-charset",
    "accept-language",
    "accept-ranges",
    "authorization",
    "cache-control",
    "content-type",
    "cookie",
    "date",
    "expect",
    "from",
    "host",
    "if-match",
    "if-modified-since",
    "if-none-match",
    "if-schedule-tag-match",
    "if-unmodified-since",
    "max-forwards",
    "origin",
    "pragma",
    "referer",
    "user-agent",
    "via",
    "warning",
];

/// Transport-level response metadata that never reaches the client.
const TRANSPORT_KEYS: &[&str] = &[
    "content-type",
    "content-length",
    "date",
    "te",
    "trailer",
    "grpc-status",
    "grpc-message",
    "grpc-encoding",
    "grpc-accept-encoding",
    "grpc-status-details-bin",
];

/// Returns `true` for headers in the permanent registry.
pub fn is_permanent_header(name: &str) -> bool {
    PERMANENT_HEADERS.contains(&name.to_ascii_lowercase().as_str())
}

/// Attributes of one HTTP request that enter the call metadata.
#[derive(Debug, Clone, Copy)]
pub struct RequestAttributes<'a> {
    /// HTTP method.
    pub method: &'a http::Method,
    /// Request URI.
    pub uri: &'a http::Uri,
    /// Request headers.
    pub headers: &'a HeaderMap,
    /// Matched route pattern, empty when unresolved.
    pub route: &'a str,
    /// TCP peer.
    pub peer: Option<SocketAddr>,
}

/// Maps request headers to metadata keys.
#[derive(Debug, Clone, Default)]
pub struct HeaderForwarder {
    explicit: HashSet<String>,
}

impl HeaderForwarder {
    /// Forwards `explicit` (lowercase names) under the reserved prefix.
    pub fn new(explicit: HashSet<String>) -> Self {
        Self { explicit }
    }

    /// Metadata key for a request header, or `None` when it is dropped.
    pub fn key_for(&self, header: &str) -> Option<String> {
        let header = header.to_ascii_lowercase();
        if self.explicit.contains(&header) {
            return Some(format!("{RESERVED_PREFIX}{header}"));
        }
        if is_permanent_header(&header) {
            return Some(format!("{PERMANENT_HEADER_PREFIX}{header}"));
        }
        header
            .strip_prefix(METADATA_HEADER_PREFIX)
            .filter(|rest| !rest.is_empty())
            .map(str::to_string)
    }

    /// Builds the metadata of the call behind `request`.
    pub fn incoming(&self, request: RequestAttributes<'_>) -> MetadataMap {
        let mut md = MetadataMap::new();

        for (name, value) in request.headers {
            if let Some(key) = self.key_for(name.as_str()) {
                if let Ok(value) = value.to_str() {
                    append(&mut md, &key, value);
                }
            }
        }

        let request_uri = request
            .uri
            .path_and_query()
            .map_or_else(|| request.uri.path().to_string(), ToString::to_string);
        let user_agent = request
            .headers
            .get(http::header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        insert(&mut md, HTTP_METHOD, request.method.as_str());
        insert(&mut md, HTTP_REQUEST_URI, &request_uri);
        insert(&mut md, HTTP_REAL_IP, &real_ip(request.headers, request.peer));
        insert(&mut md, HTTP_ROUTE, request.route);
        insert(&mut md, HTTP_USER_AGENT, user_agent);
        md
    }
}

fn append(md: &mut MetadataMap, key: &str, value: &str) {
    match (AsciiMetadataKey::from_str(key), AsciiMetadataValue::from_str(value)) {
        (Ok(key), Ok(value)) => {
            md.append(key, value);
        }
        _ => tracing::debug!(key, "dropping header that is not valid metadata"),
    }
}

fn insert(md: &mut MetadataMap, key: &'static str, value: &str) {
    match AsciiMetadataValue::from_str(value) {
        Ok(value) => {
            md.insert(key, value);
        }
        Err(_) => {
            md.insert(key, AsciiMetadataValue::from_static(""));
        }
    }
}

/// The caller's address.
///
/// The first public address in `X-Forwarded-For` wins, then `X-Real-Ip`,
/// then the TCP peer.
pub fn real_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    if let Some(forwarded) = header("x-forwarded-for") {
        let public = forwarded
            .split(',')
            .map(str::trim)
            .filter_map(|candidate| candidate.parse::<IpAddr>().ok())
            .find(|ip| !is_private(ip));
        if let Some(ip) = public {
            return ip.to_string();
        }
    }
    if let Some(real) = header("x-real-ip") {
        return real.to_string();
    }
    peer.map(|peer| peer.ip().to_string()).unwrap_or_default()
}

fn is_private(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}

/// Maps response metadata to response headers.
#[derive(Debug, Clone, Default)]
pub struct ResponseHeaders {
    raw: HashSet<String>,
}

impl ResponseHeaders {
    /// Passes `raw` keys (lowercase) through unchanged.
    pub fn new(raw: HashSet<String>) -> Self {
        Self { raw }
    }

    /// Writes the metadata of a response or error into `headers`.
    ///
    /// The override code and transport keys are never copied.
    pub fn apply(&self, md: &MetadataMap, headers: &mut HeaderMap) {
        for entry in md.iter() {
            let KeyAndValueRef::Ascii(key, value) = entry else {
                continue;
            };
            let key = key.as_str();
            if key == HTTP_CODE || TRANSPORT_KEYS.contains(&key) {
                continue;
            }
            let name = if self.raw.contains(key) {
                key.to_string()
            } else {
                format!("{METADATA_HEADER_PREFIX}{key}")
            };
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_bytes(value.as_encoded_bytes()),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => tracing::debug!(key, "dropping metadata that is not a valid header"),
            }
        }
    }
}

/// The override status code carried by response or error metadata.
pub fn override_status(md: &MetadataMap) -> Option<StatusCode> {
    metadata::http_code(md)
}
