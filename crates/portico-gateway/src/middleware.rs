//! Request pipeline stages run before dispatch, in order: CORS, gzip
//! request-body decompression and payload logging.

use std::io::Read;

use bytes::Bytes;
use flate2::read::GzDecoder;
use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_METHOD, CONTENT_ENCODING, CONTENT_LENGTH,
    ORIGIN,
};
use http::{HeaderMap, HeaderValue, Method, StatusCode};

use crate::status::{response, HttpResponse};

const ALLOWED_HEADERS: &str = "*,authorization,content-type,traceid";
const ALLOWED_METHODS: &str = "GET,HEAD,POST,PUT,DELETE,PATCH";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Cross-origin handling for one request.
#[derive(Debug, Clone, Default)]
pub(crate) struct Cors {
    origin: Option<HeaderValue>,
}

impl Cors {
    /// Remembers the request `Origin`, if any.
    pub(crate) fn from_request(headers: &HeaderMap) -> Self {
        Self {
            origin: headers.get(ORIGIN).filter(|value| !value.is_empty()).cloned(),
        }
    }

    /// Short-circuits a pre-flight request.
    pub(crate) fn preflight(&self, method: &Method, headers: &HeaderMap, path: &str) -> Option<HttpResponse> {
        if self.origin.is_none() || method != Method::OPTIONS || !headers.contains_key(ACCESS_CONTROL_REQUEST_METHOD) {
            return None;
        }
        tracing::debug!(path, "preflight request");

        let mut preflight = response(StatusCode::OK, "text/plain; charset=utf-8", Bytes::new());
        let headers = preflight.headers_mut();
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOWED_HEADERS));
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS));
        Some(preflight)
    }

    /// Reflects the origin on `response`.
    pub(crate) fn apply(&self, response: &mut HttpResponse) {
        if let Some(origin) = &self.origin {
            let headers = response.headers_mut();
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
    }
}

fn plain_error(status: StatusCode, message: &str) -> HttpResponse {
    response(status, "text/plain; charset=utf-8", format!("{message}\n"))
}

/// Inflates a `Content-Encoding: gzip` body and drops the encoding headers.
///
/// A body that is not gzip answers 400, one inflating past `limit` bytes
/// answers 413, and a truncated or corrupt stream answers 500.
pub(crate) fn gunzip(headers: &mut HeaderMap, body: Bytes, limit: usize) -> Result<Bytes, HttpResponse> {
    let is_gzip = headers
        .get(CONTENT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("gzip"));
    if !is_gzip {
        return Ok(body);
    }

    if !body.starts_with(&GZIP_MAGIC) {
        return Err(plain_error(StatusCode::BAD_REQUEST, "Failed to create gzip reader"));
    }

    let mut inflated = Vec::new();
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    if let Err(error) = GzDecoder::new(body.as_ref()).take(cap).read_to_end(&mut inflated) {
        tracing::warn!(%error, "failed to inflate request body");
        return Err(plain_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to read decompressed data",
        ));
    }
    if inflated.len() > limit {
        tracing::warn!(limit, "decompressed request body too large");
        return Err(plain_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            "Decompressed body too large",
        ));
    }

    headers.remove(CONTENT_ENCODING);
    headers.remove(CONTENT_LENGTH);
    tracing::info!(size = inflated.len(), "decompressed request body");
    Ok(Bytes::from(inflated))
}

/// Logs a non-empty request body.
pub(crate) fn log_payload(body: &Bytes) {
    if !body.is_empty() {
        tracing::info!("request body: {}", String::from_utf8_lossy(body));
    }
}
