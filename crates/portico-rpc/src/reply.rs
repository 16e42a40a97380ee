//! Building responses that talk back to the gateway.
//!
//! A handler answers with a message or a [`Status`]; either way the gateway
//! reads the response metadata for an override HTTP status code, extra
//! response headers and the route pattern the call was served under.

use std::str::FromStr;

use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};
use tonic::{Request, Response, Status};

use crate::context::CallContext;
use crate::metadata::{inject_http_code, inject_http_header, CallMetadata, PATH_PATTERN};

/// Response builder.
///
/// ```rust,ignore
/// Reply::from_request(&request)
///     .http_status(201)
///     .header("x-resource-id", "42")
///     .ok(created)
/// ```
#[derive(Debug, Clone, Default)]
pub struct Reply {
    code: Option<u16>,
    headers: Vec<(String, String)>,
    route: Option<String>,
}

impl Reply {
    /// A builder that sets nothing but the message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder that echoes the route pattern of `request` back to the
    /// gateway under `path-pattern`.
    pub fn from_request<T>(request: &Request<T>) -> Self {
        let route = CallContext::of(request)
            .map(|context| context.route.clone())
            .unwrap_or_else(|| CallMetadata::new(request.metadata()).route().to_string());
        Self {
            route: Some(route).filter(|route| !route.is_empty()),
            ..Self::default()
        }
    }

    /// Overrides the HTTP status code the gateway answers with.
    ///
    /// Codes outside `200..600` are ignored.
    pub fn http_status(mut self, code: u16) -> Self {
        if (200..600).contains(&code) {
            self.code = Some(code);
        } else {
            tracing::warn!(code, "ignoring HTTP status override outside 200..600");
        }
        self
    }

    /// Adds a response header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Answers with `message`.
    pub fn ok<T>(self, message: T) -> Result<Response<T>, Status> {
        let mut response = Response::new(message);
        self.apply(response.metadata_mut());
        Ok(response)
    }

    /// Answers with `status`, carrying the override code and headers in its
    /// metadata.
    pub fn error<T>(self, mut status: Status) -> Result<Response<T>, Status> {
        self.apply(status.metadata_mut());
        Err(status)
    }

    fn apply(self, metadata: &mut MetadataMap) {
        if let Some(code) = self.code {
            if let Err(error) = inject_http_code(metadata, code) {
                tracing::warn!(error = %error, "dropping HTTP status override");
            }
        }
        if let Some(route) = self.route {
            match (
                AsciiMetadataKey::from_str(PATH_PATTERN),
                AsciiMetadataValue::from_str(&route),
            ) {
                (Ok(key), Ok(value)) => {
                    metadata.insert(key, value);
                }
                _ => tracing::debug!(route = %route, "route pattern is not valid metadata"),
            }
        }
        for (key, value) in self.headers {
            if let Err(error) = inject_http_header(metadata, &key, &value) {
                tracing::warn!(error = %error, "dropping response header");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{http_code, HTTP_ROUTE};

    fn routed_request() -> Request<()> {
        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert(HTTP_ROUTE, AsciiMetadataValue::from_static("/v1/users/{username}/items"));
        request
    }

    #[test]
    fn test_ok_carries_code_route_and_headers() {
        let response = Reply::from_request(&routed_request())
            .http_status(201)
            .header("X-Resource-Id", "42")
            .ok("created")
            .unwrap();

        let metadata = response.metadata();
        assert_eq!(http_code(metadata), Some(http::StatusCode::CREATED));
        assert_eq!(
            metadata.get(PATH_PATTERN).unwrap(),
            "/v1/users/{username}/items"
        );
        assert_eq!(metadata.get("x-resource-id").unwrap(), "42");
        assert_eq!(*response.get_ref(), "created");
    }

    #[test]
    fn test_out_of_range_codes_are_ignored() {
        let response = Reply::new().http_status(199).http_status(600).ok(()).unwrap();
        assert_eq!(http_code(response.metadata()), None);
    }

    #[test]
    fn test_non_standard_code_in_range_is_dropped() {
        let response = Reply::new().http_status(299).ok(()).unwrap();
        assert_eq!(http_code(response.metadata()), None);
    }

    #[test]
    fn test_error_carries_metadata() {
        let status = Reply::new()
            .http_status(409)
            .header("retry-after", "3")
            .error::<()>(Status::already_exists("taken"))
            .unwrap_err();

        assert_eq!(status.code(), tonic::Code::AlreadyExists);
        assert_eq!(http_code(status.metadata()), Some(http::StatusCode::CONFLICT));
        assert_eq!(status.metadata().get("retry-after").unwrap(), "3");
    }

    #[test]
    fn test_unrouted_request_sets_no_pattern() {
        let response = Reply::from_request(&Request::new(())).ok(()).unwrap();
        assert!(response.metadata().get(PATH_PATTERN).is_none());
    }
}
