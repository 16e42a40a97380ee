//! Per-call context and the interceptor chain.

use std::fmt;
use std::sync::Arc;

use tonic::service::Interceptor;
use tonic::{Request, Status};
use uuid::Uuid;

use crate::metadata::CallMetadata;

/// Attributes of the HTTP request behind an RPC call, plus correlation ids.
///
/// Stored in the request extensions by [`CallInterceptors`]; handlers read it
/// with [`CallContext::of`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    /// Originating HTTP method.
    pub http_method: String,
    /// Raw request URI.
    pub request_uri: String,
    /// Route pattern, empty when unknown.
    pub route: String,
    /// Caller's user agent.
    pub user_agent: String,
    /// Caller's real IP.
    pub real_ip: String,
    /// Trace id for log correlation.
    pub trace_id: String,
    /// Span id for log correlation.
    pub span_id: String,
}

impl CallContext {
    /// Builds a context from gateway-injected metadata with fresh ids.
    pub fn from_metadata(metadata: &tonic::metadata::MetadataMap) -> Self {
        let md = CallMetadata::new(metadata);
        Self {
            http_method: md.method().to_string(),
            request_uri: md.request_uri().to_string(),
            route: md.route().to_string(),
            user_agent: md.user_agent().to_string(),
            real_ip: md.real_ip().to_string(),
            trace_id: Uuid::now_v7().simple().to_string(),
            span_id: Uuid::now_v7().simple().to_string(),
        }
    }

    /// The context attached to `request`, if the interceptor chain ran.
    pub fn of<T>(request: &Request<T>) -> Option<&Self> {
        request.extensions().get::<Self>()
    }

    /// A span carrying the context fields.
    pub fn span(&self, rpc_method: &str) -> tracing::Span {
        tracing::info_span!(
            "rpc.call",
            rpc.method = %rpc_method,
            http.method = %self.http_method,
            http.request_uri = %self.request_uri,
            http.route = %self.route,
            http.user_agent = %self.user_agent,
            http.real_ip = %self.real_ip,
            trace_id = %self.trace_id,
            span_id = %self.span_id,
        )
    }
}

/// Attaches a [`CallContext`] to the request.
pub fn enrich_call_context(mut request: Request<()>) -> Result<Request<()>, Status> {
    let context = CallContext::from_metadata(request.metadata());
    request.extensions_mut().insert(context);
    Ok(request)
}

type SharedInterceptor = Arc<dyn Fn(Request<()>) -> Result<Request<()>, Status> + Send + Sync>;

/// The listener's interceptor chain.
///
/// [`enrich_call_context`] always runs first; user interceptors follow in
/// the order they were added. The first rejection stops the chain.
#[derive(Clone, Default)]
pub struct CallInterceptors {
    chain: Vec<SharedInterceptor>,
}

impl CallInterceptors {
    /// A chain with only the built-in enrichment step.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an interceptor.
    #[must_use]
    pub fn push<F>(mut self, interceptor: F) -> Self
    where
        F: Fn(Request<()>) -> Result<Request<()>, Status> + Send + Sync + 'static,
    {
        self.chain.push(Arc::new(interceptor));
        self
    }

    /// Number of user interceptors.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Returns `true` when only the built-in step runs.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }
}

impl Interceptor for CallInterceptors {
    fn call(&mut self, request: Request<()>) -> Result<Request<()>, Status> {
        self.chain
            .iter()
            .try_fold(enrich_call_context(request)?, |request, next| next(request))
    }
}

impl fmt::Debug for CallInterceptors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallInterceptors")
            .field("user_interceptors", &self.chain.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{HTTP_METHOD, HTTP_ROUTE};
    use tonic::metadata::AsciiMetadataValue;

    fn gateway_request() -> Request<()> {
        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert(HTTP_METHOD, AsciiMetadataValue::from_static("GET"));
        request
            .metadata_mut()
            .insert(HTTP_ROUTE, AsciiMetadataValue::from_static("/v1/items/{id}"));
        request
    }

    #[test]
    fn test_enrichment_attaches_context() {
        let mut chain = CallInterceptors::new();
        let request = chain.call(gateway_request()).unwrap();

        let context = CallContext::of(&request).unwrap();
        assert_eq!(context.http_method, "GET");
        assert_eq!(context.route, "/v1/items/{id}");
        assert_eq!(context.trace_id.len(), 32);
        assert!(!context.trace_id.contains('-'));
        assert_ne!(context.trace_id, context.span_id);
    }

    #[test]
    fn test_user_interceptors_see_context_and_can_reject() {
        let mut chain = CallInterceptors::new()
            .push(|request: Request<()>| {
                if CallContext::of(&request).is_some() {
                    Ok(request)
                } else {
                    Err(Status::internal("context missing"))
                }
            })
            .push(|_request: Request<()>| Err(Status::unauthenticated("no token")));
        assert_eq!(chain.len(), 2);

        let status = chain.call(gateway_request()).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn test_missing_metadata_yields_empty_fields() {
        let context = CallContext::from_metadata(&tonic::metadata::MetadataMap::new());
        assert!(context.http_method.is_empty());
        assert!(context.route.is_empty());
        assert!(!context.trace_id.is_empty());
    }
}
