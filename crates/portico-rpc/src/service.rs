//! Hand-described gRPC services.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tonic::body::BoxBody;
use tonic::server::{Grpc, NamedService, UnaryService};
use tonic::{Request, Response, Status};
use tracing::Instrument;

use crate::codec::JsonCodec;
use crate::context::CallContext;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;
type StdError = Box<dyn std::error::Error + Send + Sync + 'static>;
type MethodHandler =
    Arc<dyn Fn(http::Request<BoxBody>) -> BoxFuture<http::Response<BoxBody>> + Send + Sync>;
type UnaryHandler<Req, Resp> =
    Arc<dyn Fn(Request<Req>) -> BoxFuture<Result<Response<Resp>, Status>> + Send + Sync>;

/// Names a gRPC service, e.g. `example.Example`.
pub trait ServiceDescriptor: Send + Sync + 'static {
    /// Fully qualified service name.
    const NAME: &'static str;
}

/// Methods of one service, keyed by method name.
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: HashMap<&'static str, MethodHandler>,
}

impl MethodTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a unary method.
    ///
    /// Every call is logged once with its request and its response or error,
    /// inside the `rpc.call` span of its [`CallContext`].
    #[must_use]
    pub fn unary<Req, Resp, H, Fut>(mut self, name: &'static str, handler: H) -> Self
    where
        Req: Serialize + DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        H: Fn(Request<Req>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response<Resp>, Status>> + Send + 'static,
    {
        let handler: UnaryHandler<Req, Resp> =
            Arc::new(move |request| -> BoxFuture<Result<Response<Resp>, Status>> {
                Box::pin(handler(request))
            });
        let method: MethodHandler = Arc::new(move |request: http::Request<BoxBody>| -> BoxFuture<http::Response<BoxBody>> {
            let adapter = UnaryAdapter {
                method: name,
                handler: Arc::clone(&handler),
            };
            Box::pin(async move {
                let mut grpc = Grpc::new(JsonCodec::<Resp, Req>::default());
                grpc.unary(adapter, request).await
            })
        });
        self.methods.insert(name, method);
        self
    }

    /// Method names in the table.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.methods.keys().copied()
    }

    fn get(&self, name: &str) -> Option<MethodHandler> {
        self.methods.get(name).cloned()
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

struct UnaryAdapter<Req, Resp> {
    method: &'static str,
    handler: UnaryHandler<Req, Resp>,
}

impl<Req, Resp> UnaryService<Req> for UnaryAdapter<Req, Resp>
where
    Req: Serialize + Send + 'static,
    Resp: Serialize + Send + 'static,
{
    type Response = Resp;
    type Future = BoxFuture<Result<Response<Resp>, Status>>;

    fn call(&mut self, request: Request<Req>) -> Self::Future {
        let context = CallContext::of(&request)
            .cloned()
            .unwrap_or_else(|| CallContext::from_metadata(request.metadata()));
        let span = context.span(self.method);
        let method = self.method;
        let payload = serde_json::to_string(request.get_ref()).unwrap_or_default();
        let handler = Arc::clone(&self.handler);

        Box::pin(
            async move {
                let started = Instant::now();
                let result = handler(request).await;
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                match &result {
                    Ok(response) => {
                        let body = serde_json::to_string(response.get_ref()).unwrap_or_default();
                        tracing::info!(
                            request = %payload,
                            response = %body,
                            duration_ms,
                            "API log: {} {} {}",
                            context.http_method,
                            context.route,
                            method
                        );
                    }
                    Err(status) => {
                        tracing::warn!(
                            request = %payload,
                            code = ?status.code(),
                            error = %status.message(),
                            duration_ms,
                            "API log: {} {} {}",
                            context.http_method,
                            context.route,
                            method
                        );
                    }
                }
                result
            }
            .instrument(span),
        )
    }
}

/// A gRPC service routing calls by method name.
pub struct RpcService<D> {
    methods: Arc<MethodTable>,
    _descriptor: PhantomData<fn() -> D>,
}

impl<D: ServiceDescriptor> RpcService<D> {
    /// Wraps a method table.
    pub fn new(methods: MethodTable) -> Self {
        Self {
            methods: Arc::new(methods),
            _descriptor: PhantomData,
        }
    }

    /// Full gRPC path of `method`, e.g. `/example.Example/Login`.
    pub fn path(method: &str) -> String {
        format!("/{}/{method}", D::NAME)
    }

    fn resolve(&self, path: &str) -> Option<MethodHandler> {
        let method = path
            .strip_prefix('/')?
            .strip_prefix(D::NAME)?
            .strip_prefix('/')?;
        self.methods.get(method)
    }
}

impl<D> Clone for RpcService<D> {
    fn clone(&self) -> Self {
        Self {
            methods: Arc::clone(&self.methods),
            _descriptor: PhantomData,
        }
    }
}

impl<D: ServiceDescriptor> fmt::Debug for RpcService<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcService")
            .field("name", &D::NAME)
            .field("methods", &self.methods)
            .finish()
    }
}

impl<D: ServiceDescriptor> NamedService for RpcService<D> {
    const NAME: &'static str = D::NAME;
}

impl<D, B> tower_service::Service<http::Request<B>> for RpcService<D>
where
    D: ServiceDescriptor,
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<B>) -> Self::Future {
        match self.resolve(request.uri().path()) {
            Some(method) => {
                let request = request.map(tonic::body::boxed);
                Box::pin(async move { Ok(method(request).await) })
            }
            None => Box::pin(async move { Ok(unimplemented_response()) }),
        }
    }
}

fn unimplemented_response() -> http::Response<BoxBody> {
    let mut response = http::Response::new(tonic::body::empty_body());
    let headers = response.headers_mut();
    headers.insert(
        http::HeaderName::from_static("grpc-status"),
        http::HeaderValue::from(tonic::Code::Unimplemented as i32),
    );
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/grpc"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tower_service::Service;

    struct Echo;

    impl ServiceDescriptor for Echo {
        const NAME: &'static str = "test.Echo";
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Ping {
        text: String,
    }

    fn echo_service() -> RpcService<Echo> {
        RpcService::new(MethodTable::new().unary("Ping", |request: Request<Ping>| async move {
            Ok(Response::new(request.into_inner()))
        }))
    }

    #[test]
    fn test_path_and_resolution() {
        let service = echo_service();
        assert_eq!(RpcService::<Echo>::path("Ping"), "/test.Echo/Ping");
        assert!(service.resolve("/test.Echo/Ping").is_some());
        assert!(service.resolve("/test.Echo/Pong").is_none());
        assert!(service.resolve("/other.Echo/Ping").is_none());
        assert_eq!(<RpcService<Echo> as NamedService>::NAME, "test.Echo");
    }

    #[tokio::test]
    async fn test_unknown_method_is_unimplemented() {
        let mut service = echo_service();
        let request = http::Request::builder()
            .uri("/test.Echo/Missing")
            .body(tonic::body::empty_body())
            .unwrap();

        let response = service.call(request).await.unwrap();
        assert_eq!(response.headers()["grpc-status"], "12");
    }

    #[test]
    fn test_method_names() {
        let table = MethodTable::new()
            .unary("A", |r: Request<Ping>| async move { Ok(Response::new(r.into_inner())) })
            .unary("B", |r: Request<Ping>| async move { Ok(Response::new(r.into_inner())) });
        let mut names: Vec<_> = table.names().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["A", "B"]);
    }
}
