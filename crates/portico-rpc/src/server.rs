//! The RPC listener.

use std::net::SocketAddr;

use portico_boot::{Latch, ShutdownRegistrar};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::Server;
use tonic::{Request, Status};

use crate::context::CallInterceptors;
use crate::error::RpcError;
use crate::service::{RpcService, ServiceDescriptor};
use crate::RpcResult;

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcServerConfig {
    /// Address to listen on.
    pub addr: SocketAddr,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 50051)),
        }
    }
}

/// gRPC listener serving one [`RpcService`].
#[derive(Debug)]
pub struct RpcServer<D: ServiceDescriptor> {
    service: RpcService<D>,
    interceptors: CallInterceptors,
}

impl<D: ServiceDescriptor> RpcServer<D> {
    /// Creates a listener with only the built-in context enrichment.
    pub fn new(service: RpcService<D>) -> Self {
        Self {
            service,
            interceptors: CallInterceptors::new(),
        }
    }

    /// Appends an interceptor; it runs after the context enrichment.
    #[must_use]
    pub fn interceptor<F>(mut self, interceptor: F) -> Self
    where
        F: Fn(Request<()>) -> Result<Request<()>, Status> + Send + Sync + 'static,
    {
        self.interceptors = self.interceptors.push(interceptor);
        self
    }

    /// Binds `addr` and serves until the registered shutdown callback runs.
    pub async fn serve(self, addr: SocketAddr, registrar: ShutdownRegistrar) -> RpcResult<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RpcError::Bind { addr, source })?;
        self.serve_with_listener(listener, registrar).await
    }

    /// Serves on an already bound listener.
    ///
    /// The shutdown callback stops accepting, then waits until in-flight
    /// calls have finished.
    pub async fn serve_with_listener(
        self,
        listener: TcpListener,
        registrar: ShutdownRegistrar,
    ) -> RpcResult<()> {
        let local_addr = listener.local_addr().ok();
        let stop = Latch::new();
        let stopped = Latch::new();

        {
            let stop = stop.clone();
            let stopped = stopped.clone();
            registrar.register(move || async move {
                tracing::info!("stopping RPC listener");
                stop.trigger();
                stopped.wait().await;
                tracing::info!("RPC listener stopped");
                Ok(())
            })?;
        }
        let _stopped = stopped.guard();

        tracing::info!(
            service = D::NAME,
            addr = ?local_addr,
            interceptors = self.interceptors.len(),
            "RPC listener started"
        );

        Server::builder()
            .add_service(InterceptedService::new(self.service, self.interceptors))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), stop.wait())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::context::CallContext;
    use crate::metadata::{http_code, HTTP_METHOD, HTTP_ROUTE};
    use crate::reply::Reply;
    use crate::service::MethodTable;
    use http::uri::PathAndQuery;
    use tonic::metadata::AsciiMetadataValue;
    use tonic::transport::Endpoint;

    struct Echo;

    impl ServiceDescriptor for Echo {
        const NAME: &'static str = "test.Echo";
    }

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Ping {
        text: String,
    }

    fn echo_methods() -> MethodTable {
        MethodTable::new().unary("Ping", |request: Request<Ping>| async move {
            let method = CallContext::of(&request)
                .map(|context| context.http_method.clone())
                .unwrap_or_default();
            let text = format!("{method} {}", request.get_ref().text);
            Reply::from_request(&request)
                .http_status(202)
                .ok(Ping { text })
        })
    }

    #[tokio::test]
    async fn test_serves_calls_and_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (registrar, registry) = ShutdownRegistrar::detached();

        let server = RpcServer::new(RpcService::<Echo>::new(echo_methods()))
            .interceptor(|request: Request<()>| Ok(request));
        let serving = tokio::spawn(server.serve_with_listener(listener, registrar));

        let channel = Endpoint::from_shared(format!("http://{addr}"))
            .unwrap()
            .connect()
            .await
            .unwrap();
        let mut client = tonic::client::Grpc::new(channel);
        client.ready().await.unwrap();

        let mut request = Request::new(Ping {
            text: "hello".to_string(),
        });
        request
            .metadata_mut()
            .insert(HTTP_METHOD, AsciiMetadataValue::from_static("POST"));
        request
            .metadata_mut()
            .insert(HTTP_ROUTE, AsciiMetadataValue::from_static("/v1/echo"));

        let response = client
            .unary(
                request,
                PathAndQuery::from_static("/test.Echo/Ping"),
                JsonCodec::<Ping, Ping>::default(),
            )
            .await
            .unwrap();
        assert_eq!(response.get_ref().text, "POST hello");
        assert_eq!(http_code(response.metadata()), Some(http::StatusCode::ACCEPTED));
        assert_eq!(response.metadata().get("path-pattern").unwrap(), "/v1/echo");

        client.ready().await.unwrap();
        let status = client
            .unary(
                Request::new(Ping::default()),
                PathAndQuery::from_static("/test.Echo/Missing"),
                JsonCodec::<Ping, Ping>::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unimplemented);

        drop(client);
        let report = registry.fire().await.unwrap();
        assert_eq!(report.failed, 0);
        tokio_test::assert_ok!(serving.await.unwrap());
    }

    #[tokio::test]
    async fn test_rejecting_interceptor() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (registrar, registry) = ShutdownRegistrar::detached();

        let server = RpcServer::new(RpcService::<Echo>::new(echo_methods()))
            .interceptor(|_request: Request<()>| Err(Status::permission_denied("closed")));
        let serving = tokio::spawn(server.serve_with_listener(listener, registrar));

        let channel = Endpoint::from_shared(format!("http://{addr}"))
            .unwrap()
            .connect()
            .await
            .unwrap();
        let mut client = tonic::client::Grpc::new(channel);
        client.ready().await.unwrap();
        let status = client
            .unary(
                Request::new(Ping::default()),
                PathAndQuery::from_static("/test.Echo/Ping"),
                JsonCodec::<Ping, Ping>::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::PermissionDenied);

        drop(client);
        registry.fire().await.unwrap();
        tokio_test::assert_ok!(serving.await.unwrap());
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();
        let (registrar, _registry) = ShutdownRegistrar::detached();

        let result = RpcServer::new(RpcService::<Echo>::new(echo_methods()))
            .serve(addr, registrar)
            .await;
        assert!(matches!(result, Err(RpcError::Bind { .. })));
    }

    #[test]
    fn test_default_config() {
        assert_eq!(RpcServerConfig::default().addr.port(), 50051);
    }
}
