//! The gateway's HTTP listener.
//!
//! Startup dials the RPC listener first and fails when it cannot be reached.
//! Every request then passes CORS handling, the body size limit, gzip
//! decompression and payload logging before it reaches the health probes or
//! the route table.
//!
//! The shutdown callback stops the accept loop, lets in-flight connections
//! finish for up to the drain timeout, then closes the RPC connection.

use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use portico_boot::{Latch, ShutdownRegistrar};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tonic::Code;

use crate::bridge::{HeaderForwarder, ResponseHeaders};
use crate::config::GatewayConfig;
use crate::connection::RpcConnection;
use crate::error::{GatewayError, GatewayResult};
use crate::health::{health, healthz, HEALTHZ_PATH, HEALTH_PATH};
use crate::marshal::MarshalerRegistry;
use crate::middleware::{gunzip, log_payload, Cors};
use crate::route::{GatewayCall, RouteHandler, Translation};
use crate::router::Router;
use crate::status::{error_response, HttpResponse};

/// HTTP front end translating REST-style requests into RPC calls.
///
/// # Example
///
/// ```rust,ignore
/// use portico_gateway::{Gateway, GatewayConfig, UnaryRoute};
///
/// Gateway::new(GatewayConfig::default().forward_header("X-Custom-Header"))
///     .route(Method::POST, "/v1/login", UnaryRoute::<LoginReq, LoginResp>::new("/example.Example/Login"))
///     .serve(registrar)
///     .await?;
/// ```
pub struct Gateway {
    config: GatewayConfig,
    router: Router<Arc<dyn RouteHandler>>,
    marshalers: MarshalerRegistry,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .field("routes", &self.router.len())
            .field("marshalers", &self.marshalers)
            .finish()
    }
}

impl Gateway {
    /// A gateway without routes.
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            router: Router::new(),
            marshalers: MarshalerRegistry::default(),
        }
    }

    /// Binds `pattern` to `handler`. Earlier routes win over later ones.
    #[must_use]
    pub fn route<H: RouteHandler>(mut self, method: Method, pattern: &str, handler: H) -> Self {
        self.router.add(method, pattern, Arc::new(handler));
        self
    }

    /// Replaces the content marshalers.
    #[must_use]
    pub fn marshalers(mut self, registry: MarshalerRegistry) -> Self {
        self.marshalers = registry;
        self
    }

    /// Dials the RPC listener, binds the configured address and serves
    /// until the registered shutdown callback runs.
    pub async fn serve(self, registrar: ShutdownRegistrar) -> GatewayResult<()> {
        self.config.validate()?;
        let connection = RpcConnection::dial(&self.config.rpc_target, self.config.dial_timeout).await?;

        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::Bind { addr, source })?;
        self.run(listener, connection, registrar).await
    }

    /// Like [`serve`](Self::serve) on an already bound listener.
    pub async fn serve_with_listener(
        self,
        listener: TcpListener,
        registrar: ShutdownRegistrar,
    ) -> GatewayResult<()> {
        self.config.validate()?;
        let connection = RpcConnection::dial(&self.config.rpc_target, self.config.dial_timeout).await?;
        self.run(listener, connection, registrar).await
    }

    async fn run(
        self,
        listener: TcpListener,
        connection: RpcConnection,
        registrar: ShutdownRegistrar,
    ) -> GatewayResult<()> {
        let stop = Latch::new();
        let stopped = Latch::new();
        {
            let stop = stop.clone();
            let stopped = stopped.clone();
            registrar.register(move || async move {
                tracing::info!("shutting down gateway");
                stop.trigger();
                stopped.wait().await;
                Ok(())
            })?;
        }
        let _stopped = stopped.guard();

        let drain_timeout = self.config.drain_timeout;
        let shared = Arc::new(Shared {
            translation: Translation {
                forwarder: HeaderForwarder::new(self.config.forward_set()),
                response_headers: ResponseHeaders::new(self.config.response_set()),
                marshalers: self.marshalers,
            },
            cors: self.config.cors,
            health_timeout: self.config.health_timeout,
            max_body_bytes: self.config.max_body_bytes,
            router: self.router,
            connection: connection.clone(),
        });

        tracing::info!(
            addr = ?listener.local_addr().ok(),
            rpc_target = %connection.target(),
            routes = shared.router.len(),
            "gateway listening"
        );

        let tracker = ConnectionTracker::new();
        let stopping = stop.wait();
        tokio::pin!(stopping);
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let token = tracker.acquire();
                        let shared = Arc::clone(&shared);
                        let stop = stop.clone();
                        tokio::spawn(async move {
                            serve_connection(shared, stream, peer, stop).await;
                            drop(token);
                        });
                    }
                    Err(error) => tracing::error!(%error, "failed to accept connection"),
                },
                () = &mut stopping => break,
            }
        }
        drop(listener);

        tracing::info!(
            active = tracker.active_connections(),
            timeout = ?drain_timeout,
            "draining gateway connections"
        );
        if tokio::time::timeout(drain_timeout, tracker.wait_idle()).await.is_err() {
            tracing::warn!(
                active = tracker.active_connections(),
                "drain timeout reached, dropping connections"
            );
        }

        connection.close();
        tracing::info!("gateway stopped");
        Ok(())
    }
}

struct Shared {
    router: Router<Arc<dyn RouteHandler>>,
    translation: Translation,
    connection: RpcConnection,
    cors: bool,
    health_timeout: Duration,
    max_body_bytes: usize,
}

impl Shared {
    async fn handle(&self, request: Request<Incoming>, peer: SocketAddr) -> HttpResponse {
        let started = Instant::now();
        let (mut parts, body) = request.into_parts();

        let cors = if self.cors {
            Cors::from_request(&parts.headers)
        } else {
            Cors::default()
        };
        if let Some(mut preflight) = cors.preflight(&parts.method, &parts.headers, parts.uri.path()) {
            cors.apply(&mut preflight);
            return preflight;
        }

        let mut response = match Limited::new(body, self.max_body_bytes).collect().await {
            Ok(collected) => match gunzip(&mut parts.headers, collected.to_bytes(), self.max_body_bytes) {
                Ok(body) => {
                    log_payload(&body);
                    self.dispatch(&parts, body, peer).await
                }
                Err(rejected) => rejected,
            },
            Err(error) if error.is::<LengthLimitError>() => {
                tracing::warn!(limit = self.max_body_bytes, "request body too large");
                error_response(StatusCode::PAYLOAD_TOO_LARGE, Code::ResourceExhausted, "request body too large")
            }
            Err(error) => {
                tracing::warn!(%error, "failed to read request body");
                error_response(StatusCode::BAD_REQUEST, Code::InvalidArgument, "failed to read request body")
            }
        };
        cors.apply(&mut response);

        tracing::info!(
            http.method = %parts.method,
            http.request_uri = %parts.uri,
            http.status_code = response.status().as_u16(),
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "request completed"
        );
        response
    }

    async fn dispatch(&self, parts: &http::request::Parts, body: Bytes, peer: SocketAddr) -> HttpResponse {
        let path = parts.uri.path();
        match path {
            HEALTH_PATH => return health(self.connection.check(self.health_timeout).await),
            HEALTHZ_PATH => return healthz(self.connection.check(self.health_timeout).await),
            _ => {}
        }

        let Some(found) = self.router.match_route(&parts.method, path) else {
            return error_response(StatusCode::NOT_FOUND, Code::NotFound, "Not Found");
        };
        let pattern = found.pattern();
        let handler = Arc::clone(found.handler());

        handler
            .handle(GatewayCall {
                parts,
                body,
                pattern,
                params: found.into_params(),
                peer: Some(peer),
                connection: &self.connection,
                translation: &self.translation,
            })
            .await
    }
}

async fn serve_connection(shared: Arc<Shared>, stream: TcpStream, peer: SocketAddr, stop: Latch) {
    let service = service_fn(move |request: Request<Incoming>| {
        let shared = Arc::clone(&shared);
        async move { Ok::<_, Infallible>(shared.handle(request, peer).await) }
    });

    let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        () = stop.wait() => {
            connection.as_mut().graceful_shutdown();
            connection.await
        }
    };
    if let Err(error) = result {
        tracing::debug!(%peer, %error, "connection closed with error");
    }
}

/// Counts open connections so shutdown can wait for them.
#[derive(Debug, Clone, Default)]
struct ConnectionTracker {
    active: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl ConnectionTracker {
    fn new() -> Self {
        Self::default()
    }

    fn acquire(&self) -> ConnectionToken {
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionToken {
            tracker: self.clone(),
        }
    }

    fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active_connections() == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct ConnectionToken {
    tracker: ConnectionTracker,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        if self.tracker.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}
