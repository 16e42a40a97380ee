//! The gateway's client connection to the RPC listener.
//!
//! The connection is dialed once at startup and shared by every route. Calls
//! record the readiness they observe; the health probes run a fresh
//! [`check`](RpcConnection::check) so a listener that went away is reported
//! even when no call has failed yet.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http::uri::PathAndQuery;
use portico_rpc::JsonCodec;
use tonic::transport::{Channel, Endpoint};
use serde_json::Value;
use tonic::{Code, Request, Response, Status};

use crate::error::{GatewayError, GatewayResult};
use crate::message::Message;

/// Method called by [`RpcConnection::check`]. Any status other than
/// `UNAVAILABLE`, `DEADLINE_EXCEEDED` or `UNKNOWN` means the listener
/// answered, `UNIMPLEMENTED` included. Transport errors surface as one of the
/// three.
pub const READINESS_PATH: &str = "/grpc.health.v1.Health/Check";

/// Readiness of the RPC connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Not dialed yet.
    Idle = 0,
    /// Dial in progress.
    Connecting = 1,
    /// The last dial or call reached the listener.
    Ready = 2,
    /// The last call found the listener unavailable.
    TransientFailure = 3,
    /// Closed by gateway shutdown.
    Shutdown = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Ready,
            3 => Self::TransientFailure,
            4 => Self::Shutdown,
            _ => Self::Idle,
        }
    }

    /// Upper-case name, as reported by the health probes.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Connecting => "CONNECTING",
            Self::Ready => "READY",
            Self::TransientFailure => "TRANSIENT_FAILURE",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared readiness cell.
#[derive(Debug, Clone)]
pub(crate) struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub(crate) fn new(state: ConnectionState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    pub(crate) fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Stores `state` unless the connection is already shut down.
    pub(crate) fn set(&self, state: ConnectionState) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != ConnectionState::Shutdown as u8).then_some(state as u8)
            });
    }

    fn shut_down(&self) {
        self.0.store(ConnectionState::Shutdown as u8, Ordering::Release);
    }
}

/// Client connection to the RPC listener.
#[derive(Debug, Clone)]
pub struct RpcConnection {
    channel: Channel,
    target: Arc<str>,
    state: StateCell,
}

impl RpcConnection {
    /// Dials `target` (`host:port`), waiting at most `timeout`.
    pub async fn dial(target: &str, timeout: Duration) -> GatewayResult<Self> {
        let state = StateCell::new(ConnectionState::Connecting);
        let dial_error = |source: tonic::transport::Error| GatewayError::Dial {
            target: target.to_string(),
            source,
        };

        let endpoint = Endpoint::from_shared(format!("http://{target}"))
            .map_err(dial_error)?
            .connect_timeout(timeout);

        tracing::debug!(target = %target, "dialing RPC listener");
        let channel = endpoint.connect().await.map_err(dial_error)?;

        state.set(ConnectionState::Ready);
        tracing::info!(target = %target, "connected to RPC listener");

        Ok(Self {
            channel,
            target: Arc::from(target),
            state,
        })
    }

    /// Address the connection was dialed with.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Readiness recorded by the last dial or call.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Asks the listener whether it is serving, waiting at most `timeout`.
    ///
    /// The answer is returned without being recorded.
    pub async fn check(&self, timeout: Duration) -> ConnectionState {
        if self.state() == ConnectionState::Shutdown {
            return ConnectionState::Shutdown;
        }

        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        let call = async {
            grpc.ready()
                .await
                .map_err(|error| Status::unavailable(error.to_string()))?;
            grpc.unary(
                Request::new(Value::Object(serde_json::Map::new())),
                PathAndQuery::from_static(READINESS_PATH),
                JsonCodec::<Value, Value>::default(),
            )
            .await
        };

        match tokio::time::timeout(timeout, call).await {
            Err(_) => ConnectionState::TransientFailure,
            Ok(Err(status))
                if matches!(
                    status.code(),
                    Code::Unavailable | Code::DeadlineExceeded | Code::Unknown
                ) =>
            {
                tracing::debug!(target = %self.target, %status, "RPC listener not serving");
                ConnectionState::TransientFailure
            }
            Ok(_) => ConnectionState::Ready,
        }
    }

    /// Performs one unary call of `path`, e.g. `/example.Example/Login`.
    pub async fn unary<Req, Resp>(
        &self,
        path: PathAndQuery,
        request: Request<Req>,
    ) -> Result<Response<Resp>, Status>
    where
        Req: Message,
        Resp: Message,
    {
        if self.state() == ConnectionState::Shutdown {
            return Err(Status::unavailable("connection is shut down"));
        }

        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        if let Err(error) = grpc.ready().await {
            self.state.set(ConnectionState::TransientFailure);
            return Err(Status::unavailable(format!("RPC listener not ready: {error}")));
        }

        let result = grpc
            .unary(request, path, JsonCodec::<Req, Resp>::default())
            .await;
        match &result {
            Err(status) if status.code() == Code::Unavailable => {
                self.state.set(ConnectionState::TransientFailure);
            }
            _ => self.state.set(ConnectionState::Ready),
        }
        result
    }

    /// Marks the connection shut down; later calls fail with `UNAVAILABLE`.
    pub fn close(&self) {
        self.state.shut_down();
        tracing::debug!(target = %self.target, "RPC connection closed");
    }
}
