//! The `example.Example` service served over both front ends.
//!
//! `Login` and `ListItems` run on the RPC listener; the gateway exposes them
//! as `POST /v1/login` and `GET /v1/users/{username}/items`. Members and items
//! live in an [`InMemoryRepository`](repository::InMemoryRepository).

#![doc(html_root_url = "https://docs.rs/portico-demo/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod messages;
pub mod repository;
pub mod service;

use portico::boot::{BootError, BoxError, Orchestrator};
use portico::gateway::GatewayConfig;
use tokio::net::TcpListener;

pub use error::DemoError;
pub use service::{gateway, Example, ExampleService};

/// Package version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Registers the RPC listener and the gateway on `boot`.
///
/// Both listeners are bound by the caller, so the gateway can dial the RPC
/// listener as soon as it starts.
pub fn register(
    boot: &Orchestrator,
    service: &ExampleService,
    rpc_listener: TcpListener,
    gateway_listener: TcpListener,
    gateway_config: GatewayConfig,
) -> Result<(), BootError> {
    let rpc = service.rpc_server();
    boot.register(move |registrar| async move {
        rpc.serve_with_listener(rpc_listener, registrar)
            .await
            .map_err(BoxError::from)
    })?;

    let gateway = gateway(gateway_config);
    boot.register(move |registrar| async move {
        gateway
            .serve_with_listener(gateway_listener, registrar)
            .await
            .map_err(BoxError::from)
    })
}
