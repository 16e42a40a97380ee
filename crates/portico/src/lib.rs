//! # Portico
//!
//! **One process, two front ends, one shutdown sequence.**
//!
//! Portico hosts a gRPC listener and an HTTP gateway that translates
//! REST-style requests into unary calls on that listener:
//!
//! - **Boot**: an orchestrator runs every registered server, waits for a
//!   termination signal and fires the shutdown callbacks in priority order
//!   within a grace period.
//! - **RPC**: services are described by hand and carry JSON payloads; handlers
//!   can override the gateway's HTTP status and add response headers through
//!   call metadata.
//! - **Gateway**: `{param}` routes, content negotiation, multipart uploads,
//!   gzip request bodies, CORS and health probes.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use portico::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     init_logging(&config.log_config())?;
//!
//!     let orchestrator = Orchestrator::new();
//!     let rpc = config.rpc_config();
//!     orchestrator.register(move |registrar| async move {
//!         RpcServer::new(service()).serve(rpc.addr, registrar).await.map_err(Into::into)
//!     })?;
//!     let gateway = config.gateway_config();
//!     orchestrator.register(move |registrar| async move {
//!         Gateway::new(gateway).route(/* ... */).serve(registrar).await.map_err(Into::into)
//!     })?;
//!
//!     orchestrator.run(tokio_util::sync::CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/portico/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Lifecycle and shutdown
pub use portico_boot as boot;

// gRPC listener
pub use portico_rpc as rpc;

// HTTP gateway
pub use portico_gateway as gateway;

// Logging
pub use portico_telemetry as telemetry;

// Environment configuration
pub use portico_config as config;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use portico::prelude::*;
/// ```
pub mod prelude {
    pub use portico_boot::{
        BootError, BoxError, Latch, Orchestrator, ShutdownLevel, ShutdownRegistrar,
        ShutdownRegistry, ShutdownReport,
    };

    pub use portico_rpc::{
        inject_http_code, inject_http_header, CallContext, CallMetadata, MethodTable, Reply,
        RpcServer, RpcServerConfig, RpcService, ServiceDescriptor,
    };

    pub use portico_gateway::{
        FormFields, Gateway, GatewayConfig, GatewayError, HttpBody, Message, UnaryRoute,
    };

    pub use portico_telemetry::{init_logging, LogConfig, LogFormat};

    pub use portico_config::{AppConfig, Environment};
}
