//! HTTP gateway in front of a `portico-rpc` listener.
//!
//! The gateway dials the RPC listener once, then translates REST-style
//! requests into unary RPC calls:
//!
//! - the [`router`] matches `{param}` patterns, first match wins;
//! - the [`marshal`] registry decodes the body by `Content-Type` (JSON, forms,
//!   multipart file uploads, plain text) and encodes the reply by `Accept`;
//! - the [`bridge`] copies request attributes and selected headers into call
//!   metadata and turns response metadata back into headers and an optional
//!   override status;
//! - [`health`] probes report the readiness of the RPC connection.
//!
//! # Example
//!
//! ```rust,ignore
//! use http::Method;
//! use portico_gateway::{Gateway, GatewayConfig, UnaryRoute};
//!
//! let config = GatewayConfig::default()
//!     .rpc_target("127.0.0.1:50051")
//!     .forward_header("X-Custom-Header");
//!
//! Gateway::new(config)
//!     .route(Method::POST, "/v1/login", UnaryRoute::<LoginReq, LoginResp>::new("/example.Example/Login"))
//!     .route(
//!         Method::GET,
//!         "/v1/users/{username}/items",
//!         UnaryRoute::<ListItemsReq, ListItemsResp>::new("/example.Example/ListItems").query(),
//!     )
//!     .serve(registrar)
//!     .await?;
//! ```

#![doc(html_root_url = "https://docs.rs/portico-gateway/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod bridge;
pub mod config;
pub mod connection;
pub mod error;
pub mod health;
pub mod marshal;
pub mod message;
mod middleware;
pub mod route;
pub mod router;
mod server;
pub mod status;

pub use config::GatewayConfig;
pub use connection::{ConnectionState, RpcConnection};
pub use error::{GatewayError, GatewayResult, MarshalError};
pub use marshal::{Marshaler, MarshalerRegistry};
pub use message::{FormFields, HttpBody, Message};
pub use route::{RouteHandler, UnaryRoute};
pub use server::Gateway;
pub use status::ErrorBody;
