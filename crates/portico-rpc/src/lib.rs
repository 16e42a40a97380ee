//! gRPC listener for services described by hand.
//!
//! Services are declared without protobuf code generation: a
//! [`ServiceDescriptor`] names the service, and a [`MethodTable`] maps each
//! method to a typed async handler. Messages are any `serde` types; they
//! travel in standard gRPC framing with a JSON codec ([`JsonCodec`]), so the
//! HTTP gateway and the listener agree on the wire format without a schema
//! compiler.
//!
//! Every call passes through an interceptor chain that lifts the metadata
//! injected by the gateway into a [`CallContext`] and runs the handler inside
//! a span carrying those fields.
//!
//! # Example
//!
//! ```rust,ignore
//! use portico_rpc::{MethodTable, Reply, RpcServer, RpcService, ServiceDescriptor};
//!
//! struct Greeter;
//! impl ServiceDescriptor for Greeter {
//!     const NAME: &'static str = "hello.Greeter";
//! }
//!
//! let methods = MethodTable::new().unary("SayHello", |request: tonic::Request<HelloReq>| async move {
//!     let reply = HelloResp { message: format!("hello {}", request.get_ref().name) };
//!     Reply::from_request(&request).http_status(201).ok(reply)
//! });
//!
//! RpcServer::new(RpcService::<Greeter>::new(methods))
//!     .serve(addr, registrar)
//!     .await?;
//! ```

#![doc(html_root_url = "https://docs.rs/portico-rpc/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod context;
pub mod error;
pub mod metadata;
pub mod reply;
pub mod server;
pub mod service;

pub use codec::JsonCodec;
pub use context::{CallContext, CallInterceptors};
pub use error::RpcError;
pub use metadata::{inject_http_code, inject_http_header, CallMetadata};
pub use reply::Reply;
pub use server::{RpcServer, RpcServerConfig};
pub use service::{MethodTable, RpcService, ServiceDescriptor};

/// Result type for RPC listener operations.
pub type RpcResult<T> = Result<T, RpcError>;
