//! Structured logging for portico services.
//!
//! Both front ends (the RPC listener and the HTTP gateway) and the boot
//! orchestrator log through `tracing`. This crate owns the subscriber setup
//! and the field names those logs share, so that an RPC call and the gateway
//! request that caused it can be correlated by `trace_id`.
//!
//! # Example
//!
//! ```rust,ignore
//! use portico_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::production().with_service_name("example"))?;
//! tracing::info!(http.route = "/v1/login", "request accepted");
//! ```

#![doc(html_root_url = "https://docs.rs/portico-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;

pub use error::TelemetryError;
pub use logging::{fields, init_logging, LogConfig, LogFormat};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
