//! Environment-driven configuration for portico processes.
//!
//! A process running both front ends reads its listen addresses, deployment
//! namespace and logging overrides from the environment (and an optional
//! `.env` file), then derives the per-crate settings from them:
//!
//! | Variable           | Default         |
//! |--------------------|-----------------|
//! | `GRPC_ADDR`        | `0.0.0.0:50051` |
//! | `GRPC_GW_ADDR`     | `0.0.0.0:8080`  |
//! | `ENV_NAMESPACE`    | none            |
//! | `ENV_SERVICE_NAME` | `portico`       |
//! | `LOG_FORMAT`       | by namespace    |
//! | `LOG_LEVEL`        | by namespace    |
//!
//! # Example
//!
//! ```rust,ignore
//! use portico_config::AppConfig;
//!
//! let config = AppConfig::from_env()?;
//! portico_telemetry::init_logging(&config.log_config())?;
//! let gateway = portico_gateway::Gateway::new(config.gateway_config());
//! ```

#![doc(html_root_url = "https://docs.rs/portico-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod app;
pub mod environment;
pub mod error;

pub use app::AppConfig;
pub use environment::Environment;
pub use error::ConfigError;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
