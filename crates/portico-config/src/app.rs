//! Process configuration read from the environment.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use portico_gateway::config::dial_target;
use portico_gateway::GatewayConfig;
use portico_rpc::RpcServerConfig;
use portico_telemetry::{LogConfig, LogFormat};

use crate::environment::Environment;
use crate::error::ConfigError;

/// RPC listen address.
pub const GRPC_ADDR: &str = "GRPC_ADDR";
/// Gateway listen address.
pub const GRPC_GW_ADDR: &str = "GRPC_GW_ADDR";
/// Deployment namespace.
pub const ENV_NAMESPACE: &str = "ENV_NAMESPACE";
/// Service name used in logs.
pub const ENV_SERVICE_NAME: &str = "ENV_SERVICE_NAME";
/// `json` or `pretty`.
pub const LOG_FORMAT: &str = "LOG_FORMAT";
/// Default log filter directive.
pub const LOG_LEVEL: &str = "LOG_LEVEL";

/// Settings of a process running both front ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// RPC listen address.
    pub rpc_addr: SocketAddr,
    /// Gateway listen address.
    pub gateway_addr: SocketAddr,
    /// Deployment namespace.
    pub environment: Environment,
    /// Service name used in logs.
    pub service_name: String,
    /// Log format override.
    pub log_format: Option<LogFormat>,
    /// Log level override.
    pub log_level: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rpc_addr: RpcServerConfig::default().addr,
            gateway_addr: GatewayConfig::default().listen_addr,
            environment: Environment::None,
            service_name: "portico".to_string(),
            log_format: None,
            log_level: None,
        }
    }
}

impl AppConfig {
    /// Loads `.env` when present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(error) if error.not_found() => {}
            Err(error) => return Err(ConfigError::Dotenv(error.to_string())),
        }
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads `path` as a `.env` file without touching the process
    /// environment; process variables still win over the file.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = dotenvy::from_path_iter(path)
            .map_err(|e| ConfigError::Dotenv(format!("{}: {e}", path.display())))?
            .collect::<Result<HashMap<_, _>, _>>()
            .map_err(|e| ConfigError::Dotenv(format!("{}: {e}", path.display())))?;
        Self::from_lookup(|var| std::env::var(var).ok().or_else(|| file.get(var).cloned()))
    }

    /// Reads settings through `lookup`; unset or empty variables keep their
    /// defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(value) = get(GRPC_ADDR) {
            config.rpc_addr = parse_addr(GRPC_ADDR, &value)?;
        }
        if let Some(value) = get(GRPC_GW_ADDR) {
            config.gateway_addr = parse_addr(GRPC_GW_ADDR, &value)?;
        }
        if let Some(value) = get(ENV_NAMESPACE) {
            config.environment = value
                .parse()
                .map_err(|reason: String| ConfigError::invalid_value(ENV_NAMESPACE, reason))?;
        }
        if let Some(value) = get(ENV_SERVICE_NAME) {
            config.service_name = value;
        }
        if let Some(value) = get(LOG_FORMAT) {
            config.log_format = Some(
                value
                    .parse()
                    .map_err(|reason: String| ConfigError::invalid_value(LOG_FORMAT, reason))?,
            );
        }
        config.log_level = get(LOG_LEVEL);

        Ok(config)
    }

    /// Logging setup: pretty debug output in development, JSON otherwise,
    /// with the `LOG_*` overrides applied.
    pub fn log_config(&self) -> LogConfig {
        let mut log = if self.environment.is_development() {
            LogConfig::development()
        } else {
            LogConfig::production()
        };
        log = log.with_service_name(self.service_name.clone());
        if let Some(format) = self.log_format {
            log = log.with_format(format);
        }
        if let Some(level) = &self.log_level {
            log = log.with_level(level.clone());
        }
        log
    }

    /// RPC listener settings.
    pub fn rpc_config(&self) -> RpcServerConfig {
        RpcServerConfig {
            addr: self.rpc_addr,
        }
    }

    /// Gateway settings: dials the RPC listener, CORS off in production.
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig::default()
            .listen_addr(self.gateway_addr)
            .rpc_target(dial_target(&self.rpc_addr.to_string()))
            .cors(!self.environment.is_production())
    }
}

/// Accepts `host:port` and the bare `:port` form.
fn parse_addr(var: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    let normalized = match value.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => value.to_string(),
    };
    normalized
        .parse()
        .map_err(|e| ConfigError::invalid_value(var, format!("'{value}': {e}")))
}
