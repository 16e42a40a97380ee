//! Gateway configuration.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{GatewayError, GatewayResult};

/// Default startup dial timeout, kept below the boot grace period so a
/// failed dial surfaces while the orchestrator still watches for it.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(2);

/// Default limit on a request body, before and after gzip decompression.
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Gateway settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Address the HTTP listener binds.
    pub listen_addr: SocketAddr,
    /// Address of the RPC listener, `host:port`.
    pub rpc_target: String,
    /// How long the startup dial may take.
    pub dial_timeout: Duration,
    /// How long a health probe waits for the RPC listener to answer.
    pub health_timeout: Duration,
    /// How long shutdown waits for in-flight HTTP connections.
    pub drain_timeout: Duration,
    /// Largest request body accepted, compressed or not.
    pub max_body_bytes: usize,
    /// Request headers forwarded under the reserved prefix.
    pub forward_headers: Vec<String>,
    /// Response metadata keys written back as raw headers.
    pub response_headers: Vec<String>,
    /// Reflect `Origin` and answer pre-flight requests.
    pub cors: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            rpc_target: "127.0.0.1:50051".to_string(),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            health_timeout: Duration::from_secs(1),
            drain_timeout: Duration::from_secs(10),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            forward_headers: Vec::new(),
            response_headers: Vec::new(),
            cors: true,
        }
    }
}

impl GatewayConfig {
    /// Sets the listen address.
    #[must_use]
    pub fn listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    /// Sets the RPC target.
    #[must_use]
    pub fn rpc_target(mut self, target: impl Into<String>) -> Self {
        self.rpc_target = target.into();
        self
    }

    /// Sets the dial timeout.
    #[must_use]
    pub fn dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Sets the health probe timeout.
    #[must_use]
    pub fn health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    /// Sets the drain timeout.
    #[must_use]
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Sets the request body limit.
    #[must_use]
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Adds a request header to forward under the reserved prefix.
    #[must_use]
    pub fn forward_header(mut self, name: impl Into<String>) -> Self {
        self.forward_headers.push(name.into());
        self
    }

    /// Adds a response metadata key to pass back as a raw header.
    #[must_use]
    pub fn response_header(mut self, name: impl Into<String>) -> Self {
        self.response_headers.push(name.into());
        self
    }

    /// Enables or disables CORS handling.
    #[must_use]
    pub fn cors(mut self, enabled: bool) -> Self {
        self.cors = enabled;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.rpc_target.trim().is_empty() {
            return Err(GatewayError::config("rpc_target is required"));
        }
        if self.dial_timeout.is_zero() {
            return Err(GatewayError::config("dial_timeout must be positive"));
        }
        if self.health_timeout.is_zero() {
            return Err(GatewayError::config("health_timeout must be positive"));
        }
        if self.max_body_bytes == 0 {
            return Err(GatewayError::config("max_body_bytes must be positive"));
        }
        if let Some(name) = self
            .forward_headers
            .iter()
            .chain(&self.response_headers)
            .find(|name| http::HeaderName::from_bytes(name.as_bytes()).is_err())
        {
            return Err(GatewayError::config(format!("invalid header name: {name}")));
        }
        Ok(())
    }

    pub(crate) fn forward_set(&self) -> HashSet<String> {
        lowercase_set(&self.forward_headers)
    }

    pub(crate) fn response_set(&self) -> HashSet<String> {
        lowercase_set(&self.response_headers)
    }
}

fn lowercase_set(names: &[String]) -> HashSet<String> {
    names.iter().map(|name| name.to_ascii_lowercase()).collect()
}

/// Turns a listen address into something dialable.
///
/// Wildcard hosts, including the bare `:port` form, are dialed on loopback.
pub fn dial_target(listen: &str) -> String {
    let listen = listen.trim();
    if let Some(port) = listen.strip_prefix(':') {
        return format!("127.0.0.1:{port}");
    }
    match listen.parse::<SocketAddr>() {
        Ok(addr) if addr.ip().is_unspecified() => format!("127.0.0.1:{}", addr.port()),
        _ => listen.to_string(),
    }
}
