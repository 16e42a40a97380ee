//! RPC listener errors.

use std::net::SocketAddr;

use portico_boot::BootError;
use thiserror::Error;

/// Errors raised by the RPC listener and the metadata helpers.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The listener could not bind its address.
    #[error("failed to bind RPC listener on {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The transport failed while serving.
    #[error("RPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// The value has no standard HTTP status text.
    #[error("invalid HTTP status code: {0}")]
    InvalidStatusCode(u16),

    /// A metadata key or value is not valid ASCII metadata.
    #[error("invalid metadata entry '{key}': {reason}")]
    InvalidMetadata {
        /// Offending key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The shutdown callback could not be registered.
    #[error("failed to register RPC shutdown callback: {0}")]
    Registration(#[from] BootError),
}

impl RpcError {
    pub(crate) fn invalid_metadata(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidMetadata {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}
