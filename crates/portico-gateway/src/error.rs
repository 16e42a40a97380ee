//! Error types for the gateway.

use std::net::SocketAddr;

use portico_boot::BootError;
use thiserror::Error;

/// Control-plane errors: configuration, startup and dialing.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// The RPC listener could not be dialed.
    #[error("failed to dial RPC listener at {target}: {source}")]
    Dial {
        /// Dialed address.
        target: String,
        /// Underlying error.
        #[source]
        source: tonic::transport::Error,
    },

    /// The HTTP listener could not bind its address.
    #[error("failed to bind gateway on {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The shutdown callback could not be registered.
    #[error("failed to register gateway shutdown callback: {0}")]
    Registration(#[from] BootError),

    /// A payload could not be translated.
    #[error(transparent)]
    Marshal(#[from] MarshalError),
}

impl GatewayError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Dial { .. } => 502,
            Self::Marshal(error) => error.status_code(),
            Self::Config { .. } | Self::Bind { .. } | Self::Registration(_) => 500,
        }
    }

    /// Error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Dial { .. } => "dial",
            Self::Bind { .. } => "bind",
            Self::Registration(_) => "registration",
            Self::Marshal(_) => "marshal",
        }
    }
}

/// Data-plane errors raised while decoding or encoding one payload.
#[derive(Debug, Error)]
pub enum MarshalError {
    /// The payload does not fit the target message.
    #[error("failed to decode payload: {0}")]
    Decode(String),

    /// The message could not be written in the selected format.
    #[error("failed to encode message: {0}")]
    Encode(String),

    /// A multipart request without a boundary parameter.
    #[error("multipart payload has no boundary")]
    MissingBoundary,

    /// A multipart request without any file part.
    #[error("multipart payload has no file part")]
    NoFilePart,

    /// The uploaded spreadsheet could not be read.
    #[error("unreadable spreadsheet: {0}")]
    UnsupportedSpreadsheet(String),

    /// Scratch file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MarshalError {
    pub(crate) fn decode(error: impl ToString) -> Self {
        Self::Decode(error.to_string())
    }

    pub(crate) fn encode(error: impl ToString) -> Self {
        Self::Encode(error.to_string())
    }

    /// Returns `true` when the caller sent a bad payload.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Decode(_) | Self::MissingBoundary | Self::NoFilePart | Self::UnsupportedSpreadsheet(_)
        )
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }

    /// gRPC code reported in the error body.
    pub fn rpc_code(&self) -> tonic::Code {
        if self.is_client_error() {
            tonic::Code::InvalidArgument
        } else {
            tonic::Code::Internal
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(GatewayError::config("missing target").status_code(), 500);
        assert_eq!(GatewayError::from(MarshalError::NoFilePart).status_code(), 400);
        assert_eq!(
            GatewayError::from(MarshalError::encode("cycle")).status_code(),
            500
        );
    }

    #[test]
    fn test_client_errors() {
        assert!(MarshalError::decode("bad json").is_client_error());
        assert!(MarshalError::MissingBoundary.is_client_error());
        assert!(!MarshalError::Io(std::io::Error::other("disk full")).is_client_error());
        assert_eq!(MarshalError::NoFilePart.rpc_code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn test_display_and_category() {
        let err = GatewayError::config("rpc_target is required");
        assert!(err.to_string().contains("Configuration error"));
        assert_eq!(err.category(), "config");
        assert_eq!(
            GatewayError::from(MarshalError::MissingBoundary).to_string(),
            "multipart payload has no boundary"
        );
    }
}
