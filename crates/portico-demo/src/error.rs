//! Service errors and their RPC status.

use thiserror::Error;
use tonic::{Code, Status};

/// Errors raised by the example service.
#[derive(Debug, Error)]
pub enum DemoError {
    /// The request failed validation.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Unknown user or wrong password.
    #[error("wrong username or password")]
    Unauthenticated,

    /// The repository failed.
    #[error("repository error: {0}")]
    Repository(String),
}

impl DemoError {
    /// HTTP status the gateway answers with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Unauthenticated => 401,
            Self::Repository(_) => 500,
        }
    }

    /// RPC code of the error.
    pub fn code(&self) -> Code {
        match self {
            Self::Validation(_) => Code::InvalidArgument,
            Self::Unauthenticated => Code::Unauthenticated,
            Self::Repository(_) => Code::Internal,
        }
    }
}

impl From<DemoError> for Status {
    fn from(error: DemoError) -> Self {
        Status::new(error.code(), error.to_string())
    }
}
