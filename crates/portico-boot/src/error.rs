//! Orchestrator error types.

use thiserror::Error;

/// Boxed error returned by registrants and shutdown callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by the orchestrator.
#[derive(Debug, Error)]
pub enum BootError {
    /// `run` was called without any registrant.
    #[error("no server registered")]
    NoRegistrants,

    /// A registrant failed within the startup grace period.
    #[error("server failed to start: {source}")]
    Serve {
        /// The registrant's error.
        #[source]
        source: BoxError,
    },

    /// A registrant panicked within the startup grace period.
    #[error("server panicked during startup: {0}")]
    RegistrantPanicked(String),

    /// A registrant was added after `run` had already started the servers.
    #[error("orchestrator already running; registration rejected")]
    AlreadyStarted,

    /// Registration was attempted after the shutdown pipeline fired.
    #[error("shutdown already in progress; registration rejected")]
    ShutdownInProgress,
}

impl BootError {
    /// Wraps a registrant error.
    pub fn serve(source: impl Into<BoxError>) -> Self {
        Self::Serve {
            source: source.into(),
        }
    }

    /// Returns `true` for failures raised before any server started.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::NoRegistrants)
    }
}
