//! Boot orchestration for processes that run several servers at once.
//!
//! An [`Orchestrator`] owns two registries:
//!
//! - the **serve registry**: long-running server functions ("registrants"),
//!   each started concurrently when [`Orchestrator::run`] is called;
//! - the **shutdown registry**: callbacks grouped by [`ShutdownLevel`].
//!
//! A termination signal (SIGTERM/SIGINT) or cancellation of the token passed
//! to `run` fires the shutdown pipeline exactly once. Levels run in ascending
//! order, callbacks inside one level run concurrently, and the next level only
//! starts once every callback of the previous one has returned. When the last
//! level drains the [`CompletionSignal`] closes.
//!
//! Registrants receive a [`ShutdownRegistrar`] that adds a callback at the
//! reserved top-priority level, ahead of every user level, so servers stop
//! before the resources they depend on are released.
//!
//! # Example
//!
//! ```rust,ignore
//! use portico_boot::{Orchestrator, ShutdownLevel};
//! use tokio_util::sync::CancellationToken;
//!
//! let boot = Orchestrator::new();
//!
//! boot.register(|registrar| async move {
//!     let server = MyServer::bind("0.0.0.0:8080").await?;
//!     let handle = server.handle();
//!     registrar.register(move || async move {
//!         handle.stop().await;
//!         Ok(())
//!     })?;
//!     server.serve().await?;
//!     Ok(())
//! })?;
//!
//! boot.add_shutdown_handler(|| async { db.close().await }, ShutdownLevel::default())?;
//!
//! boot.run(CancellationToken::new()).await?;
//! boot.wait().await;
//! ```

#![doc(html_root_url = "https://docs.rs/portico-boot/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod latch;
mod level;
mod orchestrator;
mod serve;
pub mod shutdown;
pub mod signals;

pub use error::{BootError, BoxError};
pub use latch::{CompletionSignal, Latch, LatchGuard};
pub use level::ShutdownLevel;
pub use orchestrator::{Orchestrator, DEFAULT_GRACE_PERIOD};
pub use shutdown::{ShutdownRegistrar, ShutdownRegistry, ShutdownReport};

/// Result type for orchestrator operations.
pub type BootResult<T> = Result<T, BootError>;
