//! One-shot latches.
//!
//! A [`Latch`] starts open and closes once; every waiter, including those that
//! start waiting after the close, observes it. Servers use one to hand a stop
//! request from a shutdown callback to their accept loop, and the orchestrator
//! exposes one as the [`CompletionSignal`].

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

/// A cloneable one-shot signal.
///
/// # Example
///
/// ```rust
/// use portico_boot::Latch;
///
/// let latch = Latch::new();
/// let observer = latch.clone();
///
/// assert!(latch.trigger());
/// assert!(!latch.trigger());
/// assert!(observer.is_triggered());
/// ```
#[derive(Debug, Clone)]
pub struct Latch {
    sender: Arc<watch::Sender<bool>>,
}

impl Latch {
    /// Creates an untriggered latch.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Closes the latch. Returns `true` if this call was the one that closed it.
    pub fn trigger(&self) -> bool {
        let previous = self.sender.send_replace(true);
        !previous
    }

    /// Returns `true` once the latch has been triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    /// Returns a future that completes when the latch is triggered.
    ///
    /// The future owns its receiver and can outlive `self`.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut receiver = self.sender.subscribe();
        async move {
            // The sender lives as long as any Latch clone; a closed channel
            // means nobody can trigger anymore, so treat it as released.
            let _ = receiver.wait_for(|triggered| *triggered).await;
        }
    }

    /// Returns a guard that triggers the latch when dropped.
    #[must_use]
    pub fn guard(&self) -> LatchGuard {
        LatchGuard {
            latch: self.clone(),
        }
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

/// Triggers its latch on drop, including when the owning task is aborted.
#[derive(Debug)]
pub struct LatchGuard {
    latch: Latch,
}

impl Drop for LatchGuard {
    fn drop(&mut self) {
        self.latch.trigger();
    }
}

/// Closes after every shutdown level has drained.
///
/// A read-only view of the orchestrator's internal latch.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    latch: Latch,
}

impl CompletionSignal {
    pub(crate) fn new(latch: Latch) -> Self {
        Self { latch }
    }

    /// Returns `true` once shutdown callbacks have all finished.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.latch.is_triggered()
    }

    /// Waits until shutdown callbacks have all finished.
    pub async fn wait(&self) {
        self.latch.wait().await;
    }
}
