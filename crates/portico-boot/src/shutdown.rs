//! The shutdown registry.
//!
//! Callbacks are grouped by [`ShutdownLevel`]. Firing takes the registry lock
//! once, moves every callback out, and marks the registry as fired; later
//! registrations are rejected with [`BootError::ShutdownInProgress`] instead of
//! being silently dropped.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinSet;

use crate::error::{BootError, BoxError};
use crate::level::ShutdownLevel;
use crate::BootResult;

type ShutdownFuture = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send + 'static>>;
type ShutdownCallback = Box<dyn FnOnce() -> ShutdownFuture + Send + 'static>;

#[derive(Default)]
struct RegistryState {
    levels: BTreeMap<ShutdownLevel, Vec<ShutdownCallback>>,
    fired: bool,
}

/// Priority-ordered collection of shutdown callbacks.
///
/// Cloning is cheap; clones share the same callbacks.
#[derive(Clone, Default)]
pub struct ShutdownRegistry {
    state: Arc<Mutex<RegistryState>>,
}

/// Outcome of one shutdown sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Number of levels executed.
    pub levels: usize,
    /// Number of callbacks attempted.
    pub attempted: usize,
    /// Number of callbacks that returned an error or panicked.
    pub failed: usize,
    /// Wall time of the whole sequence.
    pub elapsed: Duration,
}

impl ShutdownRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a callback under `level`.
    ///
    /// Registering after the registry has fired is not allowed.
    pub fn add<F, Fut>(&self, level: ShutdownLevel, callback: F) -> BootResult<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.fired {
            return Err(BootError::ShutdownInProgress);
        }
        state
            .levels
            .entry(level)
            .or_default()
            .push(Box::new(move || -> ShutdownFuture { Box::pin(callback()) }));
        Ok(())
    }

    /// Total number of pending callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().levels.values().map(Vec::len).sum()
    }

    /// Returns `true` if no callback is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once [`fire`](Self::fire) has taken the snapshot.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.state.lock().fired
    }

    /// Runs every registered callback, level by level.
    ///
    /// Returns `None` if the registry already fired; only the first caller
    /// executes the sequence.
    pub async fn fire(&self) -> Option<ShutdownReport> {
        let snapshot = {
            let mut state = self.state.lock();
            if state.fired {
                return None;
            }
            state.fired = true;
            std::mem::take(&mut state.levels)
        };

        let started = Instant::now();
        let mut report = ShutdownReport {
            levels: snapshot.len(),
            attempted: 0,
            failed: 0,
            elapsed: Duration::ZERO,
        };

        for (level, callbacks) in snapshot {
            tracing::debug!(level = %level, callbacks = callbacks.len(), "running shutdown level");
            report.attempted += callbacks.len();

            let mut wave = JoinSet::new();
            for (index, callback) in callbacks.into_iter().enumerate().rev() {
                wave.spawn(async move { (index, callback().await) });
            }

            while let Some(joined) = wave.join_next().await {
                match joined {
                    Ok((_, Ok(()))) => {}
                    Ok((index, Err(error))) => {
                        report.failed += 1;
                        tracing::error!(level = %level, callback = index, error = %error, "shutdown callback failed");
                    }
                    Err(error) => {
                        report.failed += 1;
                        tracing::error!(level = %level, error = %error, "shutdown callback panicked");
                    }
                }
            }
        }

        report.elapsed = started.elapsed();
        Some(report)
    }
}

impl fmt::Debug for ShutdownRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ShutdownRegistry")
            .field("levels", &state.levels.keys().collect::<Vec<_>>())
            .field("fired", &state.fired)
            .finish()
    }
}

/// Capability handed to each registrant for registering its own teardown.
///
/// The callback lands at the reserved top-priority level, so it runs before
/// any user-level callback. `register` consumes the registrar: a registrant
/// adds at most one callback.
#[derive(Debug)]
pub struct ShutdownRegistrar {
    registry: ShutdownRegistry,
}

impl ShutdownRegistrar {
    pub(crate) fn new(registry: ShutdownRegistry) -> Self {
        Self { registry }
    }

    /// Registers the server's shutdown callback.
    pub fn register<F, Fut>(self, callback: F) -> BootResult<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.registry.add(ShutdownLevel::top_priority(), callback)
    }

    /// A registrar that is not attached to any orchestrator.
    ///
    /// Useful for running a server on its own; its callback is kept in a
    /// private registry that can be fired through the returned handle.
    pub fn detached() -> (Self, ShutdownRegistry) {
        let registry = ShutdownRegistry::new();
        (Self::new(registry.clone()), registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder(
        log: &Arc<std::sync::Mutex<Vec<&'static str>>>,
        name: &'static str,
    ) -> impl FnOnce() -> std::future::Ready<Result<(), BoxError>> + Send + 'static {
        let log = Arc::clone(log);
        move || {
            log.lock().unwrap().push(name);
            std::future::ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_empty_registry_fires_once() {
        let registry = ShutdownRegistry::new();
        let report = registry.fire().await.unwrap();
        assert_eq!(report.attempted, 0);
        assert!(registry.fire().await.is_none());
    }

    #[tokio::test]
    async fn test_levels_run_in_ascending_order() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let registry = ShutdownRegistry::new();

        registry.add(ShutdownLevel::user(2), recorder(&log, "two")).unwrap();
        registry.add(ShutdownLevel::user(0), recorder(&log, "zero")).unwrap();
        registry
            .add(ShutdownLevel::top_priority(), recorder(&log, "server"))
            .unwrap();
        registry.add(ShutdownLevel::user(1), recorder(&log, "one")).unwrap();

        let report = registry.fire().await.unwrap();
        assert_eq!(report.levels, 4);
        assert_eq!(report.attempted, 4);
        assert_eq!(*log.lock().unwrap(), vec!["server", "zero", "one", "two"]);
    }

    #[tokio::test]
    async fn test_level_waits_for_slow_callbacks() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let registry = ShutdownRegistry::new();

        let slow = Arc::clone(&log);
        registry
            .add(ShutdownLevel::user(0), move || async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                slow.lock().unwrap().push("a");
                Ok(())
            })
            .unwrap();
        registry.add(ShutdownLevel::user(1), recorder(&log, "b")).unwrap();
        registry.add(ShutdownLevel::user(1), recorder(&log, "c")).unwrap();

        registry.fire().await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log[0], "a");
        assert_eq!(log.len(), 3);
        assert!(log[1..].contains(&"b"));
        assert!(log[1..].contains(&"c"));
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_siblings_or_later_levels() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = ShutdownRegistry::new();

        registry
            .add(ShutdownLevel::user(0), || async { Err::<(), BoxError>("boom".into()) })
            .unwrap();
        registry
            .add(ShutdownLevel::user(0), || async {
                if true {
                    panic!("callback panicked");
                }
                Ok(())
            })
            .unwrap();
        for level in [0, 1] {
            let counter = Arc::clone(&counter);
            registry
                .add(ShutdownLevel::user(level), move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }

        let report = registry.fire().await.unwrap();
        assert_eq!(report.attempted, 4);
        assert_eq!(report.failed, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_registration_after_fire_is_rejected() {
        let registry = ShutdownRegistry::new();
        registry.fire().await.unwrap();

        let result = registry.add(ShutdownLevel::default(), || async { Ok(()) });
        assert!(matches!(result, Err(BootError::ShutdownInProgress)));
    }

    #[tokio::test]
    async fn test_detached_registrar() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (registrar, registry) = ShutdownRegistrar::detached();

        let hits = Arc::clone(&counter);
        registrar
            .register(move || async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        assert_eq!(registry.len(), 1);

        registry.fire().await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }
}
