//! The boot orchestrator.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{BootError, BoxError};
use crate::latch::{CompletionSignal, Latch};
use crate::level::ShutdownLevel;
use crate::serve::ServeRegistry;
use crate::shutdown::{ShutdownRegistrar, ShutdownRegistry};
use crate::signals;
use crate::BootResult;

/// How long a registrant may fail before startup counts as successful.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

struct Inner {
    serve: ServeRegistry,
    shutdown: ShutdownRegistry,
    requested: Latch,
    completion: Latch,
}

impl Inner {
    async fn fire(&self) {
        if let Some(report) = self.shutdown.fire().await {
            tracing::info!(
                levels = report.levels,
                attempted = report.attempted,
                failed = report.failed,
                duration_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
                "shutdown callbacks finished within {:.3}s",
                report.elapsed.as_secs_f64()
            );
        }
        self.completion.trigger();
    }
}

/// Supervises a set of servers as one process.
///
/// Cloning is cheap; clones drive the same registries, so a clone can be
/// moved into a task to call [`wait`](Self::wait) or
/// [`trigger_shutdown`](Self::trigger_shutdown).
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
    grace_period: Duration,
    os_signals: bool,
}

impl Orchestrator {
    /// Creates an orchestrator with the default grace period that listens
    /// for SIGTERM and SIGINT.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                serve: ServeRegistry::default(),
                shutdown: ShutdownRegistry::new(),
                requested: Latch::new(),
                completion: Latch::new(),
            }),
            grace_period: DEFAULT_GRACE_PERIOD,
            os_signals: true,
        }
    }

    /// Sets the startup grace period.
    #[must_use]
    pub fn grace_period(mut self, period: Duration) -> Self {
        self.grace_period = period;
        self
    }

    /// Enables or disables the OS signal listener.
    #[must_use]
    pub fn os_signals(mut self, enabled: bool) -> Self {
        self.os_signals = enabled;
        self
    }

    /// Adds a registrant.
    ///
    /// The function is started by [`run`](Self::run) and should block for
    /// the lifetime of its server. It receives a [`ShutdownRegistrar`] to
    /// register the callback that stops it.
    pub fn register<F, Fut>(&self, serve: F) -> BootResult<()>
    where
        F: FnOnce(ShutdownRegistrar) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        if self.inner.shutdown.is_fired() {
            return Err(BootError::ShutdownInProgress);
        }
        self.inner.serve.add(serve)
    }

    /// Adds a shutdown callback at a user level.
    pub fn add_shutdown_handler<F, Fut>(
        &self,
        callback: F,
        level: impl Into<ShutdownLevel>,
    ) -> BootResult<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.inner.shutdown.add(level.into(), callback)
    }

    /// Number of registrants waiting for `run`.
    #[must_use]
    pub fn registrants(&self) -> usize {
        self.inner.serve.len()
    }

    /// Fires the shutdown sequence as if a termination signal had arrived.
    ///
    /// A request made before `run` is kept and fires as soon as `run` arms
    /// the pipeline. Repeated calls are no-ops.
    pub fn trigger_shutdown(&self) {
        self.inner.requested.trigger();
    }

    /// A handle on the completion signal.
    #[must_use]
    pub fn completion(&self) -> CompletionSignal {
        CompletionSignal::new(self.inner.completion.clone())
    }

    /// Blocks until every shutdown level has finished.
    pub async fn wait(&self) {
        self.inner.completion.wait().await;
    }

    /// Starts every registrant and supervises them.
    ///
    /// Returns the first registrant error raised within the grace period,
    /// after shutting everything else down. Otherwise returns `Ok(())` once
    /// every registrant has returned. A registrant failing after the grace
    /// period is logged and shuts the others down.
    ///
    /// A second call fails with [`BootError::AlreadyStarted`].
    pub async fn run(&self, cancel: CancellationToken) -> BootResult<()> {
        let registrants = self.inner.serve.take()?;
        if registrants.is_empty() {
            return Err(BootError::NoRegistrants);
        }

        let token = cancel.child_token();
        self.arm(token.clone());

        let mut servers = JoinSet::new();
        for (index, registrant) in registrants.into_iter().enumerate() {
            let registrar = ShutdownRegistrar::new(self.inner.shutdown.clone());
            servers.spawn(async move { (index, registrant(registrar).await) });
        }

        let grace = tokio::time::sleep(self.grace_period);
        tokio::pin!(grace);

        loop {
            tokio::select! {
                joined = servers.join_next() => {
                    let failure = match joined {
                        None => break,
                        Some(Ok((_, Ok(())))) => continue,
                        Some(Ok((index, Err(error)))) => {
                            tracing::error!(server = index, error = %error, "server failed to start");
                            BootError::serve(error)
                        }
                        Some(Err(error)) => {
                            tracing::error!(error = %error, "server panicked during startup");
                            BootError::RegistrantPanicked(error.to_string())
                        }
                    };
                    self.abort_startup(&token, servers).await;
                    return Err(failure);
                }
                () = &mut grace => {
                    tracing::info!(
                        servers = servers.len(),
                        "start serving without error within {:?}",
                        self.grace_period
                    );
                    break;
                }
            }
        }

        while let Some(joined) = servers.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((index, Err(error))) => {
                    tracing::error!(server = index, error = %error, "server stopped with error, shutting down");
                    token.cancel();
                }
                Err(error) => {
                    tracing::error!(error = %error, "server panicked, shutting down");
                    token.cancel();
                }
            }
        }

        // Nothing left to serve; release user-level resources too.
        token.cancel();
        Ok(())
    }

    async fn abort_startup(
        &self,
        token: &CancellationToken,
        mut servers: JoinSet<(usize, Result<(), BoxError>)>,
    ) {
        token.cancel();
        self.inner.completion.wait().await;
        servers.shutdown().await;
    }

    fn arm(&self, token: CancellationToken) {
        let inner = Arc::clone(&self.inner);
        let os_signals = self.os_signals;

        tokio::spawn(async move {
            let logger = os_signals.then(|| tokio::spawn(signals::log_other_signals()));

            tokio::select! {
                signal = signals::wait_for_termination(), if os_signals => {
                    tracing::info!(signal = %signal, "termination signal received, shutting down");
                }
                () = token.cancelled() => {
                    tracing::info!("context cancelled, shutting down");
                }
                () = inner.requested.wait() => {
                    tracing::info!("shutdown requested");
                }
            }
            token.cancel();

            inner.fire().await;

            if let Some(logger) = logger {
                logger.abort();
            }
        });
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registrants", &self.inner.serve.len())
            .field("shutdown", &self.inner.shutdown)
            .field("grace_period", &self.grace_period)
            .field("os_signals", &self.os_signals)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    fn orchestrator() -> Orchestrator {
        Orchestrator::new()
            .os_signals(false)
            .grace_period(Duration::from_millis(50))
    }

    /// Registers a server that runs until its shutdown callback fires.
    fn register_server(
        boot: &Orchestrator,
        stopped: Arc<AtomicBool>,
        log: Option<Arc<std::sync::Mutex<Vec<&'static str>>>>,
    ) {
        boot.register(move |registrar| async move {
            let stop = Latch::new();
            let trigger = stop.clone();
            registrar.register(move || async move {
                if let Some(log) = log {
                    log.lock().unwrap().push("server");
                }
                trigger.trigger();
                Ok(())
            })?;
            stop.wait().await;
            stopped.store(true, Ordering::SeqCst);
            Ok::<(), BoxError>(())
        })
        .unwrap();
    }

    #[tokio::test]
    async fn test_run_without_registrants_fails() {
        let boot = orchestrator();
        let err = boot.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BootError::NoRegistrants));
        assert!(err.is_configuration_error());
    }

    #[tokio::test]
    async fn test_cancellation_fires_levels_in_order() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let stopped = Arc::new(AtomicBool::new(false));
        let boot = orchestrator();
        register_server(&boot, Arc::clone(&stopped), Some(Arc::clone(&log)));

        for (name, level) in [("b", 1u32), ("a", 0), ("c", 1)] {
            let log = Arc::clone(&log);
            boot.add_shutdown_handler(
                move || async move {
                    if name == "a" {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                    }
                    log.lock().unwrap().push(name);
                    Ok(())
                },
                level,
            )
            .unwrap();
        }

        let cancel = CancellationToken::new();
        let runner = {
            let boot = boot.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { boot.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        assert_ok!(runner.await.unwrap());
        tokio::time::timeout(Duration::from_secs(1), boot.wait())
            .await
            .expect("completion should close");

        assert!(stopped.load(Ordering::SeqCst));
        let log = log.lock().unwrap();
        assert_eq!(&log[..2], &["server", "a"]);
        assert_eq!(log.len(), 4);
        assert!(log[2..].contains(&"b"));
        assert!(log[2..].contains(&"c"));
    }

    #[tokio::test]
    async fn test_startup_failure_is_returned_and_siblings_stop() {
        let stopped = Arc::new(AtomicBool::new(false));
        let boot = orchestrator();
        register_server(&boot, Arc::clone(&stopped), None);
        boot.register(|_registrar| async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err::<(), BoxError>("address already in use".into())
        })
        .unwrap();

        let err = tokio::time::timeout(Duration::from_secs(1), boot.run(CancellationToken::new()))
            .await
            .expect("run should return")
            .unwrap_err();

        assert_eq!(err.to_string(), "server failed to start: address already in use");
        assert!(stopped.load(Ordering::SeqCst));
        assert!(boot.completion().is_complete());
    }

    #[tokio::test]
    async fn test_error_after_grace_period_stops_siblings() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let stopped = Arc::new(AtomicBool::new(false));
        let boot = orchestrator();
        register_server(&boot, Arc::clone(&stopped), Some(Arc::clone(&log)));
        boot.register(|_registrar| async {
            tokio::time::sleep(Duration::from_millis(120)).await;
            Err::<(), BoxError>("connection reset".into())
        })
        .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), boot.run(CancellationToken::new()))
            .await
            .expect("a late failure should stop the remaining server");
        assert_ok!(result);
        tokio::time::timeout(Duration::from_secs(1), boot.wait())
            .await
            .expect("completion should close");

        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(*log.lock().unwrap(), ["server"]);
    }

    #[tokio::test]
    async fn test_second_run_is_already_started() {
        let boot = orchestrator();
        boot.register(|_| async { Ok(()) }).unwrap();
        assert_ok!(boot.run(CancellationToken::new()).await);

        let err = boot.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BootError::AlreadyStarted));
    }

    #[tokio::test]
    async fn test_shutdown_requested_before_run_fires_on_arm() {
        let counter = Arc::new(AtomicUsize::new(0));
        let boot = orchestrator();
        boot.register(|_| async { Ok(()) }).unwrap();
        let hits = Arc::clone(&counter);
        boot.add_shutdown_handler(
            move || async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            ShutdownLevel::default(),
        )
        .unwrap();

        boot.trigger_shutdown();
        assert!(!boot.completion().is_complete());

        assert_ok!(boot.run(CancellationToken::new()).await);
        tokio::time::timeout(Duration::from_secs(1), boot.wait())
            .await
            .expect("the early request should fire once armed");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_trigger_shutdown_runs_callbacks_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let boot = orchestrator();
        register_server(&boot, Arc::new(AtomicBool::new(false)), None);

        let hits = Arc::clone(&counter);
        boot.add_shutdown_handler(
            move || async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            ShutdownLevel::default(),
        )
        .unwrap();

        let runner = {
            let boot = boot.clone();
            tokio::spawn(async move { boot.run(CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(80)).await;

        boot.trigger_shutdown();
        boot.trigger_shutdown();
        assert_ok!(runner.await.unwrap());
        boot.wait().await;
        boot.trigger_shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_registration_is_closed_after_run() {
        let boot = orchestrator();
        boot.register(|_| async { Ok(()) }).unwrap();
        assert_ok!(boot.run(CancellationToken::new()).await);
        boot.wait().await;

        assert_err!(boot.register(|_| async { Ok(()) }));
        assert!(matches!(
            boot.add_shutdown_handler(|| async { Ok(()) }, ShutdownLevel::default()),
            Err(BootError::ShutdownInProgress)
        ));
    }

    #[tokio::test]
    async fn test_completion_waits_for_slow_callbacks() {
        let boot = orchestrator();
        register_server(&boot, Arc::new(AtomicBool::new(false)), None);
        boot.add_shutdown_handler(
            || async {
                tokio::time::sleep(Duration::from_millis(60)).await;
                Ok(())
            },
            ShutdownLevel::user(3),
        )
        .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_ok!(boot.run(cancel).await);

        let completion = boot.completion();
        tokio::time::timeout(Duration::from_secs(1), completion.wait())
            .await
            .expect("completion should close");
        assert!(completion.is_complete());
    }
}
