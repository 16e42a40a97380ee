//! OS signal handling.
//!
//! SIGTERM and SIGINT trigger shutdown. A handful of other signals are
//! watched and logged but never trigger anything. SIGCHLD and SIGURG are not
//! watched at all.

use std::fmt;

/// Signal that started the shutdown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    /// SIGTERM.
    Terminate,
    /// SIGINT, or Ctrl-C on platforms without Unix signals.
    Interrupt,
}

impl fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminate => f.write_str("SIGTERM"),
            Self::Interrupt => f.write_str("SIGINT"),
        }
    }
}

/// Waits for the first termination signal.
///
/// If the handlers cannot be installed the error is logged and the future
/// never completes, leaving cancellation as the only shutdown trigger.
pub async fn wait_for_termination() -> TerminationSignal {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!(error = %e, "failed to install termination signal handlers");
                    return std::future::pending().await;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => TerminationSignal::Terminate,
            _ = sigint.recv() => TerminationSignal::Interrupt,
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            return std::future::pending().await;
        }
        TerminationSignal::Interrupt
    }
}

/// Logs every received non-terminating signal until the task is aborted.
#[cfg(unix)]
pub async fn log_other_signals() {
    use tokio::signal::unix::{signal, SignalKind};

    let watched = [
        ("SIGHUP", SignalKind::hangup()),
        ("SIGQUIT", SignalKind::quit()),
        ("SIGUSR1", SignalKind::user_defined1()),
        ("SIGUSR2", SignalKind::user_defined2()),
        ("SIGPIPE", SignalKind::pipe()),
        ("SIGALRM", SignalKind::alarm()),
        ("SIGWINCH", SignalKind::window_change()),
    ];

    let mut listeners = tokio::task::JoinSet::new();
    for (name, kind) in watched {
        match signal(kind) {
            Ok(mut stream) => {
                listeners.spawn(async move {
                    while stream.recv().await.is_some() {
                        tracing::info!(signal = name, "received signal");
                    }
                });
            }
            Err(e) => tracing::debug!(signal = name, error = %e, "signal not observable"),
        }
    }

    while listeners.join_next().await.is_some() {}
}

/// Logs every received non-terminating signal until the task is aborted.
#[cfg(not(unix))]
pub async fn log_other_signals() {
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(TerminationSignal::Terminate.to_string(), "SIGTERM");
        assert_eq!(TerminationSignal::Interrupt.to_string(), "SIGINT");
    }

    #[tokio::test]
    async fn test_wait_for_termination_is_pending_without_signal() {
        let waited = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            wait_for_termination(),
        )
        .await;
        assert!(waited.is_err());
    }
}
