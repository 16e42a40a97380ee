//! SIGTERM handling, in its own process so the signal reaches no other test.

#![cfg(unix)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use portico_boot::{BoxError, Latch, Orchestrator, ShutdownLevel};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_sigterm_runs_callbacks_in_level_order() {
    // Replaces the default disposition before anything sends SIGTERM.
    let _sigterm = signal(SignalKind::terminate()).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let boot = Orchestrator::new().grace_period(Duration::from_millis(50));

    let server_log = Arc::clone(&log);
    boot.register(move |registrar| async move {
        let stop = Latch::new();
        let trigger = stop.clone();
        registrar.register(move || async move {
            server_log.lock().unwrap().push("server");
            trigger.trigger();
            Ok(())
        })?;
        stop.wait().await;
        Ok::<(), BoxError>(())
    })
    .unwrap();

    for (name, level) in [("late", 1u32), ("early", 0)] {
        let log = Arc::clone(&log);
        boot.add_shutdown_handler(
            move || async move {
                if name == "early" {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
                log.lock().unwrap().push(name);
                Ok(())
            },
            ShutdownLevel::user(level),
        )
        .unwrap();
    }

    let runner = {
        let boot = boot.clone();
        tokio::spawn(async move { boot.run(CancellationToken::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(150)).await;

    kill(Pid::this(), Signal::SIGTERM).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), runner)
        .await
        .expect("SIGTERM should stop the server")
        .unwrap();
    tokio_test::assert_ok!(result);
    tokio::time::timeout(Duration::from_secs(1), boot.wait())
        .await
        .expect("completion should close");

    assert_eq!(*log.lock().unwrap(), ["server", "early", "late"]);
}
