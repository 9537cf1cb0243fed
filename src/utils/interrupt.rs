//! Ctrl-C handling for experiment runs
//!
//! Once installed, the first Ctrl-C only raises a process-wide flag. Runners
//! check it between steps and during waits, so a stopped run still records
//! its end time, deletes what it created and exports its metrics. A second
//! Ctrl-C exits immediately.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::utils::ScaleLabError;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static INSTALLED: AtomicBool = AtomicBool::new(false);

/// How often waits look at the flag
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Exit status for a second Ctrl-C (128 + SIGINT)
const EXIT_INTERRUPTED: i32 = 130;

/// Start listening for Ctrl-C on a background thread. Idempotent.
pub fn install() -> Result<()> {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start signal runtime")?;

    std::thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async {
                loop {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        crate::log_warn!("Ctrl-C handling unavailable: {}", e);
                        return;
                    }
                    if INTERRUPTED.swap(true, Ordering::SeqCst) {
                        crate::log_error!("Interrupted again, exiting without cleanup");
                        std::process::exit(EXIT_INTERRUPTED);
                    }
                    crate::log_warn!(
                        "Interrupted. Saving times, cleaning up and exporting; press Ctrl-C again to exit now"
                    );
                }
            });
        })
        .context("Failed to spawn Ctrl-C listener")?;

    Ok(())
}

/// Whether Ctrl-C has been pressed since `install`
pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

fn check_flag(flag: &AtomicBool) -> Result<()> {
    if flag.load(Ordering::SeqCst) {
        Err(ScaleLabError::interrupted().into())
    } else {
        Ok(())
    }
}

fn sleep_flag(flag: &AtomicBool, duration: Duration) -> Result<()> {
    let deadline = Instant::now() + duration;
    loop {
        check_flag(flag)?;
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

/// Fail with an interruption error if Ctrl-C was pressed
pub fn check() -> Result<()> {
    check_flag(&INTERRUPTED)
}

/// Sleep for `duration`, returning early with an error on Ctrl-C
pub fn sleep(duration: Duration) -> Result<()> {
    sleep_flag(&INTERRUPTED, duration)
}

/// Resolve once Ctrl-C has been pressed
pub async fn wait() {
    let mut ticks = tokio::time::interval(POLL_INTERVAL);
    while !is_interrupted() {
        ticks.tick().await;
    }
}

/// Whether an error chain came from an interruption
pub fn is_interruption(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<ScaleLabError>()
            .is_some_and(|e| e.message == ScaleLabError::interrupted().message)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_follows_flag() {
        let flag = AtomicBool::new(false);
        assert!(check_flag(&flag).is_ok());

        flag.store(true, Ordering::SeqCst);
        let err = check_flag(&flag).unwrap_err();
        assert!(is_interruption(&err));
    }

    #[test]
    fn test_sleep_runs_to_completion() {
        let flag = AtomicBool::new(false);
        let started = Instant::now();
        sleep_flag(&flag, Duration::from_millis(50)).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_sleep_stops_early_when_flagged() {
        let flag = AtomicBool::new(false);
        let started = Instant::now();
        std::thread::scope(|scope| {
            scope.spawn(|| {
                std::thread::sleep(Duration::from_millis(100));
                flag.store(true, Ordering::SeqCst);
            });
            let err = sleep_flag(&flag, Duration::from_secs(30)).unwrap_err();
            assert!(is_interruption(&err));
        });
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_other_errors_are_not_interruptions() {
        let err = anyhow::anyhow!("kubectl failed");
        assert!(!is_interruption(&err));
        let wrapped = anyhow::Error::from(ScaleLabError::interrupted()).context("Experiment run1");
        assert!(is_interruption(&wrapped));
    }
}
