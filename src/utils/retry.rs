//! Bounded polling

use anyhow::{Result, anyhow};
use std::time::Duration;

/// How many times to probe and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl PollPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    pub fn from_secs(attempts: u32, delay_secs: u64) -> Self {
        Self::new(attempts, Duration::from_secs(delay_secs))
    }

    /// Upper bound on the time spent sleeping
    pub fn budget(&self) -> Duration {
        self.delay * self.attempts.saturating_sub(1)
    }
}

/// Call `probe` until it yields a value or the attempts run out.
///
/// `Ok(None)` means "not ready yet". A probe error is logged and counted as
/// a failed attempt. No sleep follows the final attempt. Ctrl-C during a
/// sleep ends the poll with an interruption error.
pub fn poll<T, F>(policy: PollPolicy, what: &str, mut probe: F) -> Result<T>
where
    F: FnMut(u32) -> Result<Option<T>>,
{
    for attempt in 1..=policy.attempts {
        match probe(attempt) {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {
                crate::log_info!(
                    "Waiting for {} (attempt {}/{})...",
                    what,
                    attempt,
                    policy.attempts
                );
            }
            Err(e) => {
                crate::log_warn!(
                    "Probe for {} failed (attempt {}/{}): {:#}",
                    what,
                    attempt,
                    policy.attempts,
                    e
                );
            }
        }

        if attempt < policy.attempts {
            crate::utils::interrupt::sleep(policy.delay)?;
        }
    }

    Err(anyhow!(
        "Timed out waiting for {} after {} attempts ({}s)",
        what,
        policy.attempts,
        policy.budget().as_secs()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant(attempts: u32) -> PollPolicy {
        PollPolicy::new(attempts, Duration::ZERO)
    }

    #[test]
    fn test_returns_first_ready_value() {
        let mut calls = 0;
        let value = poll(instant(5), "ip", |attempt| {
            calls += 1;
            Ok((attempt == 3).then(|| "10.0.0.7".to_string()))
        })
        .unwrap();
        assert_eq!(value, "10.0.0.7");
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_gives_up_after_bound() {
        let mut calls = 0;
        let result: Result<String> = poll(instant(18), "ip", |_| {
            calls += 1;
            Ok(None)
        });
        assert_eq!(calls, 18);
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("18 attempts"));
    }

    #[test]
    fn test_probe_errors_count_as_attempts() {
        let mut calls = 0;
        let value = poll(instant(4), "ip", |attempt| {
            calls += 1;
            if attempt < 4 {
                Err(anyhow!("connection refused"))
            } else {
                Ok(Some(42))
            }
        })
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_budget_counts_sleeps_between_probes() {
        // 18 probes 10s apart: 17 sleeps
        let policy = PollPolicy::from_secs(18, 10);
        assert_eq!(policy.budget(), Duration::from_secs(170));
    }
}
