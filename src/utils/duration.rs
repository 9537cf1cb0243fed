//! Human duration strings: Prometheus steps ("15s", "1m") and load-test
//! run times ("300s", "20m", "1h30m")

use anyhow::{Result, anyhow};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static STEP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*([smh]?)\s*$").expect("valid step regex"));

static RUN_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(\d+)h)?\s*(?:(\d+)m)?\s*(?:(\d+)s)?\s*$").expect("valid run time regex")
});

/// Parse a single-unit step into whole seconds. A bare number is seconds.
pub fn parse_step_seconds(step: &str) -> Result<u64> {
    let caps = STEP_RE
        .captures(step)
        .ok_or_else(|| anyhow!("Invalid step '{}': expected e.g. 15s, 1m or 30", step))?;

    let value: u64 = caps[1].parse()?;
    let multiplier = match &caps[2] {
        "m" => 60,
        "h" => 3600,
        _ => 1,
    };

    let seconds = value
        .checked_mul(multiplier)
        .ok_or_else(|| anyhow!("Step '{}' is too large", step))?;
    if seconds == 0 {
        return Err(anyhow!("Step '{}' must be greater than zero", step));
    }
    Ok(seconds)
}

/// Step in seconds, falling back to `default` with a warning when unparsable
pub fn step_seconds_or(step: &str, default: u64) -> u64 {
    match parse_step_seconds(step) {
        Ok(seconds) => seconds,
        Err(e) => {
            crate::log_warn!("{}. Using {}s", e, default);
            default
        }
    }
}

/// Parse a compound run time such as `1h30m` or `300s`. A bare number is seconds.
pub fn parse_run_time(value: &str) -> Result<Duration> {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    let caps = RUN_TIME_RE
        .captures(value)
        .ok_or_else(|| anyhow!("Invalid run time '{}': expected e.g. 300s, 20m, 1h30m", value))?;

    if caps.iter().skip(1).all(|c| c.is_none()) {
        return Err(anyhow!("Invalid run time '{}': no units given", value));
    }

    let part = |i: usize| -> Result<u64> {
        caps.get(i)
            .map(|m| m.as_str().parse::<u64>())
            .transpose()
            .map(|v| v.unwrap_or(0))
            .map_err(Into::into)
    };

    let (hours, minutes, secs) = (part(1)?, part(2)?, part(3)?);
    let seconds = hours
        .checked_mul(3600)
        .and_then(|s| s.checked_add(minutes.checked_mul(60)?))
        .and_then(|s| s.checked_add(secs))
        .ok_or_else(|| anyhow!("Run time '{}' is too large", value))?;
    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_step_seconds() {
        assert_eq!(parse_step_seconds("15s").unwrap(), 15);
        assert_eq!(parse_step_seconds("1m").unwrap(), 60);
        assert_eq!(parse_step_seconds("30").unwrap(), 30);
        assert_eq!(parse_step_seconds("2h").unwrap(), 7200);
        assert!(parse_step_seconds("0s").is_err());
        assert!(parse_step_seconds("fast").is_err());
        assert!(parse_step_seconds("1m30s").is_err());
    }

    #[test]
    fn test_oversized_values_are_errors() {
        assert!(parse_step_seconds("9999999999999999h").is_err());
        assert!(parse_step_seconds("99999999999999999999s").is_err());
        assert!(parse_run_time("9999999999999999h").is_err());
        assert!(parse_run_time("1h9999999999999999999m").is_err());
        assert_eq!(step_seconds_or("9999999999999999h", 15), 15);
    }

    #[test]
    fn test_step_fallback() {
        assert_eq!(step_seconds_or("bogus", 15), 15);
        assert_eq!(step_seconds_or("5s", 15), 5);
    }

    #[test]
    fn test_parse_run_time() {
        assert_eq!(parse_run_time("300s").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_run_time("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_run_time("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_run_time("90").unwrap(), Duration::from_secs(90));
        assert!(parse_run_time("").is_err());
        assert!(parse_run_time("ten minutes").is_err());
    }
}
