//! Experiment start/end times persisted as `KEY=VALUE` lines

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

pub const START_TIME_ISO: &str = "START_TIME_ISO";
pub const START_TIME_UNIX: &str = "START_TIME_UNIX";
pub const END_TIME_ISO: &str = "END_TIME_ISO";
pub const END_TIME_UNIX: &str = "END_TIME_UNIX";

/// Unix seconds with sub-second precision
pub fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, false)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

/// Start a fresh times file
pub fn write_start(path: &Path, start: DateTime<Utc>) -> Result<()> {
    ensure_parent(path)?;
    let contents = format!(
        "{}={}\n{}={}\n",
        START_TIME_ISO,
        iso(start),
        START_TIME_UNIX,
        unix_seconds(start)
    );
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

/// Append the end time to an existing (or new) times file
pub fn append_end(path: &Path, end: DateTime<Utc>) -> Result<()> {
    ensure_parent(path)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    write!(
        file,
        "{}={}\n{}={}\n",
        END_TIME_ISO,
        iso(end),
        END_TIME_UNIX,
        unix_seconds(end)
    )
    .with_context(|| format!("Failed to write {}", path.display()))
}

/// All `KEY=VALUE` pairs of a times file
pub fn read(path: &Path) -> Result<HashMap<String, String>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    Ok(contents
        .lines()
        .filter_map(|line| line.trim().split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect())
}

fn window_from_file(path: &Path, start: f64, end: f64) -> Result<(f64, f64)> {
    let values = read(path)?;
    let get = |key: &str, fallback: f64| -> Result<f64> {
        match values.get(key) {
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .map_err(|e| anyhow!("{}={} is not a number: {}", key, raw, e)),
            None => Ok(fallback),
        }
    };
    Ok((get(START_TIME_UNIX, start)?, get(END_TIME_UNIX, end)?))
}

/// Query window as recorded on disk. A missing key keeps the in-memory
/// value; an unreadable file or value falls back to both in-memory times.
pub fn resolve_window(path: &Path, start: f64, end: f64) -> (f64, f64) {
    match window_from_file(path, start, end) {
        Ok(window) => window,
        Err(e) => {
            crate::log_warn!(
                "Unable to read times from {}, using in-memory start/end: {:#}",
                path.display(),
                e
            );
            (start, end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_start_then_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("run_times.txt");
        let start = Utc.with_ymd_and_hms(2025, 6, 10, 9, 55, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 10, 10, 5, 30).unwrap();

        write_start(&path, start).unwrap();
        append_end(&path, end).unwrap();

        let values = read(&path).unwrap();
        assert_eq!(values[START_TIME_UNIX], "1749549300");
        assert_eq!(values[END_TIME_UNIX], "1749549930");
        assert!(values[START_TIME_ISO].starts_with("2025-06-10T09:55:00"));
        assert!(values[END_TIME_ISO].ends_with("+00:00"));

        assert_eq!(
            resolve_window(&path, 0.0, 0.0),
            (1749549300.0, 1749549930.0)
        );
    }

    #[test]
    fn test_missing_end_keeps_in_memory_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("times.txt");
        fs::write(&path, "START_TIME_UNIX=100.5\n").unwrap();
        assert_eq!(resolve_window(&path, 1.0, 200.0), (100.5, 200.0));
    }

    #[test]
    fn test_unreadable_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            resolve_window(&dir.path().join("missing.txt"), 1.0, 2.0),
            (1.0, 2.0)
        );

        let path = dir.path().join("times.txt");
        fs::write(&path, "START_TIME_UNIX=abc\nEND_TIME_UNIX=300\n").unwrap();
        assert_eq!(resolve_window(&path, 1.0, 2.0), (1.0, 2.0));
    }
}
