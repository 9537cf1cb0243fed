//! Dry-run mode utilities

use colored::Colorize;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};

static DRY_RUN: AtomicBool = AtomicBool::new(false);

/// Environment variable that also enables dry-run mode
pub const DRY_RUN_ENV: &str = "SCALELAB_DRY_RUN";

/// Enable or disable dry-run mode for this process
pub fn set_dry_run(enabled: bool) {
    DRY_RUN.store(enabled, Ordering::SeqCst);
}

/// Check if dry-run mode is enabled
pub fn is_dry_run() -> bool {
    DRY_RUN.load(Ordering::SeqCst) || env::var_os(DRY_RUN_ENV).is_some()
}

/// Log a dry-run action
pub fn log_action(action: &str) {
    if is_dry_run() {
        println!("  {} {}", "[DRY RUN]".cyan().bold(), action);
    }
}

/// Execute function only if not in dry-run mode
/// Returns Ok(()) in dry-run mode without executing
pub fn exec_unless_dry_run<F>(action_desc: &str, f: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    exec_unless(is_dry_run(), action_desc, f)
}

fn exec_unless<F>(dry_run: bool, action_desc: &str, f: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    if dry_run {
        println!("  {} {}", "[DRY RUN]".cyan().bold(), action_desc);
        Ok(())
    } else {
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The process-wide flag is left alone: other tests write files through
    // exec_unless_dry_run and would race with a toggle here
    #[test]
    fn test_exec_unless_skips_in_dry_run() {
        let mut executed = false;
        exec_unless(true, "test action", || {
            executed = true;
            Ok(())
        })
        .unwrap();
        assert!(!executed);

        exec_unless(false, "test action", || {
            executed = true;
            Ok(())
        })
        .unwrap();
        assert!(executed);
    }

    #[test]
    fn test_exec_unless_propagates_errors() {
        let result = exec_unless(false, "test action", || Err(anyhow::anyhow!("boom")));
        assert!(result.is_err());
    }
}
