//! External command execution
//!
//! Every vendor CLI call (gcloud, kubectl, helm, docker) is described as an
//! [`Invocation`] and handed to a [`CommandRunner`]. The system runner honors
//! dry-run mode for mutating calls; read-only probes always run so that
//! check-then-create guards keep working under `--dry-run`.

use anyhow::{Context, Result, anyhow};
use std::fmt;
use std::process::{Command, Stdio};

use crate::utils::dryrun;

/// A single external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub read_only: bool,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            read_only: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Mark as a probe that never changes anything
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Shell-quoted command line, for logs and error messages
    pub fn command_line(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.as_str());
        words.extend(self.args.iter().map(String::as_str));
        shell_words::join(words)
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Captured result of a command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Seam between the runbook logic and the processes it spawns
pub trait CommandRunner {
    /// Run with inherited stdio, returning whether it exited successfully
    fn status(&self, invocation: &Invocation) -> Result<bool>;

    /// Run and capture stdout/stderr
    fn output(&self, invocation: &Invocation) -> Result<CommandOutput>;

    /// Run with inherited stdio and fail on a non-zero exit
    fn run(&self, invocation: &Invocation) -> Result<()> {
        if self.status(invocation)? {
            Ok(())
        } else {
            Err(anyhow!("Command failed: {}", invocation))
        }
    }

    /// Capture stdout and fail on a non-zero exit, including stderr in the error
    fn stdout(&self, invocation: &Invocation) -> Result<String> {
        let output = self.output(invocation)?;
        if !output.success {
            return Err(anyhow!(
                "Command failed: {}\n{}",
                invocation,
                output.stderr.trim()
            ));
        }
        Ok(output.stdout)
    }

    /// Whether the command exits successfully, with output suppressed
    fn succeeds(&self, invocation: &Invocation) -> Result<bool> {
        Ok(self.output(invocation)?.success)
    }
}

/// Runs real processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    fn skipped(invocation: &Invocation) -> bool {
        if !invocation.read_only && dryrun::is_dry_run() {
            dryrun::log_action(&invocation.command_line());
            return true;
        }
        false
    }
}

impl CommandRunner for SystemRunner {
    fn status(&self, invocation: &Invocation) -> Result<bool> {
        if Self::skipped(invocation) {
            return Ok(true);
        }

        crate::log_info!("Executing: {}", invocation);

        let status = invocation
            .to_command()
            .status()
            .with_context(|| format!("Failed to run {}", invocation.program))?;

        Ok(status.success())
    }

    fn output(&self, invocation: &Invocation) -> Result<CommandOutput> {
        if Self::skipped(invocation) {
            return Ok(CommandOutput {
                success: true,
                ..Default::default()
            });
        }

        tracing::debug!(command = %invocation, "capturing output");

        let output = invocation
            .to_command()
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run {}", invocation.program))?;

        let result = CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.stderr.trim().is_empty() {
            tracing::debug!(command = %invocation, stderr = %result.stderr.trim(), "stderr");
        }

        Ok(result)
    }
}

#[cfg(test)]
pub mod testing {
    //! Scripted runner for unit tests

    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays canned outputs keyed by a command-line prefix and records calls.
    /// Unmatched invocations succeed with empty output.
    #[derive(Default)]
    pub struct FakeRunner {
        rules: RefCell<Vec<(String, VecDeque<CommandOutput>)>>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a response for commands starting with `prefix`.
        /// The last queued response for a prefix is sticky.
        pub fn respond(&self, prefix: &str, success: bool, stdout: &str) -> &Self {
            let output = CommandOutput {
                success,
                stdout: stdout.to_string(),
                stderr: if success { String::new() } else { "error".to_string() },
            };
            let mut rules = self.rules.borrow_mut();
            if let Some((_, queue)) = rules.iter_mut().find(|(p, _)| p == prefix) {
                queue.push_back(output);
            } else {
                rules.push((prefix.to_string(), VecDeque::from([output])));
            }
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|c| c.starts_with(prefix))
                .collect()
        }

        fn next(&self, invocation: &Invocation) -> CommandOutput {
            // Plain join keeps assertions independent of shell quoting
            let mut words = vec![invocation.program.clone()];
            words.extend(invocation.args.iter().cloned());
            let line = words.join(" ");
            self.calls.borrow_mut().push(line.clone());

            let mut rules = self.rules.borrow_mut();
            // Longest matching prefix wins
            let best = rules
                .iter_mut()
                .filter(|(p, _)| line.starts_with(p.as_str()))
                .max_by_key(|(p, _)| p.len());

            match best {
                Some((_, queue)) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
                Some((_, queue)) => queue.front().cloned().unwrap_or_default(),
                None => CommandOutput {
                    success: true,
                    ..Default::default()
                },
            }
        }
    }

    impl CommandRunner for FakeRunner {
        fn status(&self, invocation: &Invocation) -> Result<bool> {
            Ok(self.next(invocation).success)
        }

        fn output(&self, invocation: &Invocation) -> Result<CommandOutput> {
            Ok(self.next(invocation))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeRunner;
    use super::*;

    #[test]
    fn test_command_line_quotes_arguments() {
        let inv = Invocation::new("gcloud")
            .args(["compute", "ssh", "prometheus-vm", "--command"])
            .arg("docker --version");
        assert_eq!(
            inv.command_line(),
            "gcloud compute ssh prometheus-vm --command 'docker --version'"
        );
        assert_eq!(inv.to_string(), inv.command_line());
    }

    #[test]
    fn test_system_runner_captures_stdout() {
        let out = SystemRunner
            .stdout(&Invocation::new("echo").arg("hello").read_only())
            .unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn test_system_runner_missing_program() {
        let result = SystemRunner.output(&Invocation::new("nonexistent-tool-xyz").read_only());
        assert!(result.is_err());
    }

    #[test]
    fn test_stdout_error_includes_command() {
        let runner = FakeRunner::new();
        runner.respond("gcloud container", false, "");
        let err = runner
            .stdout(&Invocation::new("gcloud").args(["container", "clusters", "list"]))
            .unwrap_err();
        assert!(err.to_string().contains("gcloud container clusters list"));
    }

    #[test]
    fn test_fake_runner_queue_then_sticky() {
        let runner = FakeRunner::new();
        runner.respond("kubectl get", true, "").respond("kubectl get", true, "10.0.0.1");

        let inv = Invocation::new("kubectl").arg("get");
        assert_eq!(runner.stdout(&inv).unwrap(), "");
        assert_eq!(runner.stdout(&inv).unwrap(), "10.0.0.1");
        assert_eq!(runner.stdout(&inv).unwrap(), "10.0.0.1");
        assert_eq!(runner.calls().len(), 3);
    }
}
