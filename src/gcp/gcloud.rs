//! gcloud invocation helpers

use anyhow::Result;

use crate::utils::exec::{CommandRunner, Invocation};

/// gcloud bound to a project
pub struct Gcloud<'a> {
    runner: &'a dyn CommandRunner,
    project: String,
}

impl<'a> Gcloud<'a> {
    pub fn new(runner: &'a dyn CommandRunner, project: impl Into<String>) -> Self {
        Self {
            runner,
            project: project.into(),
        }
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner
    }

    /// `gcloud <args> --project=<project> --quiet`
    pub fn invocation<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation::new("gcloud")
            .args(args)
            .arg(format!("--project={}", self.project))
            .arg("--quiet")
    }

    /// Run a mutating command
    pub fn run<I, S>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runner.run(&self.invocation(args))
    }

    /// Whether a read-only command (typically `describe`) succeeds
    pub fn probe<I, S>(&self, args: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runner.succeeds(&self.invocation(args).read_only())
    }

    /// Capture stdout of a read-only command
    pub fn output<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(self
            .runner
            .stdout(&self.invocation(args).read_only())?
            .trim()
            .to_string())
    }
}

/// Active gcloud account, if any. Not project-scoped.
pub fn active_account(runner: &dyn CommandRunner) -> Result<Option<String>> {
    let account = runner.stdout(
        &Invocation::new("gcloud")
            .args([
                "auth",
                "list",
                "--filter=status:ACTIVE",
                "--format=value(account)",
            ])
            .read_only(),
    )?;

    let account = account.lines().next().unwrap_or("").trim();
    Ok((!account.is_empty()).then(|| account.to_string()))
}
