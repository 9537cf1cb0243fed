//! Helm chart repository and release management

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::utils::exec::{CommandRunner, Invocation};

/// A chart release installed from a values file
#[derive(Debug, Clone)]
pub struct Release {
    pub name: String,
    pub chart: String,
    pub namespace: String,
    pub values_file: PathBuf,
}

/// helm bound to a runner and an optional kubeconfig
pub struct Helm<'a> {
    runner: &'a dyn CommandRunner,
    kubeconfig: Option<PathBuf>,
}

impl<'a> Helm<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            kubeconfig: None,
        }
    }

    pub fn with_kubeconfig(mut self, kubeconfig: Option<PathBuf>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }

    fn invocation<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inv = Invocation::new("helm").args(args);
        if let Some(kc) = &self.kubeconfig {
            inv = inv.arg("--kubeconfig").arg(kc.to_string_lossy());
        }
        inv
    }

    /// Add (or refresh) a chart repository
    pub fn repo_add(&self, name: &str, url: &str) -> Result<()> {
        crate::log_info!("Adding helm repository {} ({})", name, url);
        self.runner
            .run(&Invocation::new("helm").args(["repo", "add", name, url, "--force-update"]))
            .with_context(|| format!("Failed to add helm repository {}", name))
    }

    pub fn repo_update(&self) -> Result<()> {
        self.runner
            .run(&Invocation::new("helm").args(["repo", "update"]))
            .context("Failed to update helm repositories")
    }

    /// Install the release or upgrade it in place
    pub fn upgrade_install(&self, release: &Release) -> Result<()> {
        crate::log_info!(
            "Installing {} ({}) into namespace {}...",
            release.name,
            release.chart,
            release.namespace
        );

        self.runner
            .run(&self.invocation([
                "upgrade".to_string(),
                "--install".to_string(),
                release.name.clone(),
                release.chart.clone(),
                "-f".to_string(),
                release.values_file.to_string_lossy().into_owned(),
                "-n".to_string(),
                release.namespace.clone(),
                "--create-namespace".to_string(),
            ]))
            .with_context(|| format!("helm upgrade --install {} failed", release.name))
    }

    /// Remove a release; a missing release is only a warning
    pub fn uninstall(&self, name: &str, namespace: &str) -> Result<()> {
        let ok = self
            .runner
            .status(&self.invocation(["uninstall", name, "-n", namespace]))?;
        if !ok {
            crate::log_warn!("helm uninstall {} returned non-zero exit code", name);
        }
        Ok(())
    }

    /// Whether a release is deployed in the namespace
    pub fn release_exists(&self, name: &str, namespace: &str) -> Result<bool> {
        self.runner
            .succeeds(&self.invocation(["status", name, "-n", namespace]).read_only())
    }
}

/// Release description for a values file path
pub fn release(name: &str, chart: &str, namespace: &str, values_file: &Path) -> Release {
    Release {
        name: name.to_string(),
        chart: chart.to_string(),
        namespace: namespace.to_string(),
        values_file: values_file.to_path_buf(),
    }
}
