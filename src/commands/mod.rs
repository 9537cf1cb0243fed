//! Command implementations for the scalelab CLI

pub mod cluster;
pub mod config;
pub mod experiment;
pub mod monitoring;
pub mod vm;
pub mod workload;

use anyhow::Result;
use std::path::PathBuf;

use crate::config::Settings;
use crate::gcp::Gcloud;
use crate::k8s::helm::Helm;
use crate::k8s::kubectl::Kubectl;
use crate::utils::exec::CommandRunner;

/// Everything a command needs: settings, the process runner and global flags
pub struct Context<'a> {
    pub settings: Settings,
    pub runner: &'a dyn CommandRunner,
    pub kubeconfig: Option<PathBuf>,
    /// Skip confirmation prompts
    pub assume_yes: bool,
}

impl<'a> Context<'a> {
    pub fn new(settings: Settings, runner: &'a dyn CommandRunner) -> Self {
        Self {
            settings,
            runner,
            kubeconfig: None,
            assume_yes: false,
        }
    }

    /// gcloud for the configured project; fails when no project is set
    pub fn gcloud(&self) -> Result<Gcloud<'a>> {
        Ok(Gcloud::new(
            self.runner,
            self.settings.gcp.require_project()?,
        ))
    }

    pub fn kubectl(&self) -> Kubectl<'a> {
        Kubectl::new(self.runner).with_kubeconfig(self.kubeconfig.clone())
    }

    pub fn helm(&self) -> Helm<'a> {
        Helm::new(self.runner).with_kubeconfig(self.kubeconfig.clone())
    }

    /// Namespace override or the configured one
    pub fn namespace(&self, explicit: Option<String>) -> String {
        explicit.unwrap_or_else(|| self.settings.cluster.namespace.clone())
    }
}

/// Print a banner the way every long command closes
pub(crate) fn banner(message: &str) {
    crate::log_info!("");
    crate::log_info!("==========================================");
    crate::log_info!("{}", message);
    crate::log_info!("==========================================");
    crate::log_info!("");
}
