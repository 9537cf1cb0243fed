//! kube-state-metrics: chart values, helm install, external IP discovery

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::settings::MonitoringSettings;
use crate::k8s::helm::{self, Helm};
use crate::k8s::kubectl::Kubectl;
use crate::utils::retry::{self, PollPolicy};
use crate::utils::ScaleLabError;

/// The subset of chart values this runbook sets
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartValues {
    pub service: ServiceValues,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceValues {
    #[serde(rename = "type")]
    pub service_type: String,
    pub port: u16,
}

impl ChartValues {
    /// Expose the metrics endpoint through a LoadBalancer on `port`
    pub fn load_balancer(port: u16) -> Self {
        Self {
            service: ServiceValues {
                service_type: "LoadBalancer".to_string(),
                port,
            },
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize chart values")
    }
}

pub fn values_path(monitoring: &MonitoringSettings) -> PathBuf {
    PathBuf::from(&monitoring.ksm_values_file)
}

/// Write the default values file. An existing file is kept unless `overwrite`.
pub fn write_default_values(path: &Path, port: u16, overwrite: bool) -> Result<bool> {
    if path.exists() && !overwrite {
        crate::log_info!(
            "Values file {} already exists, leaving it untouched (use --force to replace)",
            path.display()
        );
        return Ok(false);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    fs::write(path, ChartValues::load_balancer(port).to_yaml()?)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    crate::log_info!("Wrote kube-state-metrics values to {}", path.display());
    Ok(true)
}

/// Add the chart repository and install or upgrade the release
pub fn install(helm: &Helm, monitoring: &MonitoringSettings) -> Result<()> {
    let values = values_path(monitoring);
    if !values.exists() {
        return Err(ScaleLabError::file_not_found(
            &values.display().to_string(),
            "Generate it with: scalelab monitoring values",
        )
        .into());
    }

    helm.repo_add(&monitoring.helm_repo_name, &monitoring.helm_repo_url)?;
    helm.repo_update()?;
    helm.upgrade_install(&helm::release(
        &monitoring.ksm_release,
        &monitoring.ksm_chart,
        &monitoring.ksm_namespace,
        &values,
    ))?;

    crate::log_info!("kube-state-metrics installed");
    Ok(())
}

/// Remove the release if it is deployed
pub fn uninstall(helm: &Helm, monitoring: &MonitoringSettings) -> Result<bool> {
    if !helm.release_exists(&monitoring.ksm_release, &monitoring.ksm_namespace)? {
        crate::log_info!("Release {} is not installed", monitoring.ksm_release);
        return Ok(false);
    }

    helm.uninstall(&monitoring.ksm_release, &monitoring.ksm_namespace)?;
    crate::log_info!("kube-state-metrics removed");
    Ok(true)
}

/// Poll the service until the load balancer reports an external IP
pub fn discover_ip(kubectl: &Kubectl, monitoring: &MonitoringSettings) -> Result<String> {
    let policy = PollPolicy::from_secs(monitoring.ip_poll_attempts, monitoring.ip_poll_delay_secs);
    discover_ip_with(kubectl, monitoring, policy)
}

pub fn discover_ip_with(
    kubectl: &Kubectl,
    monitoring: &MonitoringSettings,
    policy: PollPolicy,
) -> Result<String> {
    let service = &monitoring.ksm_release;
    let namespace = &monitoring.ksm_namespace;

    let ip = retry::poll(policy, "kube-state-metrics external IP", |_| {
        kubectl.service_ingress_ip(service, namespace)
    })
    .map_err(|e| {
        if crate::utils::interrupt::is_interruption(&e) {
            return e;
        }
        crate::log_error!("{:#}", e);
        anyhow::Error::from(ScaleLabError::ip_not_assigned(service, namespace))
    })?;

    crate::log_info!("kube-state-metrics reachable at {}:{}", ip, monitoring.ksm_port);
    Ok(ip)
}
