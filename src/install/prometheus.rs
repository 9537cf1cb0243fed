//! Prometheus server: scrape configuration and container

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::settings::MonitoringSettings;
use crate::utils::container::ContainerSpec;

/// Mount point of the generated config inside the container
pub const CONFIG_MOUNT: &str = "/etc/prometheus/prometheus.yml";
const DATA_MOUNT: &str = "/prometheus";

/// `prometheus.yml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrometheusConfig {
    pub global: GlobalConfig,
    pub scrape_configs: Vec<ScrapeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    pub scrape_interval: String,
    pub evaluation_interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapeConfig {
    pub job_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_interval: Option<String>,
    pub static_configs: Vec<StaticConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaticConfig {
    pub targets: Vec<String>,
}

impl ScrapeConfig {
    pub fn static_target(job_name: &str, target: String) -> Self {
        Self {
            job_name: job_name.to_string(),
            scrape_interval: None,
            static_configs: vec![StaticConfig {
                targets: vec![target],
            }],
        }
    }
}

impl PrometheusConfig {
    /// Self-scrape, kube-state-metrics at its external IP, and the
    /// Stackdriver exporter by container name on the shared network
    pub fn for_stack(monitoring: &MonitoringSettings, ksm_ip: &str) -> Self {
        Self {
            global: GlobalConfig {
                scrape_interval: monitoring.scrape_interval.clone(),
                evaluation_interval: monitoring.scrape_interval.clone(),
            },
            scrape_configs: vec![
                ScrapeConfig::static_target(
                    "prometheus",
                    format!("localhost:{}", monitoring.prometheus_port),
                ),
                ScrapeConfig::static_target(
                    "kube-state-metrics",
                    format!("{}:{}", ksm_ip, monitoring.ksm_port),
                ),
                ScrapeConfig {
                    // Cloud Monitoring samples at one minute resolution
                    scrape_interval: Some("60s".to_string()),
                    ..ScrapeConfig::static_target(
                        "stackdriver-exporter",
                        format!("{}:{}", monitoring.exporter_container, monitoring.exporter_port),
                    )
                },
            ],
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize Prometheus configuration")
    }

    /// Write the configuration, creating parent directories
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        fs::write(path, self.to_yaml()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        crate::log_info!("Prometheus configuration written to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Target of a job's first static config
    pub fn target_of(&self, job_name: &str) -> Option<&str> {
        self.scrape_configs
            .iter()
            .find(|job| job.job_name == job_name)
            .and_then(|job| job.static_configs.first())
            .and_then(|sc| sc.targets.first())
            .map(String::as_str)
    }
}

/// Absolute location of the config file for bind-mounting
pub fn config_path(monitoring: &MonitoringSettings) -> Result<PathBuf> {
    std::path::absolute(&monitoring.prometheus_config_path).with_context(|| {
        format!(
            "Failed to resolve config path {}",
            monitoring.prometheus_config_path
        )
    })
}

/// Write `prometheus.yml` pointing at kube-state-metrics on `ksm_ip`
pub fn write_for_stack(monitoring: &MonitoringSettings, ksm_ip: &str) -> Result<PathBuf> {
    let path = config_path(monitoring)?;
    PrometheusConfig::for_stack(monitoring, ksm_ip).write(&path)?;
    Ok(path)
}

/// Container running Prometheus with the generated config and a data volume
pub fn container_spec(monitoring: &MonitoringSettings, config_file: &Path) -> ContainerSpec {
    ContainerSpec {
        network: Some(monitoring.docker_network.clone()),
        ports: vec![(monitoring.prometheus_port, 9090)],
        volumes: vec![
            (
                config_file.to_string_lossy().into_owned(),
                format!("{}:ro", CONFIG_MOUNT),
            ),
            (
                monitoring.prometheus_data_volume.clone(),
                DATA_MOUNT.to_string(),
            ),
        ],
        args: vec![
            format!("--config.file={}", CONFIG_MOUNT),
            format!("--storage.tsdb.path={}", DATA_MOUNT),
            "--web.enable-lifecycle".to_string(),
        ],
        ..ContainerSpec::new(&monitoring.prometheus_container, &monitoring.prometheus_image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_contains_discovered_ip_and_exporter_port() {
        let monitoring = MonitoringSettings::default();
        let yaml = PrometheusConfig::for_stack(&monitoring, "34.76.10.20")
            .to_yaml()
            .unwrap();

        assert!(yaml.contains("34.76.10.20:8080"));
        assert!(yaml.contains("stackdriver-exporter:9255"));
        assert!(yaml.contains("job_name: prometheus"));
    }

    #[test]
    fn test_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prometheus").join("prometheus.yml");
        let config = PrometheusConfig::for_stack(&MonitoringSettings::default(), "10.0.0.7");

        config.write(&path).unwrap();
        let loaded = PrometheusConfig::load(&path).unwrap();

        assert_eq!(loaded, config);
        assert_eq!(loaded.target_of("kube-state-metrics"), Some("10.0.0.7:8080"));
        assert_eq!(loaded.target_of("missing"), None);
    }

    #[test]
    fn test_container_spec_mounts_config_and_data() {
        let monitoring = MonitoringSettings::default();
        let spec = container_spec(&monitoring, Path::new("/srv/prometheus.yml"));

        assert_eq!(spec.name, "prometheus");
        assert_eq!(spec.network.as_deref(), Some("monitoring"));
        assert_eq!(spec.ports, vec![(9090, 9090)]);
        assert_eq!(spec.volumes[0].0, "/srv/prometheus.yml");
        assert_eq!(spec.volumes[1], ("prometheus-data".to_string(), "/prometheus".to_string()));
    }
}
