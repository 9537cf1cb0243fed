//! Configuration file support for scalelab
//!
//! One TOML file holds every named value the runbook needs: project,
//! region, VM shape, chart and container coordinates, and experiment
//! defaults. All fields have defaults so a partial file is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::ScaleLabError;

/// Local file name searched in the working directory
pub const LOCAL_CONFIG_FILE: &str = ".scalelab.toml";

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub gcp: GcpSettings,

    #[serde(default)]
    pub cluster: ClusterSettings,

    #[serde(default)]
    pub vm: VmSettings,

    #[serde(default)]
    pub monitoring: MonitoringSettings,

    #[serde(default)]
    pub experiment: ExperimentSettings,

    #[serde(default)]
    pub workload: WorkloadSettings,
}

/// Project and location
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GcpSettings {
    /// Left empty by default; commands that need it refuse to run
    #[serde(default)]
    pub project_id: String,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_zone")]
    pub zone: String,
}

/// Autopilot cluster
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ClusterSettings {
    #[serde(default = "default_cluster_name")]
    pub name: String,

    /// Namespace experiment workloads run in
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

/// Monitoring VM
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct VmSettings {
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    #[serde(default = "default_machine_type")]
    pub machine_type: String,

    #[serde(default = "default_image_family")]
    pub image_family: String,

    #[serde(default = "default_image_project")]
    pub image_project: String,

    #[serde(default = "default_disk_size_gb")]
    pub disk_size_gb: u32,

    #[serde(default = "default_disk_type")]
    pub disk_type: String,

    /// Network tag the firewall rule targets
    #[serde(default = "default_target_tag")]
    pub target_tag: String,

    #[serde(default = "default_firewall_rule")]
    pub firewall_rule: String,

    /// CIDR ranges allowed to reach Prometheus on the VM
    #[serde(default = "default_source_ranges")]
    pub source_ranges: Vec<String>,
}

/// kube-state-metrics chart plus the Prometheus/exporter containers
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MonitoringSettings {
    #[serde(default = "default_helm_repo_name")]
    pub helm_repo_name: String,

    #[serde(default = "default_helm_repo_url")]
    pub helm_repo_url: String,

    #[serde(default = "default_ksm_release")]
    pub ksm_release: String,

    #[serde(default = "default_ksm_chart")]
    pub ksm_chart: String,

    #[serde(default = "default_ksm_namespace")]
    pub ksm_namespace: String,

    #[serde(default = "default_ksm_values_file")]
    pub ksm_values_file: String,

    #[serde(default = "default_ksm_port")]
    pub ksm_port: u16,

    #[serde(default = "default_ip_poll_attempts")]
    pub ip_poll_attempts: u32,

    #[serde(default = "default_ip_poll_delay_secs")]
    pub ip_poll_delay_secs: u64,

    #[serde(default = "default_docker_network")]
    pub docker_network: String,

    #[serde(default = "default_prometheus_image")]
    pub prometheus_image: String,

    #[serde(default = "default_prometheus_container")]
    pub prometheus_container: String,

    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,

    #[serde(default = "default_prometheus_config_path")]
    pub prometheus_config_path: String,

    #[serde(default = "default_prometheus_data_volume")]
    pub prometheus_data_volume: String,

    #[serde(default = "default_scrape_interval")]
    pub scrape_interval: String,

    #[serde(default = "default_exporter_image")]
    pub exporter_image: String,

    #[serde(default = "default_exporter_container")]
    pub exporter_container: String,

    #[serde(default = "default_exporter_port")]
    pub exporter_port: u16,

    #[serde(default = "default_exporter_metric_prefixes")]
    pub exporter_metric_prefixes: Vec<String>,
}

/// Experiment runner defaults
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExperimentSettings {
    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    #[serde(default = "default_sampling_interval")]
    pub sampling_interval: String,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Where `<app>-deployment.yaml` and friends live
    #[serde(default = "default_manifests_dir")]
    pub manifests_dir: String,

    #[serde(default = "default_node_type_label")]
    pub node_type_label: String,

    #[serde(default = "default_hpa_replicas_metric")]
    pub hpa_replicas_metric: String,

    #[serde(default = "default_rollout_timeout")]
    pub rollout_timeout: String,

    #[serde(default = "default_service_poll_attempts")]
    pub service_poll_attempts: u32,

    #[serde(default = "default_service_poll_delay_secs")]
    pub service_poll_delay_secs: u64,
}

/// Shape of the rendered experiment workloads
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WorkloadSettings {
    #[serde(default = "default_workload_image")]
    pub image: String,

    #[serde(default = "default_container_port")]
    pub container_port: u16,

    #[serde(default = "default_replicas")]
    pub replicas: u32,

    #[serde(default = "default_cpu_request")]
    pub cpu_request: String,

    #[serde(default = "default_cpu_limit")]
    pub cpu_limit: String,

    #[serde(default = "default_memory_request")]
    pub memory_request: String,

    #[serde(default = "default_memory_limit")]
    pub memory_limit: String,

    #[serde(default = "default_hpa_min_replicas")]
    pub hpa_min_replicas: u32,

    #[serde(default = "default_hpa_max_replicas")]
    pub hpa_max_replicas: u32,

    /// Average CPU utilization percentage the autoscaler aims for
    #[serde(default = "default_hpa_cpu_target")]
    pub hpa_cpu_target: u32,

    #[serde(default = "default_loadgen_image")]
    pub loadgen_image: String,

    #[serde(default = "default_loadgen_replicas")]
    pub loadgen_replicas: u32,
}

// Default value functions
fn default_region() -> String {
    "europe-west1".to_string()
}

fn default_zone() -> String {
    "europe-west1-b".to_string()
}

fn default_cluster_name() -> String {
    "autopilot-lab".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_instance_name() -> String {
    "prometheus-vm".to_string()
}

fn default_machine_type() -> String {
    "e2-medium".to_string()
}

fn default_image_family() -> String {
    "ubuntu-2204-lts".to_string()
}

fn default_image_project() -> String {
    "ubuntu-os-cloud".to_string()
}

fn default_disk_size_gb() -> u32 {
    30
}

fn default_disk_type() -> String {
    "pd-balanced".to_string()
}

fn default_target_tag() -> String {
    "prometheus-server".to_string()
}

fn default_firewall_rule() -> String {
    "allow-prometheus".to_string()
}

fn default_source_ranges() -> Vec<String> {
    vec!["0.0.0.0/0".to_string()]
}

fn default_helm_repo_name() -> String {
    "prometheus-community".to_string()
}

fn default_helm_repo_url() -> String {
    "https://prometheus-community.github.io/helm-charts".to_string()
}

fn default_ksm_release() -> String {
    "kube-state-metrics".to_string()
}

fn default_ksm_chart() -> String {
    "prometheus-community/kube-state-metrics".to_string()
}

fn default_ksm_namespace() -> String {
    "kube-system".to_string()
}

fn default_ksm_values_file() -> String {
    "ksm-values.yaml".to_string()
}

fn default_ksm_port() -> u16 {
    8080
}

fn default_ip_poll_attempts() -> u32 {
    18
}

fn default_ip_poll_delay_secs() -> u64 {
    10
}

fn default_docker_network() -> String {
    "monitoring".to_string()
}

fn default_prometheus_image() -> String {
    "prom/prometheus:v2.53.0".to_string()
}

fn default_prometheus_container() -> String {
    "prometheus".to_string()
}

fn default_prometheus_port() -> u16 {
    9090
}

fn default_prometheus_config_path() -> String {
    "prometheus/prometheus.yml".to_string()
}

fn default_prometheus_data_volume() -> String {
    "prometheus-data".to_string()
}

fn default_scrape_interval() -> String {
    "15s".to_string()
}

fn default_exporter_image() -> String {
    "prometheuscommunity/stackdriver-exporter:v0.16.0".to_string()
}

fn default_exporter_container() -> String {
    "stackdriver-exporter".to_string()
}

fn default_exporter_port() -> u16 {
    9255
}

fn default_exporter_metric_prefixes() -> Vec<String> {
    vec![
        "kubernetes.io/container/cpu".to_string(),
        "kubernetes.io/container/memory".to_string(),
        "kubernetes.io/node/cpu".to_string(),
        "kubernetes.io/node/memory".to_string(),
    ]
}

fn default_prometheus_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_sampling_interval() -> String {
    "15s".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_manifests_dir() -> String {
    "webapps".to_string()
}

fn default_node_type_label() -> String {
    "label_node_kubernetes_io_instance_type".to_string()
}

fn default_hpa_replicas_metric() -> String {
    "kube_hpa_status_current_replicas".to_string()
}

fn default_rollout_timeout() -> String {
    "10m".to_string()
}

fn default_service_poll_attempts() -> u32 {
    30
}

fn default_service_poll_delay_secs() -> u64 {
    10
}

fn default_workload_image() -> String {
    "nginx:1.27".to_string()
}

fn default_container_port() -> u16 {
    80
}

fn default_replicas() -> u32 {
    1
}

fn default_cpu_request() -> String {
    "250m".to_string()
}

fn default_cpu_limit() -> String {
    "500m".to_string()
}

fn default_memory_request() -> String {
    "64Mi".to_string()
}

fn default_memory_limit() -> String {
    "128Mi".to_string()
}

fn default_hpa_min_replicas() -> u32 {
    1
}

fn default_hpa_max_replicas() -> u32 {
    10
}

fn default_hpa_cpu_target() -> u32 {
    50
}

fn default_loadgen_image() -> String {
    "busybox:1.36".to_string()
}

fn default_loadgen_replicas() -> u32 {
    1
}

impl Default for GcpSettings {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            region: default_region(),
            zone: default_zone(),
        }
    }
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            name: default_cluster_name(),
            namespace: default_namespace(),
        }
    }
}

impl Default for VmSettings {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            machine_type: default_machine_type(),
            image_family: default_image_family(),
            image_project: default_image_project(),
            disk_size_gb: default_disk_size_gb(),
            disk_type: default_disk_type(),
            target_tag: default_target_tag(),
            firewall_rule: default_firewall_rule(),
            source_ranges: default_source_ranges(),
        }
    }
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            helm_repo_name: default_helm_repo_name(),
            helm_repo_url: default_helm_repo_url(),
            ksm_release: default_ksm_release(),
            ksm_chart: default_ksm_chart(),
            ksm_namespace: default_ksm_namespace(),
            ksm_values_file: default_ksm_values_file(),
            ksm_port: default_ksm_port(),
            ip_poll_attempts: default_ip_poll_attempts(),
            ip_poll_delay_secs: default_ip_poll_delay_secs(),
            docker_network: default_docker_network(),
            prometheus_image: default_prometheus_image(),
            prometheus_container: default_prometheus_container(),
            prometheus_port: default_prometheus_port(),
            prometheus_config_path: default_prometheus_config_path(),
            prometheus_data_volume: default_prometheus_data_volume(),
            scrape_interval: default_scrape_interval(),
            exporter_image: default_exporter_image(),
            exporter_container: default_exporter_container(),
            exporter_port: default_exporter_port(),
            exporter_metric_prefixes: default_exporter_metric_prefixes(),
        }
    }
}

impl Default for ExperimentSettings {
    fn default() -> Self {
        Self {
            prometheus_url: default_prometheus_url(),
            sampling_interval: default_sampling_interval(),
            data_dir: default_data_dir(),
            manifests_dir: default_manifests_dir(),
            node_type_label: default_node_type_label(),
            hpa_replicas_metric: default_hpa_replicas_metric(),
            rollout_timeout: default_rollout_timeout(),
            service_poll_attempts: default_service_poll_attempts(),
            service_poll_delay_secs: default_service_poll_delay_secs(),
        }
    }
}

impl Default for WorkloadSettings {
    fn default() -> Self {
        Self {
            image: default_workload_image(),
            container_port: default_container_port(),
            replicas: default_replicas(),
            cpu_request: default_cpu_request(),
            cpu_limit: default_cpu_limit(),
            memory_request: default_memory_request(),
            memory_limit: default_memory_limit(),
            hpa_min_replicas: default_hpa_min_replicas(),
            hpa_max_replicas: default_hpa_max_replicas(),
            hpa_cpu_target: default_hpa_cpu_target(),
            loadgen_image: default_loadgen_image(),
            loadgen_replicas: default_loadgen_replicas(),
        }
    }
}

impl GcpSettings {
    /// Project id, or an error telling the user where to set it
    pub fn require_project(&self) -> Result<&str> {
        if self.project_id.trim().is_empty() {
            return Err(ScaleLabError::missing_setting("gcp.project_id").into());
        }
        Ok(&self.project_id)
    }
}

impl Settings {
    /// Load settings: explicit path first, then the standard locations, then defaults.
    /// An explicit path that cannot be read is an error; a broken discovered file
    /// is reported and ignored.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        match Self::find_config_file() {
            Some(path) => match Self::load_from_file(&path) {
                Ok(settings) => {
                    crate::log_info!("Loaded settings from {}", path.display());
                    Ok(settings)
                }
                Err(e) => {
                    crate::log_warn!("Ignoring unreadable settings file: {:#}", e);
                    Ok(Self::default())
                }
            },
            None => Ok(Self::default()),
        }
    }

    /// Load settings from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(settings)
    }

    /// Find config file in standard locations
    /// Priority:
    /// 1. .scalelab.toml in current directory
    /// 2. ~/.config/scalelab/config.toml (XDG config directory)
    fn find_config_file() -> Option<PathBuf> {
        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Some(local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("scalelab").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        None
    }

    /// Save settings to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize settings")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Generate example config file content
    pub fn example_config() -> Result<String> {
        let header = "# scalelab configuration file\n\
                      # Place this file at ~/.config/scalelab/config.toml or .scalelab.toml in your project\n\
                      # gcp.project_id must be set before provisioning anything\n\n";

        let body = toml::to_string_pretty(&Settings::default())
            .context("Failed to serialize example settings")?;

        Ok(format!("{}{}", header, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.monitoring.ksm_port, 8080);
        assert_eq!(settings.monitoring.exporter_port, 9255);
        assert_eq!(settings.monitoring.ip_poll_attempts, 18);
        assert_eq!(settings.monitoring.ip_poll_delay_secs, 10);
        assert_eq!(settings.experiment.sampling_interval, "15s");
        assert!(settings.gcp.project_id.is_empty());
    }

    #[test]
    fn test_require_project() {
        let mut settings = Settings::default();
        let err = settings.gcp.require_project().unwrap_err();
        assert!(err.to_string().contains("gcp.project_id"));

        settings.gcp.project_id = "lab-123".to_string();
        assert_eq!(settings.gcp.require_project().unwrap(), "lab-123");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let toml_str = r#"
[gcp]
project_id = "lab-123"
region = "us-central1"

[vm]
machine_type = "e2-standard-2"
"#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.gcp.project_id, "lab-123");
        assert_eq!(settings.gcp.region, "us-central1");
        assert_eq!(settings.gcp.zone, "europe-west1-b");
        assert_eq!(settings.vm.machine_type, "e2-standard-2");
        assert_eq!(settings.vm.disk_size_gb, 30);
        assert_eq!(settings.cluster, ClusterSettings::default());
    }

    #[test]
    fn test_example_config_round_trips() {
        let example = Settings::example_config().unwrap();
        assert!(example.contains("[gcp]"));
        assert!(example.contains("[monitoring]"));
        assert!(example.contains("[experiment]"));
        assert!(example.contains("[workload]"));

        let parsed: Settings = toml::from_str(&example).unwrap();
        assert_eq!(parsed, Settings::default());
    }

    #[test]
    fn test_load_explicit_path() {
        let mut temp = tempfile::NamedTempFile::new().unwrap();
        writeln!(temp, "[cluster]\nname = \"hpa-study\"").unwrap();

        let settings = Settings::load(Some(temp.path())).unwrap();
        assert_eq!(settings.cluster.name, "hpa-study");

        assert!(Settings::load(Some(Path::new("/nonexistent/scalelab.toml"))).is_err());
    }
}
