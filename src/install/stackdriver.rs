//! Stackdriver (Cloud Monitoring) exporter container

use crate::config::settings::MonitoringSettings;
use crate::utils::container::ContainerSpec;

/// Port the exporter listens on inside its container
pub const EXPORTER_LISTEN_PORT: u16 = 9255;

pub const PROJECT_ENV: &str = "STACKDRIVER_EXPORTER_GOOGLE_PROJECT_ID";

/// Exporter container republishing the configured metric prefixes
pub fn container_spec(monitoring: &MonitoringSettings, project_id: &str) -> ContainerSpec {
    ContainerSpec {
        network: Some(monitoring.docker_network.clone()),
        ports: vec![(monitoring.exporter_port, EXPORTER_LISTEN_PORT)],
        env: vec![(PROJECT_ENV.to_string(), project_id.to_string())],
        args: vec![format!(
            "--monitoring.metrics-type-prefixes={}",
            monitoring.exporter_metric_prefixes.join(",")
        )],
        ..ContainerSpec::new(&monitoring.exporter_container, &monitoring.exporter_image)
    }
}
