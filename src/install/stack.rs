//! The collector stack on the monitoring host: network, exporter, Prometheus

use anyhow::{Context, Result};

use crate::config::settings::MonitoringSettings;
use crate::install::{prometheus, stackdriver};
use crate::utils::container::{ContainerRuntime, EnsureOutcome};
use crate::utils::exec::CommandRunner;

/// What `up` did to each container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackStatus {
    pub exporter: EnsureOutcome,
    pub prometheus: EnsureOutcome,
}

pub struct MonitoringStack<'a> {
    runner: &'a dyn CommandRunner,
    runtime: ContainerRuntime,
    monitoring: &'a MonitoringSettings,
}

impl<'a> MonitoringStack<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        runtime: ContainerRuntime,
        monitoring: &'a MonitoringSettings,
    ) -> Self {
        Self {
            runner,
            runtime,
            monitoring,
        }
    }

    /// Bring up the network and both containers. The config file must exist.
    pub fn up(&self, project_id: &str) -> Result<StackStatus> {
        let config_file = prometheus::config_path(self.monitoring)?;
        if !config_file.exists() {
            return Err(crate::utils::ScaleLabError::file_not_found(
                &config_file.display().to_string(),
                "Generate it with: scalelab monitoring config",
            )
            .into());
        }

        self.runtime
            .ensure_network(self.runner, &self.monitoring.docker_network)?;

        let exporter = self
            .runtime
            .ensure_container(
                self.runner,
                &stackdriver::container_spec(self.monitoring, project_id),
            )
            .context("Failed to start the Stackdriver exporter")?;

        let prometheus = self
            .runtime
            .ensure_container(
                self.runner,
                &prometheus::container_spec(self.monitoring, &config_file),
            )
            .context("Failed to start Prometheus")?;

        // A running server keeps the old config until told to reload
        if prometheus == EnsureOutcome::AlreadyRunning {
            self.runtime
                .reload(self.runner, &self.monitoring.prometheus_container)?;
        }

        crate::log_info!(
            "Prometheus listening on port {}",
            self.monitoring.prometheus_port
        );
        Ok(StackStatus {
            exporter,
            prometheus,
        })
    }

    /// Remove both containers, logging failures instead of stopping
    pub fn down(&self) {
        for name in [
            &self.monitoring.prometheus_container,
            &self.monitoring.exporter_container,
        ] {
            if let Err(e) = self.runtime.remove_container(self.runner, name) {
                crate::log_warn!("{:#}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::exec::testing::FakeRunner;

    fn settings_in(dir: &tempfile::TempDir) -> MonitoringSettings {
        MonitoringSettings {
            prometheus_config_path: dir
                .path()
                .join("prometheus.yml")
                .to_string_lossy()
                .into_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn test_up_requires_config() {
        let dir = tempfile::tempdir().unwrap();
        let monitoring = settings_in(&dir);
        let runner = FakeRunner::new();

        let stack = MonitoringStack::new(&runner, ContainerRuntime::Docker, &monitoring);
        assert!(stack.up("lab-123").is_err());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_up_creates_everything_once() {
        let dir = tempfile::tempdir().unwrap();
        let monitoring = settings_in(&dir);
        let runner = FakeRunner::new();
        runner
            .respond("docker network inspect", false, "")
            .respond("docker container inspect", false, "");

        let stack = MonitoringStack::new(&runner, ContainerRuntime::Docker, &monitoring);
        prometheus::write_for_stack(&monitoring, "34.76.10.20").unwrap();
        let status = stack.up("lab-123").unwrap();

        assert_eq!(status.exporter, EnsureOutcome::Created);
        assert_eq!(status.prometheus, EnsureOutcome::Created);
        assert_eq!(runner.calls_starting_with("docker network create monitoring").len(), 1);

        let runs = runner.calls_starting_with("docker run");
        assert_eq!(runs.len(), 2);
        assert!(runs[0].contains("--name stackdriver-exporter"));
        assert!(runs[1].contains("--name prometheus"));
        assert!(runner.calls_starting_with("docker kill").is_empty());
    }

    #[test]
    fn test_up_reloads_running_prometheus() {
        let dir = tempfile::tempdir().unwrap();
        let monitoring = settings_in(&dir);
        let runner = FakeRunner::new();
        runner.respond("docker container inspect", true, "true");

        let stack = MonitoringStack::new(&runner, ContainerRuntime::Docker, &monitoring);
        prometheus::write_for_stack(&monitoring, "34.76.10.20").unwrap();
        stack.up("lab-123").unwrap();

        assert!(runner.calls_starting_with("docker run").is_empty());
        assert_eq!(
            runner.calls_starting_with("docker kill --signal HUP prometheus").len(),
            1
        );
    }

    #[test]
    fn test_down_tolerates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let monitoring = settings_in(&dir);
        let runner = FakeRunner::new();
        runner
            .respond("docker container inspect", true, "true")
            .respond("docker rm", false, "");

        MonitoringStack::new(&runner, ContainerRuntime::Docker, &monitoring).down();
        assert_eq!(runner.calls_starting_with("docker rm -f").len(), 2);
    }
}
