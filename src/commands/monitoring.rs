//! Monitoring stack command implementations

use anyhow::Result;

use crate::commands::{Context, banner};
use crate::install::kube_state_metrics;
use crate::install::prometheus::{self, PrometheusConfig};
use crate::install::stack::MonitoringStack;
use crate::utils::ContainerRuntime;
use crate::utils::dryrun::exec_unless_dry_run;

/// Handle monitoring values command
pub fn values(ctx: &Context, force: bool) -> Result<()> {
    let monitoring = &ctx.settings.monitoring;
    let path = kube_state_metrics::values_path(monitoring);
    exec_unless_dry_run(&format!("Write {}", path.display()), || {
        kube_state_metrics::write_default_values(&path, monitoring.ksm_port, force).map(|_| ())
    })
}

/// Handle monitoring ksm command
pub fn install_ksm(ctx: &Context) -> Result<()> {
    kube_state_metrics::install(&ctx.helm(), &ctx.settings.monitoring)?;
    banner("kube-state-metrics installed. Next: scalelab monitoring discover");
    Ok(())
}

/// Handle monitoring ksm-remove command
pub fn remove_ksm(ctx: &Context) -> Result<()> {
    kube_state_metrics::uninstall(&ctx.helm(), &ctx.settings.monitoring)?;
    Ok(())
}

/// Handle monitoring discover command
pub fn discover(ctx: &Context) -> Result<()> {
    let monitoring = &ctx.settings.monitoring;
    let ip = crate::utils::progress::with_spinner_result(
        "Waiting for the kube-state-metrics load balancer",
        "External IP assigned",
        || kube_state_metrics::discover_ip(&ctx.kubectl(), monitoring),
    )?;
    println!("{}:{}", ip, monitoring.ksm_port);
    Ok(())
}

fn resolve_ip(ctx: &Context, ip: Option<String>) -> Result<String> {
    match ip {
        Some(ip) => Ok(ip),
        None => kube_state_metrics::discover_ip(&ctx.kubectl(), &ctx.settings.monitoring),
    }
}

fn write_config(ctx: &Context, ksm_ip: &str) -> Result<()> {
    let monitoring = &ctx.settings.monitoring;
    let path = prometheus::config_path(monitoring)?;
    exec_unless_dry_run(&format!("Write {}", path.display()), || {
        prometheus::write_for_stack(monitoring, ksm_ip).map(|_| ())
    })
}

/// Handle monitoring config command: discover (or take) the IP and write prometheus.yml
pub fn config(ctx: &Context, ip: Option<String>) -> Result<()> {
    let ksm_ip = resolve_ip(ctx, ip)?;
    write_config(ctx, &ksm_ip)?;

    let rendered = PrometheusConfig::for_stack(&ctx.settings.monitoring, &ksm_ip);
    if let Some(target) = rendered.target_of("kube-state-metrics") {
        println!("kube-state-metrics target: {}", target);
    }
    Ok(())
}

/// Handle monitoring up command: render prometheus.yml for the discovered
/// (or given) kube-state-metrics IP, then start the containers
pub fn up(ctx: &Context, ip: Option<String>, runtime: ContainerRuntime) -> Result<()> {
    let project_id = ctx.settings.gcp.require_project()?;

    let ksm_ip = resolve_ip(ctx, ip)?;
    write_config(ctx, &ksm_ip)?;

    let stack = MonitoringStack::new(ctx.runner, runtime, &ctx.settings.monitoring);
    let status = stack.up(project_id)?;
    crate::log_info!(
        "Exporter: {:?}, Prometheus: {:?}",
        status.exporter,
        status.prometheus
    );
    banner(&format!(
        "Prometheus is up on port {}",
        ctx.settings.monitoring.prometheus_port
    ));
    Ok(())
}

/// Handle monitoring down command
pub fn down(ctx: &Context, runtime: ContainerRuntime) -> Result<()> {
    MonitoringStack::new(ctx.runner, runtime, &ctx.settings.monitoring).down();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::utils::exec::testing::FakeRunner;

    fn settings_in(dir: &tempfile::TempDir) -> Settings {
        let mut settings = Settings::default();
        settings.gcp.project_id = "lab-123".to_string();
        settings.monitoring.ksm_values_file = dir
            .path()
            .join("ksm-values.yaml")
            .to_string_lossy()
            .into_owned();
        settings.monitoring.prometheus_config_path = dir
            .path()
            .join("prometheus.yml")
            .to_string_lossy()
            .into_owned();
        settings
    }

    #[test]
    fn test_ksm_requires_values_file() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        let ctx = Context::new(settings_in(&dir), &runner);

        let err = install_ksm(&ctx).unwrap_err();
        assert!(err.to_string().contains("ksm-values.yaml"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_values_then_ksm_installs_release() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        let ctx = Context::new(settings_in(&dir), &runner);

        values(&ctx, false).unwrap();
        install_ksm(&ctx).unwrap();

        assert_eq!(runner.calls_starting_with("helm repo add").len(), 1);
        assert_eq!(runner.calls_starting_with("helm upgrade --install").len(), 1);
    }

    #[test]
    fn test_config_with_explicit_ip_skips_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        let ctx = Context::new(settings_in(&dir), &runner);

        config(&ctx, Some("34.76.10.20".to_string())).unwrap();

        assert!(runner.calls_starting_with("kubectl").is_empty());
        let written = std::fs::read_to_string(dir.path().join("prometheus.yml")).unwrap();
        assert!(written.contains("34.76.10.20:8080"));
    }

    #[test]
    fn test_up_requires_project() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        let mut settings = settings_in(&dir);
        settings.gcp.project_id.clear();
        let ctx = Context::new(settings, &runner);

        assert!(up(&ctx, Some("34.76.10.20".to_string()), ContainerRuntime::Docker).is_err());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_up_discovers_ip_and_writes_config() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        runner
            .respond("kubectl get service kube-state-metrics", true, "'34.76.10.20'")
            .respond("docker network inspect", false, "")
            .respond("docker container inspect", false, "");
        let ctx = Context::new(settings_in(&dir), &runner);

        up(&ctx, None, ContainerRuntime::Docker).unwrap();

        assert_eq!(
            runner
                .calls_starting_with("kubectl get service kube-state-metrics")
                .len(),
            1
        );
        let written = std::fs::read_to_string(dir.path().join("prometheus.yml")).unwrap();
        assert!(written.contains("34.76.10.20:8080"));
        assert_eq!(runner.calls_starting_with("docker run").len(), 2);
    }

    #[test]
    fn test_up_with_ip_writes_config_and_starts_containers() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        runner
            .respond("docker network inspect", false, "")
            .respond("docker container inspect", false, "");
        let ctx = Context::new(settings_in(&dir), &runner);

        up(&ctx, Some("34.76.10.20".to_string()), ContainerRuntime::Docker).unwrap();

        assert!(dir.path().join("prometheus.yml").exists());
        assert_eq!(runner.calls_starting_with("docker run").len(), 2);
    }
}
