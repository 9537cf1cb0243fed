//! Autoscaler experiment: deploy behind an HPA, drive HTTP load at the
//! service, then tear everything down and export what happened

use anyhow::Result;
use std::time::Duration;

use crate::config::experiment::{ExperimentLayout, ManifestKind};
use crate::config::settings::ExperimentSettings;
use crate::experiment::{self, ExperimentOutcome};
use crate::k8s::kubectl::Kubectl;
use crate::loadgen::{LoadTestConfig, LoadTestReport};
use crate::metrics::export::ExportPlan;
use crate::utils::retry::{self, PollPolicy};
use crate::utils::ScaleLabError;
use crate::utils::interrupt;

/// Order the objects are applied in
const APPLY_ORDER: [ManifestKind; 3] = [
    ManifestKind::Deployment,
    ManifestKind::Service,
    ManifestKind::Hpa,
];

#[derive(Debug, Clone)]
pub struct HpaOptions {
    pub namespace: String,
    pub users: u32,
    pub spawn_rate: f64,
    pub run_time: Duration,
}

impl HpaOptions {
    pub fn load_test(&self, target: String) -> LoadTestConfig {
        LoadTestConfig::new(target, self.users, self.spawn_rate, self.run_time)
    }
}

/// Poll the service's load balancer for an external IP
pub fn wait_for_service_ip(
    kubectl: &Kubectl,
    service: &str,
    namespace: &str,
    policy: PollPolicy,
) -> Result<String> {
    retry::poll(policy, "service external IP", |_| {
        kubectl.service_ingress_ip(service, namespace)
    })
    .map_err(|e| {
        if interrupt::is_interruption(&e) {
            return e;
        }
        crate::log_error!("{:#}", e);
        ScaleLabError::ip_not_assigned(service, namespace).into()
    })
}

fn body<L>(
    kubectl: &Kubectl,
    layout: &ExperimentLayout,
    settings: &ExperimentSettings,
    options: &HpaOptions,
    load: L,
) -> Result<()>
where
    L: FnOnce(&LoadTestConfig) -> Result<LoadTestReport>,
{
    let ns = options.namespace.as_str();
    for kind in APPLY_ORDER {
        interrupt::check()?;
        kubectl.apply_file(&layout.manifest(kind), ns)?;
    }

    let policy = PollPolicy::from_secs(
        settings.service_poll_attempts,
        settings.service_poll_delay_secs,
    );
    let ip = wait_for_service_ip(kubectl, &layout.object(ManifestKind::Service), ns, policy)?;
    crate::log_info!("Service is ready at external IP: {}", ip);

    interrupt::check()?;
    let report = load(&options.load_test(format!("http://{}", ip)))?;
    crate::log_info!("Load test finished: {}", report);
    Ok(())
}

fn cleanup(kubectl: &Kubectl, layout: &ExperimentLayout, namespace: &str) {
    crate::log_info!("Cleaning up Kubernetes resources");
    kubectl.delete_tolerant("hpa", &layout.object(ManifestKind::Hpa), namespace, false);
    kubectl.delete_tolerant(
        "service",
        &layout.object(ManifestKind::Service),
        namespace,
        false,
    );
    kubectl.delete_tolerant(
        "deployment",
        &layout.object(ManifestKind::Deployment),
        namespace,
        true,
    );
}

/// Run the experiment with the given load driver
pub fn run<L>(
    kubectl: &Kubectl,
    layout: &ExperimentLayout,
    settings: &ExperimentSettings,
    options: &HpaOptions,
    load: L,
) -> Result<ExperimentOutcome>
where
    L: FnOnce(&LoadTestConfig) -> Result<LoadTestReport>,
{
    for kind in APPLY_ORDER {
        let manifest = layout.manifest(kind);
        if !manifest.exists() {
            return Err(ScaleLabError::file_not_found(
                &manifest.display().to_string(),
                "Render it with: scalelab workload render <app>",
            )
            .into());
        }
    }

    let start = experiment::record_start(layout)?;
    let interrupted = experiment::interrupted(body(kubectl, layout, settings, options, load));
    let end = experiment::record_end(layout);

    cleanup(kubectl, layout, &options.namespace);

    let plan = ExportPlan::hpa(
        &layout.object(ManifestKind::Deployment),
        &layout.object(ManifestKind::Hpa),
        &options.namespace,
        settings,
    );
    let csv = experiment::export_window(layout, settings, &plan, start, end);

    Ok(ExperimentOutcome {
        name: layout.name.clone(),
        start,
        end,
        interrupted,
        csv,
    })
}
