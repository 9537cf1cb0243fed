//! Replica-stepping experiment: scale a deployment up in fixed steps and
//! watch how the Autopilot node pool follows

use anyhow::{Result, anyhow};
use std::time::Duration;

use crate::config::experiment::{ExperimentLayout, ManifestKind};
use crate::config::settings::ExperimentSettings;
use crate::experiment::{self, ExperimentOutcome};
use crate::k8s::kubectl::Kubectl;
use crate::metrics::export::ExportPlan;
use crate::utils::ScaleLabError;
use crate::utils::interrupt;

#[derive(Debug, Clone)]
pub struct ScaleOptions {
    pub namespace: String,
    /// Hold time after each step
    pub wait: Duration,
    pub max_replicas: u32,
    pub step_size: u32,
}

/// Replica targets: `step_size`, `2 * step_size`, ... up to `max_replicas`
pub fn replica_steps(step_size: u32, max_replicas: u32) -> Result<Vec<u32>> {
    if step_size == 0 {
        return Err(anyhow!("Step size must be at least 1"));
    }
    Ok((step_size..=max_replicas).step_by(step_size as usize).collect())
}

fn body(
    kubectl: &Kubectl,
    layout: &ExperimentLayout,
    settings: &ExperimentSettings,
    options: &ScaleOptions,
    steps: &[u32],
) -> Result<()> {
    let manifest = layout.manifest(ManifestKind::Deployment);
    let deployment = layout.object(ManifestKind::Deployment);
    let ns = options.namespace.as_str();

    kubectl.apply_file(&manifest, ns)?;
    kubectl
        .rollout_status(&deployment, ns, &settings.rollout_timeout)
        .map_err(|e| e.context(ScaleLabError::deployment_not_ready(&deployment, ns)))?;

    let progress =
        crate::utils::progress::create_progress_bar(steps.len() as u64, "Scaling");
    for &replicas in steps {
        interrupt::check()?;
        progress.set_message(format!("{} replicas", replicas));
        kubectl.scale_deployment(&deployment, ns, replicas)?;
        kubectl.rollout_status(&deployment, ns, &settings.rollout_timeout)?;

        crate::log_info!(
            "{} at {} replicas, holding for {}s",
            deployment,
            replicas,
            options.wait.as_secs_f64()
        );
        interrupt::sleep(options.wait)?;
        progress.inc(1);
    }
    progress.finish_and_clear();

    Ok(())
}

/// Run the experiment. The times file and CSV are written even when the
/// body fails; check `interrupted` on the outcome.
pub fn run(
    kubectl: &Kubectl,
    layout: &ExperimentLayout,
    settings: &ExperimentSettings,
    options: &ScaleOptions,
) -> Result<ExperimentOutcome> {
    let manifest = layout.manifest(ManifestKind::Deployment);
    if !manifest.exists() {
        return Err(ScaleLabError::file_not_found(
            &manifest.display().to_string(),
            "Render it with: scalelab workload render <app>",
        )
        .into());
    }
    let steps = replica_steps(options.step_size, options.max_replicas)?;

    let start = experiment::record_start(layout)?;
    let interrupted = experiment::interrupted(body(kubectl, layout, settings, options, &steps));
    let end = experiment::record_end(layout);

    let plan = ExportPlan::scale(
        &layout.object(ManifestKind::Deployment),
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
