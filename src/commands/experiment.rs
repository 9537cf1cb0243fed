//! Experiment command implementations

use anyhow::{Context as _, Result, anyhow};
use std::path::Path;
use std::time::Duration;

use crate::commands::{Context, banner};
use crate::config::experiment::{self, ExperimentLayout, ManifestKind};
use crate::config::settings::ExperimentSettings;
use crate::experiment::hpa::{self, HpaOptions};
use crate::experiment::scale::{self, ScaleOptions};
use crate::experiment::ExperimentOutcome;
use crate::loadgen;
use crate::metrics::summary;
use crate::utils::dryrun;
use crate::utils::interrupt;
use crate::utils::duration::parse_run_time;

/// Per-run overrides of the `[experiment]` settings
#[derive(Debug, Clone, Default)]
pub struct ExperimentOverrides {
    pub name: Option<String>,
    pub prometheus_url: Option<String>,
    pub sampling_interval: Option<String>,
    pub data_dir: Option<String>,
}

impl ExperimentOverrides {
    pub fn apply(&self, settings: &ExperimentSettings) -> ExperimentSettings {
        let mut merged = settings.clone();
        if let Some(url) = &self.prometheus_url {
            merged.prometheus_url = url.clone();
        }
        if let Some(interval) = &self.sampling_interval {
            merged.sampling_interval = interval.clone();
        }
        if let Some(dir) = &self.data_dir {
            merged.data_dir = dir.clone();
        }
        merged
    }
}

fn wait_duration(wait_minutes: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(wait_minutes * 60.0)
        .map_err(|_| anyhow!("Wait must be a non-negative number of minutes, got {}", wait_minutes))
}

/// Where a finished or stopped run left its data
fn saved_lines(outcome: &ExperimentOutcome, layout: &ExperimentLayout) -> Vec<String> {
    let metrics = match &outcome.csv {
        Some(csv) => format!("Metrics: {}", csv.display()),
        None => "Metrics: none exported (is Prometheus reachable?)".to_string(),
    };
    vec![format!("Times:   {}", layout.times_file().display()), metrics]
}

fn report(outcome: ExperimentOutcome, layout: &ExperimentLayout) -> Result<()> {
    for line in saved_lines(&outcome, layout) {
        println!("{}", line);
    }

    let outcome = outcome.into_result()?;
    banner(&format!("Experiment {} complete", outcome.name));
    if let Some(csv) = &outcome.csv {
        println!();
        print!("{}", summary::summarize(csv)?);
    }
    Ok(())
}

/// What the scale experiment would do
pub fn scale_plan(layout: &ExperimentLayout, options: &ScaleOptions) -> Result<Vec<String>> {
    let deployment = layout.object(ManifestKind::Deployment);
    let mut plan = vec![format!(
        "apply {} in {}",
        layout.manifest(ManifestKind::Deployment).display(),
        options.namespace
    )];
    for replicas in scale::replica_steps(options.step_size, options.max_replicas)? {
        plan.push(format!(
            "scale {} to {} replicas, hold {}s",
            deployment,
            replicas,
            options.wait.as_secs_f64()
        ));
    }
    plan.push(format!("export metrics to {}", layout.metrics_csv().display()));
    Ok(plan)
}

/// What the HPA experiment would do
pub fn hpa_plan(layout: &ExperimentLayout, options: &HpaOptions) -> Vec<String> {
    let mut plan: Vec<String> = [ManifestKind::Deployment, ManifestKind::Service, ManifestKind::Hpa]
        .into_iter()
        .map(|kind| {
            format!(
                "apply {} in {}",
                layout.manifest(kind).display(),
                options.namespace
            )
        })
        .collect();
    plan.push(format!(
        "wait for the external IP of {}",
        layout.object(ManifestKind::Service)
    ));
    plan.push(format!(
        "load test with {} users at {}/s for {}s",
        options.users,
        options.spawn_rate,
        options.run_time.as_secs()
    ));
    plan.push("delete hpa, service and deployment".to_string());
    plan.push(format!("export metrics to {}", layout.metrics_csv().display()));
    plan
}

fn print_plan(name: &str, plan: &[String]) {
    dryrun::log_action(&format!("Experiment {}", name));
    for step in plan {
        dryrun::log_action(&format!("  {}", step));
    }
}

/// Handle experiment scale command
pub fn run_scale(
    ctx: &Context,
    app: &str,
    overrides: &ExperimentOverrides,
    namespace: Option<String>,
    wait_minutes: f64,
    max_replicas: u32,
    step_size: u32,
) -> Result<()> {
    let settings = overrides.apply(&ctx.settings.experiment);
    let layout = ExperimentLayout::new(app, overrides.name.clone(), &settings);
    let options = ScaleOptions {
        namespace: ctx.namespace(namespace),
        wait: wait_duration(wait_minutes)?,
        max_replicas,
        step_size,
    };

    if dryrun::is_dry_run() {
        print_plan(&layout.name, &scale_plan(&layout, &options)?);
        return Ok(());
    }
    interrupt::install()?;

    let outcome = scale::run(&ctx.kubectl(), &layout, &settings, &options)?;
    report(outcome, &layout)
}

/// Handle experiment hpa command
pub fn run_hpa(
    ctx: &Context,
    app: &str,
    overrides: &ExperimentOverrides,
    namespace: Option<String>,
    users: u32,
    spawn_rate: f64,
    run_time: &str,
) -> Result<()> {
    let settings = overrides.apply(&ctx.settings.experiment);
    let layout = ExperimentLayout::new(app, overrides.name.clone(), &settings);
    let options = HpaOptions {
        namespace: ctx.namespace(namespace),
        users,
        spawn_rate,
        run_time: parse_run_time(run_time)?,
    };

    if dryrun::is_dry_run() {
        print_plan(&layout.name, &hpa_plan(&layout, &options));
        return Ok(());
    }
    interrupt::install()?;

    let outcome = hpa::run(&ctx.kubectl(), &layout, &settings, &options, |config| {
        crate::utils::progress::with_spinner_result(
            &format!("Load testing {} for {}s", config.target, config.run_time.as_secs()),
            "Load test complete",
            || loadgen::run_blocking(config),
        )
    })?;
    report(outcome, &layout)
}

/// Handle experiment summarize command
pub fn summarize(ctx: &Context, name: &str, data_dir: Option<String>) -> Result<()> {
    let data_dir = data_dir.unwrap_or_else(|| ctx.settings.experiment.data_dir.clone());
    let csv = experiment::metrics_csv_path(Path::new(&data_dir), name);
    let summary = summary::summarize(&csv)
        .with_context(|| format!("Failed to summarize experiment {}", name))?;
    print!("{}", summary);
    Ok(())
}
