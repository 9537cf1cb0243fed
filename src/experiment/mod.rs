//! Experiment runners
//!
//! Both runners share one shape: record the start time, run the body, then
//! always record the end time, clean up where applicable, and export the
//! metrics for the recorded window. A failing body does not skip the export;
//! its error is carried in the outcome.

pub mod hpa;
pub mod scale;

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

use crate::config::experiment::ExperimentLayout;
use crate::config::settings::ExperimentSettings;
use crate::metrics::export::{self, ExportPlan};
use crate::metrics::{PrometheusClient, times};

/// How an experiment went
#[derive(Debug)]
pub struct ExperimentOutcome {
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Error that interrupted the body, if any
    pub interrupted: Option<anyhow::Error>,
    /// CSV written, if Prometheus returned anything
    pub csv: Option<PathBuf>,
}

impl ExperimentOutcome {
    /// Turn an interrupted run into an error once its data has been saved
    pub fn into_result(self) -> Result<Self> {
        match self.interrupted {
            Some(e) => Err(e.context(format!("Experiment {} was interrupted", self.name))),
            None => Ok(self),
        }
    }
}

pub(crate) fn record_start(layout: &ExperimentLayout) -> Result<DateTime<Utc>> {
    let start = Utc::now();
    crate::log_info!("Experiment {} started at {}", layout.name, start.to_rfc3339());
    times::write_start(&layout.times_file(), start)?;
    Ok(start)
}

pub(crate) fn record_end(layout: &ExperimentLayout) -> DateTime<Utc> {
    let end = Utc::now();
    crate::log_info!("Experiment {} ended at {}", layout.name, end.to_rfc3339());
    if let Err(e) = times::append_end(&layout.times_file(), end) {
        crate::log_warn!("{:#}", e);
    }
    end
}

/// Export the recorded window; export problems are logged, never fatal
pub(crate) fn export_window(
    layout: &ExperimentLayout,
    settings: &ExperimentSettings,
    plan: &ExportPlan,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Option<PathBuf> {
    let (start, end) = times::resolve_window(
        &layout.times_file(),
        times::unix_seconds(start),
        times::unix_seconds(end),
    );

    crate::log_info!("Exporting metrics from {}", settings.prometheus_url);
    let client = match PrometheusClient::new(&settings.prometheus_url) {
        Ok(client) => client,
        Err(e) => {
            crate::log_warn!("{:#}", e);
            return None;
        }
    };

    let csv = layout.metrics_csv();
    match export::export(&client, plan, start, end, &settings.sampling_interval, &csv) {
        Ok(true) => Some(csv),
        Ok(false) => None,
        Err(e) => {
            crate::log_warn!("Metrics export failed: {:#}", e);
            None
        }
    }
}

pub(crate) fn interrupted(result: Result<()>) -> Option<anyhow::Error> {
    match result {
        Ok(()) => None,
        Err(e) => {
            crate::log_error!("An error interrupted the experiment: {:#}", e);
            Some(e)
        }
    }
}
