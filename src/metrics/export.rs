//! Prometheus range export to a fixed-step CSV
//!
//! Samples from every query are merged into one table keyed by whole-second
//! timestamp, then resampled onto a regular grid running from the floored
//! start to the floored end (inclusive). Each grid point takes the row of the
//! nearest sampled timestamp, earlier on ties, but only when it lies strictly
//! less than one step away.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::config::settings::ExperimentSettings;
use crate::metrics::prometheus::{PrometheusClient, Series};

pub const TIMESTAMP_ISO: &str = "timestamp_iso";
pub const TIMESTAMP_UNIX: &str = "timestamp_unix";

/// Step used when the sampling interval cannot be parsed
pub const DEFAULT_STEP_SECONDS: u64 = 15;

/// How a grid cell with no nearby sample is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingValue {
    Empty,
    Zero,
}

impl MissingValue {
    fn as_str(&self) -> &'static str {
        match self {
            MissingValue::Empty => "",
            MissingValue::Zero => "0",
        }
    }
}

/// A fixed CSV column fed by the first series of a query
#[derive(Debug, Clone, PartialEq)]
pub struct MetricColumn {
    pub name: String,
    pub query: String,
}

impl MetricColumn {
    pub fn new(name: &str, query: String) -> Self {
        Self {
            name: name.to_string(),
            query,
        }
    }
}

/// What an experiment exports
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPlan {
    pub columns: Vec<MetricColumn>,
    /// Label that splits the node count into one column per node type
    pub node_label: String,
    /// Column for node series lacking the label; `None` drops them
    pub unlabeled_nodes: Option<String>,
    pub missing: MissingValue,
}

fn selector(metric: &str, label: &str, name: &str, namespace: &str) -> String {
    format!(
        "{}{{{}=\"{}\", namespace=\"{}\"}}",
        metric, label, name, namespace
    )
}

pub fn node_count_query(label: &str) -> String {
    format!("count by ({}) (kube_node_labels)", label)
}

impl ExportPlan {
    /// Replica-stepping run: desired replicas and node types, blanks for gaps
    pub fn scale(deployment: &str, namespace: &str, settings: &ExperimentSettings) -> Self {
        Self {
            columns: vec![MetricColumn::new(
                "deployment_spec_replicas",
                selector("kube_deployment_spec_replicas", "deployment", deployment, namespace),
            )],
            node_label: settings.node_type_label.clone(),
            unlabeled_nodes: None,
            missing: MissingValue::Empty,
        }
    }

    /// Autoscaler run: desired, available and HPA replicas, zeros for gaps
    pub fn hpa(deployment: &str, hpa: &str, namespace: &str, settings: &ExperimentSettings) -> Self {
        Self {
            columns: vec![
                MetricColumn::new(
                    "deployment_spec_replicas",
                    selector("kube_deployment_spec_replicas", "deployment", deployment, namespace),
                ),
                MetricColumn::new(
                    "deployment_ready_replicas",
                    selector(
                        "kube_deployment_status_replicas_available",
                        "deployment",
                        deployment,
                        namespace,
                    ),
                ),
                MetricColumn::new(
                    "hpa_current_replicas",
                    selector(&settings.hpa_replicas_metric, "hpa", hpa, namespace),
                ),
            ],
            node_label: settings.node_type_label.clone(),
            unlabeled_nodes: Some("unknown_node".to_string()),
            missing: MissingValue::Zero,
        }
    }
}

/// Samples keyed by whole-second timestamp, then by column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedMetrics {
    pub rows: BTreeMap<i64, BTreeMap<String, String>>,
    pub node_types: BTreeSet<String>,
}

impl MergedMetrics {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn insert(&mut self, ts: f64, column: &str, value: &str) {
        self.rows
            .entry(ts.floor() as i64)
            .or_default()
            .insert(column.to_string(), value.to_string());
    }

    /// Merge the first series of a single-valued query
    pub fn merge_single(&mut self, column: &str, series: &[Series]) {
        if let Some(first) = series.first() {
            for (ts, value) in &first.values {
                self.insert(*ts, column, value);
            }
        }
    }

    /// Merge per-node-type series, one column per label value
    pub fn merge_nodes(&mut self, label: &str, unlabeled: Option<&str>, series: &[Series]) {
        for s in series {
            let node_type = match s.metric.get(label).filter(|v| !v.is_empty()) {
                Some(value) => value.as_str(),
                None => match unlabeled {
                    Some(fallback) => fallback,
                    None => continue,
                },
            };
            self.node_types.insert(node_type.to_string());
            for (ts, value) in &s.values {
                self.insert(*ts, node_type, value);
            }
        }
    }

    /// Nearest sampled timestamp to `t` within `step` seconds, earlier on ties
    pub fn nearest(&self, t: i64, step: i64) -> Option<&BTreeMap<String, String>> {
        let before = self.rows.range(..=t).next_back();
        let after = self.rows.range(t..).next();

        let best = match (before, after) {
            (Some(b), Some(a)) => {
                if (t - b.0) <= (a.0 - t) {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };

        ((best.0 - t).abs() < step).then_some(best.1)
    }
}

/// Grid timestamps from `floor(start)` to `floor(end)` inclusive
pub fn grid(start: f64, end: f64, step: u64) -> Vec<i64> {
    let first = start.floor() as i64;
    let last = end.floor() as i64;
    if step == 0 || last < first {
        return Vec::new();
    }
    (first..=last).step_by(step as usize).collect()
}

fn iso_utc(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

/// Write the resampled table. Returns the number of data rows.
pub fn write_csv(
    path: &Path,
    plan: &ExportPlan,
    merged: &MergedMetrics,
    start: f64,
    end: f64,
    step: u64,
) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let mut header: Vec<&str> = vec![TIMESTAMP_ISO, TIMESTAMP_UNIX];
    header.extend(plan.columns.iter().map(|c| c.name.as_str()));
    header.extend(merged.node_types.iter().map(String::as_str));
    let value_columns = &header[2..];

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(&header)?;

    let mut rows = 0;
    for ts in grid(start, end, step) {
        let row = merged.nearest(ts, step as i64);
        let mut record = vec![iso_utc(ts), ts.to_string()];
        for column in value_columns {
            let value = row
                .and_then(|r| r.get(*column))
                .map(String::as_str)
                .unwrap_or(plan.missing.as_str());
            record.push(value.to_string());
        }
        writer.write_record(&record)?;
        rows += 1;
    }

    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(rows)
}

/// Query every series in the plan and merge them
pub fn collect(
    client: &PrometheusClient,
    plan: &ExportPlan,
    start: f64,
    end: f64,
    step: &str,
) -> MergedMetrics {
    let mut merged = MergedMetrics::default();
    for column in &plan.columns {
        let series = client.query_range(&column.query, start, end, step);
        merged.merge_single(&column.name, &series);
    }

    let nodes = client.query_range(&node_count_query(&plan.node_label), start, end, step);
    merged.merge_nodes(&plan.node_label, plan.unlabeled_nodes.as_deref(), &nodes);
    merged
}

/// Export the window to `csv_path`. No data means no file; returns whether
/// one was written.
pub fn export(
    client: &PrometheusClient,
    plan: &ExportPlan,
    start: f64,
    end: f64,
    sampling_interval: &str,
    csv_path: &Path,
) -> Result<bool> {
    let merged = collect(client, plan, start, end, sampling_interval);
    if merged.is_empty() {
        crate::log_warn!("No metric data retrieved from Prometheus; no CSV written");
        return Ok(false);
    }

    let step = crate::utils::duration::step_seconds_or(sampling_interval, DEFAULT_STEP_SECONDS);
    let rows = write_csv(csv_path, plan, &merged, start, end, step)?;
    crate::log_info!(
        "Metrics exported to {} ({} rows)",
        csv_path.display(),
        rows
    );
    Ok(true)
}
