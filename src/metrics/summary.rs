//! Per-column summary of an exported experiment CSV

use anyhow::{Context, Result};
use colored::Colorize;
use std::fmt;
use std::path::Path;

use crate::metrics::export::{TIMESTAMP_ISO, TIMESTAMP_UNIX};
use crate::utils::ScaleLabError;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub name: String,
    /// Rows holding a numeric value
    pub samples: usize,
    pub peak: Option<f64>,
    /// First timestamp at which the peak was reached
    pub peak_at: Option<String>,
    /// Value in the last row, if that cell is numeric
    pub last: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentSummary {
    pub rows: usize,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
    pub columns: Vec<ColumnSummary>,
}

fn parse_cell(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Summarize an export CSV
pub fn summarize(path: &Path) -> Result<ExperimentSummary> {
    if !path.exists() {
        return Err(ScaleLabError::file_not_found(
            &path.display().to_string(),
            "Run an experiment first, or check --data-dir and the experiment name",
        )
        .into());
    }

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?
        .clone();

    let ts_index = headers.iter().position(|h| h == TIMESTAMP_ISO);
    let value_indices: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| *h != TIMESTAMP_ISO && *h != TIMESTAMP_UNIX)
        .map(|(i, _)| i)
        .collect();

    let mut columns: Vec<ColumnSummary> = value_indices
        .iter()
        .map(|&i| ColumnSummary {
            name: headers[i].to_string(),
            samples: 0,
            peak: None,
            peak_at: None,
            last: None,
        })
        .collect();

    let mut rows = 0;
    let mut first_timestamp = None;
    let mut last_timestamp = None;

    for record in reader.records() {
        let record = record.with_context(|| format!("Malformed row in {}", path.display()))?;
        rows += 1;

        let ts = ts_index
            .and_then(|i| record.get(i))
            .unwrap_or_default()
            .to_string();
        if first_timestamp.is_none() {
            first_timestamp = Some(ts.clone());
        }
        last_timestamp = Some(ts.clone());

        for (column, &i) in columns.iter_mut().zip(&value_indices) {
            let value = record.get(i).and_then(parse_cell);
            column.last = value;
            if let Some(v) = value {
                column.samples += 1;
                if column.peak.is_none_or(|p| v > p) {
                    column.peak = Some(v);
                    column.peak_at = Some(ts.clone());
                }
            }
        }
    }

    Ok(ExperimentSummary {
        rows,
        first_timestamp,
        last_timestamp,
        columns,
    })
}

fn fmt_value(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{}", v))
}

impl fmt::Display for ExperimentSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} rows from {} to {}",
            self.rows,
            self.first_timestamp.as_deref().unwrap_or("-"),
            self.last_timestamp.as_deref().unwrap_or("-")
        )?;
        writeln!(
            f,
            "{:<40} {:>8} {:>8} {:>8}  {}",
            "column".bold(),
            "samples".bold(),
            "peak".bold(),
            "last".bold(),
            "first peak at".bold()
        )?;
        for column in &self.columns {
            writeln!(
                f,
                "{:<40} {:>8} {:>8} {:>8}  {}",
                column.name.cyan(),
                column.samples,
                fmt_value(column.peak),
                fmt_value(column.last),
                column.peak_at.as_deref().unwrap_or("-")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_summarize_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_export.csv");
        fs::write(
            &path,
            "timestamp_iso,timestamp_unix,deployment_spec_replicas,e2-medium\n\
             2025-06-10T09:55:00+00:00,1749549300,1,\n\
             2025-06-10T09:55:15+00:00,1749549315,3,2\n\
             2025-06-10T09:55:30+00:00,1749549330,3,2\n\
             2025-06-10T09:55:45+00:00,1749549345,2,\n",
        )
        .unwrap();

        let summary = summarize(&path).unwrap();
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.first_timestamp.as_deref(), Some("2025-06-10T09:55:00+00:00"));

        let replicas = &summary.columns[0];
        assert_eq!(replicas.name, "deployment_spec_replicas");
        assert_eq!(replicas.peak, Some(3.0));
        assert_eq!(replicas.peak_at.as_deref(), Some("2025-06-10T09:55:15+00:00"));
        assert_eq!(replicas.last, Some(2.0));
        assert_eq!(replicas.samples, 4);

        let nodes = &summary.columns[1];
        assert_eq!(nodes.samples, 2);
        assert_eq!(nodes.peak, Some(2.0));
        assert_eq!(nodes.last, None);

        let text = summary.to_string();
        assert!(text.contains("4 rows"));
    }

    #[test]
    fn test_missing_file_is_descriptive() {
        let err = summarize(Path::new("/nonexistent/run_export.csv")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/run_export.csv"));
    }
}
