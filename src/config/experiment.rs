//! Experiment naming and file layout
//!
//! An application `web` maps to manifests `<manifests_dir>/web-deployment.yaml`
//! (and `-service`, `-hpa`, `-loadgen`), Kubernetes objects named
//! `web-deployment` and so on, and result files under `<data_dir>`.

use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::settings::ExperimentSettings;

/// Kinds of workload object an experiment manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestKind {
    Deployment,
    Service,
    Hpa,
    LoadGen,
}

impl ManifestKind {
    pub const ALL: [ManifestKind; 4] = [
        ManifestKind::Deployment,
        ManifestKind::Service,
        ManifestKind::Hpa,
        ManifestKind::LoadGen,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            ManifestKind::Deployment => "deployment",
            ManifestKind::Service => "service",
            ManifestKind::Hpa => "hpa",
            ManifestKind::LoadGen => "loadgen",
        }
    }

    /// Resource type as kubectl spells it
    pub fn kubectl_resource(&self) -> &'static str {
        match self {
            ManifestKind::Deployment | ManifestKind::LoadGen => "deployment",
            ManifestKind::Service => "service",
            ManifestKind::Hpa => "hpa",
        }
    }
}

impl fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Kubernetes object name for an application
pub fn object_name(app: &str, kind: ManifestKind) -> String {
    format!("{}-{}", app, kind.suffix())
}

/// Path of an application's manifest
pub fn manifest_path(manifests_dir: &Path, app: &str, kind: ManifestKind) -> PathBuf {
    manifests_dir.join(format!("{}.yaml", object_name(app, kind)))
}

/// Exported metrics of a named experiment
pub fn metrics_csv_path(data_dir: &Path, name: &str) -> PathBuf {
    data_dir.join(format!("{}_export.csv", name))
}

/// `YYYYMMDD_HHMM_<app>`
pub fn default_experiment_name(app: &str, now: DateTime<Local>) -> String {
    format!("{}_{}", now.format("%Y%m%d_%H%M"), app)
}

/// Where one experiment's inputs and outputs live
#[derive(Debug, Clone)]
pub struct ExperimentLayout {
    pub app: String,
    pub name: String,
    pub data_dir: PathBuf,
    pub manifests_dir: PathBuf,
}

impl ExperimentLayout {
    pub fn new(app: &str, name: Option<String>, settings: &ExperimentSettings) -> Self {
        let name = name.unwrap_or_else(|| default_experiment_name(app, Local::now()));
        Self {
            app: app.to_string(),
            name,
            data_dir: PathBuf::from(&settings.data_dir),
            manifests_dir: PathBuf::from(&settings.manifests_dir),
        }
    }

    pub fn times_file(&self) -> PathBuf {
        self.data_dir.join(format!("{}_times.txt", self.name))
    }

    pub fn metrics_csv(&self) -> PathBuf {
        metrics_csv_path(&self.data_dir, &self.name)
    }

    pub fn manifest(&self, kind: ManifestKind) -> PathBuf {
        manifest_path(&self.manifests_dir, &self.app, kind)
    }

    pub fn object(&self, kind: ManifestKind) -> String {
        object_name(&self.app, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_experiment_name() {
        let now = Local.with_ymd_and_hms(2025, 6, 10, 11, 55, 42).unwrap();
        assert_eq!(default_experiment_name("single-tier", now), "20250610_1155_single-tier");
    }

    #[test]
    fn test_layout_paths() {
        let settings = ExperimentSettings::default();
        let layout = ExperimentLayout::new("web", Some("run1".to_string()), &settings);

        assert_eq!(layout.times_file(), PathBuf::from("data/run1_times.txt"));
        assert_eq!(layout.metrics_csv(), PathBuf::from("data/run1_export.csv"));
        assert_eq!(
            layout.manifest(ManifestKind::Hpa),
            PathBuf::from("webapps/web-hpa.yaml")
        );
        assert_eq!(layout.object(ManifestKind::Deployment), "web-deployment");
    }

    #[test]
    fn test_layout_generates_name() {
        let layout = ExperimentLayout::new("web", None, &ExperimentSettings::default());
        assert!(layout.name.ends_with("_web"));
        assert_eq!(layout.name.len(), "YYYYMMDD_HHMM_web".len());
    }
}
