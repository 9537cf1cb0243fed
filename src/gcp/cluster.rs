//! GKE Autopilot cluster lifecycle

use anyhow::{Context, Result};

use crate::gcp::gcloud::Gcloud;

/// What `create` ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    AlreadyExists,
    Created,
}

/// An Autopilot cluster in a region
#[derive(Debug, Clone)]
pub struct AutopilotCluster {
    pub name: String,
    pub region: String,
}

impl AutopilotCluster {
    pub fn new(name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
        }
    }

    fn region_flag(&self) -> String {
        format!("--region={}", self.region)
    }

    /// Check if this cluster exists
    pub fn exists(&self, gcloud: &Gcloud) -> Result<bool> {
        gcloud.probe([
            "container",
            "clusters",
            "describe",
            self.name.as_str(),
            self.region_flag().as_str(),
        ])
    }

    /// Create the cluster unless it already exists. Safe to run repeatedly.
    pub fn create(&self, gcloud: &Gcloud) -> Result<CreateOutcome> {
        if self.exists(gcloud)? {
            crate::log_info!(
                "Cluster '{}' already exists in {}, skipping creation",
                self.name,
                self.region
            );
            return Ok(CreateOutcome::AlreadyExists);
        }

        crate::log_info!(
            "Creating Autopilot cluster '{}' in {} (this takes several minutes)...",
            self.name,
            self.region
        );

        gcloud
            .run([
                "container",
                "clusters",
                "create-auto",
                self.name.as_str(),
                self.region_flag().as_str(),
            ])
            .with_context(|| format!("Failed to create cluster {}", self.name))?;

        crate::log_info!("Cluster '{}' created successfully", self.name);
        Ok(CreateOutcome::Created)
    }

    /// Write kubectl credentials for this cluster into the active kubeconfig
    pub fn get_credentials(&self, gcloud: &Gcloud) -> Result<()> {
        crate::log_info!("Fetching credentials for cluster '{}'...", self.name);
        gcloud
            .run([
                "container",
                "clusters",
                "get-credentials",
                self.name.as_str(),
                self.region_flag().as_str(),
            ])
            .with_context(|| format!("Failed to fetch credentials for {}", self.name))
    }

    /// Cluster status string (RUNNING, PROVISIONING, ...), `None` if absent
    pub fn status(&self, gcloud: &Gcloud) -> Result<Option<String>> {
        if !self.exists(gcloud)? {
            return Ok(None);
        }

        let status = gcloud.output([
            "container",
            "clusters",
            "describe",
            self.name.as_str(),
            self.region_flag().as_str(),
            "--format=value(status)",
        ])?;
        Ok(Some(status))
    }

    /// Delete the cluster; absent clusters are left alone
    pub fn delete(&self, gcloud: &Gcloud) -> Result<bool> {
        if !self.exists(gcloud)? {
            crate::log_warn!("Cluster '{}' does not exist", self.name);
            return Ok(false);
        }

        crate::log_info!("Deleting cluster '{}'...", self.name);
        gcloud
            .run([
                "container",
                "clusters",
                "delete",
                self.name.as_str(),
                self.region_flag().as_str(),
            ])
            .with_context(|| format!("Failed to delete cluster {}", self.name))?;

        crate::log_info!("Cluster '{}' deleted successfully", self.name);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::exec::testing::FakeRunner;

    const DESCRIBE: &str = "gcloud container clusters describe lab";

    #[test]
    fn test_create_twice_does_not_fail() {
        let runner = FakeRunner::new();
        // Absent on the first run, present afterwards
        runner.respond(DESCRIBE, false, "").respond(DESCRIBE, true, "");
        let gcloud = Gcloud::new(&runner, "lab-123");
        let cluster = AutopilotCluster::new("lab", "europe-west1");

        assert_eq!(cluster.create(&gcloud).unwrap(), CreateOutcome::Created);
        assert_eq!(cluster.create(&gcloud).unwrap(), CreateOutcome::AlreadyExists);

        let creates = runner.calls_starting_with("gcloud container clusters create-auto");
        assert_eq!(
            creates,
            vec!["gcloud container clusters create-auto lab --region=europe-west1 --project=lab-123 --quiet"]
        );
    }

    #[test]
    fn test_create_failure_propagates() {
        let runner = FakeRunner::new();
        runner
            .respond(DESCRIBE, false, "")
            .respond("gcloud container clusters create-auto", false, "");
        let gcloud = Gcloud::new(&runner, "lab-123");

        let err = AutopilotCluster::new("lab", "europe-west1")
            .create(&gcloud)
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to create cluster lab"));
    }

    #[test]
    fn test_status_of_missing_cluster() {
        let runner = FakeRunner::new();
        runner.respond(DESCRIBE, false, "");
        let gcloud = Gcloud::new(&runner, "lab-123");
        assert_eq!(
            AutopilotCluster::new("lab", "europe-west1").status(&gcloud).unwrap(),
            None
        );
    }

    #[test]
    fn test_delete_missing_cluster_is_noop() {
        let runner = FakeRunner::new();
        runner.respond(DESCRIBE, false, "");
        let gcloud = Gcloud::new(&runner, "lab-123");
        assert!(!AutopilotCluster::new("lab", "europe-west1").delete(&gcloud).unwrap());
        assert!(runner.calls_starting_with("gcloud container clusters delete").is_empty());
    }
}
