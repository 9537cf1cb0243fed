//! Compute Engine: the monitoring VM and its firewall rule

use anyhow::{Context, Result};
use std::fmt;

use crate::config::settings::VmSettings;
use crate::gcp::gcloud::Gcloud;
use crate::utils::exec::CommandOutput;

/// Instance lifecycle states as gcloud reports them
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceStatus {
    Provisioning,
    Staging,
    Running,
    Stopping,
    Suspended,
    Terminated,
    Other(String),
}

impl InstanceStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "PROVISIONING" => InstanceStatus::Provisioning,
            "STAGING" => InstanceStatus::Staging,
            "RUNNING" => InstanceStatus::Running,
            "STOPPING" => InstanceStatus::Stopping,
            "SUSPENDED" => InstanceStatus::Suspended,
            "TERMINATED" => InstanceStatus::Terminated,
            other => InstanceStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceStatus::Provisioning => f.write_str("PROVISIONING"),
            InstanceStatus::Staging => f.write_str("STAGING"),
            InstanceStatus::Running => f.write_str("RUNNING"),
            InstanceStatus::Stopping => f.write_str("STOPPING"),
            InstanceStatus::Suspended => f.write_str("SUSPENDED"),
            InstanceStatus::Terminated => f.write_str("TERMINATED"),
            InstanceStatus::Other(s) => f.write_str(s),
        }
    }
}

/// The monitoring VM
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub zone: String,
    pub machine_type: String,
    pub image_family: String,
    pub image_project: String,
    pub disk_size_gb: u32,
    pub disk_type: String,
    pub tags: Vec<String>,
}

impl Instance {
    pub fn from_settings(vm: &VmSettings, zone: &str) -> Self {
        Self {
            name: vm.instance_name.clone(),
            zone: zone.to_string(),
            machine_type: vm.machine_type.clone(),
            image_family: vm.image_family.clone(),
            image_project: vm.image_project.clone(),
            disk_size_gb: vm.disk_size_gb,
            disk_type: vm.disk_type.clone(),
            tags: vec![vm.target_tag.clone()],
        }
    }

    fn zone_flag(&self) -> String {
        format!("--zone={}", self.zone)
    }

    fn instances_args(&self, verb: &str) -> Vec<String> {
        vec![
            "compute".to_string(),
            "instances".to_string(),
            verb.to_string(),
            self.name.clone(),
            self.zone_flag(),
        ]
    }

    /// Current status, `None` when the instance does not exist
    pub fn status(&self, gcloud: &Gcloud) -> Result<Option<InstanceStatus>> {
        if !gcloud.probe(self.instances_args("describe"))? {
            return Ok(None);
        }

        let mut args = self.instances_args("describe");
        args.push("--format=value(status)".to_string());
        Ok(Some(InstanceStatus::parse(&gcloud.output(args)?)))
    }

    /// Create the instance unless it already exists
    pub fn create(&self, gcloud: &Gcloud) -> Result<bool> {
        if let Some(status) = self.status(gcloud)? {
            crate::log_info!(
                "Instance '{}' already exists ({}), skipping creation",
                self.name,
                status
            );
            return Ok(false);
        }

        crate::log_info!(
            "Creating instance '{}' ({}) in {}...",
            self.name,
            self.machine_type,
            self.zone
        );

        let mut args = self.instances_args("create");
        args.extend([
            format!("--machine-type={}", self.machine_type),
            format!("--image-family={}", self.image_family),
            format!("--image-project={}", self.image_project),
            format!("--boot-disk-size={}GB", self.disk_size_gb),
            format!("--boot-disk-type={}", self.disk_type),
            format!("--tags={}", self.tags.join(",")),
            "--scopes=cloud-platform".to_string(),
        ]);

        gcloud
            .run(args)
            .with_context(|| format!("Failed to create instance {}", self.name))?;

        crate::log_info!("Instance '{}' created successfully", self.name);
        Ok(true)
    }

    /// Start the instance if it is not already running
    pub fn start(&self, gcloud: &Gcloud) -> Result<()> {
        match self.status(gcloud)? {
            None => Err(anyhow::anyhow!(
                "Instance '{}' does not exist. Create it first with: scalelab vm create",
                self.name
            )),
            Some(InstanceStatus::Running) => {
                crate::log_info!("Instance '{}' is already running", self.name);
                Ok(())
            }
            Some(_) => {
                crate::log_info!("Starting instance '{}'...", self.name);
                gcloud
                    .run(self.instances_args("start"))
                    .with_context(|| format!("Failed to start instance {}", self.name))
            }
        }
    }

    /// Stop the instance if it is running
    pub fn stop(&self, gcloud: &Gcloud) -> Result<()> {
        match self.status(gcloud)? {
            None => {
                crate::log_warn!("Instance '{}' does not exist", self.name);
                Ok(())
            }
            Some(InstanceStatus::Terminated) => {
                crate::log_info!("Instance '{}' is already stopped", self.name);
                Ok(())
            }
            Some(_) => {
                crate::log_info!("Stopping instance '{}'...", self.name);
                gcloud
                    .run(self.instances_args("stop"))
                    .with_context(|| format!("Failed to stop instance {}", self.name))
            }
        }
    }

    /// Delete the instance; absent instances are left alone
    pub fn delete(&self, gcloud: &Gcloud) -> Result<bool> {
        if self.status(gcloud)?.is_none() {
            crate::log_warn!("Instance '{}' does not exist", self.name);
            return Ok(false);
        }

        crate::log_info!("Deleting instance '{}'...", self.name);
        gcloud
            .run(self.instances_args("delete"))
            .with_context(|| format!("Failed to delete instance {}", self.name))?;
        Ok(true)
    }

    /// External NAT IP of the first interface
    pub fn external_ip(&self, gcloud: &Gcloud) -> Result<Option<String>> {
        let mut args = self.instances_args("describe");
        args.push("--format=get(networkInterfaces[0].accessConfigs[0].natIP)".to_string());
        let ip = gcloud.output(args)?;
        Ok((!ip.is_empty()).then_some(ip))
    }

    fn ssh_invocation(&self, gcloud: &Gcloud, command: &str) -> crate::utils::Invocation {
        gcloud.invocation([
            "compute".to_string(),
            "ssh".to_string(),
            self.name.clone(),
            self.zone_flag(),
            format!("--command={}", command),
        ])
    }

    /// Run a mutating shell command on the instance over SSH
    pub fn ssh(&self, gcloud: &Gcloud, command: &str) -> Result<()> {
        gcloud
            .runner()
            .run(&self.ssh_invocation(gcloud, command))
            .with_context(|| format!("Remote command failed on {}: {}", self.name, command))
    }

    /// Run a read-only probe on the instance over SSH
    pub fn ssh_probe(&self, gcloud: &Gcloud, command: &str) -> Result<CommandOutput> {
        gcloud
            .runner()
            .output(&self.ssh_invocation(gcloud, command).read_only())
    }
}

/// Ingress rule letting the collector port reach tagged instances
#[derive(Debug, Clone)]
pub struct FirewallRule {
    pub name: String,
    pub network: String,
    pub port: u16,
    pub target_tag: String,
    pub source_ranges: Vec<String>,
}

impl FirewallRule {
    pub fn from_settings(vm: &VmSettings, port: u16) -> Self {
        Self {
            name: vm.firewall_rule.clone(),
            network: "default".to_string(),
            port,
            target_tag: vm.target_tag.clone(),
            source_ranges: vm.source_ranges.clone(),
        }
    }

    pub fn exists(&self, gcloud: &Gcloud) -> Result<bool> {
        gcloud.probe(["compute", "firewall-rules", "describe", self.name.as_str()])
    }

    /// Create the rule unless it already exists
    pub fn ensure(&self, gcloud: &Gcloud) -> Result<bool> {
        if self.exists(gcloud)? {
            crate::log_info!("Firewall rule '{}' already exists", self.name);
            return Ok(false);
        }

        crate::log_info!(
            "Creating firewall rule '{}' (tcp:{} -> tag {})...",
            self.name,
            self.port,
            self.target_tag
        );

        gcloud
            .run([
                "compute".to_string(),
                "firewall-rules".to_string(),
                "create".to_string(),
                self.name.clone(),
                format!("--network={}", self.network),
                "--direction=INGRESS".to_string(),
                format!("--allow=tcp:{}", self.port),
                format!("--target-tags={}", self.target_tag),
                format!("--source-ranges={}", self.source_ranges.join(",")),
            ])
            .with_context(|| format!("Failed to create firewall rule {}", self.name))?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::exec::testing::FakeRunner;

    fn instance() -> Instance {
        Instance::from_settings(&VmSettings::default(), "europe-west1-b")
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(InstanceStatus::parse("RUNNING\n"), InstanceStatus::Running);
        assert_eq!(InstanceStatus::parse("terminated"), InstanceStatus::Terminated);
        assert_eq!(
            InstanceStatus::parse("REPAIRING"),
            InstanceStatus::Other("REPAIRING".to_string())
        );
    }

    #[test]
    fn test_create_skips_existing_instance() {
        let runner = FakeRunner::new();
        runner.respond("gcloud compute instances describe", true, "RUNNING\n");
        let gcloud = Gcloud::new(&runner, "lab-123");

        assert!(!instance().create(&gcloud).unwrap());
        assert!(runner.calls_starting_with("gcloud compute instances create").is_empty());
    }

    #[test]
    fn test_create_passes_machine_shape() {
        let runner = FakeRunner::new();
        runner.respond("gcloud compute instances describe", false, "");
        let gcloud = Gcloud::new(&runner, "lab-123");

        assert!(instance().create(&gcloud).unwrap());
        let create = &runner.calls_starting_with("gcloud compute instances create")[0];
        assert!(create.contains("prometheus-vm --zone=europe-west1-b"));
        assert!(create.contains("--machine-type=e2-medium"));
        assert!(create.contains("--image-family=ubuntu-2204-lts"));
        assert!(create.contains("--boot-disk-size=30GB"));
        assert!(create.contains("--tags=prometheus-server"));
    }

    #[test]
    fn test_start_and_stop_respect_state() {
        let runner = FakeRunner::new();
        runner.respond("gcloud compute instances describe", true, "TERMINATED");
        let gcloud = Gcloud::new(&runner, "lab-123");

        instance().stop(&gcloud).unwrap();
        assert!(runner.calls_starting_with("gcloud compute instances stop").is_empty());

        instance().start(&gcloud).unwrap();
        assert_eq!(runner.calls_starting_with("gcloud compute instances start").len(), 1);
    }

    #[test]
    fn test_start_missing_instance_fails() {
        let runner = FakeRunner::new();
        runner.respond("gcloud compute instances describe", false, "");
        let gcloud = Gcloud::new(&runner, "lab-123");
        assert!(instance().start(&gcloud).is_err());
    }

    #[test]
    fn test_firewall_check_then_create() {
        let runner = FakeRunner::new();
        runner
            .respond("gcloud compute firewall-rules describe", false, "")
            .respond("gcloud compute firewall-rules describe", true, "");
        let gcloud = Gcloud::new(&runner, "lab-123");
        let rule = FirewallRule::from_settings(&VmSettings::default(), 9090);

        assert!(rule.ensure(&gcloud).unwrap());
        assert!(!rule.ensure(&gcloud).unwrap());

        let creates = runner.calls_starting_with("gcloud compute firewall-rules create");
        assert_eq!(creates.len(), 1);
        assert!(creates[0].contains("--allow=tcp:9090"));
        assert!(creates[0].contains("--target-tags=prometheus-server"));
    }
}
