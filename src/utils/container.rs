//! Container runtime detection and operations (Docker/Podman)

use anyhow::{Context, Result, anyhow};

use crate::utils::exec::{CommandRunner, Invocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRuntime {
    Docker,
    Podman,
}

/// Observed state of a named container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Stopped,
    Absent,
}

/// What `ensure_container` ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    AlreadyRunning,
    Started,
    Created,
}

/// Parameters for `run -d`
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub network: Option<String>,
    /// (host, container)
    pub ports: Vec<(u16, u16)>,
    /// (source, target); source may be a path or a named volume
    pub volumes: Vec<(String, String)>,
    pub env: Vec<(String, String)>,
    /// Arguments passed to the image entrypoint
    pub args: Vec<String>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }
}

impl ContainerRuntime {
    /// Detect which container runtime is available
    pub fn detect() -> Result<Self> {
        // Check for docker first
        if which::which("docker").is_ok() {
            crate::log_info!("Using container runtime: docker");
            return Ok(ContainerRuntime::Docker);
        }

        // Fall back to podman
        if which::which("podman").is_ok() {
            crate::log_info!("Using container runtime: podman");
            return Ok(ContainerRuntime::Podman);
        }

        Err(anyhow!(
            "Neither docker nor podman found. Please install one of them:\n  \
             - Docker: https://docs.docker.com/get-docker/\n  \
             - Podman: https://podman.io/getting-started/installation\n  \
             - On the monitoring VM: scalelab vm install-runtime"
        ))
    }

    /// Get the command name for this runtime
    pub fn command(&self) -> &str {
        match self {
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::Podman => "podman",
        }
    }

    fn invocation(&self) -> Invocation {
        Invocation::new(self.command())
    }

    /// Check if a network exists
    pub fn network_exists(&self, runner: &dyn CommandRunner, name: &str) -> Result<bool> {
        runner.succeeds(
            &self
                .invocation()
                .args(["network", "inspect", name])
                .read_only(),
        )
    }

    /// Create a network unless it already exists
    pub fn ensure_network(&self, runner: &dyn CommandRunner, name: &str) -> Result<()> {
        if self.network_exists(runner, name)? {
            crate::log_info!("Network '{}' already exists", name);
            return Ok(());
        }

        crate::log_info!("Creating network '{}'...", name);
        runner
            .run(&self.invocation().args(["network", "create", name]))
            .with_context(|| format!("Failed to create network {}", name))
    }

    /// Inspect a container's state
    pub fn container_state(&self, runner: &dyn CommandRunner, name: &str) -> Result<ContainerState> {
        let output = runner.output(
            &self
                .invocation()
                .args(["container", "inspect", "--format", "{{.State.Running}}", name])
                .read_only(),
        )?;

        if !output.success {
            return Ok(ContainerState::Absent);
        }

        match output.stdout.trim() {
            "true" => Ok(ContainerState::Running),
            _ => Ok(ContainerState::Stopped),
        }
    }

    /// Build the `run -d` invocation for a spec
    pub fn run_invocation(&self, spec: &ContainerSpec) -> Invocation {
        let mut inv = self
            .invocation()
            .args(["run", "-d", "--name", spec.name.as_str()])
            .args(["--restart", "unless-stopped"]);

        if let Some(network) = &spec.network {
            inv = inv.args(["--network", network.as_str()]);
        }
        for (host, container) in &spec.ports {
            inv = inv.arg("-p").arg(format!("{}:{}", host, container));
        }
        for (source, target) in &spec.volumes {
            inv = inv.arg("-v").arg(format!("{}:{}", source, target));
        }
        for (key, value) in &spec.env {
            inv = inv.arg("-e").arg(format!("{}={}", key, value));
        }

        inv.arg(spec.image.as_str()).args(spec.args.iter().cloned())
    }

    /// Make sure the container is running: skip, start, or create it
    pub fn ensure_container(
        &self,
        runner: &dyn CommandRunner,
        spec: &ContainerSpec,
    ) -> Result<EnsureOutcome> {
        match self.container_state(runner, &spec.name)? {
            ContainerState::Running => {
                crate::log_info!("Container '{}' already running", spec.name);
                Ok(EnsureOutcome::AlreadyRunning)
            }
            ContainerState::Stopped => {
                crate::log_info!("Starting existing container '{}'...", spec.name);
                runner
                    .run(&self.invocation().args(["start", spec.name.as_str()]))
                    .with_context(|| format!("Failed to start container {}", spec.name))?;
                Ok(EnsureOutcome::Started)
            }
            ContainerState::Absent => {
                crate::log_info!("Creating container '{}' from {}...", spec.name, spec.image);
                runner
                    .run(&self.run_invocation(spec))
                    .with_context(|| format!("Failed to run container {}", spec.name))?;
                Ok(EnsureOutcome::Created)
            }
        }
    }

    /// Stop and remove a container; a missing container is not an error
    pub fn remove_container(&self, runner: &dyn CommandRunner, name: &str) -> Result<()> {
        if self.container_state(runner, name)? == ContainerState::Absent {
            crate::log_info!("Container '{}' not present", name);
            return Ok(());
        }

        runner
            .run(&self.invocation().args(["rm", "-f", name]))
            .with_context(|| format!("Failed to remove container {}", name))
    }

    /// Send SIGHUP so Prometheus re-reads its configuration
    pub fn reload(&self, runner: &dyn CommandRunner, name: &str) -> Result<()> {
        runner
            .run(&self.invocation().args(["kill", "--signal", "HUP", name]))
            .with_context(|| format!("Failed to signal container {}", name))
    }
}

impl std::fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command())
    }
}
