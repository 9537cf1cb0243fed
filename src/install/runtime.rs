//! Container runtime on the monitoring VM

use anyhow::Result;

use crate::gcp::compute::Instance;
use crate::gcp::gcloud::Gcloud;

const DOCKER_PROBE: &str = "docker --version";

const DOCKER_INSTALL: &str = "curl -fsSL https://get.docker.com -o /tmp/get-docker.sh \
     && sudo sh /tmp/get-docker.sh \
     && sudo usermod -aG docker \"$USER\"";

/// Install Docker on the instance unless it is already present.
/// Returns whether an installation ran.
pub fn ensure_docker(gcloud: &Gcloud, instance: &Instance) -> Result<bool> {
    let probe = instance.ssh_probe(gcloud, DOCKER_PROBE)?;
    if probe.success {
        crate::log_info!(
            "Docker already installed on {}: {}",
            instance.name,
            probe.stdout.trim()
        );
        return Ok(false);
    }

    crate::log_info!("Installing Docker on {}...", instance.name);
    instance.ssh(gcloud, DOCKER_INSTALL)?;
    crate::log_info!("Docker installed on {}", instance.name);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::VmSettings;
    use crate::utils::exec::testing::FakeRunner;

    const SSH: &str = "gcloud compute ssh prometheus-vm --zone=europe-west1-b";

    fn instance() -> Instance {
        Instance::from_settings(&VmSettings::default(), "europe-west1-b")
    }

    #[test]
    fn test_skips_when_docker_present() {
        let runner = FakeRunner::new();
        runner.respond(SSH, true, "Docker version 27.1.1\n");
        let gcloud = Gcloud::new(&runner, "lab-123");

        assert!(!ensure_docker(&gcloud, &instance()).unwrap());
        assert_eq!(runner.calls().len(), 1);
        assert!(runner.calls()[0].contains("--command=docker --version"));
    }

    #[test]
    fn test_installs_when_missing() {
        let runner = FakeRunner::new();
        runner.respond(SSH, false, "").respond(SSH, true, "");
        let gcloud = Gcloud::new(&runner, "lab-123");

        assert!(ensure_docker(&gcloud, &instance()).unwrap());
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].contains("get.docker.com"));
    }
}
