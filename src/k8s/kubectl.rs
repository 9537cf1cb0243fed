//! Kubectl wrapper utilities

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::utils::exec::{CommandRunner, Invocation};

/// Jsonpath of a LoadBalancer service's first ingress IP
pub const INGRESS_IP_JSONPATH: &str = "{.status.loadBalancer.ingress[0].ip}";

/// kubectl bound to a runner and an optional kubeconfig
pub struct Kubectl<'a> {
    runner: &'a dyn CommandRunner,
    kubeconfig: Option<PathBuf>,
}

impl<'a> Kubectl<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            kubeconfig: None,
        }
    }

    pub fn with_kubeconfig(mut self, kubeconfig: Option<PathBuf>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }

    fn invocation<'s>(&self, args: impl IntoIterator<Item = &'s str>) -> Invocation {
        let mut inv = Invocation::new("kubectl").args(args);
        if let Some(kc) = &self.kubeconfig {
            inv = inv.env("KUBECONFIG", kc.to_string_lossy());
        }
        inv
    }

    /// Run a mutating kubectl command with inherited output
    pub fn run(&self, args: &[&str]) -> Result<()> {
        self.runner.run(&self.invocation(args.iter().copied()))
    }

    /// Run a read-only kubectl command and capture stdout
    pub fn output(&self, args: &[&str]) -> Result<String> {
        self.runner
            .stdout(&self.invocation(args.iter().copied()).read_only())
    }

    /// Apply a manifest file into a namespace
    pub fn apply_file(&self, path: &Path, namespace: &str) -> Result<()> {
        let path_str = path.to_string_lossy();
        self.run(&["apply", "-f", &path_str, "-n", namespace])
            .with_context(|| format!("Failed to apply {}", path.display()))
    }

    /// Apply a YAML document held in memory
    pub fn apply_yaml(&self, yaml: &str, namespace: &str) -> Result<()> {
        let mut temp_file = tempfile::Builder::new()
            .prefix("scalelab-")
            .suffix(".yaml")
            .tempfile()
            .context("Failed to create temporary manifest")?;
        temp_file.write_all(yaml.as_bytes())?;
        temp_file.flush()?;

        self.apply_file(temp_file.path(), namespace)
    }

    /// Delete a named object
    pub fn delete(&self, resource: &str, name: &str, namespace: &str, wait: bool) -> Result<()> {
        let wait_flag = format!("--wait={}", wait);
        self.run(&["delete", resource, name, "-n", namespace, &wait_flag])
            .with_context(|| format!("Failed to delete {}/{}", resource, name))
    }

    /// Delete, logging instead of failing
    pub fn delete_tolerant(&self, resource: &str, name: &str, namespace: &str, wait: bool) {
        if let Err(e) = self.delete(resource, name, namespace, wait) {
            crate::log_warn!("{:#}", e);
        }
    }

    /// Set a deployment's replica count
    pub fn scale_deployment(&self, name: &str, namespace: &str, replicas: u32) -> Result<()> {
        let replicas_flag = format!("--replicas={}", replicas);
        let target = format!("deployment/{}", name);
        self.run(&["scale", &target, &replicas_flag, "-n", namespace])
            .with_context(|| format!("Failed to scale {} to {} replicas", name, replicas))
    }

    /// Block until a deployment rollout completes or the timeout elapses
    pub fn rollout_status(&self, name: &str, namespace: &str, timeout: &str) -> Result<()> {
        let target = format!("deployment/{}", name);
        let timeout_flag = format!("--timeout={}", timeout);
        // Read-only: waits without changing anything, and must still run under dry-run
        self.runner
            .run(
                &self
                    .invocation(["rollout", "status", &target, "-n", namespace, &timeout_flag])
                    .read_only(),
            )
            .with_context(|| format!("Rollout of {} did not complete", name))
    }

    /// Get a single object with a jsonpath template
    pub fn get_jsonpath(
        &self,
        resource: &str,
        name: &str,
        namespace: &str,
        jsonpath: &str,
    ) -> Result<String> {
        let output_flag = format!("-o=jsonpath={}", jsonpath);
        self.output(&["get", resource, name, "-n", namespace, &output_flag])
    }

    /// External IP of a LoadBalancer service, `None` while pending
    pub fn service_ingress_ip(&self, name: &str, namespace: &str) -> Result<Option<String>> {
        let raw = self.get_jsonpath("service", name, namespace, INGRESS_IP_JSONPATH)?;
        Ok(parse_ingress_ip(&raw))
    }

    /// Name of the active context
    pub fn current_context(&self) -> Result<String> {
        Ok(self.output(&["config", "current-context"])?.trim().to_string())
    }
}

/// Strip the quotes and whitespace kubectl may wrap around a jsonpath result
pub fn parse_ingress_ip(raw: &str) -> Option<String> {
    let ip = raw.trim().trim_matches('\'').trim_matches('"').trim();
    if ip.is_empty() {
        None
    } else {
        Some(ip.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::exec::testing::FakeRunner;

    #[test]
    fn test_parse_ingress_ip() {
        assert_eq!(parse_ingress_ip("'34.76.1.2'\n"), Some("34.76.1.2".to_string()));
        assert_eq!(parse_ingress_ip("34.76.1.2"), Some("34.76.1.2".to_string()));
        assert_eq!(parse_ingress_ip("''"), None);
        assert_eq!(parse_ingress_ip("   "), None);
    }

    #[test]
    fn test_service_ingress_ip_pending_then_ready() {
        let runner = FakeRunner::new();
        runner
            .respond("kubectl get service web-service", true, "")
            .respond("kubectl get service web-service", true, "10.1.2.3");
        let kubectl = Kubectl::new(&runner);

        assert_eq!(kubectl.service_ingress_ip("web-service", "default").unwrap(), None);
        assert_eq!(
            kubectl.service_ingress_ip("web-service", "default").unwrap(),
            Some("10.1.2.3".to_string())
        );
    }

    #[test]
    fn test_scale_and_delete_arguments() {
        let runner = FakeRunner::new();
        let kubectl = Kubectl::new(&runner);

        kubectl.scale_deployment("web-deployment", "lab", 3).unwrap();
        kubectl.delete("hpa", "web-hpa", "lab", false).unwrap();

        let calls = runner.calls();
        assert_eq!(
            calls[0],
            "kubectl scale deployment/web-deployment --replicas=3 -n lab"
        );
        assert_eq!(calls[1], "kubectl delete hpa web-hpa -n lab --wait=false");
    }

    #[test]
    fn test_delete_tolerant_swallows_failure() {
        let runner = FakeRunner::new();
        runner.respond("kubectl delete", false, "");
        Kubectl::new(&runner).delete_tolerant("service", "web-service", "default", false);
        assert_eq!(runner.calls().len(), 1);
    }
}
