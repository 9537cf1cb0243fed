//! Enhanced error types with actionable suggestions

use colored::Colorize;
use thiserror::Error;

/// Error with suggestions the operator can act on
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ScaleLabError {
    pub message: String,
    pub suggestions: Vec<String>,
}

impl ScaleLabError {
    /// Create a new error with suggestions
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestions: Vec::new(),
        }
    }

    /// Add a suggestion to the error
    pub fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Display the error with suggestions
    pub fn display(&self) {
        crate::log_error!("{}", self.message);
        eprintln!("{} {}", "Error:".red().bold(), self.message);

        if !self.suggestions.is_empty() {
            eprintln!();
            eprintln!("{}", "Suggestions:".yellow().bold());
            for suggestion in &self.suggestions {
                eprintln!("  {} {}", "→".blue(), suggestion);
            }
        }
    }

    // Common error patterns

    /// A required settings value is empty
    pub fn missing_setting(key: &str) -> Self {
        Self::new(format!("Required setting '{}' is not set", key))
            .suggest(format!("Set {} in .scalelab.toml", key))
            .suggest("Generate a starting file with: scalelab config init")
    }

    /// A file the runbook needs is absent
    pub fn file_not_found(path: &str, hint: &str) -> Self {
        Self::new(format!("Required file not found: {}", path)).suggest(hint.to_string())
    }

    /// Tool not found error
    pub fn tool_not_found(tool: &str, install_hint: &str) -> Self {
        Self::new(format!("Required tool '{}' not found", tool))
            .suggest(install_hint.to_string())
            .suggest("Ensure the tool is in your PATH")
    }

    /// The operator pressed Ctrl-C during an experiment
    pub fn interrupted() -> Self {
        Self::new("Interrupted by Ctrl-C")
            .suggest("The times recorded so far and any exported metrics were kept")
            .suggest("Re-run the experiment to collect a complete window")
    }

    /// A load balancer never reported an external IP
    pub fn ip_not_assigned(service: &str, namespace: &str) -> Self {
        Self::new(format!(
            "Service {}/{} never reported an external IP",
            namespace, service
        ))
        .suggest(format!(
            "Check the service: kubectl describe service {} -n {}",
            service, namespace
        ))
        .suggest("Pass --ip to skip discovery if the address is already known")
    }

    /// Deployment not ready error
    pub fn deployment_not_ready(name: &str, namespace: &str) -> Self {
        Self::new(format!(
            "Deployment {}/{} failed to become ready",
            namespace, name
        ))
        .suggest(format!("Check pod status: kubectl get pods -n {}", namespace))
        .suggest(format!(
            "Describe it: kubectl describe deployment {} -n {}",
            name, namespace
        ))
    }

    /// gcloud is installed but not authenticated
    pub fn gcloud_not_authenticated() -> Self {
        Self::new("gcloud has no active account")
            .suggest("Log in with: gcloud auth login")
            .suggest("Set the project with: gcloud config set project <project-id>")
    }

    /// Permission denied error
    pub fn permission_denied(operation: &str) -> Self {
        Self::new(format!("Permission denied: {}", operation))
            .suggest("Verify the active gcloud account has the required IAM roles")
            .suggest("Check the project id in your settings file")
    }

    /// Something stopped answering
    pub fn connection_timeout(detail: &str) -> Self {
        Self::new(format!("Timed out: {}", detail))
            .suggest("Check that the cluster is healthy")
            .suggest("Verify network connectivity and firewall rules")
    }
}

/// Helper to display error and exit
pub fn display_error_and_exit(error: ScaleLabError) -> ! {
    error.display();
    std::process::exit(1);
}

/// Map an anyhow error onto a known pattern when possible
pub fn enhance_error(err: anyhow::Error) -> ScaleLabError {
    if let Some(known) = err.downcast_ref::<ScaleLabError>() {
        let mut copy = ScaleLabError::new(known.message.clone());
        copy.suggestions = known.suggestions.clone();
        return copy;
    }

    let err_str = format!("{:#}", err);
    let lower = err_str.to_lowercase();

    if lower.contains("timed out") || lower.contains("connection refused") {
        return ScaleLabError::connection_timeout(&err_str);
    }

    if lower.contains("permission_denied")
        || lower.contains("forbidden")
        || lower.contains("unauthorized")
    {
        return ScaleLabError::permission_denied(&err_str);
    }

    if lower.contains("gcloud auth login") || lower.contains("no active account") {
        return ScaleLabError::gcloud_not_authenticated();
    }

    ScaleLabError::new(err_str)
        .suggest("Run with -v for more details")
        .suggest("Use --dry-run to see the commands that would run")
}
