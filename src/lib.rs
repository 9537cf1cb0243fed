//! scalelab - runbook CLI for GKE autoscaling experiments
//!
//! Provisions an Autopilot cluster and a monitoring VM, launches the
//! Prometheus collection stack, and runs scaling experiments whose
//! metrics are exported to CSV for offline analysis.

pub mod commands;
pub mod config;
pub mod experiment;
pub mod gcp;
pub mod install;
pub mod k8s;
pub mod loadgen;
pub mod metrics;
pub mod utils;
