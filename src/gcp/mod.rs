//! Google Cloud operations through the gcloud CLI

pub mod cluster;
pub mod compute;
pub mod gcloud;

pub use cluster::AutopilotCluster;
pub use compute::{FirewallRule, Instance, InstanceStatus};
pub use gcloud::Gcloud;
