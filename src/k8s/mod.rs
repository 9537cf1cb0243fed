//! Kubernetes operations through kubectl and helm

pub mod helm;
pub mod kubectl;
pub mod manifests;
