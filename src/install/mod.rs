//! Monitoring stack installation: cluster exporter, collector host, VM runtime

pub mod kube_state_metrics;
pub mod prometheus;
pub mod runtime;
pub mod stack;
pub mod stackdriver;
