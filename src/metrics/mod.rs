//! Experiment metrics: Prometheus queries, CSV export, summaries

pub mod export;
pub mod prometheus;
pub mod summary;
pub mod times;

pub use prometheus::PrometheusClient;
