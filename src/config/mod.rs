//! Configuration: settings file and experiment naming

pub mod experiment;
pub mod settings;

pub use settings::Settings;
