//! Utility modules for scalelab

pub mod container;
pub mod dryrun;
pub mod duration;
pub mod errors;
pub mod exec;
pub mod interrupt;
pub mod logger;
pub mod prereqs;
pub mod progress;
pub mod prompt;
pub mod retry;

// Re-export commonly used items
pub use container::ContainerRuntime;
pub use errors::ScaleLabError;
pub use exec::{CommandRunner, Invocation, SystemRunner};
pub use logger::{log_error, log_info, log_warn};
pub use prereqs::{CommonPrereqs, Prerequisite};
pub use prompt::confirm;
pub use retry::{PollPolicy, poll};
