//! Scheduling a run: requirement matching, environment lifecycle, batching.
//!
//! # Modules
//!
//! - [`config`]: `RunnerConfig` and its policies
//! - [`runner`]: `Scheduler::run`
//! - [`fitness`]: result-versus-environment evaluation per lifecycle stage
//! - [`cancel`]: `CancelToken`
//! - [`report`]: `RunReport`
//! - [`error`]: `SchedulerError` / `SchedulerResult`

pub mod cancel;
pub mod config;
pub mod error;
pub mod fitness;
pub mod report;
pub mod runner;

pub use cancel::CancelToken;
pub use config::{ConfigError, ConfigResult, EnvironmentGeneration, KeepEnvironment, RunnerConfig};
pub use error::{SchedulerError, SchedulerResult};
pub use fitness::Stage;
pub use report::RunReport;
pub use runner::Scheduler;
