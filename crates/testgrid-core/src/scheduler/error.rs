//! Errors that abort a run before or after scheduling.

use super::config::ConfigError;
use crate::environment::PoolError;

/// Structural failures of a run. Per-result problems never surface here;
/// they end up in the result's status and message.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("case {case} belongs to unregistered suite {suite}")]
    UnknownSuite { case: String, suite: String },

    #[error("platform reports an empty platform type")]
    EmptyPlatformType,

    #[error("case {case}: invalid requirement: {source}")]
    InvalidRequirement {
        case: String,
        #[source]
        source: testgrid_space::SpaceError,
    },

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("platform code panicked on environment {environment}: {message}")]
    EnvironmentPanicked { environment: String, message: String },

    #[error("results left unresolved after the run: {ids:?}")]
    Unresolved { ids: Vec<String> },
}

/// Result type for scheduler runs.
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
