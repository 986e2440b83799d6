//! Error types for the environment pool.

use super::status::EnvironmentStatus;

/// Errors produced by the environment pool and lifecycle transitions.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("environment {environment}: invalid status transition {from} -> {to}")]
    InvalidTransition {
        environment: String,
        from: EnvironmentStatus,
        to: EnvironmentStatus,
    },

    #[error("duplicate environment name: {0}")]
    DuplicateName(String),

    #[error("environment {0} declares no nodes")]
    NoNodes(String),

    #[error("capability error: {0}")]
    Space(#[from] testgrid_space::SpaceError),
}

/// Result type for pool operations.
pub type PoolResult<T> = std::result::Result<T, PoolError>;
