//! Error types for suite registration and selection.

/// Errors produced by the [`Registry`](super::Registry).
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("suite already registered: {0}")]
    DuplicateSuite(String),

    #[error("case {case} registered twice in suite {suite}")]
    DuplicateCase { suite: String, case: String },

    #[error("suite {0} has no cases")]
    EmptySuite(String),

    #[error("case {case}: invalid requirement: {source}")]
    InvalidRequirement {
        case: String,
        #[source]
        source: testgrid_space::SpaceError,
    },

    #[error("invalid case pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Result type for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
