//! Error types for capability space construction and algebra.

/// Errors produced while building or combining capability spaces.
#[derive(Debug, thiserror::Error)]
pub enum SpaceError {
    #[error("invalid range: min {min} is greater than max {max}")]
    InvertedRange { min: u64, max: u64 },

    #[error("invalid range: min equals max ({value}) but max is exclusive")]
    EmptyExclusiveRange { value: u64 },

    #[error("wildcard is not allowed in a deny-list")]
    WildcardInDenyList,

    #[error("no intersection between {left} and {right}")]
    EmptyIntersection { left: String, right: String },

    #[error("node count mismatch: {left} vs {right}")]
    NodeCountMismatch { left: usize, right: usize },

    #[error("invalid requirement: {0}")]
    InvalidRequirement(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for capability space operations.
pub type SpaceResult<T> = std::result::Result<T, SpaceError>;
