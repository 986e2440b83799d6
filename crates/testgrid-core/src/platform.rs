//! The seam between the scheduler and a provisioning backend.

use async_trait::async_trait;

use crate::environment::Environment;

/// Errors a platform may return from lifecycle calls.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// Resources are temporarily exhausted; the environment stays where it
    /// is and its results stay queued.
    #[error("waiting for more resource: {0}")]
    WaitMoreResource(String),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PlatformError {
    pub fn is_wait(&self) -> bool {
        matches!(self, PlatformError::WaitMoreResource(_))
    }
}

/// Result type for platform calls.
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// A provisioning backend.
///
/// Implementations may adjust an environment's nodes and cost (for example
/// to record detected OS information in `connect`) but never its status,
/// which only the scheduler changes.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Matched against each requirement's platform types.
    fn platform_type(&self) -> &str;

    /// Validate and price the environment. `Ok(false)` means it can never be
    /// deployed on this platform.
    async fn prepare(&self, environment: &mut Environment) -> PlatformResult<bool>;

    async fn deploy(&self, environment: &mut Environment) -> PlatformResult<()>;

    /// Establish remote access and detect node OS. The default does nothing.
    async fn connect(&self, _environment: &mut Environment) -> PlatformResult<()> {
        Ok(())
    }

    async fn delete(&self, environment: &mut Environment) -> PlatformResult<()>;
}
