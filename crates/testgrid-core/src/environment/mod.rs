//! Environments and the pool that owns them for the duration of a run.
//!
//! # Modules
//!
//! - [`status`]: `EnvironmentStatus`, `LifecyclePhase`, transition table
//! - [`model`]: `Environment`, `Node`, `EnvironmentSpec`, `ScheduleKey`
//! - [`pool`]: `EnvironmentPool::get_or_create`, `prioritize`
//! - [`error`]: `PoolError` / `PoolResult`

pub mod error;
pub mod model;
pub mod pool;
pub mod status;

pub use error::{PoolError, PoolResult};
pub use model::{Environment, EnvironmentSpec, Node, ScheduleKey};
pub use pool::{prioritize, EnvironmentPool, SharedEnvironment};
pub use status::{EnvironmentStatus, LifecyclePhase};
