//! Test suites: metadata, registration, and execution.
//!
//! # Modules
//!
//! - [`metadata`]: `SuiteMetadata`, `CaseMetadata`, resolved `CaseSpec`
//! - [`registry`]: `Registry`, `CaseSelector`, `CaseRuntime`
//! - [`testsuite`]: the `TestSuite` trait and `CaseOutcome`
//! - [`retry`]: bounded retry with timeout and backoff
//! - [`executor`]: `SuiteExecutor`, the per-batch state machine
//! - [`error`]: `RegistryError` / `RegistryResult`

pub mod error;
pub mod executor;
pub mod metadata;
pub mod registry;
pub mod retry;
pub mod testsuite;

pub use error::{RegistryError, RegistryResult};
pub use executor::SuiteExecutor;
pub use metadata::{CaseMetadata, CaseSpec, SuiteMetadata, DEFAULT_PRIORITY, DEFAULT_TIMEOUT_SECS};
pub use registry::{CaseRuntime, CaseSelector, Registry};
pub use retry::{execute_with_retry, RetryOutcome, RetryPolicy};
pub use testsuite::{CaseContext, CaseOutcome, SuiteContext, TestSuite};
