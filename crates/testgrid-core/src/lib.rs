//! testgrid-core: matches test cases to environments and runs them.
//!
//! A run takes selected cases from a [`Registry`](suite::Registry), finds or
//! generates an environment for each case's requirement, prepares and
//! deploys environments through a [`Platform`](platform::Platform), runs the
//! cases that fit, and tears the environments down again. Every status
//! change is published on the [`NotifierBus`](notifier::NotifierBus).
//!
//! # Modules
//!
//! - [`environment`]: `Environment`, `EnvironmentPool`, lifecycle states
//! - [`suite`]: registration, selection and the case state machine
//! - [`scheduler`]: `Scheduler::run`, `RunnerConfig`, `RunReport`
//! - [`result`]: `TestStatus`, `TestResult`, `ResultBoard`
//! - [`notifier`]: publish/subscribe bus and `ResultCollector`
//! - [`platform`]: the `Platform` trait
//! - [`fakes`]: scripted platform and suite for tests
//! - [`obs`], [`telemetry`], [`metrics`]: tracing events, subscriber setup, counters

pub mod environment;
pub mod fakes;
pub mod metrics;
pub mod notifier;
pub mod obs;
pub mod platform;
pub mod result;
pub mod scheduler;
pub mod suite;
pub mod telemetry;

pub use environment::{
    Environment, EnvironmentPool, EnvironmentSpec, EnvironmentStatus, LifecyclePhase, PoolError,
};
pub use notifier::{Message, MessageBody, MessageKind, NotifierBus, ResultCollector, Subscriber};
pub use platform::{Platform, PlatformError, PlatformResult};
pub use result::{ResultBoard, ResultSnapshot, TestResult, TestStatus};
pub use scheduler::{
    CancelToken, EnvironmentGeneration, KeepEnvironment, RunReport, RunnerConfig, Scheduler,
    SchedulerError, SchedulerResult,
};
pub use suite::{
    CaseMetadata, CaseOutcome, CaseRuntime, CaseSelector, Registry, SuiteMetadata, TestSuite,
};

/// Crate version, for run reports and logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
