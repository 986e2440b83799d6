//! Structured lifecycle events for test runs.
//!
//! - `RunSpan` RAII guard tagging everything inside a run with its id
//! - `emit_*` functions for run start/finish, environment transitions,
//!   result finalization and platform errors
//!
//! Events are plain `tracing` events carrying an `event = "..."` field, so
//! they can be filtered with `TESTGRID_LOG` and rendered as JSON by
//! [`crate::telemetry::init_tracing`].

use tracing::{info, warn};

use crate::environment::EnvironmentStatus;
use crate::result::TestStatus;

/// Enters a span tagged with the run id for as long as it lives.
///
/// The span is not held across `.await` points; use
/// [`RunSpan::span`] with `Instrument` for async code.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        Self {
            _span: Self::span(run_id).entered(),
        }
    }

    /// The run span without entering it.
    pub fn span(run_id: &str) -> tracing::Span {
        tracing::info_span!("testgrid.run", run_id = %run_id)
    }
}

pub fn emit_run_started(run_id: &str, test_count: usize, environments: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        test_count = test_count,
        environments = environments,
    );
}

/// Run finished; `failed` is also the process exit code.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, total: usize, failed: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        total = total,
        failed = failed,
    );
}

pub fn emit_environment_transition(
    environment: &str,
    previous: EnvironmentStatus,
    status: EnvironmentStatus,
) {
    info!(
        event = "env.transition",
        environment = %environment,
        previous = %previous,
        status = %status,
    );
}

pub fn emit_result_finalized(result_id: &str, case: &str, status: TestStatus, message: &str) {
    info!(
        event = "result.finalized",
        result = %result_id,
        case = %case,
        status = %status,
        message = %message,
    );
}

/// A platform call failed (warning level).
pub fn emit_platform_error(environment: &str, phase: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "env.platform_error",
        environment = %environment,
        phase = %phase,
        error = %error,
    );
}
