//! Whether a queued result may run on an environment at a given stage.

use testgrid_space::{CheckMode, CheckResult, RequiredStatus};

use crate::environment::Environment;
use crate::result::{Fitness, TestResult};

/// How far the environment has come in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Not deployed yet; only the static capability is known.
    Probe,
    Deployed,
    /// Node OS information is available.
    Connected,
}

/// Evaluate `result` against `environment`.
///
/// Reasons are collected in full so the final skip message lists every
/// mismatch. An OS mismatch is only decidable once connected and makes the
/// result [`Fitness::Incompatible`].
pub fn evaluate(result: &TestResult, environment: &Environment, stage: Stage) -> Fitness {
    if let Some(pinned) = &result.runtime.environment_name {
        if pinned != environment.name() {
            return Fitness::Unfit(CheckResult::fail(format!(
                "case is pinned to environment {pinned}"
            )));
        }
    }

    let check = result
        .requirement
        .check_capability(&environment.capability(), CheckMode::CollectAll);
    if !check.is_ok() {
        return Fitness::Unfit(check);
    }

    match stage {
        Stage::Probe => Fitness::Fits,
        Stage::Deployed if needs_connection(result) => Fitness::NotYet,
        Stage::Deployed => Fitness::Fits,
        Stage::Connected => {
            let mut os_check = CheckResult::ok();
            for node in environment.nodes() {
                if let Some(os) = &node.os {
                    os_check.merge(result.requirement.check_os(os), &node.name);
                }
            }
            if os_check.is_ok() {
                Fitness::Fits
            } else {
                Fitness::Incompatible(format!("OS type mismatch: {}", os_check.joined()))
            }
        }
    }
}

pub fn needs_connection(result: &TestResult) -> bool {
    result.requirement.environment_status == RequiredStatus::Connected
}

/// Fits only results that still wait for a connected environment.
pub fn evaluate_for_connection(result: &TestResult, environment: &Environment) -> Fitness {
    match evaluate(result, environment, Stage::Probe) {
        Fitness::Fits if needs_connection(result) => Fitness::Fits,
        Fitness::Fits => Fitness::NotYet,
        other => other,
    }
}
