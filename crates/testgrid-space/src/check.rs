//! Outcome of a requirement-versus-capability check.
//!
//! [`CheckResult`] accumulates human-readable reasons from nested checks.
//! [`Checker`] walks the fields of a composite space and honours
//! [`CheckMode`], stopping at the first failing field when asked to.

use serde::{Deserialize, Serialize};

/// How a composite check reacts to a failing sub-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckMode {
    /// Stop at the first failing field.
    FirstFailure,
    /// Visit every field so that all mismatches are reported.
    #[default]
    CollectAll,
}

/// Result of checking a requirement against a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub result: bool,
    pub reasons: Vec<String>,
}

impl Default for CheckResult {
    fn default() -> Self {
        Self::ok()
    }
}

impl CheckResult {
    /// A satisfied check with no reasons.
    pub fn ok() -> Self {
        Self {
            result: true,
            reasons: Vec::new(),
        }
    }

    /// A failed check carrying a single reason.
    pub fn fail(reason: impl Into<String>) -> Self {
        let mut result = Self::ok();
        result.add_reason(reason);
        result
    }

    pub fn is_ok(&self) -> bool {
        self.result
    }

    /// Mark the check failed and record `reason` unless it is already listed.
    pub fn add_reason(&mut self, reason: impl Into<String>) {
        self.result = false;
        let reason = reason.into();
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
    }

    /// Fold a sub-check into this one, prefixing its reasons with `name`.
    ///
    /// Reasons that already carry a `field: detail` shape are joined with
    /// `/` so nested paths read `node[0]/core_count: ...`.
    pub fn merge(&mut self, sub: CheckResult, name: &str) {
        self.result = self.result && sub.result;
        for reason in sub.reasons {
            let reason = if name.is_empty() {
                reason
            } else if reason.contains(": ") {
                format!("{name}/{reason}")
            } else {
                format!("{name}: {reason}")
            };
            self.add_reason(reason);
        }
    }

    /// Reasons joined into one line, for result messages.
    pub fn joined(&self) -> String {
        self.reasons.join("; ")
    }
}

/// Field-by-field driver for composite checks.
pub struct Checker {
    result: CheckResult,
    mode: CheckMode,
}

impl Checker {
    pub fn new(mode: CheckMode) -> Self {
        Self {
            result: CheckResult::ok(),
            mode,
        }
    }

    /// Run `check` for the field `name` unless an earlier field already
    /// failed in [`CheckMode::FirstFailure`].
    pub fn field(mut self, name: &str, check: impl FnOnce(CheckMode) -> CheckResult) -> Self {
        if self.stopped() {
            return self;
        }
        let sub = check(self.mode);
        self.result.merge(sub, name);
        self
    }

    /// Record a failure that is not tied to a sub-space.
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        if !self.stopped() {
            self.result.add_reason(reason);
        }
        self
    }

    pub fn stopped(&self) -> bool {
        self.mode == CheckMode::FirstFailure && !self.result.result
    }

    pub fn finish(self) -> CheckResult {
        self.result
    }
}
