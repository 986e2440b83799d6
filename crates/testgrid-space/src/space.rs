//! The [`Space`] trait shared by every capability primitive and composite.

use crate::check::{CheckMode, CheckResult};
use crate::error::SpaceResult;

/// A value that can act as a requirement or as a capability.
///
/// `self` is always the requirement side. Implementations are pure: none of
/// the operations mutate their operands.
pub trait Space: Sized {
    /// Check whether `capability` satisfies `self`.
    fn check_with(&self, capability: &Self, mode: CheckMode) -> CheckResult;

    /// Check collecting every mismatch.
    fn check(&self, capability: &Self) -> CheckResult {
        self.check_with(capability, CheckMode::CollectAll)
    }

    /// Values acceptable to both `self` and `other`.
    fn intersect(&self, other: &Self) -> SpaceResult<Self>;

    /// The smallest capability that satisfies `self`.
    fn generate_minimum(&self) -> Self;
}

/// Check an optional sub-space. An absent requirement is unconstrained.
pub(crate) fn check_optional<S: Space>(
    requirement: Option<&S>,
    capability: Option<&S>,
    mode: CheckMode,
) -> CheckResult {
    match (requirement, capability) {
        (None, _) => CheckResult::ok(),
        (Some(_), None) => CheckResult::fail("capability shouldn't be None"),
        (Some(req), Some(cap)) => req.check_with(cap, mode),
    }
}

/// Intersect optional sub-spaces; an absent side contributes no constraint.
pub(crate) fn intersect_optional<S: Space + Clone>(
    left: Option<&S>,
    right: Option<&S>,
) -> SpaceResult<Option<S>> {
    match (left, right) {
        (None, None) => Ok(None),
        (Some(one), None) | (None, Some(one)) => Ok(Some(one.clone())),
        (Some(l), Some(r)) => l.intersect(r).map(Some),
    }
}
