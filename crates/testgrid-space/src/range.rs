//! Integer count ranges.

use std::cmp::{max, min};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::check::{CheckMode, CheckResult};
use crate::error::{SpaceError, SpaceResult};
use crate::space::Space;

/// A count constraint such as "at least 2 cores" or "1 to 4 NICs".
///
/// `max = None` means unbounded. Equality compares the normalized
/// inclusive bounds, so `[1, 3)` equals `[1, 2]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "RawCountRange", into = "RawCountRange")]
pub struct CountRange {
    min: u64,
    max: Option<u64>,
    max_inclusive: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawCountRange {
    #[serde(default)]
    min: u64,
    #[serde(default)]
    max: Option<u64>,
    #[serde(default = "default_inclusive")]
    max_inclusive: bool,
}

fn default_inclusive() -> bool {
    true
}

impl TryFrom<RawCountRange> for CountRange {
    type Error = SpaceError;

    fn try_from(raw: RawCountRange) -> SpaceResult<Self> {
        CountRange::new(raw.min, raw.max, raw.max_inclusive)
    }
}

impl From<CountRange> for RawCountRange {
    fn from(range: CountRange) -> Self {
        Self {
            min: range.min,
            max: range.max,
            max_inclusive: range.max_inclusive,
        }
    }
}

impl CountRange {
    /// Build a validated range.
    pub fn new(min: u64, max: Option<u64>, max_inclusive: bool) -> SpaceResult<Self> {
        if let Some(upper) = max {
            if min > upper {
                return Err(SpaceError::InvertedRange { min, max: upper });
            }
            if min == upper && !max_inclusive {
                return Err(SpaceError::EmptyExclusiveRange { value: min });
            }
        }
        Ok(Self {
            min,
            max,
            max_inclusive,
        })
    }

    /// `[min, ∞)`.
    pub fn at_least(min: u64) -> Self {
        Self {
            min,
            max: None,
            max_inclusive: true,
        }
    }

    /// A single concrete value.
    pub fn exact(value: u64) -> Self {
        Self {
            min: value,
            max: Some(value),
            max_inclusive: true,
        }
    }

    /// `[min, max]`, both inclusive.
    pub fn between(min: u64, max: u64) -> SpaceResult<Self> {
        Self::new(min, Some(max), true)
    }

    /// Any count at all.
    pub fn any() -> Self {
        Self::at_least(0)
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> Option<u64> {
        self.max
    }

    pub fn max_inclusive(&self) -> bool {
        self.max_inclusive
    }

    /// The largest admitted value, or `None` when unbounded.
    pub fn upper_bound(&self) -> Option<u64> {
        self.max.map(|m| if self.max_inclusive { m } else { m - 1 })
    }

    pub fn is_exact(&self) -> bool {
        self.upper_bound() == Some(self.min)
    }

    pub fn contains(&self, value: u64) -> bool {
        value >= self.min && self.upper_bound().map_or(true, |upper| value <= upper)
    }
}

impl PartialEq for CountRange {
    fn eq(&self, other: &Self) -> bool {
        self.min == other.min && self.upper_bound() == other.upper_bound()
    }
}

impl Eq for CountRange {}

impl fmt::Display for CountRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exact() {
            return write!(f, "{}", self.min);
        }
        match self.max {
            None => write!(f, "[{},]", self.min),
            Some(m) if self.max_inclusive => write!(f, "[{},{}]", self.min, m),
            Some(m) => write!(f, "[{},{})", self.min, m),
        }
    }
}

impl Space for CountRange {
    fn check_with(&self, capability: &Self, _mode: CheckMode) -> CheckResult {
        let mut result = CheckResult::ok();
        if capability.min < self.min {
            result.add_reason(format!(
                "capability ({capability}) is smaller than requirement min ({})",
                self.min
            ));
        }
        if let Some(req_upper) = self.upper_bound() {
            match capability.upper_bound() {
                None => result.add_reason(format!(
                    "capability ({capability}) is unbounded, requirement max ({req_upper})"
                )),
                Some(cap_upper) if cap_upper > req_upper => result.add_reason(format!(
                    "capability ({capability}) is bigger than requirement max ({req_upper})"
                )),
                Some(_) => {}
            }
        }
        result
    }

    fn intersect(&self, other: &Self) -> SpaceResult<Self> {
        let lower = max(self.min, other.min);
        let upper = match (self.upper_bound(), other.upper_bound()) {
            (None, bound) | (bound, None) => bound,
            (Some(a), Some(b)) => Some(min(a, b)),
        };
        match upper {
            Some(u) if u < lower => Err(SpaceError::EmptyIntersection {
                left: self.to_string(),
                right: other.to_string(),
            }),
            _ => Ok(Self {
                min: lower,
                max: upper,
                max_inclusive: true,
            }),
        }
    }

    fn generate_minimum(&self) -> Self {
        Self::exact(self.min)
    }
}
