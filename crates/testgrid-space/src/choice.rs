//! Discrete option sets with allow/deny semantics.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::check::{CheckMode, CheckResult};
use crate::error::{SpaceError, SpaceResult};
use crate::space::Space;

/// Token that stands for "any item" in an allow-list.
pub const WILDCARD: &str = "*";

/// An item that can appear in a [`ChoiceSet`].
pub trait ChoiceItem: Clone + Ord + fmt::Display + fmt::Debug {
    fn is_wildcard(&self) -> bool {
        false
    }
}

impl ChoiceItem for String {
    fn is_wildcard(&self) -> bool {
        self == WILDCARD
    }
}

/// Whether the listed items are allowed or excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetMode {
    #[default]
    Allow,
    Deny,
}

/// How an allow-list requirement compares to the items a capability offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetSemantics {
    /// Every offered item must be listed.
    #[default]
    OnlyOf,
    /// At least one offered item must be listed.
    AnyOf,
    /// Every listed item must be offered.
    AllOf,
}

/// A set of discrete options, e.g. OS families or node features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize",
    deserialize = "T: Deserialize<'de> + Ord"
))]
pub struct ChoiceSet<T> {
    #[serde(default)]
    mode: SetMode,
    #[serde(default)]
    semantics: SetSemantics,
    items: BTreeSet<T>,
}

impl<T: ChoiceItem> ChoiceSet<T> {
    /// Allow-list with [`SetSemantics::OnlyOf`].
    pub fn allow(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            mode: SetMode::Allow,
            semantics: SetSemantics::OnlyOf,
            items: items.into_iter().collect(),
        }
    }

    /// Allow-list satisfied by a capability offering any listed item.
    pub fn any_of(items: impl IntoIterator<Item = T>) -> Self {
        Self::allow(items).with_semantics(SetSemantics::AnyOf)
    }

    /// Allow-list satisfied only by a capability offering every listed item.
    pub fn all_of(items: impl IntoIterator<Item = T>) -> Self {
        Self::allow(items).with_semantics(SetSemantics::AllOf)
    }

    /// Deny-list. Fails if `items` contains the wildcard.
    pub fn deny(items: impl IntoIterator<Item = T>) -> SpaceResult<Self> {
        let set = Self {
            mode: SetMode::Deny,
            semantics: SetSemantics::OnlyOf,
            items: items.into_iter().collect(),
        };
        set.validate()?;
        Ok(set)
    }

    pub fn with_semantics(mut self, semantics: SetSemantics) -> Self {
        self.semantics = semantics;
        self
    }

    pub fn mode(&self) -> SetMode {
        self.mode
    }

    pub fn semantics(&self) -> SetSemantics {
        self.semantics
    }

    pub fn items(&self) -> &BTreeSet<T> {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// `true` for an allow-list carrying the wildcard.
    pub fn is_any(&self) -> bool {
        self.mode == SetMode::Allow && self.items.iter().any(T::is_wildcard)
    }

    /// Structural validation, for sets that arrive through deserialization.
    pub fn validate(&self) -> SpaceResult<()> {
        if self.mode == SetMode::Deny && self.items.iter().any(T::is_wildcard) {
            return Err(SpaceError::WildcardInDenyList);
        }
        Ok(())
    }

    /// Items of both sets, keeping this set's mode and semantics. A wildcard
    /// side adds no constraint.
    pub fn union(&self, other: &Self) -> Self {
        if self.is_any() {
            return other.clone();
        }
        if other.is_any() {
            return self.clone();
        }
        let mut set = self.clone();
        set.items.extend(other.items.iter().cloned());
        set
    }

    /// Copy of this set without `removed` items.
    pub fn without(&self, removed: &[T]) -> Self {
        let mut set = self.clone();
        set.items.retain(|item| !removed.contains(item));
        set
    }

    fn rebuild(&self, mode: SetMode, items: BTreeSet<T>) -> Self {
        Self {
            mode,
            semantics: self.semantics,
            items,
        }
    }
}

fn render<T: fmt::Display>(items: impl IntoIterator<Item = T>) -> String {
    let parts: Vec<String> = items.into_iter().map(|i| i.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

impl<T: ChoiceItem> fmt::Display for ChoiceSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            SetMode::Allow => "allow",
            SetMode::Deny => "deny",
        };
        write!(f, "{mode}{}", render(&self.items))
    }
}

impl<T: ChoiceItem> Space for ChoiceSet<T> {
    fn check_with(&self, capability: &Self, _mode: CheckMode) -> CheckResult {
        if self.is_any() {
            return CheckResult::ok();
        }
        if capability.mode == SetMode::Deny {
            return CheckResult::fail(format!(
                "capability {capability} must list offered items"
            ));
        }
        let offered = &capability.items;
        match (self.mode, self.semantics) {
            (SetMode::Deny, _) => {
                let excluded: Vec<&T> = self.items.intersection(offered).collect();
                if excluded.is_empty() {
                    CheckResult::ok()
                } else {
                    CheckResult::fail(format!("requirement excludes {}", render(excluded)))
                }
            }
            (SetMode::Allow, SetSemantics::OnlyOf) => {
                let extra: Vec<&T> = offered.difference(&self.items).collect();
                if extra.is_empty() {
                    CheckResult::ok()
                } else {
                    CheckResult::fail(format!(
                        "capability offers {} not in requirement {}",
                        render(extra),
                        render(&self.items)
                    ))
                }
            }
            (SetMode::Allow, SetSemantics::AnyOf) => {
                if self.items.intersection(offered).next().is_some() {
                    CheckResult::ok()
                } else {
                    CheckResult::fail(format!(
                        "capability {} matches none of requirement {}",
                        render(offered),
                        render(&self.items)
                    ))
                }
            }
            (SetMode::Allow, SetSemantics::AllOf) => {
                let missing: Vec<&T> = self.items.difference(offered).collect();
                if missing.is_empty() {
                    CheckResult::ok()
                } else {
                    CheckResult::fail(format!("capability is missing {}", render(missing)))
                }
            }
        }
    }

    fn intersect(&self, other: &Self) -> SpaceResult<Self> {
        if self.is_any() {
            return Ok(other.clone());
        }
        if other.is_any() {
            return Ok(self.clone());
        }
        let combined = match (self.mode, other.mode) {
            (SetMode::Allow, SetMode::Allow) => {
                let items: BTreeSet<T> = self.items.intersection(&other.items).cloned().collect();
                if items.is_empty()
                    && self.semantics != SetSemantics::AllOf
                    && !self.items.is_empty()
                    && !other.items.is_empty()
                {
                    return Err(SpaceError::EmptyIntersection {
                        left: self.to_string(),
                        right: other.to_string(),
                    });
                }
                self.rebuild(SetMode::Allow, items)
            }
            (SetMode::Allow, SetMode::Deny) => self.rebuild(
                SetMode::Allow,
                self.items.difference(&other.items).cloned().collect(),
            ),
            (SetMode::Deny, SetMode::Allow) => other.rebuild(
                SetMode::Allow,
                other.items.difference(&self.items).cloned().collect(),
            ),
            (SetMode::Deny, SetMode::Deny) => self.rebuild(
                SetMode::Deny,
                self.items.union(&other.items).cloned().collect(),
            ),
        };
        Ok(combined)
    }

    fn generate_minimum(&self) -> Self {
        if self.is_any() || self.mode == SetMode::Deny {
            return self.rebuild(SetMode::Allow, BTreeSet::new());
        }
        let items = match self.semantics {
            SetSemantics::AllOf => self.items.clone(),
            SetSemantics::OnlyOf | SetSemantics::AnyOf => {
                self.items.iter().next().cloned().into_iter().collect()
            }
        };
        self.rebuild(SetMode::Allow, items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn deny_list_rejects_wildcard() {
        assert!(matches!(
            ChoiceSet::deny(strings(&["gpu", WILDCARD])),
            Err(SpaceError::WildcardInDenyList)
        ));
    }

    #[test]
    fn only_of_requires_capability_subset() {
        let req = ChoiceSet::allow(strings(&["ssd", "nvme"]));
        assert!(req.check(&ChoiceSet::allow(strings(&["ssd"]))).result);
        let result = req.check(&ChoiceSet::allow(strings(&["hdd", "ssd"])));
        assert!(!result.result);
        assert!(result.reasons[0].contains("[hdd]"));
    }

    #[test]
    fn any_of_requires_overlap() {
        let req = ChoiceSet::any_of(strings(&["azure", "ready"]));
        assert!(req.check(&ChoiceSet::allow(strings(&["azure"]))).result);
        assert!(!req.check(&ChoiceSet::allow(strings(&["qemu"]))).result);
    }

    #[test]
    fn all_of_requires_every_item() {
        let req = ChoiceSet::all_of(strings(&["gpu", "sriov"]));
        assert!(req
            .check(&ChoiceSet::allow(strings(&["gpu", "sriov", "nvme"])))
            .result);
        let result = req.check(&ChoiceSet::allow(strings(&["gpu"])));
        assert_eq!(result.reasons, vec!["capability is missing [sriov]".to_string()]);
    }

    #[test]
    fn deny_list_reports_excluded_items() {
        let req = ChoiceSet::deny(strings(&["hibernation"])).unwrap();
        let result = req.check(&ChoiceSet::allow(strings(&["gpu", "hibernation"])));
        assert_eq!(
            result.reasons,
            vec!["requirement excludes [hibernation]".to_string()]
        );
        assert!(req.check(&ChoiceSet::allow(strings(&["gpu"]))).result);
    }

    #[test]
    fn wildcard_allows_anything() {
        let req = ChoiceSet::allow(strings(&[WILDCARD]));
        assert!(req.check(&ChoiceSet::allow(strings(&["anything"]))).result);
    }

    #[test]
    fn intersect_follows_allow_deny_algebra() {
        let a = ChoiceSet::allow(strings(&["a", "b", "c"]));
        let b = ChoiceSet::allow(strings(&["b", "c", "d"]));
        assert_eq!(a.intersect(&b).unwrap().items().len(), 2);

        let deny_c = ChoiceSet::deny(strings(&["c"])).unwrap();
        let allowed = a.intersect(&deny_c).unwrap();
        assert_eq!(allowed.mode(), SetMode::Allow);
        assert_eq!(allowed.items().iter().cloned().collect::<Vec<_>>(), strings(&["a", "b"]));

        let deny_d = ChoiceSet::deny(strings(&["d"])).unwrap();
        let union = deny_c.intersect(&deny_d).unwrap();
        assert_eq!(union.mode(), SetMode::Deny);
        assert_eq!(union.items().len(), 2);
    }

    #[test]
    fn disjoint_allow_lists_do_not_intersect() {
        let a = ChoiceSet::allow(strings(&["x"]));
        let b = ChoiceSet::allow(strings(&["y"]));
        assert!(matches!(
            a.intersect(&b),
            Err(SpaceError::EmptyIntersection { .. })
        ));
    }

    #[test]
    fn minimum_satisfies_requirement() {
        let only = ChoiceSet::allow(strings(&["ssd", "nvme"]));
        let min = only.generate_minimum();
        assert_eq!(min.items().len(), 1);
        assert!(only.check(&min).result);

        let all = ChoiceSet::all_of(strings(&["gpu", "sriov"]));
        assert!(all.check(&all.generate_minimum()).result);

        let deny = ChoiceSet::deny(strings(&["gpu"])).unwrap();
        let min = deny.generate_minimum();
        assert!(min.is_empty());
        assert!(deny.check(&min).result);
    }
}
