//! Test case requirements.
//!
//! A [`Requirement`] bundles the node tree with the checks that do not live
//! on the capability tree itself: the OS families (only decidable once nodes
//! are connected), the platform types, and the environment status a case
//! needs before it may run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::check::{CheckMode, CheckResult};
use crate::choice::ChoiceSet;
use crate::environment::EnvironmentSpace;
use crate::error::{SpaceError, SpaceResult};
use crate::node::NodeSpace;
use crate::os::{OsFamily, OsInfo};
use crate::space::Space;

/// The lifecycle point an environment must reach before a case may run on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredStatus {
    Deployed,
    #[default]
    Connected,
}

impl fmt::Display for RequiredStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequiredStatus::Deployed => f.write_str("deployed"),
            RequiredStatus::Connected => f.write_str("connected"),
        }
    }
}

/// What a test case needs from an environment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Requirement {
    #[serde(default)]
    pub environment: EnvironmentSpace,
    #[serde(default)]
    pub os: Option<ChoiceSet<OsFamily>>,
    #[serde(default)]
    pub platform_types: Option<ChoiceSet<String>>,
    #[serde(default)]
    pub environment_status: RequiredStatus,
}

impl Requirement {
    /// `node_count` identical nodes described by `node`.
    pub fn simple(node_count: usize, node: NodeSpace) -> Self {
        Self {
            environment: EnvironmentSpace::uniform(node_count, node),
            ..Self::default()
        }
    }

    /// A single default node.
    pub fn single_node() -> Self {
        Self::simple(1, NodeSpace::default())
    }

    pub fn with_os(mut self, os: ChoiceSet<OsFamily>) -> Self {
        self.os = Some(os);
        self
    }

    /// Restrict the case to the listed platform types.
    pub fn on_platforms<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.platform_types = Some(ChoiceSet::any_of(types.into_iter().map(Into::into)));
        self
    }

    pub fn with_platform_types(mut self, types: ChoiceSet<String>) -> Self {
        self.platform_types = Some(types);
        self
    }

    pub fn with_environment_status(mut self, status: RequiredStatus) -> Self {
        self.environment_status = status;
        self
    }

    /// Structural validation; failures abort a run before scheduling.
    pub fn validate(&self) -> SpaceResult<()> {
        if self.environment.nodes.is_empty() {
            return Err(SpaceError::InvalidRequirement(
                "at least one node is required".to_string(),
            ));
        }
        self.environment.validate()?;
        if let Some(os) = &self.os {
            os.validate()?;
        }
        if let Some(types) = &self.platform_types {
            types.validate()?;
        }
        Ok(())
    }

    /// Whether the active platform type is acceptable.
    pub fn check_platform(&self, platform_type: &str) -> CheckResult {
        let Some(types) = &self.platform_types else {
            return CheckResult::ok();
        };
        let offered = ChoiceSet::allow([platform_type.to_string()]);
        let mut result = CheckResult::ok();
        result.merge(types.check(&offered), "platform_type");
        result
    }

    /// Node tree check against an environment capability.
    pub fn check_capability(&self, capability: &EnvironmentSpace, mode: CheckMode) -> CheckResult {
        self.environment.check_with(capability, mode)
    }

    /// OS check against one connected node.
    pub fn check_os(&self, os: &OsInfo) -> CheckResult {
        let Some(required) = &self.os else {
            return CheckResult::ok();
        };
        let mut result = CheckResult::ok();
        result.merge(required.check(&os.capability()), &format!("os ({os})"));
        result
    }

    /// The smallest environment capability meeting this requirement.
    pub fn minimum_capability(&self) -> EnvironmentSpace {
        self.environment.generate_minimum()
    }

    /// Merge with a platform-wide node constraint.
    pub fn merge_platform(&self, platform: &NodeSpace) -> SpaceResult<Self> {
        Ok(Self {
            environment: self.environment.constrain_nodes(platform)?,
            ..self.clone()
        })
    }

    /// Copy with `ignored` features no longer required.
    pub fn without_features(&self, ignored: &[String]) -> Self {
        if ignored.is_empty() {
            return self.clone();
        }
        Self {
            environment: self.environment.without_features(ignored),
            ..self.clone()
        }
    }
}
