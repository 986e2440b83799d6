//! Suite and case metadata, and the flat case configuration they resolve to.
//!
//! Case-level fields are optional overrides. [`CaseMetadata::resolve`]
//! merges them with the suite's defaults once, at registration time,
//! producing a [`CaseSpec`] with every field filled in.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use testgrid_space::Requirement;

/// Priority used when neither case nor suite sets one. Lower runs first.
pub const DEFAULT_PRIORITY: u8 = 2;

/// Per-attempt case timeout used when neither case nor suite sets one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;

/// Suite-level metadata and defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteMetadata {
    pub name: String,
    #[serde(default)]
    pub area: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub owner: String,
    /// Requirement shared by cases that declare none.
    #[serde(default = "Requirement::single_node")]
    pub requirement: Requirement,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    pub cases: Vec<CaseMetadata>,
}

impl SuiteMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requirement: Requirement::single_node(),
            ..Self::default()
        }
    }

    pub fn with_area(mut self, area: impl Into<String>) -> Self {
        self.area = area.into();
        self
    }

    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirement = requirement;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_case(mut self, case: CaseMetadata) -> Self {
        self.cases.push(case);
        self
    }
}

/// Case-level metadata; `None` fields fall back to the suite.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub requirement: Option<Requirement>,
    #[serde(default)]
    pub use_new_environment: bool,
    #[serde(default)]
    pub owner: Option<String>,
}

impl CaseMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirement = Some(requirement);
        self
    }

    pub fn with_new_environment(mut self) -> Self {
        self.use_new_environment = true;
        self
    }

    /// Merge with `suite` defaults into a flat configuration.
    pub fn resolve(&self, suite: &SuiteMetadata) -> CaseSpec {
        CaseSpec {
            full_name: format!("{}.{}", suite.name, self.name),
            suite: suite.name.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            area: suite.area.clone(),
            category: suite.category.clone(),
            owner: self.owner.clone().unwrap_or_else(|| suite.owner.clone()),
            priority: self
                .priority
                .or(suite.priority)
                .unwrap_or(DEFAULT_PRIORITY),
            timeout: Duration::from_secs(
                self.timeout_secs
                    .or(suite.timeout_secs)
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            requirement: self
                .requirement
                .clone()
                .unwrap_or_else(|| suite.requirement.clone()),
            use_new_environment: self.use_new_environment,
        }
    }
}

/// Fully resolved case configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseSpec {
    /// `suite.case`
    pub full_name: String,
    pub suite: String,
    pub name: String,
    pub description: String,
    pub area: String,
    pub category: String,
    pub owner: String,
    pub priority: u8,
    pub timeout: Duration,
    pub requirement: Requirement,
    pub use_new_environment: bool,
}
