//! Explicit registry of suites and cases, and case selection.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use super::error::{RegistryError, RegistryResult};
use super::metadata::{CaseSpec, SuiteMetadata};
use super::testsuite::TestSuite;

struct RegisteredSuite {
    metadata: SuiteMetadata,
    cases: Vec<Arc<CaseSpec>>,
    suite: Arc<dyn TestSuite>,
}

/// Every suite known to this process. Built once and passed by reference.
#[derive(Default)]
pub struct Registry {
    suites: Vec<RegisteredSuite>,
    by_name: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a suite with its implementation.
    ///
    /// Case overrides are resolved against suite defaults here, and every
    /// resolved requirement is validated.
    pub fn register(
        &mut self,
        metadata: SuiteMetadata,
        suite: Arc<dyn TestSuite>,
    ) -> RegistryResult<()> {
        if self.by_name.contains_key(&metadata.name) {
            return Err(RegistryError::DuplicateSuite(metadata.name));
        }
        if metadata.cases.is_empty() {
            return Err(RegistryError::EmptySuite(metadata.name));
        }

        let mut seen = HashSet::new();
        let mut cases = Vec::with_capacity(metadata.cases.len());
        for case in &metadata.cases {
            if !seen.insert(case.name.as_str()) {
                return Err(RegistryError::DuplicateCase {
                    suite: metadata.name.clone(),
                    case: case.name.clone(),
                });
            }
            let spec = case.resolve(&metadata);
            spec.requirement
                .validate()
                .map_err(|source| RegistryError::InvalidRequirement {
                    case: spec.full_name.clone(),
                    source,
                })?;
            cases.push(Arc::new(spec));
        }

        debug!(suite = %metadata.name, cases = cases.len(), "registered suite");
        self.by_name
            .insert(metadata.name.clone(), self.suites.len());
        self.suites.push(RegisteredSuite {
            metadata,
            cases,
            suite,
        });
        Ok(())
    }

    pub fn suite(&self, name: &str) -> Option<Arc<dyn TestSuite>> {
        self.by_name
            .get(name)
            .map(|&index| Arc::clone(&self.suites[index].suite))
    }

    pub fn metadata(&self, name: &str) -> Option<&SuiteMetadata> {
        self.by_name
            .get(name)
            .map(|&index| &self.suites[index].metadata)
    }

    /// Look up a case by `suite.case` name.
    pub fn case(&self, full_name: &str) -> Option<Arc<CaseSpec>> {
        self.cases().find(|c| c.full_name == full_name).cloned()
    }

    /// All cases in registration order.
    pub fn cases(&self) -> impl Iterator<Item = &Arc<CaseSpec>> {
        self.suites.iter().flat_map(|s| s.cases.iter())
    }

    pub fn suite_count(&self) -> usize {
        self.suites.len()
    }

    /// Apply `selectors` in order to build the run's case list.
    ///
    /// An include selector adds matching cases (or updates ones already
    /// selected); an exclude selector drops them. With no selectors every
    /// case is selected with default runtime settings. The result keeps
    /// registration order.
    pub fn select(&self, selectors: &[CaseSelector]) -> RegistryResult<Vec<CaseRuntime>> {
        if selectors.is_empty() {
            return Ok(self.cases().cloned().map(CaseRuntime::new).collect());
        }

        let compiled = selectors
            .iter()
            .map(|s| {
                Regex::new(&s.pattern)
                    .map(|re| (re, s))
                    .map_err(|source| RegistryError::InvalidPattern {
                        pattern: s.pattern.clone(),
                        source,
                    })
            })
            .collect::<RegistryResult<Vec<_>>>()?;

        let mut selected: HashMap<String, CaseRuntime> = HashMap::new();
        for (pattern, selector) in &compiled {
            for case in self.cases() {
                if !pattern.is_match(&case.full_name) {
                    continue;
                }
                if selector.exclude {
                    selected.remove(&case.full_name);
                    continue;
                }
                let runtime = selected
                    .entry(case.full_name.clone())
                    .or_insert_with(|| CaseRuntime::new(Arc::clone(case)));
                selector.apply(runtime);
            }
        }

        Ok(self
            .cases()
            .filter_map(|case| selected.remove(&case.full_name))
            .collect())
    }
}

/// Run-time settings for one selected case.
#[derive(Debug, Clone)]
pub struct CaseRuntime {
    pub spec: Arc<CaseSpec>,
    /// Extra attempts for hooks and case body.
    pub retry: u32,
    /// Number of results (repetitions) to create.
    pub times: u32,
    pub ignore_failure: bool,
    pub use_new_environment: bool,
    /// Run only on the environment with this name.
    pub environment_name: Option<String>,
}

impl CaseRuntime {
    pub fn new(spec: Arc<CaseSpec>) -> Self {
        Self {
            use_new_environment: spec.use_new_environment,
            spec,
            retry: 0,
            times: 1,
            ignore_failure: false,
            environment_name: None,
        }
    }

    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_times(mut self, times: u32) -> Self {
        self.times = times;
        self
    }

    pub fn ignoring_failure(mut self) -> Self {
        self.ignore_failure = true;
        self
    }

    pub fn on_new_environment(mut self) -> Self {
        self.use_new_environment = true;
        self
    }

    pub fn pinned_to(mut self, environment: impl Into<String>) -> Self {
        self.environment_name = Some(environment.into());
        self
    }
}

/// Selects cases by a regex over `suite.case` and sets their runtime options.
#[derive(Debug, Clone, Default)]
pub struct CaseSelector {
    pub pattern: String,
    pub exclude: bool,
    pub retry: Option<u32>,
    pub times: Option<u32>,
    pub ignore_failure: Option<bool>,
    pub use_new_environment: Option<bool>,
    pub environment_name: Option<String>,
}

impl CaseSelector {
    pub fn include(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Self::default()
        }
    }

    pub fn exclude(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            exclude: true,
            ..Self::default()
        }
    }

    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_times(mut self, times: u32) -> Self {
        self.times = Some(times);
        self
    }

    pub fn ignoring_failure(mut self) -> Self {
        self.ignore_failure = Some(true);
        self
    }

    fn apply(&self, runtime: &mut CaseRuntime) {
        if let Some(retry) = self.retry {
            runtime.retry = retry;
        }
        if let Some(times) = self.times {
            runtime.times = times;
        }
        if let Some(ignore) = self.ignore_failure {
            runtime.ignore_failure = ignore;
        }
        if let Some(use_new) = self.use_new_environment {
            runtime.use_new_environment = use_new;
        }
        if let Some(name) = &self.environment_name {
            runtime.environment_name = Some(name.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedSuite;
    use crate::suite::CaseMetadata;
    use testgrid_space::{NodeSpace, Requirement};

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                SuiteMetadata::new("boot")
                    .with_case(CaseMetadata::new("smoke"))
                    .with_case(CaseMetadata::new("reboot")),
                Arc::new(ScriptedSuite::new()),
            )
            .unwrap();
        registry
            .register(
                SuiteMetadata::new("disk").with_case(CaseMetadata::new("resize")),
                Arc::new(ScriptedSuite::new()),
            )
            .unwrap();
        registry
    }

    #[test]
    fn duplicate_suite_is_rejected() {
        let mut registry = registry();
        let err = registry
            .register(
                SuiteMetadata::new("boot").with_case(CaseMetadata::new("x")),
                Arc::new(ScriptedSuite::new()),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateSuite(name) if name == "boot"));
    }

    #[test]
    fn duplicate_case_and_empty_suite_are_rejected() {
        let mut registry = Registry::new();
        let err = registry
            .register(
                SuiteMetadata::new("dup")
                    .with_case(CaseMetadata::new("a"))
                    .with_case(CaseMetadata::new("a")),
                Arc::new(ScriptedSuite::new()),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateCase { .. }));

        let err = registry
            .register(SuiteMetadata::new("empty"), Arc::new(ScriptedSuite::new()))
            .unwrap_err();
        assert!(matches!(err, RegistryError::EmptySuite(_)));
    }

    #[test]
    fn invalid_requirement_is_rejected_at_registration() {
        let mut registry = Registry::new();
        let err = registry
            .register(
                SuiteMetadata::new("bad")
                    .with_case(CaseMetadata::new("zero").with_requirement(Requirement::simple(
                        0,
                        NodeSpace::default(),
                    ))),
                Arc::new(ScriptedSuite::new()),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidRequirement { .. }));
    }

    #[test]
    fn empty_selection_takes_everything_in_order() {
        let selected = registry().select(&[]).unwrap();
        let names: Vec<&str> = selected.iter().map(|c| c.spec.full_name.as_str()).collect();
        assert_eq!(names, vec!["boot.smoke", "boot.reboot", "disk.resize"]);
        assert!(selected.iter().all(|c| c.times == 1 && c.retry == 0));
    }

    #[test]
    fn selectors_include_update_and_exclude() {
        let selected = registry()
            .select(&[
                CaseSelector::include("^boot\\.").with_retry(2),
                CaseSelector::include("reboot").ignoring_failure(),
                CaseSelector::exclude("smoke"),
                CaseSelector::include("disk").with_times(3),
            ])
            .unwrap();
        let names: Vec<&str> = selected.iter().map(|c| c.spec.full_name.as_str()).collect();
        assert_eq!(names, vec!["boot.reboot", "disk.resize"]);
        assert_eq!(selected[0].retry, 2);
        assert!(selected[0].ignore_failure);
        assert_eq!(selected[1].times, 3);
    }

    #[test]
    fn bad_pattern_is_reported() {
        let err = registry().select(&[CaseSelector::include("(")]).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidPattern { .. }));
    }
}
