//! Runner configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use testgrid_space::NodeSpace;

/// When the scheduler may generate environments from requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentGeneration {
    /// Only when no predefined environment was supplied.
    #[default]
    Auto,
    Always,
    Never,
}

/// Which deployed environments survive the end of their processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepEnvironment {
    #[default]
    No,
    Always,
    /// Keep environments on which some result failed.
    Failed,
}

/// Settings for one scheduler run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Environments processed at the same time.
    pub max_concurrency: usize,
    pub generation: EnvironmentGeneration,
    pub keep_environment: KeepEnvironment,
    /// Features removed from every requirement before matching.
    pub ignored_features: Vec<String>,
    /// Constraint merged into every node of every requirement.
    pub platform_requirement: Option<NodeSpace>,
    /// Base delay for exponential backoff between retried attempts.
    pub retry_backoff_ms: u64,
    /// Passed unchanged to suites.
    pub variables: HashMap<String, String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            generation: EnvironmentGeneration::Auto,
            keep_environment: KeepEnvironment::No,
            ignored_features: Vec::new(),
            platform_requirement: None,
            retry_backoff_ms: 0,
            variables: HashMap::new(),
        }
    }
}

/// Invalid runner configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("max_concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("invalid platform requirement: {0}")]
    PlatformRequirement(#[from] testgrid_space::SpaceError),

    #[error("failed to parse runner config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl RunnerConfig {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if let Some(platform) = &self.platform_requirement {
            platform.validate()?;
        }
        Ok(())
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_generation(mut self, generation: EnvironmentGeneration) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_keep_environment(mut self, keep: KeepEnvironment) -> Self {
        self.keep_environment = keep;
        self
    }

    pub fn with_platform_requirement(mut self, node: NodeSpace) -> Self {
        self.platform_requirement = Some(node);
        self
    }

    pub fn ignoring_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_features = features.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Whether the pool may be extended for a run with `predefined` environments.
    pub fn generates(&self, predefined: usize) -> bool {
        match self.generation {
            EnvironmentGeneration::Auto => predefined == 0,
            EnvironmentGeneration::Always => true,
            EnvironmentGeneration::Never => false,
        }
    }
}
