//! Per-node capability records: compute, disk, and network.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::check::{CheckMode, CheckResult, Checker};
use crate::choice::{ChoiceItem, ChoiceSet};
use crate::error::SpaceResult;
use crate::range::CountRange;
use crate::space::{check_optional, intersect_optional, Space};

/// NIC data path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataPath {
    Synthetic,
    Sriov,
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataPath::Synthetic => f.write_str("synthetic"),
            DataPath::Sriov => f.write_str("sriov"),
        }
    }
}

impl ChoiceItem for DataPath {}

/// Data disks attached to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpace {
    #[serde(default = "CountRange::any")]
    pub data_disk_count: CountRange,
    #[serde(default = "CountRange::any")]
    pub data_disk_size_gb: CountRange,
    #[serde(default)]
    pub disk_type: Option<ChoiceSet<String>>,
}

impl Default for DiskSpace {
    fn default() -> Self {
        Self {
            data_disk_count: CountRange::any(),
            data_disk_size_gb: CountRange::any(),
            disk_type: None,
        }
    }
}

impl Space for DiskSpace {
    fn check_with(&self, capability: &Self, mode: CheckMode) -> CheckResult {
        Checker::new(mode)
            .field("data_disk_count", |m| {
                self.data_disk_count.check_with(&capability.data_disk_count, m)
            })
            .field("data_disk_size_gb", |m| {
                self.data_disk_size_gb
                    .check_with(&capability.data_disk_size_gb, m)
            })
            .field("disk_type", |m| {
                check_optional(self.disk_type.as_ref(), capability.disk_type.as_ref(), m)
            })
            .finish()
    }

    fn intersect(&self, other: &Self) -> SpaceResult<Self> {
        Ok(Self {
            data_disk_count: self.data_disk_count.intersect(&other.data_disk_count)?,
            data_disk_size_gb: self.data_disk_size_gb.intersect(&other.data_disk_size_gb)?,
            disk_type: intersect_optional(self.disk_type.as_ref(), other.disk_type.as_ref())?,
        })
    }

    fn generate_minimum(&self) -> Self {
        Self {
            data_disk_count: self.data_disk_count.generate_minimum(),
            data_disk_size_gb: self.data_disk_size_gb.generate_minimum(),
            disk_type: self.disk_type.as_ref().map(Space::generate_minimum),
        }
    }
}

/// Network interfaces of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpace {
    #[serde(default = "default_nic_count")]
    pub nic_count: CountRange,
    #[serde(default)]
    pub data_path: Option<ChoiceSet<DataPath>>,
}

fn default_nic_count() -> CountRange {
    CountRange::at_least(1)
}

impl Default for NetworkSpace {
    fn default() -> Self {
        Self {
            nic_count: default_nic_count(),
            data_path: None,
        }
    }
}

impl Space for NetworkSpace {
    fn check_with(&self, capability: &Self, mode: CheckMode) -> CheckResult {
        Checker::new(mode)
            .field("nic_count", |m| {
                self.nic_count.check_with(&capability.nic_count, m)
            })
            .field("data_path", |m| {
                check_optional(self.data_path.as_ref(), capability.data_path.as_ref(), m)
            })
            .finish()
    }

    fn intersect(&self, other: &Self) -> SpaceResult<Self> {
        Ok(Self {
            nic_count: self.nic_count.intersect(&other.nic_count)?,
            data_path: intersect_optional(self.data_path.as_ref(), other.data_path.as_ref())?,
        })
    }

    fn generate_minimum(&self) -> Self {
        Self {
            nic_count: self.nic_count.generate_minimum(),
            data_path: self.data_path.as_ref().map(Space::generate_minimum),
        }
    }
}

/// Everything a single node needs or offers.
///
/// On the requirement side `features` is an all-of list and
/// `excluded_features` a deny-list; both are checked against the
/// capability's `features`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpace {
    #[serde(default = "default_core_count")]
    pub core_count: CountRange,
    #[serde(default = "default_memory_mb")]
    pub memory_mb: CountRange,
    #[serde(default = "CountRange::any")]
    pub gpu_count: CountRange,
    #[serde(default)]
    pub disk: Option<DiskSpace>,
    #[serde(default)]
    pub network: Option<NetworkSpace>,
    #[serde(default)]
    pub features: Option<ChoiceSet<String>>,
    #[serde(default)]
    pub excluded_features: Option<ChoiceSet<String>>,
}

fn union_optional(
    left: Option<&ChoiceSet<String>>,
    right: Option<&ChoiceSet<String>>,
) -> Option<ChoiceSet<String>> {
    match (left, right) {
        (None, None) => None,
        (Some(one), None) | (None, Some(one)) => Some(one.clone()),
        (Some(l), Some(r)) => Some(l.union(r)),
    }
}

fn default_core_count() -> CountRange {
    CountRange::at_least(1)
}

fn default_memory_mb() -> CountRange {
    CountRange::at_least(512)
}

impl Default for NodeSpace {
    fn default() -> Self {
        Self {
            core_count: default_core_count(),
            memory_mb: default_memory_mb(),
            gpu_count: CountRange::any(),
            disk: None,
            network: None,
            features: None,
            excluded_features: None,
        }
    }
}

impl NodeSpace {
    pub fn with_core_count(mut self, cores: CountRange) -> Self {
        self.core_count = cores;
        self
    }

    pub fn with_memory_mb(mut self, memory: CountRange) -> Self {
        self.memory_mb = memory;
        self
    }

    pub fn with_gpu_count(mut self, gpus: CountRange) -> Self {
        self.gpu_count = gpus;
        self
    }

    pub fn with_disk(mut self, disk: DiskSpace) -> Self {
        self.disk = Some(disk);
        self
    }

    pub fn with_network(mut self, network: NetworkSpace) -> Self {
        self.network = Some(network);
        self
    }

    /// Require every feature in `features`.
    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = Some(ChoiceSet::all_of(features.into_iter().map(Into::into)));
        self
    }

    /// Offer exactly `features`, for capability declarations.
    pub fn offering<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = Some(ChoiceSet::allow(features.into_iter().map(Into::into)));
        self
    }

    pub fn with_excluded_features(mut self, excluded: ChoiceSet<String>) -> Self {
        self.excluded_features = Some(excluded);
        self
    }

    /// Scheduling cost of the smallest node this space admits.
    pub fn cost(&self) -> u64 {
        self.core_count.min() + self.gpu_count.min() * 100
    }

    /// Copy whose required and excluded features also include `other`'s.
    pub fn with_features_of(&self, other: &NodeSpace) -> Self {
        Self {
            features: union_optional(self.features.as_ref(), other.features.as_ref()),
            excluded_features: union_optional(
                self.excluded_features.as_ref(),
                other.excluded_features.as_ref(),
            ),
            ..self.clone()
        }
    }

    /// Copy with `ignored` features removed from the required list.
    pub fn without_features(&self, ignored: &[String]) -> Self {
        let mut node = self.clone();
        node.features = node.features.map(|set| set.without(ignored));
        node
    }

    pub fn validate(&self) -> SpaceResult<()> {
        if let Some(features) = &self.features {
            features.validate()?;
        }
        if let Some(excluded) = &self.excluded_features {
            excluded.validate()?;
        }
        Ok(())
    }
}

impl Space for NodeSpace {
    fn check_with(&self, capability: &Self, mode: CheckMode) -> CheckResult {
        let offered = capability
            .features
            .clone()
            .unwrap_or_else(|| ChoiceSet::allow(Vec::<String>::new()));
        Checker::new(mode)
            .field("core_count", |m| {
                self.core_count.check_with(&capability.core_count, m)
            })
            .field("memory_mb", |m| {
                self.memory_mb.check_with(&capability.memory_mb, m)
            })
            .field("gpu_count", |m| {
                self.gpu_count.check_with(&capability.gpu_count, m)
            })
            .field("disk", |m| {
                check_optional(self.disk.as_ref(), capability.disk.as_ref(), m)
            })
            .field("network", |m| {
                check_optional(self.network.as_ref(), capability.network.as_ref(), m)
            })
            .field("features", |m| match &self.features {
                Some(required) => required.check_with(&offered, m),
                None => CheckResult::ok(),
            })
            .field("excluded_features", |m| match &self.excluded_features {
                Some(excluded) => excluded.check_with(&offered, m),
                None => CheckResult::ok(),
            })
            .finish()
    }

    fn intersect(&self, other: &Self) -> SpaceResult<Self> {
        Ok(Self {
            core_count: self.core_count.intersect(&other.core_count)?,
            memory_mb: self.memory_mb.intersect(&other.memory_mb)?,
            gpu_count: self.gpu_count.intersect(&other.gpu_count)?,
            disk: intersect_optional(self.disk.as_ref(), other.disk.as_ref())?,
            network: intersect_optional(self.network.as_ref(), other.network.as_ref())?,
            features: intersect_optional(self.features.as_ref(), other.features.as_ref())?,
            excluded_features: intersect_optional(
                self.excluded_features.as_ref(),
                other.excluded_features.as_ref(),
            )?,
        })
    }

    fn generate_minimum(&self) -> Self {
        Self {
            core_count: self.core_count.generate_minimum(),
            memory_mb: self.memory_mb.generate_minimum(),
            gpu_count: self.gpu_count.generate_minimum(),
            disk: self.disk.as_ref().map(Space::generate_minimum),
            network: self.network.as_ref().map(Space::generate_minimum),
            features: self
                .features
                .as_ref()
                .map(|f| ChoiceSet::allow(f.generate_minimum().items().iter().cloned())),
            excluded_features: None,
        }
    }
}
