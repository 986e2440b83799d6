//! Operating system identity and the family compatibility table.
//!
//! An environment's OS is only known after the agent connects. Each node then
//! reports an [`OsInfo`]; its capability is the family's full lineage, so a
//! requirement for `Linux` is met by an `Ubuntu` node.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::choice::{ChoiceItem, ChoiceSet};

/// Closed set of OS families known to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsFamily {
    Windows,
    Posix,
    Bsd,
    FreeBsd,
    OpenBsd,
    MacOs,
    Linux,
    CoreOs,
    Alpine,
    Debian,
    Ubuntu,
    RpmDistro,
    Fedora,
    Redhat,
    CentOs,
    Oracle,
    AlmaLinux,
    AzureLinux,
    Suse,
    Sles,
    NixOs,
}

impl OsFamily {
    /// The family this one is compatible with, if any.
    pub fn parent(self) -> Option<OsFamily> {
        use OsFamily::*;
        match self {
            Windows | Posix => None,
            Bsd | MacOs | Linux => Some(Posix),
            FreeBsd | OpenBsd => Some(Bsd),
            CoreOs | Alpine | Debian | RpmDistro | Suse | NixOs => Some(Linux),
            Ubuntu => Some(Debian),
            Fedora | AzureLinux => Some(RpmDistro),
            Redhat => Some(Fedora),
            CentOs | Oracle | AlmaLinux => Some(Redhat),
            Sles => Some(Suse),
        }
    }

    /// This family followed by every ancestor, nearest first.
    pub fn lineage(self) -> Vec<OsFamily> {
        let mut chain = vec![self];
        let mut current = self;
        while let Some(parent) = current.parent() {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// `true` when a node of family `self` can stand in for `other`.
    pub fn is_compatible_with(self, other: OsFamily) -> bool {
        self.lineage().contains(&other)
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl ChoiceItem for OsFamily {}

/// OS detected on a connected node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    pub family: OsFamily,
    #[serde(default)]
    pub version: Option<String>,
}

impl OsInfo {
    pub fn new(family: OsFamily) -> Self {
        Self {
            family,
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Capability set offered by this OS: its whole lineage.
    pub fn capability(&self) -> ChoiceSet<OsFamily> {
        ChoiceSet::allow(self.family.lineage())
    }
}

impl fmt::Display for OsInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{} {}", self.family, version),
            None => write!(f, "{}", self.family),
        }
    }
}
