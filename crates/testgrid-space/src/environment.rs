//! Whole-environment capability: an ordered list of node spaces.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::check::{CheckMode, CheckResult, Checker};
use crate::error::{SpaceError, SpaceResult};
use crate::node::NodeSpace;
use crate::space::Space;

/// Nodes an environment needs (requirement) or provides (capability).
///
/// Node `i` of a requirement is matched against node `i` of a capability.
/// A capability may carry more nodes than required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSpace {
    #[serde(default)]
    pub nodes: Vec<NodeSpace>,
}

impl EnvironmentSpace {
    pub fn new(nodes: Vec<NodeSpace>) -> Self {
        Self { nodes }
    }

    /// `count` copies of `node`.
    pub fn uniform(count: usize, node: NodeSpace) -> Self {
        Self {
            nodes: vec![node; count],
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Sum of per-node costs.
    pub fn cost(&self) -> u64 {
        self.nodes.iter().map(NodeSpace::cost).sum()
    }

    /// Hex SHA-256 of the canonical JSON form.
    ///
    /// Two spaces share a fingerprint iff they are structurally equal.
    pub fn fingerprint(&self) -> SpaceResult<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    pub fn without_features(&self, ignored: &[String]) -> Self {
        Self {
            nodes: self
                .nodes
                .iter()
                .map(|n| n.without_features(ignored))
                .collect(),
        }
    }

    /// Intersect every node with a platform-wide node constraint.
    ///
    /// Required and excluded features are united first; only the remaining
    /// fields are intersected.
    pub fn constrain_nodes(&self, platform: &NodeSpace) -> SpaceResult<Self> {
        let nodes = self
            .nodes
            .iter()
            .map(|n| {
                let node = n.with_features_of(platform);
                let platform = NodeSpace {
                    features: node.features.clone(),
                    excluded_features: node.excluded_features.clone(),
                    ..platform.clone()
                };
                node.intersect(&platform)
            })
            .collect::<SpaceResult<Vec<_>>>()?;
        Ok(Self { nodes })
    }

    pub fn validate(&self) -> SpaceResult<()> {
        self.nodes.iter().try_for_each(NodeSpace::validate)
    }
}

impl Space for EnvironmentSpace {
    fn check_with(&self, capability: &Self, mode: CheckMode) -> CheckResult {
        if self.nodes.is_empty() {
            return CheckResult::ok();
        }
        if capability.nodes.is_empty() {
            return CheckResult::fail("no environment node found");
        }
        if capability.nodes.len() < self.nodes.len() {
            return CheckResult::fail(format!(
                "no enough nodes, requirement: {}, capability: {}",
                self.nodes.len(),
                capability.nodes.len()
            ));
        }
        self.nodes
            .iter()
            .zip(&capability.nodes)
            .enumerate()
            .fold(Checker::new(mode), |checker, (index, (req, cap))| {
                checker.field(&format!("node[{index}]"), |m| req.check_with(cap, m))
            })
            .finish()
    }

    fn intersect(&self, other: &Self) -> SpaceResult<Self> {
        if self.nodes.is_empty() {
            return Ok(other.clone());
        }
        if other.nodes.is_empty() {
            return Ok(self.clone());
        }
        if self.nodes.len() != other.nodes.len() {
            return Err(SpaceError::NodeCountMismatch {
                left: self.nodes.len(),
                right: other.nodes.len(),
            });
        }
        let nodes = self
            .nodes
            .iter()
            .zip(&other.nodes)
            .map(|(a, b)| a.intersect(b))
            .collect::<SpaceResult<Vec<_>>>()?;
        Ok(Self { nodes })
    }

    fn generate_minimum(&self) -> Self {
        Self {
            nodes: self.nodes.iter().map(Space::generate_minimum).collect(),
        }
    }
}
