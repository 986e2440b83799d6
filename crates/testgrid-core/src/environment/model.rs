//! The [`Environment`] record and its nodes.

use serde::{Deserialize, Serialize};

use testgrid_space::{EnvironmentSpace, NodeSpace, OsInfo};

use super::error::{PoolError, PoolResult};
use super::status::EnvironmentStatus;
use crate::notifier::{Message, MessageBody, NotifierBus};
use crate::obs;

/// A machine inside an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub index: usize,
    pub name: String,
    pub capability: NodeSpace,
    /// Detected once the environment is connected.
    pub os: Option<OsInfo>,
}

/// Declaration of a user-provided environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub nodes: Vec<NodeSpace>,
    /// Overrides the cost derived from the nodes.
    #[serde(default)]
    pub cost: Option<u64>,
}

impl EnvironmentSpec {
    pub fn new(nodes: Vec<NodeSpace>) -> Self {
        Self {
            name: None,
            nodes,
            cost: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_cost(mut self, cost: u64) -> Self {
        self.cost = Some(cost);
        self
    }
}

/// Sort key for scheduling: predefined environments first, then cheapest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScheduleKey {
    generated: bool,
    cost: u64,
}

impl ScheduleKey {
    pub fn new(is_predefined: bool, cost: u64) -> Self {
        Self {
            generated: !is_predefined,
            cost,
        }
    }
}

/// One environment in the pool.
#[derive(Debug, Clone)]
pub struct Environment {
    id: u64,
    name: String,
    status: EnvironmentStatus,
    is_predefined: bool,
    cost: u64,
    nodes: Vec<Node>,
    source_result: Option<String>,
    dedicated: bool,
    is_new: bool,
    deployed: bool,
}

fn build_nodes(env_name: &str, capability: Vec<NodeSpace>) -> Vec<Node> {
    capability
        .into_iter()
        .enumerate()
        .map(|(index, capability)| Node {
            index,
            name: format!("{env_name}-node-{index}"),
            capability,
            os: None,
        })
        .collect()
}

impl Environment {
    pub(crate) fn predefined(id: u64, spec: EnvironmentSpec) -> PoolResult<Self> {
        let name = spec.name.unwrap_or_else(|| format!("customized_{id}"));
        if spec.nodes.is_empty() {
            return Err(PoolError::NoNodes(name));
        }
        let capability = EnvironmentSpace::new(spec.nodes);
        let cost = spec.cost.unwrap_or_else(|| capability.cost());
        Ok(Self {
            id,
            nodes: build_nodes(&name, capability.nodes),
            name,
            status: EnvironmentStatus::New,
            is_predefined: true,
            cost,
            source_result: None,
            dedicated: false,
            is_new: true,
            deployed: false,
        })
    }

    pub(crate) fn generated(
        id: u64,
        capability: EnvironmentSpace,
        source_result: Option<String>,
        dedicated: bool,
    ) -> Self {
        let name = format!("generated_{id}");
        Self {
            id,
            cost: capability.cost(),
            nodes: build_nodes(&name, capability.nodes),
            name,
            status: EnvironmentStatus::New,
            is_predefined: false,
            source_result,
            dedicated,
            is_new: true,
            deployed: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> EnvironmentStatus {
        self.status
    }

    pub fn is_predefined(&self) -> bool {
        self.is_predefined
    }

    pub fn cost(&self) -> u64 {
        self.cost
    }

    /// Platforms may re-price an environment during `prepare`.
    pub fn set_cost(&mut self, cost: u64) {
        self.cost = cost;
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Platforms fill in concrete node details and detected OS here.
    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    /// Replace the node list, e.g. after a platform resolved ranges to
    /// concrete sizes during deploy.
    pub fn replace_nodes(&mut self, capability: EnvironmentSpace) {
        self.nodes = build_nodes(&self.name, capability.nodes);
    }

    /// Current capability, assembled from the nodes.
    pub fn capability(&self) -> EnvironmentSpace {
        EnvironmentSpace::new(self.nodes.iter().map(|n| n.capability.clone()).collect())
    }

    /// The test result whose requirement caused this environment to be generated.
    pub fn source_result(&self) -> Option<&str> {
        self.source_result.as_deref()
    }

    /// Generated for a case that asked for a brand-new environment.
    pub fn is_dedicated(&self) -> bool {
        self.dedicated
    }

    /// No suite has run on this environment yet.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub(crate) fn mark_used(&mut self) {
        self.is_new = false;
    }

    /// Reached `Deployed` at some point, so it holds real resources.
    pub fn was_deployed(&self) -> bool {
        self.deployed
    }

    pub fn schedule_key(&self) -> ScheduleKey {
        ScheduleKey::new(self.is_predefined, self.cost)
    }

    /// Move to `next`, notifying subscribers. Rejects undocumented transitions.
    pub(crate) fn transition(
        &mut self,
        next: EnvironmentStatus,
        bus: &NotifierBus,
    ) -> PoolResult<()> {
        let previous = self.status;
        if previous == next {
            return Ok(());
        }
        if !previous.can_transition_to(next) {
            return Err(PoolError::InvalidTransition {
                environment: self.name.clone(),
                from: previous,
                to: next,
            });
        }
        self.status = next;
        if next == EnvironmentStatus::Deployed {
            self.deployed = true;
        }
        obs::emit_environment_transition(&self.name, previous, next);
        bus.publish(Message::new(MessageBody::EnvironmentStatusChanged {
            environment: self.name.clone(),
            previous,
            status: next,
        }));
        Ok(())
    }
}
