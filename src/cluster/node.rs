use std::fmt;

use tracing::debug;

use crate::metrics::record_transition;
use crate::LiveEndpoints;
use crate::Listener;
use crate::NodeRoles;
use crate::PortLease;

/// Lifecycle of one cluster member.
///
/// `Starting` and `Stopping` mark a driver call in flight; the membership lock
/// is not held while the driver works.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    Unstarted,
    Starting,
    Running,
    Stopping,
    Stopped,
    /// Terminal
    Removed,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Unstarted => "unstarted",
            NodeState::Starting => "starting",
            NodeState::Running => "running",
            NodeState::Stopping => "stopping",
            NodeState::Stopped => "stopped",
            NodeState::Removed => "removed",
        }
    }

    pub fn is_transitional(&self) -> bool {
        matches!(self, NodeState::Starting | NodeState::Stopping)
    }
}

impl fmt::Display for NodeState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct NodeRecord {
    pub(crate) node_id: u32,
    pub(crate) state: NodeState,
    pub(crate) roles: NodeRoles,
    pub(crate) leases: Vec<PortLease<Listener>>,
    /// Driver-reported endpoints; empty unless running
    pub(crate) endpoints: LiveEndpoints,
}

impl NodeRecord {
    pub(crate) fn new(
        node_id: u32,
        roles: NodeRoles,
    ) -> Self {
        Self {
            node_id,
            state: NodeState::Unstarted,
            roles,
            leases: Vec::new(),
            endpoints: LiveEndpoints::new(),
        }
    }

    pub(crate) fn transition(
        &mut self,
        to: NodeState,
    ) {
        let from = self.state;
        if from == to {
            return;
        }
        debug!(node_id = self.node_id, %from, %to, "node transition");
        record_transition(&format!("{from}->{to}"));
        self.state = to;
        if to != NodeState::Running {
            self.endpoints.clear();
        }
    }
}
