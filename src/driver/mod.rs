//! Node driver contract.
//!
//! A driver owns the actual broker process (a thread, a container, ...) behind
//! one node id. The orchestrator only tells it when to start and stop, and
//! trusts the endpoints it reports back.

mod in_process;
pub use in_process::*;


use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::BoxError;
use crate::Listener;
use crate::PortLease;

/// How a node is taken down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminationStyle {
    /// Let the broker flush and shut down cleanly, bounded by a timeout
    Graceful,
    /// Kill without cooperation, simulating a crash
    Abrupt,
}

impl TerminationStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationStyle::Graceful => "graceful",
            TerminationStyle::Abrupt => "abrupt",
        }
    }
}

/// Address a node is actually reachable on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Endpoints reported by a driver for one running node.
pub type LiveEndpoints = HashMap<Listener, Endpoint>;

/// Roles a node plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRoles {
    Broker,
    /// KRaft combined mode: controller quorum member and broker
    ControllerAndBroker,
}

impl NodeRoles {
    pub fn is_controller(&self) -> bool {
        matches!(self, NodeRoles::ControllerAndBroker)
    }
}

/// Everything a driver needs to bring up one node.
#[derive(Debug, Clone)]
pub struct NodeLaunch {
    pub node_id: u32,
    pub cluster_id: String,
    pub roles: NodeRoles,
    pub leases: Vec<PortLease<Listener>>,
    /// `id@host:port,...` of the controller quorum; KRaft only
    pub controller_quorum_voters: Option<String>,
}

impl NodeLaunch {
    /// Leased port for `listener`, if this node has one.
    pub fn port(
        &self,
        listener: Listener,
    ) -> Option<u16> {
        self.leases.iter().find(|lease| lease.listener == listener).map(|lease| lease.port)
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodeDriver: Send + Sync + 'static {
    /// Starts the node and reports the endpoints it is bound to, which may
    /// differ from the leased ports if the driver rebinds.
    async fn start(
        &self,
        launch: &NodeLaunch,
    ) -> Result<LiveEndpoints, BoxError>;

    async fn stop(
        &self,
        node_id: u32,
        style: TerminationStyle,
    ) -> Result<(), BoxError>;
}
