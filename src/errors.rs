//! Error hierarchy for cluster provisioning.
//!
//! Errors are split by the layer that raised them so callers can tell
//! bookkeeping failures (ports, membership) apart from failures of the broker
//! process behind a [`crate::NodeDriver`].

use std::io;
use std::time::Duration;

use config::ConfigError;

use crate::TerminationStyle;

pub type Result<T> = std::result::Result<T, Error>;

/// Error type reported by node drivers. The orchestrator wraps it, never masks it.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Port lease bookkeeping and OS-level probing failures
    #[error(transparent)]
    Port(#[from] PortError),

    /// Membership and lifecycle precondition violations
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Failures reported by the broker process behind a node driver
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Configuration source loading or deserialization failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration loaded fine but breaks a harness rule
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Unsupported SASL mechanism: {0}")]
    UnsupportedSaslMechanism(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("attempted to allocate ports to an invalid range of broker ids: [{first},{last})")]
    InvalidRange { first: u32, last: u32 },

    /// Programmer error: the pair was never leased or already released.
    #[error("No port allocated for listener {listener} on node {node_id}")]
    NotAllocated { listener: String, node_id: u32 },

    #[error("Cannot lease ports for {requested} nodes in one batch (max {max})")]
    BatchTooLarge { requested: u32, max: u32 },

    /// The id has no exclusive upper bound representable as `u32`.
    #[error("Node id {0} is out of the allocatable range")]
    NodeIdOutOfRange(u32),

    #[error("Failed to probe for a free port")]
    Probe(#[source] io::Error),

    #[error("Could not find a port distinct from live leases after {attempts} attempts")]
    Exhausted { attempts: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("Cluster already started")]
    AlreadyStarted,

    #[error("Cluster not started")]
    NotStarted,

    #[error("Cluster already closed")]
    Closed,

    #[error("Node {0} was never issued or has already been removed")]
    UnknownOrReusedNodeId(u32),

    #[error("Cannot remove node {0}: it is the last running broker")]
    LastBrokerRemoval(u32),

    #[error("Cannot remove controller node {0} from a KRaft cluster")]
    ControllerRemoval(u32),

    #[error("Node {node_id} is {state} and cannot change state right now")]
    NodeInTransition {
        node_id: u32,
        state: &'static str,
    },

    /// Every per-node failure collected while closing the cluster.
    #[error("Cluster teardown failed on {} node(s)", failures.len())]
    Teardown { failures: Vec<DriverError> },
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Driver failed to start node {node_id}")]
    StartFailure {
        node_id: u32,
        #[source]
        source: BoxError,
    },

    #[error("Driver failed to stop node {node_id} ({style:?})")]
    StopFailure {
        node_id: u32,
        style: TerminationStyle,
        #[source]
        source: BoxError,
    },

    #[error("Node {node_id} did not stop gracefully within {timeout:?}")]
    GracefulStopTimeout { node_id: u32, timeout: Duration },
}

impl DriverError {
    pub fn node_id(&self) -> u32 {
        match self {
            DriverError::StartFailure { node_id, .. }
            | DriverError::StopFailure { node_id, .. }
            | DriverError::GracefulStopTimeout { node_id, .. } => *node_id,
        }
    }
}
