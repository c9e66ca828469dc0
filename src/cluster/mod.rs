//! Cluster membership and lifecycle.
//!
//! [`ClusterOrchestrator`] is the public entry point; [`NodeState`] is what it
//! reports per node.

pub mod client_config;
mod node;
mod orchestrator;

pub(crate) use node::NodeRecord;
pub use node::NodeState;
pub use orchestrator::*;
