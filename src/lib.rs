//! Short-lived Kafka-like clusters for integration tests.
//!
//! A [`ClusterOrchestrator`] leases ports from a [`PortAllocator`], drives a
//! [`NodeDriver`] to start and stop nodes, and hands out the bootstrap address
//! and client configuration for whatever is currently running.

mod cluster;
mod config;
mod driver;
mod errors;
pub mod metrics;
mod ports;

pub use cluster::*;
pub use config::*;
pub use driver::*;
pub use errors::*;
pub use ports::*;

#[cfg(test)]
pub(crate) mod test_utils;
