//! Lifecycle management for a variable-size set of broker nodes.
//!
//! ## Key Responsibilities
//! - Owns the node id → [`NodeRecord`] map and is its only mutator
//! - Leases ports for new or restarted nodes through the [`PortAllocator`]
//! - Drives the injected [`NodeDriver`] through start and stop
//! - Derives bootstrap address, cluster id and client configuration from the
//!   live node set
//!
//! The membership lock only covers bookkeeping. Driver calls happen with the
//! lock released while the node sits in `Starting` or `Stopping`, so a slow
//! broker never blocks readers and a driver may call back into the
//! orchestrator. Lock order is always membership, then allocator.
//!
//! ## Example Usage
//! ```rust,no_run
//! # async fn demo() -> kafka_cluster_harness::Result<()> {
//! use kafka_cluster_harness::*;
//!
//! let config = HarnessConfig::new()?;
//! let driver = InProcessDriver::from_config(&config.cluster);
//! let cluster = ClusterOrchestrator::new(config, driver)?;
//! cluster.start().await?;
//! let client_config = cluster.kafka_client_configuration()?;
//! cluster.close().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::client_config;
use super::NodeRecord;
use super::NodeState;
use crate::metrics::RUNNING_BROKERS;
use crate::BoxError;
use crate::ClusterError;
use crate::DriverError;
use crate::HarnessConfig;
use crate::LiveEndpoints;
use crate::Listener;
use crate::NodeDriver;
use crate::NodeLaunch;
use crate::NodeRoles;
use crate::PortAllocator;
use crate::Result;
use crate::TerminationStyle;
use crate::UserCredentials;

/// Length of generated cluster ids, matching a base64url-encoded UUID.
pub const CLUSTER_ID_LEN: usize = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClusterPhase {
    Created,
    Started,
    Closed,
}

struct Membership {
    phase: ClusterPhase,
    nodes: BTreeMap<u32, NodeRecord>,
    /// Never reused, even after removals
    next_node_id: u32,
    cluster_id: Option<String>,
}

impl Membership {
    fn new() -> Self {
        Self {
            phase: ClusterPhase::Created,
            nodes: BTreeMap::new(),
            next_node_id: 0,
            cluster_id: None,
        }
    }

    fn ensure_started(&self) -> Result<()> {
        match self.phase {
            ClusterPhase::Created => Err(ClusterError::NotStarted.into()),
            ClusterPhase::Closed => Err(ClusterError::Closed.into()),
            ClusterPhase::Started => Ok(()),
        }
    }

    fn ids_in(
        &self,
        state: NodeState,
    ) -> Vec<u32> {
        self.nodes.values().filter(|node| node.state == state).map(|node| node.node_id).collect()
    }

    fn running_count(&self) -> usize {
        self.nodes.values().filter(|node| node.state == NodeState::Running).count()
    }

    fn record_mut(
        &mut self,
        node_id: u32,
    ) -> Result<&mut NodeRecord> {
        self.nodes
            .get_mut(&node_id)
            .filter(|node| node.state != NodeState::Removed)
            .ok_or_else(|| ClusterError::UnknownOrReusedNodeId(node_id).into())
    }
}

pub struct ClusterOrchestrator<D>
where
    D: NodeDriver,
{
    config: HarnessConfig,
    listeners: Vec<Listener>,
    driver: D,
    ports: PortAllocator<Listener>,
    membership: Mutex<Membership>,
}

impl<D> ClusterOrchestrator<D>
where
    D: NodeDriver,
{
    /// Validates `config` and prepares an unstarted cluster.
    pub fn new(
        config: HarnessConfig,
        driver: D,
    ) -> Result<Self> {
        let config = config.validate()?;
        Ok(Self {
            listeners: config.cluster.listeners(),
            ports: PortAllocator::new(config.cluster.bind_address),
            config,
            driver,
            membership: Mutex::new(Membership::new()),
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Leases ports for the initial brokers, starts them and fixes the cluster id.
    pub async fn start(&self) -> Result<()> {
        let launches = {
            let mut membership = self.membership.lock();
            match membership.phase {
                ClusterPhase::Started => return Err(ClusterError::AlreadyStarted.into()),
                ClusterPhase::Closed => return Err(ClusterError::Closed.into()),
                ClusterPhase::Created => {}
            }

            let brokers = self.config.cluster.brokers_num;
            self.ports.allocate_range(&self.listeners, 0, brokers)?;

            let cluster_id = self
                .config
                .cluster
                .cluster_id
                .clone()
                .unwrap_or_else(|| nanoid::nanoid!(CLUSTER_ID_LEN));
            info!(%cluster_id, brokers, kraft = self.config.cluster.kraft_mode, "starting cluster");

            membership.phase = ClusterPhase::Started;
            membership.cluster_id = Some(cluster_id);
            membership.next_node_id = brokers;
            for node_id in 0..brokers {
                membership.nodes.insert(node_id, NodeRecord::new(node_id, self.roles_for(node_id)));
            }

            (0..brokers)
                .map(|node_id| self.prepare_start(&mut membership, node_id))
                .collect::<Result<Vec<_>>>()?
        };

        self.launch_all(launches, NodeState::Stopped).await
    }

    /// Adds a node with a fresh id, starts it and returns the id.
    pub async fn add_broker(&self) -> Result<u32> {
        let launch = {
            let mut membership = self.membership.lock();
            membership.ensure_started()?;

            let node_id = membership.next_node_id;
            self.ports.allocate(&self.listeners, node_id)?;
            membership.next_node_id += 1;
            membership.nodes.insert(node_id, NodeRecord::new(node_id, self.roles_for(node_id)));
            info!(node_id, "adding broker");
            self.prepare_start(&mut membership, node_id)?
        };

        let node_id = launch.node_id;
        self.launch_all(vec![launch], NodeState::Removed).await?;
        Ok(node_id)
    }

    /// Stops the node if it runs, releases its ports and marks it removed.
    pub async fn remove_broker(
        &self,
        node_id: u32,
    ) -> Result<()> {
        let needs_stop = {
            let mut membership = self.membership.lock();
            membership.ensure_started()?;

            let running_others = membership.running_count()
                - usize::from(
                    membership.nodes.get(&node_id).is_some_and(|n| n.state == NodeState::Running),
                );
            let record = membership.record_mut(node_id)?;

            if record.state.is_transitional() {
                return Err(ClusterError::NodeInTransition {
                    node_id,
                    state: record.state.as_str(),
                }
                .into());
            }
            if self.config.cluster.is_controller(node_id) {
                return Err(ClusterError::ControllerRemoval(node_id).into());
            }
            if !self.config.lifecycle.allow_empty_cluster && running_others == 0 {
                return Err(ClusterError::LastBrokerRemoval(node_id).into());
            }

            info!(node_id, state = %record.state, "removing broker");
            if record.state == NodeState::Running {
                record.transition(NodeState::Stopping);
                true
            } else {
                self.release(record);
                record.transition(NodeState::Removed);
                false
            }
        };

        if needs_stop {
            let result = self
                .stop_node(
                    node_id,
                    TerminationStyle::Graceful,
                    self.config.lifecycle.escalate_on_graceful_timeout,
                )
                .await;
            let mut membership = self.membership.lock();
            self.finish_stop(&mut membership, node_id, result, NodeState::Removed)?;
        }
        Ok(())
    }

    /// Stops every running node whose id matches `predicate`.
    ///
    /// Nodes that are not running are skipped.
    pub async fn stop_nodes<P>(
        &self,
        predicate: P,
        style: TerminationStyle,
    ) -> Result<()>
    where
        P: Fn(u32) -> bool,
    {
        let candidates = {
            let membership = self.membership.lock();
            membership.ensure_started()?;
            membership.ids_in(NodeState::Running)
        };
        // The predicate runs unlocked so it may inspect the cluster.
        let candidates: Vec<u32> = candidates.into_iter().filter(|id| predicate(*id)).collect();

        let targets: Vec<u32> = {
            let mut membership = self.membership.lock();
            membership.ensure_started()?;
            candidates
                .into_iter()
                .filter(|node_id| match membership.nodes.get_mut(node_id) {
                    Some(record) if record.state == NodeState::Running => {
                        record.transition(NodeState::Stopping);
                        true
                    }
                    _ => false,
                })
                .collect()
        };
        if targets.is_empty() {
            return Ok(());
        }
        info!(?targets, style = style.as_str(), "stopping nodes");

        let escalate = self.config.lifecycle.escalate_on_graceful_timeout;
        let results =
            join_all(targets.iter().map(|node_id| self.stop_node(*node_id, style, escalate))).await;

        let mut membership = self.membership.lock();
        let mut first_error = None;
        for (node_id, result) in targets.into_iter().zip(results) {
            if let Err(e) = self.finish_stop(&mut membership, node_id, result, NodeState::Stopped) {
                error!(node_id, "failed to stop node: {}", e);
                first_error.get_or_insert(e);
            }
        }
        self.update_running_gauge(&membership);
        first_error.map_or(Ok(()), Err)
    }

    /// Restarts every stopped node whose id matches `predicate`, re-leasing
    /// ports that were released in the meantime.
    pub async fn start_nodes<P>(
        &self,
        predicate: P,
    ) -> Result<()>
    where
        P: Fn(u32) -> bool,
    {
        let candidates = {
            let membership = self.membership.lock();
            membership.ensure_started()?;
            membership.ids_in(NodeState::Stopped)
        };
        let candidates: Vec<u32> = candidates.into_iter().filter(|id| predicate(*id)).collect();

        let launches = {
            let mut membership = self.membership.lock();
            membership.ensure_started()?;
            let mut launches = Vec::with_capacity(candidates.len());
            for node_id in candidates {
                if membership.nodes.get(&node_id).is_some_and(|n| n.state == NodeState::Stopped) {
                    launches.push(self.prepare_start(&mut membership, node_id)?);
                }
            }
            launches
        };
        if launches.is_empty() {
            return Ok(());
        }
        let targets: Vec<u32> = launches.iter().map(|launch| launch.node_id).collect();
        info!(?targets, "starting nodes");

        self.launch_all(launches, NodeState::Stopped).await
    }

    /// Stops all nodes and releases every port lease. Idempotent.
    ///
    /// A failure stopping one node does not prevent stopping the others; all
    /// failures are reported together.
    pub async fn close(&self) -> Result<()> {
        let targets = {
            let mut membership = self.membership.lock();
            match membership.phase {
                ClusterPhase::Closed => return Ok(()),
                ClusterPhase::Created => {
                    membership.phase = ClusterPhase::Closed;
                    return Ok(());
                }
                ClusterPhase::Started => {}
            }
            membership.phase = ClusterPhase::Closed;

            let targets = membership.ids_in(NodeState::Running);
            for node_id in &targets {
                if let Some(record) = membership.nodes.get_mut(node_id) {
                    record.transition(NodeState::Stopping);
                }
            }
            targets
        };
        info!(?targets, "closing cluster");

        let results = join_all(
            targets.iter().map(|node_id| self.stop_node(*node_id, TerminationStyle::Graceful, true)),
        )
        .await;

        let mut membership = self.membership.lock();
        let mut failures = Vec::new();
        for (node_id, result) in targets.into_iter().zip(results) {
            if let Some(record) = membership.nodes.get_mut(&node_id) {
                record.transition(NodeState::Stopped);
            }
            if let Err(e) = result {
                error!(node_id, "failed to stop node during teardown: {}", e);
                failures.push(e);
            }
        }
        // Nodes still mid-transition belong to the operation driving them;
        // it releases their leases once it sees the cluster closed.
        for record in membership.nodes.values_mut() {
            if !record.state.is_transitional() {
                self.release(record);
            }
        }
        self.update_running_gauge(&membership);

        if failures.is_empty() {
            info!("cluster closed");
            Ok(())
        } else {
            Err(ClusterError::Teardown { failures }.into())
        }
    }

    /// Count of node ids that have not been removed.
    pub fn num_of_brokers(&self) -> usize {
        let membership = self.membership.lock();
        membership.nodes.values().filter(|node| node.state != NodeState::Removed).count()
    }

    pub fn stopped_brokers(&self) -> BTreeSet<u32> {
        let membership = self.membership.lock();
        membership.ids_in(NodeState::Stopped).into_iter().collect()
    }

    /// Comma-joined client endpoints of all running nodes, in node id order.
    pub fn bootstrap_servers(&self) -> String {
        let membership = self.membership.lock();
        Self::bootstrap_from(&membership)
    }

    /// Identity fixed at `start()`.
    pub fn cluster_id(&self) -> Result<String> {
        let membership = self.membership.lock();
        membership.cluster_id.clone().ok_or_else(|| ClusterError::NotStarted.into())
    }

    pub fn node_state(
        &self,
        node_id: u32,
    ) -> Option<NodeState> {
        let membership = self.membership.lock();
        membership.nodes.get(&node_id).map(|node| node.state)
    }

    /// Ids of all nodes that have not been removed.
    pub fn node_ids(&self) -> Vec<u32> {
        let membership = self.membership.lock();
        membership
            .nodes
            .values()
            .filter(|node| node.state != NodeState::Removed)
            .map(|node| node.node_id)
            .collect()
    }

    /// Endpoints the driver reported for a running node.
    pub fn endpoints(
        &self,
        node_id: u32,
    ) -> Option<LiveEndpoints> {
        let membership = self.membership.lock();
        membership
            .nodes
            .get(&node_id)
            .filter(|node| node.state == NodeState::Running)
            .map(|node| node.endpoints.clone())
    }

    /// Client configuration for the configured user, if any.
    pub fn kafka_client_configuration(&self) -> Result<HashMap<String, String>> {
        client_config::client_configuration(&self.bootstrap_servers(), &self.config.security)
    }

    /// Client configuration authenticating as `user`.
    pub fn kafka_client_configuration_with(
        &self,
        user: &str,
        password: &str,
    ) -> Result<HashMap<String, String>> {
        client_config::client_configuration_with_credentials(
            &self.bootstrap_servers(),
            &self.config.security,
            &UserCredentials::new(user, password),
        )
    }

    fn roles_for(
        &self,
        node_id: u32,
    ) -> NodeRoles {
        if self.config.cluster.is_controller(node_id) {
            NodeRoles::ControllerAndBroker
        } else {
            NodeRoles::Broker
        }
    }

    /// `id@host:port` for each controller, from their controller leases.
    fn controller_quorum_voters(&self) -> Result<Option<String>> {
        let cluster = &self.config.cluster;
        if !cluster.kraft_mode {
            return Ok(None);
        }
        let voters = (0..cluster.kraft_controllers)
            .map(|node_id| {
                let port = self.ports.port(&Listener::Controller, node_id)?;
                Ok(format!("{node_id}@{}:{port}", cluster.advertised_host))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(voters.join(",")))
    }

    /// Ensures the node holds a lease on every listener and moves it to `Starting`.
    fn prepare_start(
        &self,
        membership: &mut Membership,
        node_id: u32,
    ) -> Result<NodeLaunch> {
        if !self.listeners.iter().all(|listener| self.ports.contains_port(listener, node_id)) {
            self.ports.allocate(&self.listeners, node_id)?;
        }
        let controller_quorum_voters = self.controller_quorum_voters()?;
        let cluster_id = membership.cluster_id.clone().ok_or(ClusterError::NotStarted)?;

        let leases = self.ports.leases_for(node_id);
        let record = membership.record_mut(node_id)?;
        record.leases = leases.clone();
        record.transition(NodeState::Starting);

        Ok(NodeLaunch {
            node_id,
            cluster_id,
            roles: record.roles,
            leases,
            controller_quorum_voters,
        })
    }

    /// Runs the driver for every launch concurrently and records the outcome.
    ///
    /// Nodes that fail to start move to `on_failure`; the first failure is
    /// returned once all outcomes are recorded.
    async fn launch_all(
        &self,
        launches: Vec<NodeLaunch>,
        on_failure: NodeState,
    ) -> Result<()> {
        let results = join_all(launches.iter().map(|launch| self.driver.start(launch))).await;

        let mut orphans = Vec::new();
        let mut first_error = None;
        {
            let mut membership = self.membership.lock();
            for (launch, result) in launches.iter().zip(results) {
                let node_id = launch.node_id;
                let closed = membership.phase == ClusterPhase::Closed;
                let Some(record) = membership.nodes.get_mut(&node_id) else {
                    continue;
                };

                let outcome = match result {
                    Ok(_) if closed => {
                        orphans.push(node_id);
                        Err(ClusterError::Closed.into())
                    }
                    Ok(endpoints) => {
                        record.endpoints = endpoints;
                        record.transition(NodeState::Running);
                        Ok(())
                    }
                    Err(source) => Err(DriverError::StartFailure { node_id, source }.into()),
                };

                if let Err(e) = outcome {
                    if closed || on_failure == NodeState::Removed {
                        self.release(record);
                    }
                    record.transition(if closed { NodeState::Stopped } else { on_failure });
                    error!(node_id, "failed to start node: {}", e);
                    first_error.get_or_insert(e);
                }
            }
            self.update_running_gauge(&membership);
        }

        for node_id in orphans {
            warn!(node_id, "cluster closed while node was starting, killing it");
            if let Err(e) = self.driver.stop(node_id, TerminationStyle::Abrupt).await {
                error!(node_id, "failed to kill orphaned node: {}", e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Stops a node through the driver, bounding graceful stops by the
    /// configured timeout.
    async fn stop_node(
        &self,
        node_id: u32,
        style: TerminationStyle,
        escalate: bool,
    ) -> std::result::Result<(), DriverError> {
        let stop_failure = |style: TerminationStyle| {
            move |source: BoxError| DriverError::StopFailure {
                node_id,
                style,
                source,
            }
        };

        if style == TerminationStyle::Abrupt {
            return self.driver.stop(node_id, style).await.map_err(stop_failure(style));
        }

        let timeout = self.config.lifecycle.graceful_stop_timeout();
        match tokio::time::timeout(timeout, self.driver.stop(node_id, style)).await {
            Ok(result) => result.map_err(stop_failure(style)),
            Err(_) if escalate => {
                warn!(node_id, ?timeout, "graceful stop timed out, stopping abruptly");
                self.driver
                    .stop(node_id, TerminationStyle::Abrupt)
                    .await
                    .map_err(stop_failure(TerminationStyle::Abrupt))
            }
            Err(_) => Err(DriverError::GracefulStopTimeout { node_id, timeout }),
        }
    }

    /// Records the outcome of a stop started by `remove_broker` or `stop_nodes`.
    ///
    /// A failed stop puts the node back to `Running`, unless the cluster was
    /// closed meanwhile, in which case it is given up as `Stopped`.
    fn finish_stop(
        &self,
        membership: &mut Membership,
        node_id: u32,
        result: std::result::Result<(), DriverError>,
        on_success: NodeState,
    ) -> Result<()> {
        let closed = membership.phase == ClusterPhase::Closed;
        let Some(record) = membership.nodes.get_mut(&node_id) else {
            return Ok(());
        };

        let outcome = match result {
            Ok(()) => {
                if closed || on_success == NodeState::Removed {
                    self.release(record);
                }
                record.transition(if on_success == NodeState::Removed {
                    NodeState::Removed
                } else {
                    NodeState::Stopped
                });
                Ok(())
            }
            Err(e) if closed => {
                self.release(record);
                record.transition(NodeState::Stopped);
                Err(e.into())
            }
            Err(e) => {
                record.transition(NodeState::Running);
                Err(e.into())
            }
        };
        self.update_running_gauge(membership);
        outcome
    }

    /// Releases the node's leases. Must happen no later than marking it removed.
    fn release(
        &self,
        record: &mut NodeRecord,
    ) {
        self.ports.deallocate(record.node_id);
        record.leases.clear();
    }

    fn bootstrap_from(membership: &Membership) -> String {
        membership
            .nodes
            .values()
            .filter(|node| node.state == NodeState::Running)
            .filter_map(|node| {
                let endpoint = node.endpoints.get(&Listener::External);
                if endpoint.is_none() {
                    warn!(node_id = node.node_id, "running node reported no client endpoint");
                }
                endpoint.map(ToString::to_string)
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    fn update_running_gauge(
        &self,
        membership: &Membership,
    ) {
        if let Some(cluster_id) = &membership.cluster_id {
            RUNNING_BROKERS.with_label_values(&[cluster_id]).set(membership.running_count() as i64);
        }
    }
}

impl<D> Drop for ClusterOrchestrator<D>
where
    D: NodeDriver,
{
    fn drop(&mut self) {
        if self.membership.get_mut().phase == ClusterPhase::Started {
            warn!("cluster dropped without close(); nodes may still be running");
        }
    }
}
