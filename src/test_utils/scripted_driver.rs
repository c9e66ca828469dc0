use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::BoxError;
use crate::Endpoint;
use crate::LiveEndpoints;
use crate::NodeDriver;
use crate::NodeLaunch;
use crate::TerminationStyle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Start(u32),
    Stop(u32, TerminationStyle),
}

/// Driver whose failures and delays are set up by the test.
///
/// Started nodes report `host:port` endpoints built from their leases.
#[derive(Default)]
pub struct ScriptedDriver {
    failing_starts: Mutex<HashSet<u32>>,
    failing_stops: Mutex<HashSet<u32>>,
    graceful_delay: Mutex<Option<Duration>>,
    start_delay: Mutex<Option<Duration>>,
    running: DashMap<u32, NodeLaunch>,
    calls: Mutex<Vec<DriverCall>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_start(
        &self,
        node_id: u32,
    ) {
        self.failing_starts.lock().insert(node_id);
    }

    pub fn fail_stop(
        &self,
        node_id: u32,
    ) {
        self.failing_stops.lock().insert(node_id);
    }

    pub fn heal(
        &self,
        node_id: u32,
    ) {
        self.failing_starts.lock().remove(&node_id);
        self.failing_stops.lock().remove(&node_id);
    }

    /// Graceful stops hang for `delay` before completing.
    pub fn delay_graceful_stop(
        &self,
        delay: Duration,
    ) {
        *self.graceful_delay.lock() = Some(delay);
    }

    pub fn delay_start(
        &self,
        delay: Duration,
    ) {
        *self.start_delay.lock() = Some(delay);
    }

    pub fn is_running(
        &self,
        node_id: u32,
    ) -> bool {
        self.running.contains_key(&node_id)
    }

    pub fn launch_of(
        &self,
        node_id: u32,
    ) -> Option<NodeLaunch> {
        self.running.get(&node_id).map(|launch| launch.clone())
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().clone()
    }

    pub fn stop_calls(
        &self,
        node_id: u32,
    ) -> Vec<TerminationStyle> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                DriverCall::Stop(id, style) if *id == node_id => Some(*style),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl NodeDriver for ScriptedDriver {
    async fn start(
        &self,
        launch: &NodeLaunch,
    ) -> Result<LiveEndpoints, BoxError> {
        self.calls.lock().push(DriverCall::Start(launch.node_id));
        let delay = *self.start_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_starts.lock().contains(&launch.node_id) {
            return Err(format!("node {} refused to start", launch.node_id).into());
        }

        let endpoints = launch
            .leases
            .iter()
            .map(|lease| (lease.listener, Endpoint::new("localhost", lease.port)))
            .collect();
        self.running.insert(launch.node_id, launch.clone());
        Ok(endpoints)
    }

    async fn stop(
        &self,
        node_id: u32,
        style: TerminationStyle,
    ) -> Result<(), BoxError> {
        self.calls.lock().push(DriverCall::Stop(node_id, style));
        if style == TerminationStyle::Graceful {
            let delay = *self.graceful_delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
        }
        if self.failing_stops.lock().contains(&node_id) {
            return Err(format!("node {node_id} refused to stop").into());
        }
        self.running.remove(&node_id);
        Ok(())
    }
}
