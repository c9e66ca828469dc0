//! A driver that stands a node up inside the current process.
//!
//! Every leased port gets a real tokio listener with an accept loop, so the
//! node is reachable on its advertised endpoints while it runs. Connections are
//! accepted and dropped; no broker protocol is spoken.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::Endpoint;
use super::LiveEndpoints;
use super::NodeDriver;
use super::NodeLaunch;
use super::TerminationStyle;
use crate::BoxError;
use crate::ClusterConfig;
use crate::Listener;

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(10);

struct RunningNode {
    shutdown: CancellationToken,
    /// Cancelled once the serve task has dropped its listeners
    finished: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct InProcessDriver {
    bind_address: IpAddr,
    advertised_host: String,
    nodes: DashMap<u32, RunningNode>,
}

impl InProcessDriver {
    pub fn new(
        bind_address: IpAddr,
        advertised_host: impl Into<String>,
    ) -> Self {
        Self {
            bind_address,
            advertised_host: advertised_host.into(),
            nodes: DashMap::new(),
        }
    }

    pub fn from_config(cluster: &ClusterConfig) -> Self {
        Self::new(cluster.bind_address, cluster.advertised_host.clone())
    }

    pub fn is_running(
        &self,
        node_id: u32,
    ) -> bool {
        self.nodes.contains_key(&node_id)
    }

    pub fn running_nodes(&self) -> usize {
        self.nodes.len()
    }
}

#[async_trait]
impl NodeDriver for InProcessDriver {
    async fn start(
        &self,
        launch: &NodeLaunch,
    ) -> Result<LiveEndpoints, BoxError> {
        let node_id = launch.node_id;
        if self.nodes.contains_key(&node_id) {
            return Err(format!("node {node_id} is already running").into());
        }

        let mut listeners = Vec::with_capacity(launch.leases.len());
        let mut endpoints = HashMap::with_capacity(launch.leases.len());
        for lease in &launch.leases {
            let listener = TcpListener::bind((self.bind_address, lease.port)).await?;
            let port = listener.local_addr()?.port();
            endpoints.insert(lease.listener, Endpoint::new(self.advertised_host.clone(), port));
            listeners.push((lease.listener, listener));
        }

        let shutdown = CancellationToken::new();
        let finished = CancellationToken::new();
        let handle = tokio::spawn(serve(node_id, listeners, shutdown.clone(), finished.clone()));
        self.nodes.insert(
            node_id,
            RunningNode {
                shutdown,
                finished,
                handle,
            },
        );

        info!(node_id, cluster_id = %launch.cluster_id, ?endpoints, "in-process node started");
        Ok(endpoints)
    }

    /// An abrupt stop of a node that is not running succeeds: there is
    /// nothing left to kill.
    ///
    /// A graceful stop keeps the node registered until its listeners are
    /// closed, so an abrupt stop issued after an abandoned graceful one still
    /// finds the task to abort.
    async fn stop(
        &self,
        node_id: u32,
        style: TerminationStyle,
    ) -> Result<(), BoxError> {
        match style {
            TerminationStyle::Graceful => {
                let Some(finished) = self.nodes.get(&node_id).map(|node| {
                    node.shutdown.cancel();
                    node.finished.clone()
                }) else {
                    return Err(format!("node {node_id} is not running").into());
                };
                finished.cancelled().await;
                if let Some((_, node)) = self.nodes.remove(&node_id) {
                    node.handle.await?;
                }
            }
            TerminationStyle::Abrupt => {
                let Some((_, node)) = self.nodes.remove(&node_id) else {
                    debug!(node_id, "abrupt stop of a node that is not running");
                    return Ok(());
                };
                node.handle.abort();
                // Wait for the aborted task to drop its listeners.
                let _ = node.handle.await;
            }
        }

        info!(node_id, style = style.as_str(), "in-process node stopped");
        Ok(())
    }
}

async fn serve(
    node_id: u32,
    listeners: Vec<(Listener, TcpListener)>,
    shutdown: CancellationToken,
    finished: CancellationToken,
) {
    let _finished = finished.drop_guard();
    // Accept loops run inside this task so aborting it closes every listener.
    let accept_loops = listeners
        .into_iter()
        .map(|(listener, socket)| accept_loop(node_id, listener, socket, shutdown.clone()));
    join_all(accept_loops).await;
    debug!(node_id, "accept loops finished");
}

async fn accept_loop(
    node_id: u32,
    listener: Listener,
    socket: TcpListener,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = socket.accept() => match accepted {
                Ok((stream, peer)) => {
                    trace!(node_id, %listener, %peer, "accepted connection");
                    drop(stream);
                }
                Err(e) => {
                    warn!(node_id, %listener, "accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
    }
}
