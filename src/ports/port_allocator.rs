//! Collision-free port leasing for cluster listeners.
//!
//! A lease is taken by binding a listening socket to an ephemeral port, noting
//! the port the OS picked and closing the socket again. The number stays
//! reserved in the lease table until the owning node is deallocated. Nothing
//! stays bound between allocations; the bind only proves the port was free at
//! lease time.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::TcpListener;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;

use crate::metrics::PORT_PROBES;
use crate::Listener;
use crate::PortError;
use crate::Result;

/// Upper bound on probes that land on a port some live lease already owns.
pub(crate) const MAX_PROBE_COLLISIONS: usize = 64;

/// Upper bound on node ids leased in a single `allocate_range` call.
pub const MAX_NODES_PER_BATCH: u32 = 1024;

/// A confirmed binding of one port number to one (listener, node id) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortLease<L = Listener> {
    pub listener: L,
    pub node_id: u32,
    pub port: u16,
    /// Allocation batch that produced this lease
    pub generation: u64,
    pub leased_at: Instant,
}

struct LeaseTable<L> {
    ports: HashMap<L, HashMap<u32, PortLease<L>>>,
    generation: u64,
}

impl<L> LeaseTable<L> {
    fn live_ports(&self) -> HashSet<u16> {
        self.ports.values().flat_map(|by_node| by_node.values().map(|lease| lease.port)).collect()
    }
}

/// Leases verified-available ports to (listener, node id) pairs.
///
/// Every operation takes the same lock: probing performs real binds, and two
/// interleaved probes could be handed the same ephemeral port.
pub struct PortAllocator<L = Listener> {
    bind_address: IpAddr,
    inner: Mutex<LeaseTable<L>>,
}

impl<L> Default for PortAllocator<L>
where
    L: Eq + Hash + Clone + Debug,
{
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

impl<L> PortAllocator<L>
where
    L: Eq + Hash + Clone + Debug,
{
    pub fn new(bind_address: IpAddr) -> Self {
        Self {
            bind_address,
            inner: Mutex::new(LeaseTable {
                ports: HashMap::new(),
                generation: 0,
            }),
        }
    }

    pub fn bind_address(&self) -> IpAddr {
        self.bind_address
    }

    /// Leases one port per listener for a single node.
    pub fn allocate<'a, I>(
        &self,
        listeners: I,
        node_id: u32,
    ) -> Result<()>
    where
        I: IntoIterator<Item = &'a L>,
        L: 'a,
    {
        let last_exclusive = node_id.checked_add(1).ok_or(PortError::NodeIdOutOfRange(node_id))?;
        self.allocate_range(listeners, node_id, last_exclusive)
    }

    /// Leases one port per listener for every node id in `[first, last_exclusive)`.
    ///
    /// All sockets opened while probing stay open until the whole batch is
    /// recorded, so no port repeats inside a batch. Probes that land on a port
    /// already held by a live lease are discarded. At most
    /// [`MAX_NODES_PER_BATCH`] node ids are leased per call.
    pub fn allocate_range<'a, I>(
        &self,
        listeners: I,
        first: u32,
        last_exclusive: u32,
    ) -> Result<()>
    where
        I: IntoIterator<Item = &'a L>,
        L: 'a,
    {
        if last_exclusive <= first {
            return Err(PortError::InvalidRange {
                first,
                last: last_exclusive,
            }
            .into());
        }
        let requested = last_exclusive - first;
        if requested > MAX_NODES_PER_BATCH {
            return Err(PortError::BatchTooLarge {
                requested,
                max: MAX_NODES_PER_BATCH,
            }
            .into());
        }
        let count = requested as usize;

        let mut seen = HashSet::new();
        let listeners: Vec<&L> = listeners.into_iter().filter(|l| seen.insert(*l)).collect();

        let mut table = self.inner.lock();
        let live = table.live_ports();

        let mut held = Vec::with_capacity(listeners.len() * count);
        let mut drawn = Vec::with_capacity(listeners.len());
        let mut collisions = 0;

        for listener in listeners {
            let mut ports = Vec::with_capacity(count);
            while ports.len() < count {
                let (socket, port) = self.probe()?;
                held.push(socket);
                if live.contains(&port) {
                    collisions += 1;
                    trace!(port, ?listener, "probe hit a leased port");
                    if collisions > MAX_PROBE_COLLISIONS {
                        return Err(PortError::Exhausted {
                            attempts: collisions,
                        }
                        .into());
                    }
                    continue;
                }
                ports.push(port);
            }
            drawn.push((listener.clone(), ports));
        }

        table.generation += 1;
        let generation = table.generation;
        let leased_at = Instant::now();
        for (listener, ports) in drawn {
            let by_node = table.ports.entry(listener.clone()).or_default();
            for (offset, port) in ports.into_iter().enumerate() {
                let node_id = first + offset as u32;
                by_node.insert(
                    node_id,
                    PortLease {
                        listener: listener.clone(),
                        node_id,
                        port,
                        generation,
                        leased_at,
                    },
                );
            }
        }
        drop(held);

        debug!(first, last_exclusive, generation, "allocated ports");
        Ok(())
    }

    fn probe(&self) -> Result<(TcpListener, u16)> {
        let socket = TcpListener::bind((self.bind_address, 0)).map_err(PortError::Probe)?;
        let port = socket.local_addr().map_err(PortError::Probe)?.port();
        PORT_PROBES.inc();
        Ok((socket, port))
    }

    /// Returns the leased port, failing loudly when the pair was never leased.
    pub fn port(
        &self,
        listener: &L,
        node_id: u32,
    ) -> Result<u16> {
        let table = self.inner.lock();
        table
            .ports
            .get(listener)
            .and_then(|by_node| by_node.get(&node_id))
            .map(|lease| lease.port)
            .ok_or_else(|| {
                PortError::NotAllocated {
                    listener: format!("{listener:?}"),
                    node_id,
                }
                .into()
            })
    }

    pub fn contains_port(
        &self,
        listener: &L,
        node_id: u32,
    ) -> bool {
        let table = self.inner.lock();
        table.ports.get(listener).is_some_and(|by_node| by_node.contains_key(&node_id))
    }

    /// Snapshot of every lease held by `node_id`.
    pub fn leases_for(
        &self,
        node_id: u32,
    ) -> Vec<PortLease<L>> {
        let table = self.inner.lock();
        table.ports.values().filter_map(|by_node| by_node.get(&node_id).cloned()).collect()
    }

    /// Releases every lease of `node_id`. Releasing an unknown node is a no-op.
    pub fn deallocate(
        &self,
        node_id: u32,
    ) {
        let mut table = self.inner.lock();
        let mut released = 0;
        for by_node in table.ports.values_mut() {
            if by_node.remove(&node_id).is_some() {
                released += 1;
            }
        }
        if released > 0 {
            debug!(node_id, released, "released port leases");
        }
    }

    pub fn lease_count(&self) -> usize {
        let table = self.inner.lock();
        table.ports.values().map(HashMap::len).sum()
    }
}
