//! Dissemination engine
//!
//! Decides what to store and whom to tell. A value is fanned out exactly once
//! per node, on the delivery that first inserts it; every later delivery of
//! the same value is absorbed silently. Sends are detached tasks whose outcome
//! nobody waits on: lost fan-out is repaired by the next anti-entropy round,
//! never by retrying here. Each destination has its own in-flight budget, so a
//! neighbor that never completes a send only starves itself.

use crate::config::NeighborMode;
use crate::store::ValueStore;
use crate::topology::TopologyTable;
use broadcast_core::{NodeId, Payload, Topology, Value};
use broadcast_net::Transport;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Engine settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time between anti-entropy rounds
    pub anti_entropy_interval: Duration,
    /// Detached sends allowed in flight to a single destination
    pub max_inflight_per_neighbor: usize,
    pub neighbor_mode: NeighborMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            anti_entropy_interval: Duration::from_secs(1),
            max_inflight_per_neighbor: 64,
            neighbor_mode: NeighborMode::Topology,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    fanout_sends: AtomicU64,
    anti_entropy_rounds: AtomicU64,
    anti_entropy_sends: AtomicU64,
    dropped_sends: AtomicU64,
    send_failures: AtomicU64,
}

/// Engine statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub values: usize,
    pub neighbors: usize,
    pub fanout_sends: u64,
    pub anti_entropy_rounds: u64,
    pub anti_entropy_sends: u64,
    /// Sends skipped for lack of a permit or a runtime
    pub dropped_sends: u64,
    pub send_failures: u64,
}

/// Gossip dissemination over a [`Transport`]
pub struct Engine<T: Transport> {
    config: EngineConfig,
    transport: Arc<T>,
    store: Arc<ValueStore>,
    topology: TopologyTable,
    /// In-flight budget per destination
    send_permits: Mutex<HashMap<NodeId, Arc<Semaphore>>>,
    counters: Arc<Counters>,
}

impl<T: Transport> Engine<T> {
    pub fn new(transport: Arc<T>, store: Arc<ValueStore>, config: EngineConfig) -> Self {
        let topology = TopologyTable::new(transport.local_id().clone());
        if config.neighbor_mode == NeighborMode::Cluster {
            let count = topology.replace(transport.node_ids());
            info!("Gossiping with all {} cluster nodes", count);
        }

        Self {
            send_permits: Mutex::new(HashMap::new()),
            config,
            transport,
            store,
            topology,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn local_id(&self) -> &NodeId {
        self.transport.local_id()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn store(&self) -> &Arc<ValueStore> {
        &self.store
    }

    pub fn topology(&self) -> &TopologyTable {
        &self.topology
    }

    /// Handle one propagated value. Returns whether it was new; only a new
    /// value is forwarded, to every neighbor except `sender` and ourselves.
    pub fn on_value_received(&self, sender: &NodeId, value: Value) -> bool {
        if !self.store.insert(value.clone()) {
            debug!("Already have {} (from {})", value, sender);
            return false;
        }

        let targets = fanout_targets(&self.topology.neighbors(), self.local_id(), Some(sender));
        debug!("New value {} from {}, forwarding to {} neighbors", value, sender, targets.len());

        for dest in targets {
            let payload = Payload::Broadcast {
                message: value.clone(),
            };
            if self.dispatch(dest, payload) {
                self.counters.fanout_sends.fetch_add(1, Ordering::Relaxed);
            }
        }
        true
    }

    /// Absorb an anti-entropy batch. Nothing is forwarded. Returns the
    /// number of values that were new.
    pub fn on_value_batch_received(
        &self,
        sender: &NodeId,
        values: impl IntoIterator<Item = Value>,
    ) -> usize {
        let merged = values
            .into_iter()
            .filter(|value| self.store.insert(value.clone()))
            .count();
        if merged > 0 {
            debug!("Merged {} new values from {}", merged, sender);
        }
        merged
    }

    /// Current value set, unordered
    pub fn on_read_requested(&self) -> Vec<Value> {
        self.store.snapshot()
    }

    /// Install this node's neighbors from the cluster topology
    pub fn on_topology_installed(&self, topology: &Topology) {
        match self.config.neighbor_mode {
            NeighborMode::Topology => {
                let count = self.topology.install(topology);
                info!("Installed topology: {} neighbors {:?}", count, self.topology.neighbors());
            }
            NeighborMode::Cluster => {
                debug!("Ignoring topology install in cluster mode");
            }
        }
    }

    /// Send the full value set to every neighbor. Returns the number of
    /// sends dispatched; an empty store sends nothing.
    pub fn resync_neighbors(&self) -> usize {
        let snapshot = self.store.snapshot();
        if snapshot.is_empty() {
            return 0;
        }

        let targets = fanout_targets(&self.topology.neighbors(), self.local_id(), None);
        let mut dispatched = 0;
        for dest in targets {
            let payload = Payload::PeriodicBroadcast {
                message: snapshot.clone(),
            };
            if self.dispatch(dest, payload) {
                dispatched += 1;
            }
        }

        self.counters.anti_entropy_rounds.fetch_add(1, Ordering::Relaxed);
        self.counters
            .anti_entropy_sends
            .fetch_add(dispatched as u64, Ordering::Relaxed);
        dispatched
    }

    fn permits_for(&self, dest: &NodeId) -> Arc<Semaphore> {
        self.send_permits
            .lock()
            .entry(dest.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.max_inflight_per_neighbor)))
            .clone()
    }

    /// Spawn a detached send. Returns false if the send was dropped because
    /// `dest` has too many sends in flight or no runtime is available.
    fn dispatch(&self, dest: NodeId, payload: Payload) -> bool {
        let Ok(permit) = self.permits_for(&dest).try_acquire_owned() else {
            self.counters.dropped_sends.fetch_add(1, Ordering::Relaxed);
            debug!("Dropping {} to {}: too many sends in flight to it", payload.kind(), dest);
            return false;
        };
        let Ok(runtime) = Handle::try_current() else {
            self.counters.dropped_sends.fetch_add(1, Ordering::Relaxed);
            debug!("Dropping {} to {}: no runtime", payload.kind(), dest);
            return false;
        };

        let transport = self.transport.clone();
        let counters = self.counters.clone();
        runtime.spawn(async move {
            let _permit = permit;
            let kind = payload.kind();
            if let Err(e) = transport.send(&dest, payload).await {
                counters.send_failures.fetch_add(1, Ordering::Relaxed);
                debug!("Send {} to {} failed: {}", kind, dest, e);
            }
        });
        true
    }

    pub fn stats(&self) -> EngineStats {
        let c = &self.counters;
        EngineStats {
            values: self.store.len(),
            neighbors: self.topology.len(),
            fanout_sends: c.fanout_sends.load(Ordering::Relaxed),
            anti_entropy_rounds: c.anti_entropy_rounds.load(Ordering::Relaxed),
            anti_entropy_sends: c.anti_entropy_sends.load(Ordering::Relaxed),
            dropped_sends: c.dropped_sends.load(Ordering::Relaxed),
            send_failures: c.send_failures.load(Ordering::Relaxed),
        }
    }
}

/// Neighbors to contact, minus this node and the node the data came from
pub fn fanout_targets(neighbors: &[NodeId], local: &NodeId, sender: Option<&NodeId>) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    neighbors
        .iter()
        .filter(|id| *id != local && Some(*id) != sender)
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect()
}
