//! Periodic anti-entropy resync
//!
//! Immediate fan-out can be lost by the transport; this loop is the only
//! recovery path. Every round pushes the whole local value set to each
//! neighbor. Rounds are independent and never wait on a neighbor.

use crate::engine::Engine;
use crate::server::shutdown_requested;
use broadcast_net::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Anti-entropy scheduler for one engine
pub struct AntiEntropy<T: Transport> {
    engine: Arc<Engine<T>>,
    interval: Duration,
}

impl<T: Transport> AntiEntropy<T> {
    pub fn new(engine: Arc<Engine<T>>) -> Self {
        let interval = engine.config().anti_entropy_interval;
        Self { engine, interval }
    }

    /// Run one round now. Returns the number of sends dispatched.
    pub fn tick(&self) -> usize {
        let sent = self.engine.resync_neighbors();
        if sent > 0 {
            debug!("Anti-entropy round: {} values to {} neighbors", self.engine.store().len(), sent);
        }
        sent
    }

    /// Start the periodic loop; it runs until `shutdown` turns true or the
    /// handle is aborted.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Anti-entropy every {:?}", self.interval);
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately; the store is empty then anyway
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick();
                    }
                    _ = shutdown_requested(&mut shutdown) => {
                        debug!("Anti-entropy stopped");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::store::ValueStore;
    use broadcast_core::{NodeId, Payload, Topology, Value};
    use broadcast_net::{MemoryNetwork, MemoryTransport};

    fn node(net: &MemoryNetwork, id: &str, neighbors: &[&str], interval: Duration) -> Arc<Engine<MemoryTransport>> {
        let (transport, _) = net.join(id, &[]);
        let config = EngineConfig {
            anti_entropy_interval: interval,
            ..EngineConfig::default()
        };
        let engine = Arc::new(Engine::new(transport, Arc::new(ValueStore::new()), config));
        let topology: Topology = [(
            NodeId::from(id),
            neighbors.iter().map(|n| NodeId::from(*n)).collect(),
        )]
        .into_iter()
        .collect();
        engine.on_topology_installed(&topology);
        engine
    }

    fn resyncs(net: &MemoryNetwork) -> usize {
        net.sent_count(|env| matches!(env.body.payload, Payload::PeriodicBroadcast { .. }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_store_tick_sends_nothing() {
        let net = MemoryNetwork::new();
        let scheduler = AntiEntropy::new(node(&net, "n1", &["n2", "n3"], Duration::from_secs(1)));

        assert_eq!(scheduler.tick(), 0);
        tokio::task::yield_now().await;
        assert!(net.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_excludes_self() {
        let net = MemoryNetwork::new();
        let engine = node(&net, "n1", &["n1", "n2"], Duration::from_secs(1));
        let _n2 = net.join("n2", &[]);
        engine.on_value_received(&"c1".into(), Value::Int(3));

        let scheduler = AntiEntropy::new(engine);
        assert_eq!(scheduler.tick(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_ticks_until_shutdown() {
        let net = MemoryNetwork::new();
        let engine = node(&net, "n1", &["n2"], Duration::from_millis(10));
        let _n2 = net.join("n2", &[]);
        engine.on_value_batch_received(&"n3".into(), vec![Value::Int(1)]);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = AntiEntropy::new(engine.clone()).spawn(shutdown_rx);

        tokio::time::sleep(Duration::from_millis(105)).await;
        assert_eq!(resyncs(&net), 10);

        shutdown_tx.send_replace(true);
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(resyncs(&net), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_exits_if_already_shut_down() {
        let net = MemoryNetwork::new();
        let engine = node(&net, "n1", &["n2"], Duration::from_millis(10));

        let (_shutdown_tx, shutdown_rx) = watch::channel(true);
        let handle = AntiEntropy::new(engine).spawn(shutdown_rx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
