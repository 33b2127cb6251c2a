//! broadcastd server - main service loop

use crate::anti_entropy::AntiEntropy;
use crate::engine::{Engine, EngineConfig, EngineStats};
use crate::storage::StorageError;
use crate::store::ValueStore;
use broadcast_core::{Envelope, NodeId, Payload};
use broadcast_net::{Inbound, Transport, TransportError};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// A running broadcast node
pub struct Server<T: Transport> {
    engine: Arc<Engine<T>>,
    /// Shutdown flag; stays set once raised
    shutdown_tx: watch::Sender<bool>,
}

impl<T: Transport> Server<T> {
    /// Create a new server instance
    pub fn new(transport: Arc<T>, store: Arc<ValueStore>, config: EngineConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            engine: Arc::new(Engine::new(transport, store, config)),
            shutdown_tx,
        }
    }

    pub fn engine(&self) -> &Arc<Engine<T>> {
        &self.engine
    }

    /// Serve `inbound` until it closes or [`shutdown`](Self::shutdown) is
    /// called. Each message is handled in its own task.
    pub async fn run(&self, mut inbound: Inbound) -> Result<(), ServerError> {
        info!(
            "Starting broadcastd as {} ({} values known)",
            self.engine.local_id(),
            self.engine.store().len()
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let anti_entropy =
            AntiEntropy::new(self.engine.clone()).spawn(self.shutdown_tx.subscribe());

        loop {
            tokio::select! {
                message = inbound.recv() => {
                    let Some(envelope) = message else {
                        info!("Inbound closed");
                        break;
                    };
                    let engine = self.engine.clone();
                    tokio::spawn(async move {
                        let (kind, src) = (envelope.body.payload.kind(), envelope.src.clone());
                        if let Err(e) = handle_message(&engine, envelope).await {
                            warn!("Failed to answer {} from {}: {}", kind, src, e);
                        }
                    });
                }
                _ = shutdown_requested(&mut shutdown_rx) => {
                    info!("Shutting down...");
                    break;
                }
            }
        }

        anti_entropy.abort();
        self.engine.store().flush()?;

        Ok(())
    }

    /// Shutdown the server. Takes effect even if `run` has not started yet.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Get server statistics
    pub fn stats(&self) -> ServerStats {
        ServerStats {
            node_id: self.engine.local_id().clone(),
            engine: self.engine.stats(),
        }
    }
}

/// Server statistics
#[derive(Debug, Clone)]
pub struct ServerStats {
    pub node_id: NodeId,
    pub engine: EngineStats,
}

/// Resolves once the flag behind `shutdown` is true, or its sender is gone
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Route one inbound message to the engine and answer it if it expects an
/// answer. Only reply sends can fail here.
pub async fn handle_message<T: Transport>(
    engine: &Engine<T>,
    envelope: Envelope,
) -> Result<(), TransportError> {
    let transport = engine.transport();

    match &envelope.body.payload {
        Payload::Broadcast { message } => {
            engine.on_value_received(&envelope.src, message.clone());
            transport.reply(&envelope, Payload::BroadcastOk).await
        }
        Payload::PeriodicBroadcast { message } => {
            engine.on_value_batch_received(&envelope.src, message.iter().cloned());
            Ok(())
        }
        Payload::Read => {
            let messages = engine.on_read_requested();
            transport.reply(&envelope, Payload::ReadOk { messages }).await
        }
        Payload::Topology { topology } => {
            engine.on_topology_installed(topology);
            transport.reply(&envelope, Payload::TopologyOk).await
        }
        Payload::Init { .. } => {
            warn!("Ignoring init from {} after startup", envelope.src);
            Ok(())
        }
        reply if reply.is_reply() => {
            debug!("Ignoring {} from {}", reply.kind(), envelope.src);
            Ok(())
        }
        other => {
            warn!("Unexpected {} from {}", other.kind(), envelope.src);
            Ok(())
        }
    }
}
