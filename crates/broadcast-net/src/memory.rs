//! In-process simulated network
//!
//! Nodes and clients join a shared [`MemoryNetwork`] and exchange envelopes
//! through unbounded mailboxes. Faults are injected per envelope, which lets
//! tests reproduce lossy links and unresponsive neighbors deterministically.

use crate::transport::{Inbound, MsgIds, Transport, TransportError};
use async_trait::async_trait;
use broadcast_core::{Envelope, NodeId, Payload};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// What happens to an envelope on a faulty link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFault {
    /// Lost silently; the sender sees success
    Drop,
    /// The send never completes
    Stall,
}

type FaultRule = Arc<dyn Fn(&Envelope) -> Option<LinkFault> + Send + Sync>;

#[derive(Default)]
struct NetworkInner {
    mailboxes: RwLock<HashMap<NodeId, mpsc::UnboundedSender<Envelope>>>,
    fault_rule: RwLock<Option<FaultRule>>,
    loss_rate: RwLock<f64>,
    /// Every envelope offered to the network, delivered or not
    sent: Mutex<Vec<Envelope>>,
}

/// A simulated cluster network
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `id` to the network. `node_ids` is the cluster membership the
    /// transport reports, as if learned at handshake.
    pub fn join(&self, id: impl Into<NodeId>, node_ids: &[NodeId]) -> (Arc<MemoryTransport>, Inbound) {
        let id = id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.mailboxes.write().insert(id.clone(), tx);

        let transport = Arc::new(MemoryTransport {
            local_id: id,
            node_ids: node_ids.to_vec(),
            network: self.clone(),
            msg_ids: MsgIds::default(),
        });
        (transport, rx)
    }

    /// Detach `id`; sends to it fail with `ConnectionClosed` afterwards.
    pub fn disconnect(&self, id: &NodeId) {
        self.inner.mailboxes.write().remove(id);
    }

    /// Install a per-envelope fault rule, replacing any previous one.
    pub fn set_fault_rule<F>(&self, rule: F)
    where
        F: Fn(&Envelope) -> Option<LinkFault> + Send + Sync + 'static,
    {
        *self.inner.fault_rule.write() = Some(Arc::new(rule));
    }

    pub fn clear_fault_rule(&self) {
        *self.inner.fault_rule.write() = None;
    }

    /// Randomly drop this fraction of envelopes (clamped to 0.0..=1.0).
    pub fn set_loss_rate(&self, rate: f64) {
        *self.inner.loss_rate.write() = rate.clamp(0.0, 1.0);
    }

    /// Every envelope offered so far
    pub fn sent(&self) -> Vec<Envelope> {
        self.inner.sent.lock().clone()
    }

    /// Count offered envelopes matching `filter`
    pub fn sent_count(&self, filter: impl Fn(&Envelope) -> bool) -> usize {
        self.inner.sent.lock().iter().filter(|env| filter(env)).count()
    }

    async fn deliver(&self, env: Envelope) -> Result<(), TransportError> {
        self.inner.sent.lock().push(env.clone());

        let fault = self
            .inner
            .fault_rule
            .read()
            .as_ref()
            .and_then(|rule| rule(&env));
        match fault {
            Some(LinkFault::Drop) => {
                trace!("Dropping {} {} -> {}", env.body.payload.kind(), env.src, env.dest);
                return Ok(());
            }
            Some(LinkFault::Stall) => {
                trace!("Stalling {} {} -> {}", env.body.payload.kind(), env.src, env.dest);
                std::future::pending::<()>().await;
            }
            None => {}
        }

        let loss_rate = *self.inner.loss_rate.read();
        let lost = loss_rate > 0.0 && rand::thread_rng().gen_bool(loss_rate);
        if lost {
            trace!("Lost {} {} -> {}", env.body.payload.kind(), env.src, env.dest);
            return Ok(());
        }

        let mailbox = self
            .inner
            .mailboxes
            .read()
            .get(&env.dest)
            .cloned()
            .ok_or_else(|| TransportError::UnknownDestination(env.dest.clone()))?;
        mailbox
            .send(env)
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

/// One node's handle on a [`MemoryNetwork`]
pub struct MemoryTransport {
    local_id: NodeId,
    node_ids: Vec<NodeId>,
    network: MemoryNetwork,
    msg_ids: MsgIds,
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_id(&self) -> &NodeId {
        &self.local_id
    }

    fn node_ids(&self) -> &[NodeId] {
        &self.node_ids
    }

    async fn send(&self, dest: &NodeId, payload: Payload) -> Result<(), TransportError> {
        let env = self.msg_ids.envelope(&self.local_id, dest, None, payload);
        self.network.deliver(env).await
    }

    async fn reply(&self, request: &Envelope, payload: Payload) -> Result<(), TransportError> {
        let env = self
            .msg_ids
            .envelope(&self.local_id, &request.src, request.body.msg_id, payload);
        self.network.deliver(env).await
    }
}
