//! Transport adapter boundary
//!
//! The node core only ever talks to peers through [`Transport`]. Delivery is
//! best-effort and unordered; implementations never retry.

use crate::framing::FrameError;
use async_trait::async_trait;
use broadcast_core::{Body, Envelope, NodeId, Payload};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Unknown destination: {0}")]
    UnknownDestination(NodeId),
    #[error("Handshake failed: {0}")]
    Handshake(String),
}

/// Inbound messages, one per received envelope
pub type Inbound = mpsc::UnboundedReceiver<Envelope>;

/// Best-effort message transport between named nodes
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// This node's id, fixed at handshake
    fn local_id(&self) -> &NodeId;

    /// Every node in the cluster, including this one
    fn node_ids(&self) -> &[NodeId];

    /// Send a new message to `dest`. Success means the message was handed
    /// off, not that it arrived.
    async fn send(&self, dest: &NodeId, payload: Payload) -> Result<(), TransportError>;

    /// Answer `request`, correlating on its `msg_id`.
    async fn reply(&self, request: &Envelope, payload: Payload) -> Result<(), TransportError>;
}

/// Allocates outbound message ids, starting at 1
#[derive(Debug, Default)]
pub struct MsgIds(AtomicU64);

impl MsgIds {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Build an outbound envelope stamped with a fresh id
    pub fn envelope(
        &self,
        src: &NodeId,
        dest: &NodeId,
        in_reply_to: Option<u64>,
        payload: Payload,
    ) -> Envelope {
        let body = Body {
            msg_id: Some(self.next()),
            in_reply_to,
            payload,
        };
        Envelope::new(src.clone(), dest.clone(), body)
    }
}
