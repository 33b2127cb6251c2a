//! Wire messages
//!
//! Every message is a JSON object with a source, a destination and a body.
//! The body's `type` field selects one [`Payload`] variant; anything that does
//! not match a variant exactly is rejected at decode time.

use crate::error::{DecodeError, Result};
use crate::types::{NodeId, Topology, Value};
use serde::{Deserialize, Serialize};

/// A routed message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub src: NodeId,
    pub dest: NodeId,
    pub body: Body,
}

/// Message body: correlation ids plus the typed payload
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Body {
    /// Sender-assigned id, echoed back as `in_reply_to`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<u64>,
    #[serde(flatten)]
    pub payload: Payload,
}

/// The closed set of message types a node understands
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// Startup handshake from the harness
    Init {
        node_id: NodeId,
        node_ids: Vec<NodeId>,
    },
    InitOk,
    /// Deliver one value (client to node, or peer fan-out)
    Broadcast { message: Value },
    BroadcastOk,
    /// Anti-entropy resync: the sender's full value set
    PeriodicBroadcast { message: Vec<Value> },
    Read,
    ReadOk { messages: Vec<Value> },
    Topology { topology: Topology },
    TopologyOk,
}

impl Payload {
    /// Wire name of this payload's type tag
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Init { .. } => "init",
            Payload::InitOk => "init_ok",
            Payload::Broadcast { .. } => "broadcast",
            Payload::BroadcastOk => "broadcast_ok",
            Payload::PeriodicBroadcast { .. } => "periodic_broadcast",
            Payload::Read => "read",
            Payload::ReadOk { .. } => "read_ok",
            Payload::Topology { .. } => "topology",
            Payload::TopologyOk => "topology_ok",
        }
    }

    /// Whether this payload answers a request rather than making one
    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            Payload::InitOk | Payload::BroadcastOk | Payload::ReadOk { .. } | Payload::TopologyOk
        )
    }
}

impl Body {
    pub fn new(payload: Payload) -> Self {
        Self {
            msg_id: None,
            in_reply_to: None,
            payload,
        }
    }
}

impl Envelope {
    pub fn new(src: NodeId, dest: NodeId, body: Body) -> Self {
        Self { src, dest, body }
    }

    /// Decode one message from its JSON bytes.
    pub fn from_json(bytes: &[u8]) -> std::result::Result<Self, DecodeError> {
        serde_json::from_slice(bytes).map_err(|source| {
            // Recover what we can for the log line
            let raw: Option<serde_json::Value> = serde_json::from_slice(bytes).ok();
            let field = |pointer: &str| {
                raw.as_ref()
                    .and_then(|v| v.pointer(pointer))
                    .and_then(|v| v.as_str())
                    .map(str::to_owned)
            };
            DecodeError {
                src: field("/src"),
                kind: field("/body/type"),
                source,
            }
        })
    }

    /// Encode as a single line of JSON (no trailing newline).
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
