//! Networking primitives for the broadcast gossip node
//!
//! This crate provides:
//! - The [`Transport`] adapter trait the node core sends through
//! - Newline-delimited JSON framing
//! - A stdin/stdout transport for the cluster harness
//! - An in-memory simulated network with fault injection

pub mod framing;
pub mod memory;
pub mod stdio;
pub mod transport;

pub use framing::{EnvelopeCodec, FrameError};
pub use memory::{LinkFault, MemoryNetwork, MemoryTransport};
pub use stdio::StdioTransport;
pub use transport::{Inbound, MsgIds, Transport, TransportError};
