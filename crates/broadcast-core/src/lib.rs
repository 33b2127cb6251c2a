//! Broadcast Core Library
//!
//! This crate provides the shared vocabulary of the broadcast gossip node:
//! the values being disseminated, node identifiers, the cluster topology, and
//! the tagged wire messages exchanged between nodes and clients.
//!
//! # Modules
//!
//! - [`types`]: Values, node identifiers and topology
//! - [`message`]: Wire envelopes and the closed set of message payloads
//! - [`error`]: Error types

pub mod error;
pub mod message;
pub mod types;

#[cfg(test)]
mod wire_vectors;

pub use error::{DecodeError, Error, Result};
pub use message::{Body, Envelope, Payload};
pub use types::*;
