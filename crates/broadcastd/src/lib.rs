//! broadcastd - gossip broadcast node
//!
//! This daemon provides:
//! - A deduplicating, concurrently readable value store
//! - Optional durable journaling of stored values
//! - Topology-constrained fan-out of newly learned values
//! - Periodic anti-entropy resync to heal lost messages
//! - Request dispatch for the broadcast/read/topology vocabulary

pub mod anti_entropy;
pub mod config;
pub mod engine;
pub mod server;
pub mod storage;
pub mod store;
pub mod topology;

pub use anti_entropy::AntiEntropy;
pub use config::Config;
pub use engine::{Engine, EngineConfig, EngineStats};
pub use server::Server;
pub use storage::Storage;
pub use store::ValueStore;
pub use topology::TopologyTable;
