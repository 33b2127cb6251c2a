//! Configuration for broadcastd

use crate::engine::EngineConfig;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Where a node's gossip neighbors come from
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NeighborMode {
    /// This node's entry in the installed topology
    #[default]
    Topology,
    /// Every other node in the cluster; topology installs are acknowledged
    /// but ignored
    Cluster,
}

/// Log output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// broadcastd - gossip broadcast node
#[derive(Parser, Debug, Clone)]
#[command(name = "broadcastd")]
#[command(about = "Gossip broadcast node with topology fan-out and anti-entropy resync")]
pub struct Config {
    /// Anti-entropy resync interval in milliseconds
    #[arg(long, env = "BROADCAST_ANTI_ENTROPY_INTERVAL_MS", default_value = "1000")]
    pub anti_entropy_interval_ms: u64,

    /// Sends in flight to any one neighbor before further sends to it are dropped
    #[arg(long, env = "BROADCAST_MAX_INFLIGHT_PER_NEIGHBOR", default_value = "64")]
    pub max_inflight_per_neighbor: usize,

    /// Neighbor selection for fan-out and resync
    #[arg(long, value_enum, env = "BROADCAST_NEIGHBOR_MODE", default_value = "topology")]
    pub neighbor_mode: NeighborMode,

    /// Journal directory; values are kept in memory only when unset
    #[arg(short, long, env = "BROADCAST_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format
    #[arg(long, value_enum, env = "BROADCAST_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.anti_entropy_interval_ms == 0 {
            anyhow::bail!("Anti-entropy interval must be greater than zero");
        }
        if self.max_inflight_per_neighbor == 0 {
            anyhow::bail!("Max inflight sends per neighbor must be greater than zero");
        }
        Ok(())
    }

    /// Engine settings derived from the command line
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            anti_entropy_interval: Duration::from_millis(self.anti_entropy_interval_ms),
            max_inflight_per_neighbor: self.max_inflight_per_neighbor,
            neighbor_mode: self.neighbor_mode,
        }
    }
}
