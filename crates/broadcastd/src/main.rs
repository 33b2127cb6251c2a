//! broadcastd - gossip broadcast node
//!
//! Speaks the line-delimited JSON protocol of the cluster harness on
//! stdin/stdout. Logs go to stderr.

use anyhow::Context;
use broadcastd::config::{Config, LogFormat};
use broadcastd::server::Server;
use broadcastd::storage::Storage;
use broadcastd::store::ValueStore;
use broadcast_net::StdioTransport;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse configuration
    let config = Config::parse();

    // Initialize logging
    init_logging(&config);

    info!(
        "broadcastd v{} - gossip broadcast node",
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &Config) {
    let level = if config.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("broadcastd={level},broadcast_net={level}"))
    });
    let json = config.log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();
}

async fn run(config: Config) -> anyhow::Result<()> {
    let store = match &config.data_dir {
        Some(dir) => {
            let storage = Storage::open(dir)
                .with_context(|| format!("Failed to open journal at {}", dir.display()))?;
            Arc::new(ValueStore::with_journal(Arc::new(storage))?)
        }
        None => Arc::new(ValueStore::new()),
    };

    let (transport, inbound) = StdioTransport::connect()
        .await
        .context("Transport failed to start")?;

    let server = Arc::new(Server::new(transport, store, config.engine_config()));

    // Install signal handler
    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_server.shutdown();
        }
    });

    server.run(inbound).await?;

    let stats = server.stats();
    info!(
        "Final stats for {}: {} values, {} fan-out sends, {} anti-entropy rounds, {} dropped sends",
        stats.node_id,
        stats.engine.values,
        stats.engine.fanout_sends,
        stats.engine.anti_entropy_rounds,
        stats.engine.dropped_sends
    );

    Ok(())
}
