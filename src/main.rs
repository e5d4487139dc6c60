//! destinator demo runner.
//!
//! Spawns several peers in one process: the first is forced into leader
//! mode, the rest go through discovery. One peer originates periodic
//! TEMPERATURE readings; every peer logs what it delivers. Exists so the
//! coordination engine can be exercised end-to-end on a single host.

mod app;
mod core;
mod coordinator;
mod scheduler;
mod transport;

use app::PeerBuilder;
use clap::Parser;
use core::config::Config;
use core::error::Result;
use core::packet::MessageType;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of peers to spawn in this process
    #[arg(short, long, default_value_t = 5)]
    peers: usize,

    /// Path to a TOML configuration file (optional)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Generate a default configuration file and exit
    #[arg(long, value_name = "FILE")]
    generate_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();

    if let Some(path) = args.generate_config {
        Config::write_default(&path)?;
        println!("Generated default configuration at: {}", path.display());
        return Ok(());
    }

    let config = match args.config {
        Some(path) => Config::from_file(&path)?,
        None => Config::default(),
    };

    let mut peers = Vec::with_capacity(args.peers);
    for i in 0..args.peers {
        let builder = PeerBuilder::new(config.clone()).set_leader(i == 0);
        let peer = builder.start().await?;
        peers.push(peer);
        // Stagger startup slightly so the leader's unicast socket is bound
        // before followers start broadcasting DISCOVERY.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    tracing::info!(count = peers.len(), "spawned peers");

    peers[0].send(MessageType::Temperature, serde_json::json!(21));

    let mut listeners = Vec::new();
    for (i, mut peer) in peers.into_iter().enumerate() {
        listeners.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    delivered = peer.deliver_channel().recv() => {
                        match delivered {
                            Some(payload) => tracing::info!(peer = i, %payload, "delivered"),
                            None => break,
                        }
                    }
                    _ = tokio::time::sleep(Duration::from_secs(10)) => {
                        peer.send(MessageType::Temperature, serde_json::json!(20 + i as i64));
                    }
                }
            }
        }));
    }

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutting down");

    for listener in listeners {
        listener.abort();
    }

    Ok(())
}
