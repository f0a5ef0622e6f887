//! Bitmark node binary entry point.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod config;
mod node;

use config::NodeConfig;
use node::Node;

/// Bitmark node with a built-in CPU miner.
#[derive(Parser, Debug)]
#[command(name = "bitmark-node")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "bitmark-node.toml")]
    config: PathBuf,

    /// Network to run on (mainnet, testnet, regtest)
    #[arg(short, long)]
    network: Option<String>,

    /// Enable mining
    #[arg(long)]
    generate: bool,

    /// Number of mining threads (negative = auto-detect)
    #[arg(long)]
    threads: Option<i32>,

    /// Mining algorithm (scrypt, sha256d, equihash)
    #[arg(long)]
    algo: Option<String>,

    /// Largest block to create, in bytes
    #[arg(long)]
    block_max_size: Option<u32>,

    /// Bytes reserved for high-priority transactions
    #[arg(long)]
    block_priority_size: Option<u32>,

    /// Minimum block size to fill with free transactions
    #[arg(long)]
    block_min_size: Option<u32>,

    /// Log per-transaction priority lines during template builds
    #[arg(long)]
    print_priority: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = NodeConfig::load(&args.config)?;
    if let Some(network) = args.network {
        config.network = network;
    }
    if args.generate {
        config.mining.generate = true;
    }
    if let Some(threads) = args.threads {
        config.mining.threads = threads;
    }
    if let Some(algo) = args.algo {
        config.mining.algo = algo;
    }
    if let Some(size) = args.block_max_size {
        config.mining.block_max_size = size;
    }
    if let Some(size) = args.block_priority_size {
        config.mining.block_priority_size = size;
    }
    if let Some(size) = args.block_min_size {
        config.mining.block_min_size = size;
    }
    if args.print_priority {
        config.mining.print_priority = true;
    }

    info!(network = %config.network, "starting bitmark-node");
    let node = Node::new(config)?;
    node.start_mining();

    // Workers run until interrupted; on regtest they stop after one block.
    node.miner().join();
    info!(height = node.height(), "node shutting down");
    Ok(())
}
