//! Tessera node binary.
//!
//! Opens (or initializes) the chain database for the selected network and
//! reports its state.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tessera_core::constants::NetworkType;
use tessera_node_lib::{Node, NodeConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "tessera-node", version, about = "Tessera multi-asset ledger node")]
struct Args {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Network: mainnet, testnet or regtest
    #[arg(long, global = true)]
    network: Option<NetworkType>,

    /// Log filter (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database and connect the genesis block
    Init,
    /// Print the chain tip
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    Config,
}

impl Args {
    /// Config file and environment first, then command-line flags.
    fn resolve_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = NodeConfig::load(self.config.as_deref()).context("loading configuration")?;
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(network) = self.network {
            config.network = network;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if self.log_json {
            config.log_json = true;
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.resolve_config()?;
    init_logging(&config.log_level, config.log_json);

    match args.command {
        Command::Init => {
            let node = Node::open(config).context("opening node")?;
            let status = node.status()?;
            info!(network = ?status.network, genesis = %status.genesis_hash, "initialized");
            println!("{}", status.genesis_hash);
            node.shutdown()?;
        }
        Command::Status { json } => {
            let node = Node::open(config).context("opening node")?;
            let status = node.status()?;
            if json {
                let value = serde_json::json!({
                    "network": status.network,
                    "genesis": status.genesis_hash.to_string(),
                    "height": status.height,
                    "tip": status.tip_hash.to_string(),
                    "pool_size": status.pool_size,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("network:  {:?}", status.network);
                println!("height:   {}", status.height);
                println!("tip:      {}", status.tip_hash);
                println!("genesis:  {}", status.genesis_hash);
                println!("pool:     {}", status.pool_size);
            }
            node.shutdown()?;
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

/// Initialize the tracing subscriber. `RUST_LOG` overrides `level`.
fn init_logging(level: &str, json: bool) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
            .init();
    }
}
