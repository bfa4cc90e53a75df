//! Binary entry point: parses the node's identity and config, opens its
//! chain store, optionally mines the genesis block, then serves RPCs until
//! interrupted.

use std::path::PathBuf;

use clap::Parser;
use tokio::signal;

use tipchain::config::Config;
use tipchain::network::server;
use tipchain::node::Node;

#[derive(Parser, Debug)]
#[command(name = "tipchain", about = "A small peer-to-peer proof-of-work ledger node")]
struct Args {
    /// This node's id within the configured roster.
    #[arg(long)]
    mid: String,

    /// Path to a TOML config file. Created with defaults on first run if absent.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Mine the genesis block before starting the RPC server.
    #[arg(long)]
    genesis: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) if path.exists() => Config::from_file(path)?,
        Some(path) => {
            let config = Config::new(args.mid.clone());
            config.to_file(path)?;
            config
        }
        None => Config::new(args.mid.clone()),
    };

    let listen_addr = config
        .roster
        .endpoint(&config.node.node_id)
        .unwrap_or("0.0.0.0:8333")
        .parse()?;

    let node = Node::open(config)?;

    if args.genesis {
        node.mine_genesis().await?;
    }
    node.announce_address().await.unwrap_or_else(|e| {
        log::warn!("failed to announce address to roster: {}", e);
    });

    let server_node = node.clone();
    let server_task = tokio::spawn(async move { server::run(server_node, listen_addr).await });

    log::info!("node {} running, press Ctrl+C to stop", node.node_id());
    signal::ctrl_c().await?;
    log::info!("shutdown signal received, exiting");
    server_task.abort();
    Ok(())
}
