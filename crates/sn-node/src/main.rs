use clap::Parser;
use sn_chain::Chain;
use sn_node::{Node, NodeConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Stakenet validator node daemon.
#[derive(Parser, Debug)]
#[command(
    name = "sn-node",
    version,
    about = "Stakenet P2P validator node",
    long_about = "Runs a stakenet validator node that gossips with its seed \
                  peers, votes on candidate transactions, and maintains the \
                  replicated ledger."
)]
struct Cli {
    /// TCP port for the WebSocket listener.
    #[arg(short, long, default_value_t = 7411, env = "SN_PORT")]
    port: u16,

    /// Hex-encoded secp256k1 private key identifying this node.
    #[arg(long, env = "SN_PRIVATE_KEY", hide_env_values = true)]
    private_key: String,

    /// Seed peers as ws:// URLs (comma-separated).
    #[arg(long, env = "SN_PEERS", value_delimiter = ',', num_args = 0..)]
    peers: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sn_node=info".parse()?))
        .init();

    info!(
        port = cli.port,
        peers = cli.peers.len(),
        "Starting stakenet node"
    );

    let config = NodeConfig {
        port: cli.port,
        peers: cli.peers,
        private_key: cli.private_key,
        chain: Chain::new(),
    };
    let (mut node, mut events) = Node::new(config)?;

    info!("Node key: {}", node.public_key());

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!("NodeEvent: {event:?}");
        }
    });

    node.start().await?;
    Ok(())
}
