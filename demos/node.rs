use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::time::Duration;

use clap::Parser;
use kadrpc::rpc::Config;
use kadrpc::Dht;
use tracing::{info, Level};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port to listen on, random if omitted
    #[arg(short, long)]
    port: Option<u16>,
    /// Addresses of nodes to bootstrap from
    #[arg(short, long)]
    bootstrap: Vec<SocketAddr>,
    /// File to save the node's state to regularly, and restart from if it exists
    #[arg(short, long)]
    state: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    let cli = Cli::parse();

    let config = Config {
        port: cli.port,
        state_path: cli.state.clone(),
        ..Default::default()
    };

    let dht = match cli.state.filter(|path| path.exists()) {
        Some(path) => Dht::from_state(path, config).expect("Failed to restore the node"),
        None => Dht::new(config).expect("Failed to bind the node"),
    };

    if !cli.bootstrap.is_empty() {
        let bootstrapped = dht.bootstrap(&cli.bootstrap).expect("Node was shutdown");

        info!(bootstrapped, "Bootstrapping done");

        let addresses = dht.inet_visible_addresses().expect("Node was shutdown");

        info!(?addresses, "Internet visible addresses");
    }

    let (tx_interrupted, rx_interrupted) = channel();

    ctrlc::set_handler(move || {
        let _ = tx_interrupted.send(());
    })
    .expect("Error setting Ctrl-C handler");

    println!("Node is running! Press Ctrl+C to stop.");

    while rx_interrupted
        .recv_timeout(Duration::from_secs(30))
        .is_err()
    {
        let info = dht.info().expect("Node was shutdown");

        info!(
            id = %info.id(),
            local_addr = ?info.local_addr(),
            routing_table_size = info.routing_table_size(),
            pending_requests = info.pending_requests(),
            "Node status"
        );
    }

    println!("Bootstrap nodes: {:?}", dht.to_bootstrap());
}
