//! Runs a simulated network of nodes in one process, stores values, optionally
//! knocks out replica holders, and reads a value back.
//!
//! Run: `cargo run --example simulation -- --nodes 100 --fail`

use std::time::{Duration, Instant};

use clap::Parser;
use rand::seq::SliceRandom;
use tracing::Level;
use xorkad::{Config, Id, Testnet};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of nodes in the network.
    #[arg(long, default_value_t = 50)]
    nodes: usize,
    /// Bucket size and replication factor.
    #[arg(short, long, default_value_t = 20)]
    k: usize,
    /// Lookup fan-out.
    #[arg(short, long, default_value_t = 3)]
    alpha: usize,
    /// Request timeout in milliseconds.
    #[arg(long, default_value_t = 1000)]
    timeout: u64,
    /// Number of keys to store.
    #[arg(long, default_value_t = 100)]
    keys: usize,
    /// Disconnect K-1 nodes holding the first key before reading it back.
    #[arg(long)]
    fail: bool,
    /// Log debug output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .init();

    let config = Config {
        k: cli.k,
        alpha: cli.alpha,
        request_timeout: Duration::from_millis(cli.timeout),
        ..Default::default()
    };

    println!("Bootstrapping {} nodes...", cli.nodes);
    let start = Instant::now();
    let testnet = Testnet::with_config(cli.nodes, config).expect("failed to create testnet");
    println!("Bootstrapped in {:?}", start.elapsed());

    let mut rng = rand::thread_rng();

    let start = Instant::now();
    for i in 0..cli.keys {
        let node = testnet.nodes.choose(&mut rng).expect("no nodes");

        node.set(&format!("{i}:name"), format!("Andrew the {i}th"))
            .expect("set failed");
        node.set(&format!("{i}:age"), format!("{}", 20 + i % 60))
            .expect("set failed");
    }
    println!("Stored {} values in {:?}", cli.keys * 2, start.elapsed());

    // Let the stores that did not win the race settle.
    std::thread::sleep(Duration::from_millis(cli.timeout));

    let key = "1:name";
    let target = Id::from_key(key);

    if cli.fail {
        let mut holders: Vec<_> = testnet
            .nodes
            .iter()
            .filter(|node| node.storage().get(&target).is_some())
            .collect();
        holders.shuffle(&mut rng);

        let knocked_out = holders.len().min(cli.k.saturating_sub(1));
        for node in holders.iter().take(knocked_out) {
            node.disconnect();
        }

        println!(
            "Disconnected {knocked_out} of the {} nodes holding {key:?}",
            holders.len()
        );
    }

    let reader = testnet
        .nodes
        .iter()
        .filter(|node| node.is_connected())
        .find(|node| node.storage().get(&target).is_none())
        .or_else(|| testnet.closest_connected(&target))
        .expect("no connected node left");

    let start = Instant::now();
    let value = reader.get(key);
    println!(
        "Got {key:?} = {:?} from {} in {:?}",
        value.map(|value| String::from_utf8_lossy(&value).to_string()),
        reader.id(),
        start.elapsed()
    );
}
