//! Local network of nodes for tests and simulations.

use std::sync::Arc;

use tracing::debug;

use crate::common::Id;
use crate::node::{Config, Node};
use crate::transport::MemoryNetwork;
use crate::Result;

#[derive(Debug)]
/// Create a testnet of Kademlia nodes on a [MemoryNetwork], each bootstrapped
/// against the one created before it.
pub struct Testnet {
    pub network: MemoryNetwork,
    pub nodes: Vec<Node>,
}

impl Testnet {
    pub fn new(count: usize) -> Result<Testnet> {
        Testnet::with_config(count, Config::default())
    }

    pub fn with_config(count: usize, config: Config) -> Result<Testnet> {
        let network = MemoryNetwork::new();
        let mut nodes: Vec<Node> = Vec::with_capacity(count);

        for i in 0..count {
            let node = Node::new(config.clone());
            node.connect(Arc::new(network.clone()))?;

            if let Some(seed) = nodes.last() {
                if let Some(address) = seed.address() {
                    node.bootstrap(*seed.id(), address)?;
                }
            }

            debug!(i, id = ?node.id(), "Added testnet node");

            nodes.push(node);
        }

        Ok(Testnet { network, nodes })
    }

    /// Returns the live node closest to `target`, if any.
    pub fn closest_connected(&self, target: &Id) -> Option<&Node> {
        let closeness = Id::closeness(*target);

        self.nodes
            .iter()
            .filter(|node| node.is_connected())
            .min_by(|a, b| closeness(a.id(), b.id()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn chain_bootstrap() {
        let testnet = Testnet::new(5).unwrap();

        assert_eq!(testnet.nodes.len(), 5);
        assert_eq!(testnet.network.len(), 5);
        assert!(testnet.nodes[0].routing_table().size() >= 1);
        assert!(testnet
            .nodes
            .iter()
            .skip(1)
            .all(|node| !node.routing_table().is_empty()));
    }
}
