//! End to end behaviour of a simulated network.
//!
//! Run with: cargo test --test dht

use std::collections::HashSet;
use std::time::Duration;

use xorkad::{Bytes, Config, Id, Testnet};

fn short_timeout(k: usize) -> Config {
    Config {
        k,
        request_timeout: Duration::from_millis(250),
        ..Default::default()
    }
}

#[test]
fn set_and_get_from_every_node() {
    let testnet = Testnet::new(20).unwrap();

    testnet.nodes[0]
        .set("1:name", "Andrew the 1th")
        .expect("set failed");

    for (i, node) in testnet.nodes.iter().enumerate() {
        assert_eq!(
            node.get("1:name"),
            Some(Bytes::from_static(b"Andrew the 1th")),
            "node {i} could not get the value"
        );
    }
}

#[test]
fn lookups_return_network_members() {
    let testnet = Testnet::with_config(30, short_timeout(8)).unwrap();
    let members: HashSet<Id> = testnet.nodes.iter().map(|node| *node.id()).collect();

    for node in testnet.nodes.iter().step_by(5) {
        let target = Id::random();
        let found = node.find_node(target);

        assert!(!found.is_empty());
        assert!(found.len() <= 8);
        assert!(found.iter().all(|contact| members.contains(&contact.id)));
        assert!(found.iter().all(|contact| contact.id != *node.id()));

        let unique: HashSet<Id> = found.iter().map(|contact| contact.id).collect();
        assert_eq!(unique.len(), found.len());
    }
}

#[test]
fn values_survive_k_minus_one_failures() {
    const K: usize = 5;

    let testnet = Testnet::with_config(30, short_timeout(K)).unwrap();
    let key = "1:name";
    let target = Id::from_key(key);

    testnet.nodes[0]
        .set(key, "Andrew the 1th")
        .expect("set failed");

    // Stores that lost the race to the first acknowledgement are still running.
    std::thread::sleep(Duration::from_millis(500));

    let closeness = Id::closeness(target);
    let mut holders: Vec<_> = testnet
        .nodes
        .iter()
        .filter(|node| node.storage().get(&target).is_some())
        .collect();
    holders.sort_by(|a, b| closeness(a.id(), b.id()));

    assert!(!holders.is_empty());
    assert!(holders.len() <= K);

    let survivor = holders[0];
    for node in &holders[1..] {
        node.disconnect();
    }

    assert_eq!(
        survivor.get(key),
        Some(Bytes::from_static(b"Andrew the 1th"))
    );

    let mut readers: Vec<_> = testnet
        .nodes
        .iter()
        .filter(|node| node.is_connected() && node.storage().get(&target).is_none())
        .collect();
    readers.sort_by(|a, b| closeness(a.id(), b.id()));
    let reader = readers[0];

    // Each failed attempt evicts the dead holders it ran into.
    let value = (0..3).find_map(|_| reader.get(key));

    assert_eq!(value, Some(Bytes::from_static(b"Andrew the 1th")));
}

#[test]
fn set_and_get_with_small_buckets() {
    let testnet = Testnet::with_config(15, short_timeout(10)).unwrap();

    testnet.nodes[3].set("2:name", "Andrew the 2th").unwrap();

    let found = testnet.nodes[10].get("2:name");

    assert_eq!(found, Some(Bytes::from_static(b"Andrew the 2th")));
}
