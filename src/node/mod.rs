//! Kademlia node engine.

pub mod config;
mod inflight;
mod lookup;
mod rpc;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::thread;

use bytes::Bytes;
use tracing::{debug, info};

use crate::common::{Contact, Id, Message, MessageKind, RoutingTable};
use crate::error::PutError;
use crate::storage::{MemoryStorage, Storage};
use crate::transport::{MessageHandler, Transport};
use crate::{Error, Result};

pub use config::Config;
use inflight::InflightRequests;

#[derive(Debug)]
/// A Kademlia node.
///
/// A node owns its routing table, its pending calls and its [Storage], and
/// talks to the rest of the network through a [Transport] it is
/// [connected](Node::connect) to. Dropping the node disconnects it.
pub struct Node(Arc<NodeInner>);

#[derive(Debug)]
pub(crate) struct NodeInner {
    id: Id,
    config: Config,
    routing_table: Mutex<RoutingTable>,
    inflight: Mutex<InflightRequests>,
    storage: Box<dyn Storage>,
    attachment: RwLock<Option<Attachment>>,
}

#[derive(Debug, Clone)]
struct Attachment {
    transport: Arc<dyn Transport>,
    address: SocketAddr,
}

/// The handler a transport delivers to; holds the node weakly so that
/// transports never keep a dropped node alive.
struct Inbox(Weak<NodeInner>);

impl MessageHandler for Inbox {
    fn receive(&self, from: SocketAddr, message: Message) {
        if let Some(inner) = self.0.upgrade() {
            inner.receive(from, message);
        }
    }
}

impl Node {
    /// Create a detached node with a random Id and in-memory storage.
    pub fn new(config: Config) -> Self {
        NodeBuilder {
            config,
            ..Default::default()
        }
        .build()
    }

    pub fn builder() -> NodeBuilder {
        NodeBuilder::default()
    }

    // === Getters ===

    pub fn id(&self) -> &Id {
        &self.0.id
    }

    pub fn config(&self) -> &Config {
        &self.0.config
    }

    /// Returns the address this node is reachable at, if connected.
    pub fn address(&self) -> Option<SocketAddr> {
        self.0.attachment().map(|attachment| attachment.address)
    }

    /// Returns this node's contact info, if connected.
    pub fn contact(&self) -> Option<Contact> {
        self.address().map(|address| Contact::new(self.0.id, address))
    }

    pub fn is_connected(&self) -> bool {
        self.0.attachment().is_some()
    }

    /// Returns a snapshot of the routing table.
    pub fn routing_table(&self) -> RoutingTable {
        self.0.routing_table().clone()
    }

    pub fn storage(&self) -> &dyn Storage {
        self.0.storage.as_ref()
    }

    // === Public Methods ===

    /// Attach to `transport`, replacing any previous attachment.
    pub fn connect(&self, transport: Arc<dyn Transport>) -> Result<SocketAddr> {
        self.disconnect();

        let inbox = Arc::new(Inbox(Arc::downgrade(&self.0)));
        let address = transport.connect(inbox)?;

        *self.0.attachment_mut() = Some(Attachment { transport, address });

        info!(id = ?self.0.id, ?address, "Node connected");

        Ok(address)
    }

    /// Detach from the transport. In-flight calls run into their timeouts.
    pub fn disconnect(&self) {
        let attachment = self.0.attachment_mut().take();

        if let Some(Attachment { transport, address }) = attachment {
            transport.disconnect(address);

            debug!(id = ?self.0.id, ?address, "Node disconnected");
        }
    }

    /// Join the network through a known node, by looking up this node's own Id.
    ///
    /// Returns the contacts closest to this node that the lookup found.
    pub fn bootstrap(&self, seed_id: Id, seed_address: SocketAddr) -> Result<Vec<Contact>> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        self.0
            .routing_table()
            .refresh(Contact::new(seed_id, seed_address));

        let closest = self.0.lookup_nodes(self.0.id);

        info!(
            id = ?self.0.id,
            found = closest.len(),
            table_size = self.0.routing_table().size(),
            "Bootstrapped"
        );

        Ok(closest)
    }

    /// Store `value` at the nodes closest to the hash of `key`.
    ///
    /// Stores are sent to all of them at once, and this returns the key's Id
    /// as soon as the first one is acknowledged. The rest run to completion
    /// in the background.
    pub fn set(&self, key: &str, value: impl Into<Bytes>) -> Result<Id, PutError> {
        if !self.is_connected() {
            return Err(PutError::NotConnected);
        }

        let target = Id::from_key(key);
        let value: Bytes = value.into();

        let closest = self.0.lookup_nodes(target);

        if closest.is_empty() {
            return Err(PutError::NoClosestNodes);
        }

        let (sender, receiver) = flume::unbounded::<Contact>();

        for contact in closest {
            let inner = self.0.clone();
            let sender = sender.clone();
            let kind = MessageKind::Store {
                key: target,
                value: value.clone(),
            };

            let spawned = thread::Builder::new()
                .name("xorkad-store".to_string())
                .spawn(move || {
                    if let Some(reply) = inner.perform_rpc(contact, kind) {
                        if matches!(reply.kind, MessageKind::StoreReply) {
                            let _ = sender.send(contact);
                        }
                    }
                });

            if let Err(error) = spawned {
                debug!(?error, "Failed to spawn store thread");
            }
        }

        // Only the store threads hold senders now.
        drop(sender);

        match receiver.recv() {
            Ok(contact) => {
                debug!(?target, stored_at = ?contact.id, "Stored value");
                Ok(target)
            }
            Err(_) => Err(PutError::NoAcknowledgement),
        }
    }

    /// Find the value stored under `key`, locally first, then on the network.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let target = Id::from_key(key);

        if let Some(value) = self.0.storage.get(&target) {
            return Some(value);
        }

        self.0.lookup_value(target)
    }

    /// Returns the up to `k` nodes closest to `target` found on the network,
    /// sorted by distance to `target`.
    pub fn find_node(&self, target: Id) -> Vec<Contact> {
        self.0.lookup_nodes(target)
    }

    /// Same as [Node::find_node], named after the procedure it runs.
    pub fn lookup_nodes(&self, target: Id) -> Vec<Contact> {
        self.0.lookup_nodes(target)
    }

    /// Run an iterative value lookup for `target`, ignoring local storage.
    pub fn lookup_value(&self, target: Id) -> Option<Bytes> {
        self.0.lookup_value(target)
    }

    /// Returns `true` if `contact` answered a Ping before the request timeout.
    pub fn ping(&self, contact: Contact) -> bool {
        matches!(
            self.0.perform_rpc(contact, MessageKind::Ping),
            Some(Message {
                kind: MessageKind::PingReply,
                ..
            })
        )
    }

    /// Handle a message delivered by a transport.
    pub fn receive(&self, from: SocketAddr, message: Message) {
        self.0.receive(from, message)
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl NodeInner {
    fn routing_table(&self) -> MutexGuard<'_, RoutingTable> {
        lock(&self.routing_table)
    }

    fn inflight(&self) -> MutexGuard<'_, InflightRequests> {
        lock(&self.inflight)
    }

    fn attachment(&self) -> Option<Attachment> {
        self.attachment
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn attachment_mut(&self) -> std::sync::RwLockWriteGuard<'_, Option<Attachment>> {
        self.attachment
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
/// Builder for a [Node].
pub struct NodeBuilder {
    config: Config,
    id: Option<Id>,
    storage: Option<Box<dyn Storage>>,
}

impl NodeBuilder {
    /// Set the bucket size and replication factor.
    pub fn k(mut self, k: usize) -> Self {
        self.config.k = k;
        self
    }

    /// Set the lookup fan-out.
    pub fn alpha(mut self, alpha: usize) -> Self {
        self.config.alpha = alpha;
        self
    }

    pub fn request_timeout(mut self, request_timeout: std::time::Duration) -> Self {
        self.config.request_timeout = request_timeout;
        self
    }

    pub fn max_lookup_rounds(mut self, max_lookup_rounds: usize) -> Self {
        self.config.max_lookup_rounds = max_lookup_rounds;
        self
    }

    /// Use an explicit Id instead of a random one.
    pub fn id(mut self, id: Id) -> Self {
        self.id = Some(id);
        self
    }

    /// Keep stored values in `storage` instead of a [MemoryStorage].
    pub fn storage(mut self, storage: impl Storage + 'static) -> Self {
        self.storage = Some(Box::new(storage));
        self
    }

    pub fn build(self) -> Node {
        let id = self.id.unwrap_or_else(Id::random);

        Node(Arc::new(NodeInner {
            id,
            routing_table: Mutex::new(RoutingTable::new(id, self.config.bucket_size())),
            inflight: Mutex::new(InflightRequests::new()),
            storage: self
                .storage
                .unwrap_or_else(|| Box::new(MemoryStorage::new())),
            attachment: RwLock::new(None),
            config: self.config,
        }))
    }
}
