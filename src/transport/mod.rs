//! Transport capabilities a [crate::Node] is composed with.
//!
//! A transport delivers [Message]s between endpoints at most once and in no
//! particular order. Each connected endpoint registers a [MessageHandler]
//! that incoming messages are handed to, along with the sender's address.

pub mod memory;
pub mod udp;

use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::common::Message;
use crate::error::TransportError;

pub use memory::MemoryNetwork;
pub use udp::UdpTransport;

/// Receives every message delivered to an endpoint.
pub trait MessageHandler: Send + Sync {
    fn receive(&self, from: SocketAddr, message: Message);
}

pub trait Transport: Debug + Send + Sync {
    /// Register a new endpoint delivering to `handler`, and return its address.
    fn connect(&self, handler: Arc<dyn MessageHandler>) -> Result<SocketAddr, TransportError>;

    /// Send `message` from the endpoint at `from` to the address `to`.
    ///
    /// Success means the message was handed over, not that it was delivered.
    fn send(&self, from: SocketAddr, to: SocketAddr, message: Message)
        -> Result<(), TransportError>;

    /// Stop delivering to the endpoint at `address`.
    fn disconnect(&self, address: SocketAddr);
}
