//! Main Crate Error

use std::net::SocketAddr;

#[derive(thiserror::Error, Debug)]
/// Xorkad crate error enum.
pub enum Error {
    #[error(transparent)]
    /// Transparent [std::io::Error]
    IO(#[from] std::io::Error),

    #[error("Failed to parse packet bytes: {0}")]
    BencodeError(#[from] serde_bencode::Error),

    /// Id is not exactly [crate::common::ID_SIZE] bytes.
    #[error("Invalid Id size, expected 20, got {0}")]
    InvalidIdSize(usize),

    /// Id string is not 40 hex characters.
    #[error("Invalid Id encoding: {0}")]
    InvalidIdEncoding(String),

    /// Compact contact info is neither 26 nor 38 bytes, or carries an invalid Id.
    #[error("Invalid compact contact info")]
    InvalidContact,

    /// The message kind tag is not one of the eight known kinds.
    #[error("Unrecognized message kind: {0}")]
    UnrecognizedMessageKind(String),

    /// The message is missing a field its kind requires, or is otherwise malformed.
    #[error("Invalid message: {0}")]
    InvalidMessage(&'static str),

    /// The node is not attached to any transport.
    #[error("Node is not connected to a network")]
    NotConnected,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(thiserror::Error, Debug)]
/// Errors reported by a [crate::transport::Transport].
pub enum TransportError {
    /// No endpoint is listening at that address.
    #[error("No route to address: {0}")]
    Unreachable(SocketAddr),

    /// The sending endpoint is not (or no longer) connected.
    #[error("Endpoint is not connected")]
    NotConnected,

    #[error(transparent)]
    /// Transparent [std::io::Error]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Errors that can occur while storing a value with [crate::Node::set].
pub enum PutError {
    /// The lookup did not find any node to store the value at.
    #[error("No nodes found close to the key, is this node connected to the network?")]
    NoClosestNodes,

    /// Every Store request timed out.
    #[error("No node acknowledged the Store request")]
    NoAcknowledgement,

    /// The node is not attached to any transport.
    #[error("Node is not connected to a network")]
    NotConnected,
}
