#![doc = include_str!("../README.md")]

// Public modules
mod common;
mod error;

pub mod node;
pub mod storage;
pub mod testnet;
pub mod transport;

pub use crate::common::{
    messages, Bucket, BucketId, Contact, FindValueResult, Id, Message, MessageKind,
    RoutingTable, DEFAULT_BUCKET_SIZE_K, ID_BITS, ID_SIZE,
};
pub use bytes::Bytes;
pub use error::{Error, PutError, TransportError};
pub use node::{Config, Node, NodeBuilder};
pub use testnet::Testnet;

pub type Result<T, E = Error> = std::result::Result<T, E>;
