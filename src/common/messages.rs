//! Kademlia RPC messages and their wire encoding.

mod internal;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::Bytes;
use serde_bytes::ByteBuf;

use crate::common::{Contact, Id, ID_SIZE};
use crate::{Error, Result};

use internal::WireMessage;

#[derive(Debug, PartialEq, Clone)]
pub struct Message {
    /// Id of the node that sent this message.
    pub sender_id: Id,
    /// Random correlation token, minted by requests and echoed by replies.
    pub cookie: u32,
    pub kind: MessageKind,
}

#[derive(Debug, PartialEq, Clone)]
pub enum MessageKind {
    Ping,
    PingReply,
    Store { key: Id, value: Bytes },
    StoreReply,
    FindNode { target: Id },
    FindNodeReply { contacts: Vec<Contact> },
    FindValue { target: Id },
    FindValueReply(FindValueResult),
}

#[derive(Debug, PartialEq, Clone)]
/// Either the value stored at a key, or the contacts closest to it.
pub enum FindValueResult {
    Value(Bytes),
    Contacts(Vec<Contact>),
}

impl MessageKind {
    /// Returns `true` for the four reply kinds.
    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            MessageKind::PingReply
                | MessageKind::StoreReply
                | MessageKind::FindNodeReply { .. }
                | MessageKind::FindValueReply(_)
        )
    }

    /// The explicit kind tag used on the wire.
    pub fn tag(&self) -> &'static str {
        match self {
            MessageKind::Ping => "ping",
            MessageKind::PingReply => "ping_r",
            MessageKind::Store { .. } => "store",
            MessageKind::StoreReply => "store_r",
            MessageKind::FindNode { .. } => "find_node",
            MessageKind::FindNodeReply { .. } => "find_node_r",
            MessageKind::FindValue { .. } => "find_value",
            MessageKind::FindValueReply(_) => "find_value_r",
        }
    }
}

impl Message {
    /// Create a new request with a fresh random cookie.
    pub fn request(sender_id: Id, kind: MessageKind) -> Message {
        Message {
            sender_id,
            cookie: rand::random(),
            kind,
        }
    }

    /// Create a reply to `request`, echoing its cookie.
    pub fn reply(sender_id: Id, request: &Message, kind: MessageKind) -> Message {
        Message {
            sender_id,
            cookie: request.cookie,
            kind,
        }
    }

    pub fn is_reply(&self) -> bool {
        self.kind.is_reply()
    }

    /// Returns the contacts carried by a FindNode or FindValue reply, if any.
    pub fn contacts(&self) -> &[Contact] {
        match &self.kind {
            MessageKind::FindNodeReply { contacts }
            | MessageKind::FindValueReply(FindValueResult::Contacts(contacts)) => contacts,
            _ => &[],
        }
    }

    /// Returns the value carried by a FindValue reply, if any.
    pub fn value(&self) -> Option<&Bytes> {
        match &self.kind {
            MessageKind::FindValueReply(FindValueResult::Value(value)) => Some(value),
            _ => None,
        }
    }

    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Message> {
        Message::from_wire(WireMessage::from_bytes(bytes.as_ref())?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.to_wire().to_bytes().map_err(Error::BencodeError)
    }

    fn to_wire(&self) -> WireMessage {
        let mut wire = WireMessage {
            kind: self.kind.tag().to_string(),
            cookie: self.cookie,
            origin: ByteBuf::from(self.sender_id.to_vec()),
            key: None,
            value: None,
            nodes: None,
        };

        match &self.kind {
            MessageKind::Ping | MessageKind::PingReply | MessageKind::StoreReply => {}
            MessageKind::Store { key, value } => {
                wire.key = Some(ByteBuf::from(key.to_vec()));
                wire.value = Some(ByteBuf::from(value.to_vec()));
            }
            MessageKind::FindNode { target } | MessageKind::FindValue { target } => {
                wire.key = Some(ByteBuf::from(target.to_vec()));
            }
            MessageKind::FindNodeReply { contacts }
            | MessageKind::FindValueReply(FindValueResult::Contacts(contacts)) => {
                wire.nodes = Some(contacts.iter().map(contact_to_bytes).collect());
            }
            MessageKind::FindValueReply(FindValueResult::Value(value)) => {
                wire.value = Some(ByteBuf::from(value.to_vec()));
            }
        }

        wire
    }

    fn from_wire(wire: WireMessage) -> Result<Message> {
        let key = || -> Result<Id> {
            let key = wire.key.as_ref().ok_or(Error::InvalidMessage("missing key"))?;
            Id::from_bytes(key)
        };
        let value = || -> Result<Bytes> {
            let value = wire
                .value
                .as_ref()
                .ok_or(Error::InvalidMessage("missing value"))?;
            Ok(Bytes::copy_from_slice(value))
        };
        let contacts = || -> Result<Vec<Contact>> {
            wire.nodes
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(|bytes| contact_from_bytes(bytes))
                .collect()
        };

        let kind = match wire.kind.as_str() {
            "ping" => MessageKind::Ping,
            "ping_r" => MessageKind::PingReply,
            "store" => MessageKind::Store {
                key: key()?,
                value: value()?,
            },
            "store_r" => MessageKind::StoreReply,
            "find_node" => MessageKind::FindNode { target: key()? },
            "find_node_r" => MessageKind::FindNodeReply {
                contacts: contacts()?,
            },
            "find_value" => MessageKind::FindValue { target: key()? },
            "find_value_r" => match (&wire.value, &wire.nodes) {
                (Some(_), None) => MessageKind::FindValueReply(FindValueResult::Value(value()?)),
                (None, _) => MessageKind::FindValueReply(FindValueResult::Contacts(contacts()?)),
                (Some(_), Some(_)) => {
                    return Err(Error::InvalidMessage(
                        "find_value reply carries both a value and nodes",
                    ))
                }
            },
            other => return Err(Error::UnrecognizedMessageKind(other.to_string())),
        };

        Ok(Message {
            sender_id: Id::from_bytes(&wire.origin)?,
            cookie: wire.cookie,
            kind,
        })
    }
}

/// Compact contact info: 20 bytes Id, followed by 4 or 16 bytes IP, and 2 bytes port.
fn contact_to_bytes(contact: &Contact) -> ByteBuf {
    let mut bytes = contact.id.to_vec();

    match contact.address.ip() {
        IpAddr::V4(ip) => bytes.extend_from_slice(&ip.octets()),
        IpAddr::V6(ip) => bytes.extend_from_slice(&ip.octets()),
    }
    bytes.extend_from_slice(&contact.address.port().to_be_bytes());

    ByteBuf::from(bytes)
}

fn contact_from_bytes(bytes: &[u8]) -> Result<Contact> {
    let (id, rest) = bytes.split_at(ID_SIZE.min(bytes.len()));
    let id = Id::from_bytes(id)?;

    let ip: IpAddr = match rest.len() {
        6 => {
            let octets: [u8; 4] = rest[..4].try_into().map_err(|_| Error::InvalidContact)?;
            Ipv4Addr::from(octets).into()
        }
        18 => {
            let octets: [u8; 16] = rest[..16].try_into().map_err(|_| Error::InvalidContact)?;
            Ipv6Addr::from(octets).into()
        }
        _ => return Err(Error::InvalidContact),
    };
    let port = u16::from_be_bytes([rest[rest.len() - 2], rest[rest.len() - 1]]);

    Ok(Contact::new(id, SocketAddr::new(ip, port)))
}
