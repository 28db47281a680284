//! Struct and implementation of the Contact entry in the Kademlia routing table
use std::fmt::{self, Display, Formatter};
use std::net::SocketAddr;

use crate::common::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// A known peer: its [Id] and the transport address it was last seen at.
pub struct Contact {
    pub id: Id,
    pub address: SocketAddr,
}

impl Contact {
    /// Creates a new Contact from an id and socket address.
    pub fn new(id: Id, address: SocketAddr) -> Contact {
        Contact { id, address }
    }

    /// Creates a contact with a random Id and an address derived from `i`.
    #[cfg(test)]
    pub(crate) fn unique(i: usize) -> Contact {
        Contact::new(
            Id::random(),
            SocketAddr::from(([127, 0, 0, 1], (i % u16::MAX as usize) as u16)),
        )
    }
}

impl Display for Contact {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<{}, {}>", self.id, self.address)
    }
}
