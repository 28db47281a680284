//! Registry of requests awaiting a reply, keyed by cookie.

use std::collections::HashMap;
use std::time::Instant;

use flume::Sender;
use tracing::trace;

use crate::common::{Contact, Message};

#[derive(Debug)]
pub(crate) struct InflightRequest {
    pub to: Contact,
    sender: Sender<Message>,
    sent_at: Instant,
}

#[derive(Debug, Default)]
/// Pending calls of a single node.
///
/// A record is added when a request is issued and removed exactly once, by
/// whichever settles first: [InflightRequests::resolve] on a matching reply,
/// or the waiting caller on timeout.
pub(crate) struct InflightRequests {
    requests: HashMap<u32, InflightRequest>,
}

impl InflightRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call to `to` and return its freshly minted cookie.
    pub fn add(&mut self, to: Contact, sender: Sender<Message>) -> u32 {
        let mut cookie: u32 = rand::random();
        while self.requests.contains_key(&cookie) {
            cookie = rand::random();
        }

        self.requests.insert(
            cookie,
            InflightRequest {
                to,
                sender,
                sent_at: Instant::now(),
            },
        );

        cookie
    }

    pub fn remove(&mut self, cookie: u32) -> Option<InflightRequest> {
        self.requests.remove(&cookie)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Settle the call `message` replies to, handing the message to its waiter.
    ///
    /// Returns the message back if no call is pending under its cookie.
    pub fn resolve(&mut self, message: Message) -> Result<(), Message> {
        let Some(request) = self.requests.remove(&message.cookie) else {
            return Err(message);
        };

        trace!(
            to = ?request.to.id,
            cookie = message.cookie,
            rtt = ?request.sent_at.elapsed(),
            "Resolved inflight request"
        );

        // The waiter may have given up already.
        let _ = request.sender.send(message);

        Ok(())
    }
}
