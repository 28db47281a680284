//! Issuing requests, waiting for their replies, and answering requests.

use std::net::SocketAddr;
use std::time::Instant;

use flume::{Receiver, RecvTimeoutError};
use tracing::{debug, trace};

use super::NodeInner;
use crate::common::{Contact, FindValueResult, Message, MessageKind};
use crate::error::TransportError;

#[derive(Debug)]
/// A request that was sent and is waiting for its reply.
pub(crate) struct PendingCall {
    cookie: u32,
    to: Contact,
    receiver: Receiver<Message>,
    deadline: Instant,
}

impl NodeInner {
    /// Send a request to `to` and register it as pending.
    ///
    /// Returns `None` if the request could not be handed to the transport, in
    /// which case nothing stays registered.
    pub(crate) fn request(&self, to: Contact, kind: MessageKind) -> Option<PendingCall> {
        let Some(attachment) = self.attachment() else {
            debug!(?to, "Cannot send request, node is not connected");
            return None;
        };

        let (sender, receiver) = flume::bounded(1);
        let (cookie, pending) = {
            let mut inflight = self.inflight();
            let cookie = inflight.add(to, sender);
            (cookie, inflight.len())
        };

        let message = Message {
            sender_id: self.id,
            cookie,
            kind,
        };

        trace!(?to, ?message, pending, "Sending request");

        if let Err(error) = attachment
            .transport
            .send(attachment.address, to.address, message)
        {
            self.inflight().remove(cookie);

            debug!(?to, ?error, "Failed to send request");

            if matches!(error, TransportError::Unreachable(_)) {
                self.evict(&to);
            }

            return None;
        }

        Some(PendingCall {
            cookie,
            to,
            receiver,
            deadline: Instant::now() + self.config.request_timeout,
        })
    }

    /// Block until `call` is replied to, or until its deadline passes.
    ///
    /// A timed out call evicts its destination from the routing table.
    pub(crate) fn wait(&self, call: PendingCall) -> Option<Message> {
        let result = call.receiver.recv_deadline(call.deadline);

        self.inflight().remove(call.cookie);

        match result {
            Ok(reply) => Some(reply),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                // A reply may have landed between the deadline and the removal.
                if let Ok(reply) = call.receiver.try_recv() {
                    return Some(reply);
                }

                debug!(to = ?call.to, cookie = call.cookie, "Request timed out, evicting contact");
                self.evict(&call.to);

                None
            }
        }
    }

    /// Send a request to `to` and wait for its reply.
    pub(crate) fn perform_rpc(&self, to: Contact, kind: MessageKind) -> Option<Message> {
        let call = self.request(to, kind)?;
        self.wait(call)
    }

    /// Handle an incoming message: record the sender, then either settle the
    /// pending call it replies to, or answer it.
    pub(crate) fn receive(&self, from: SocketAddr, message: Message) {
        trace!(id = ?self.id, ?from, ?message, "Received message");

        self.routing_table()
            .refresh(Contact::new(message.sender_id, from));

        let message = if message.is_reply() {
            let resolved = self.inflight().resolve(message);

            match resolved {
                Ok(()) => return,
                Err(message) => message,
            }
        } else {
            message
        };

        self.handle_request(from, message);
    }

    fn handle_request(&self, from: SocketAddr, request: Message) {
        let kind = match &request.kind {
            MessageKind::Ping => MessageKind::PingReply,
            MessageKind::FindNode { target } => MessageKind::FindNodeReply {
                contacts: self.routing_table().find_closest(target, self.config.bucket_size()),
            },
            MessageKind::FindValue { target } => match self.storage.get(target) {
                Some(value) => MessageKind::FindValueReply(FindValueResult::Value(value)),
                None => MessageKind::FindValueReply(FindValueResult::Contacts(
                    self.routing_table().find_closest(target, self.config.bucket_size()),
                )),
            },
            MessageKind::Store { key, value } => {
                self.storage.set(*key, value.clone());

                trace!(id = ?self.id, ?key, "Stored value");

                MessageKind::StoreReply
            }
            MessageKind::PingReply
            | MessageKind::StoreReply
            | MessageKind::FindNodeReply { .. }
            | MessageKind::FindValueReply(_) => {
                debug!(
                    ?from,
                    cookie = request.cookie,
                    kind = request.kind.tag(),
                    "Unsolicited reply, possibly to a timed out request"
                );
                return;
            }
        };

        self.reply(from, &request, kind);
    }

    fn reply(&self, to: SocketAddr, request: &Message, kind: MessageKind) {
        let Some(attachment) = self.attachment() else {
            return;
        };

        let message = Message::reply(self.id, request, kind);

        trace!(?to, ?message, "Sending reply");

        if let Err(error) = attachment.transport.send(attachment.address, to, message) {
            debug!(?to, ?error, "Failed to send reply");
        }
    }

    /// Remove an unresponsive contact from the routing table.
    pub(crate) fn evict(&self, contact: &Contact) {
        self.routing_table().remove(contact);
    }
}
