//! Iterative lookups, converging on the nodes closest to a target.

use bytes::Bytes;
use tracing::{debug, warn};

use super::NodeInner;
use crate::common::{Contact, Id, Message, MessageKind};

#[derive(Debug)]
enum Found {
    Nodes(Vec<Contact>),
    Value(Bytes),
}

impl NodeInner {
    /// Returns the up to `k` contacts closest to `target` the network knows of.
    pub(crate) fn lookup_nodes(&self, target: Id) -> Vec<Contact> {
        match self.lookup(target, false) {
            Found::Nodes(closest) => closest,
            // Only value lookups stop on a value.
            Found::Value(_) => Vec::new(),
        }
    }

    /// Returns the first value stored at `target` that a lookup runs into.
    pub(crate) fn lookup_value(&self, target: Id) -> Option<Bytes> {
        match self.lookup(target, true) {
            Found::Value(value) => Some(value),
            Found::Nodes(_) => None,
        }
    }

    fn lookup(&self, target: Id, find_value: bool) -> Found {
        let k = self.config.bucket_size();
        let fan_out = self.config.fan_out();
        let closeness = Id::closeness(target);

        let mut closest = self.routing_table().find_closest(&target, fan_out);

        if closest.is_empty() {
            warn!(
                id = ?self.id,
                ?target,
                "No nodes found. Is this node connected to the network?"
            );
            return Found::Nodes(closest);
        }

        closest.sort_by(|a, b| closeness(&a.id, &b.id));
        let mut candidates = closest.clone();
        let mut rounds = 0;
        let mut converged = false;

        while rounds < self.config.max_lookup_rounds {
            rounds += 1;

            let kind = if find_value {
                MessageKind::FindValue { target }
            } else {
                MessageKind::FindNode { target }
            };

            // Send to every candidate before waiting on any of them.
            let calls: Vec<_> = candidates
                .iter()
                .filter_map(|candidate| self.request(*candidate, kind.clone()))
                .collect();

            let replies: Vec<Message> = calls
                .into_iter()
                .filter_map(|call| self.wait(call))
                .collect();

            let mut found = Vec::new();

            for reply in replies {
                if let Some(value) = reply.value() {
                    debug!(?target, rounds, from = ?reply.sender_id, "Found value");
                    return Found::Value(value.clone());
                }

                found.extend_from_slice(reply.contacts());
            }

            found.sort_by(|a, b| closeness(&a.id, &b.id));
            found.dedup();

            let best = closest[0].id;
            let closer: Vec<Contact> = found
                .into_iter()
                .take_while(|contact| closeness(&contact.id, &best).is_lt())
                .filter(|contact| contact.id != self.id)
                .collect();

            debug!(
                ?target,
                rounds,
                queried = candidates.len(),
                closer = closer.len(),
                "Lookup round"
            );

            if closer.is_empty() {
                converged = true;
                break;
            }

            candidates = closer.iter().take(fan_out).copied().collect();

            closest = closer.into_iter().chain(closest).take(k).collect();
        }

        if !converged {
            debug!(?target, rounds, "Lookup stopped at the round limit");
        }

        if find_value {
            Found::Nodes(Vec::new())
        } else {
            Found::Nodes(closest)
        }
    }
}
