//! In-process [Transport], for simulations and tests.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use flume::Sender;
use rand::Rng;
use tracing::{debug, trace};

use super::{MessageHandler, Transport};
use crate::common::Message;
use crate::error::TransportError;

const FIRST_PORT: u16 = 1;

#[derive(Debug, Clone, Default)]
/// A simulated network delivering messages between endpoints of the same process.
///
/// Every endpoint gets its own delivery thread, so handlers never run on the
/// sender's thread. Messages to unknown addresses fail with
/// [TransportError::Unreachable].
pub struct MemoryNetwork(Arc<Inner>);

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<State>,
    /// Probability in `[0, 1]` that any given message is silently lost.
    drop_rate: f64,
}

#[derive(Debug, Default)]
struct State {
    next_port: u16,
    endpoints: HashMap<SocketAddr, Sender<(SocketAddr, Message)>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a network that loses each message with probability `drop_rate`.
    pub fn with_drop_rate(drop_rate: f64) -> Self {
        MemoryNetwork(Arc::new(Inner {
            state: Mutex::default(),
            drop_rate: drop_rate.clamp(0.0, 1.0),
        }))
    }

    /// Number of connected endpoints.
    pub fn len(&self) -> usize {
        self.state().endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.0.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for MemoryNetwork {
    fn connect(&self, handler: Arc<dyn MessageHandler>) -> Result<SocketAddr, TransportError> {
        let (sender, receiver) = flume::unbounded::<(SocketAddr, Message)>();

        let address = {
            let mut state = self.state();
            let port = state.next_port.max(FIRST_PORT);
            state.next_port = port.wrapping_add(1);

            let address = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
            state.endpoints.insert(address, sender);
            address
        };

        let spawned = thread::Builder::new()
            .name(format!("xorkad-memory-{}", address.port()))
            .spawn(move || {
                // Ends once the endpoint is disconnected and its queue drained.
                while let Ok((from, message)) = receiver.recv() {
                    handler.receive(from, message);
                }
            });

        if let Err(error) = spawned {
            self.state().endpoints.remove(&address);
            return Err(error.into());
        }

        trace!(?address, "Joined memory network");

        Ok(address)
    }

    fn send(
        &self,
        from: SocketAddr,
        to: SocketAddr,
        message: Message,
    ) -> Result<(), TransportError> {
        let destination = {
            let state = self.state();

            if !state.endpoints.contains_key(&from) {
                return Err(TransportError::NotConnected);
            }

            state
                .endpoints
                .get(&to)
                .cloned()
                .ok_or(TransportError::Unreachable(to))?
        };

        if self.0.drop_rate > 0.0 && rand::thread_rng().gen_bool(self.0.drop_rate) {
            trace!(?from, ?to, ?message, "Dropped message");
            return Ok(());
        }

        if destination.send((from, message)).is_err() {
            debug!(?to, "Endpoint left while sending");
        }

        Ok(())
    }

    fn disconnect(&self, address: SocketAddr) {
        self.state().endpoints.remove(&address);

        trace!(?address, "Left memory network");
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use flume::Receiver;

    use super::*;
    use crate::common::{Id, MessageKind};

    struct Forward(Sender<(SocketAddr, Message)>);

    impl MessageHandler for Forward {
        fn receive(&self, from: SocketAddr, message: Message) {
            let _ = self.0.send((from, message));
        }
    }

    fn endpoint(network: &MemoryNetwork) -> (SocketAddr, Receiver<(SocketAddr, Message)>) {
        let (sender, receiver) = flume::unbounded();
        let address = network.connect(Arc::new(Forward(sender))).unwrap();

        (address, receiver)
    }

    #[test]
    fn deliver_with_source_address() {
        let network = MemoryNetwork::new();
        let (a, _) = endpoint(&network);
        let (b, inbox) = endpoint(&network);
        assert_ne!(a, b);

        let message = Message::request(Id::random(), MessageKind::Ping);
        network.send(a, b, message.clone()).unwrap();

        let (from, received) = inbox.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(from, a);
        assert_eq!(received, message);
    }

    #[test]
    fn unreachable_after_disconnect() {
        let network = MemoryNetwork::new();
        let (a, _) = endpoint(&network);
        let (b, _) = endpoint(&network);

        network.disconnect(b);
        assert_eq!(network.len(), 1);

        let message = Message::request(Id::random(), MessageKind::Ping);
        assert!(matches!(
            network.send(a, b, message.clone()),
            Err(TransportError::Unreachable(address)) if address == b
        ));
        assert!(matches!(
            network.send(b, a, message),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn lossy_network_drops_everything() {
        let network = MemoryNetwork::with_drop_rate(1.0);
        let (a, _) = endpoint(&network);
        let (b, inbox) = endpoint(&network);

        network
            .send(a, b, Message::request(Id::random(), MessageKind::Ping))
            .unwrap();

        assert!(inbox.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
