//! UDP [Transport]: one socket per endpoint, one bencoded message per datagram.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, trace};

use super::{MessageHandler, Transport};
use crate::common::Message;
use crate::error::TransportError;
use crate::Error;

/// Largest UDP payload over IPv4.
const MAX_DATAGRAM: usize = 65_507;
/// How long the receiving thread blocks on an empty socket before checking
/// whether its endpoint was disconnected.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug)]
/// A [Transport] over UDP sockets bound to a single local IP.
pub struct UdpTransport {
    ip: IpAddr,
    endpoints: Mutex<HashMap<SocketAddr, Endpoint>>,
}

#[derive(Debug)]
struct Endpoint {
    socket: Arc<UdpSocket>,
    running: Arc<AtomicBool>,
}

impl UdpTransport {
    /// Create a transport binding its sockets to `ip` on random ports.
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            endpoints: Mutex::default(),
        }
    }

    fn endpoints(&self) -> std::sync::MutexGuard<'_, HashMap<SocketAddr, Endpoint>> {
        self.endpoints.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }
}

impl Transport for UdpTransport {
    fn connect(&self, handler: Arc<dyn MessageHandler>) -> Result<SocketAddr, TransportError> {
        let socket = UdpSocket::bind(SocketAddr::new(self.ip, 0))?;
        socket.set_read_timeout(Some(READ_TIMEOUT))?;

        let address = socket.local_addr()?;
        let socket = Arc::new(socket);
        let running = Arc::new(AtomicBool::new(true));

        let listener = socket.clone();
        let still_running = running.clone();

        thread::Builder::new()
            .name(format!("xorkad-udp-{}", address.port()))
            .spawn(move || listen(listener, still_running, handler))?;

        self.endpoints()
            .insert(address, Endpoint { socket, running });

        debug!(?address, "UDP endpoint listening");

        Ok(address)
    }

    fn send(
        &self,
        from: SocketAddr,
        to: SocketAddr,
        message: Message,
    ) -> Result<(), TransportError> {
        let socket = self
            .endpoints()
            .get(&from)
            .map(|endpoint| endpoint.socket.clone())
            .ok_or(TransportError::NotConnected)?;

        let bytes = message
            .to_bytes()
            .map_err(|error| std::io::Error::new(ErrorKind::InvalidData, error))?;

        socket.send_to(&bytes, to)?;

        Ok(())
    }

    fn disconnect(&self, address: SocketAddr) {
        if let Some(endpoint) = self.endpoints().remove(&address) {
            endpoint.running.store(false, Ordering::Relaxed);
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        for endpoint in self.endpoints().values() {
            endpoint.running.store(false, Ordering::Relaxed);
        }
    }
}

fn listen(socket: Arc<UdpSocket>, running: Arc<AtomicBool>, handler: Arc<dyn MessageHandler>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    while running.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buf) {
            Ok((amt, from)) => match Message::from_bytes(&buf[..amt]) {
                Ok(message) => handler.receive(from, message),
                Err(Error::UnrecognizedMessageKind(kind)) => {
                    error!(?from, ?kind, "Cannot handle message of unrecognized kind");
                }
                Err(error) => {
                    trace!(?from, ?error, "Failed to parse message");
                }
            },
            Err(error)
                if matches!(error.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(error) => {
                debug!(?error, "Error receiving on UDP socket");
            }
        }
    }

    trace!("UDP endpoint stopped");
}
