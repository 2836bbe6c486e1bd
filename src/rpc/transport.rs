//! Datagram transports the [super::Rpc] engine sends and receives on.

use std::collections::HashMap;
use std::fmt::Debug;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flume::{Receiver, Sender};
use tracing::{trace, warn};

/// Largest UDP payload, the size of the receive buffer.
pub const MAX_UDP_PAYLOAD: usize = 65535;

/// Largest datagram we send: the largest UDP payload that fits in an IPv4 packet.
pub const MAX_DATAGRAM_SIZE: usize = 65507;

/// The maximum duration to block on the socket waiting for a datagram.
///
/// Lower values increase CPU usage, but reduce the latency of serving actor messages.
pub const MAX_THREAD_BLOCK_DURATION: Duration = Duration::from_millis(10);

/// Unreliable datagram delivery.
pub trait Transport: Debug + Send {
    /// Address this transport receives datagrams on.
    fn local_addr(&self) -> SocketAddr;

    /// Send one datagram, without any delivery guarantee.
    fn send(&mut self, to: SocketAddr, bytes: &[u8]) -> io::Result<()>;

    /// Receive one datagram if any arrives soon, returning its bytes and origin.
    fn recv(&mut self) -> Option<(Vec<u8>, SocketAddr)>;
}

#[derive(Debug)]
/// [Transport] over a [UdpSocket].
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    buf: Box<[u8]>,
}

impl UdpTransport {
    pub fn bind(address: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(address)?;
        socket.set_read_timeout(Some(MAX_THREAD_BLOCK_DURATION))?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            buf: vec![0; MAX_UDP_PAYLOAD].into_boxed_slice(),
        })
    }
}

impl Transport for UdpTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn send(&mut self, to: SocketAddr, bytes: &[u8]) -> io::Result<()> {
        check_size(bytes)?;

        self.socket.send_to(bytes, to)?;

        Ok(())
    }

    fn recv(&mut self) -> Option<(Vec<u8>, SocketAddr)> {
        match self.socket.recv_from(&mut self.buf) {
            Ok((amt, from)) => Some((self.buf[..amt].to_vec(), from)),
            Err(error) => match error.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => None,
                _ => {
                    warn!(?error, "IO error");
                    None
                }
            },
        }
    }
}

fn check_size(bytes: &[u8]) -> io::Result<()> {
    if bytes.len() > MAX_DATAGRAM_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("datagram of {} bytes is too large", bytes.len()),
        ));
    }

    Ok(())
}

type Datagram = (Vec<u8>, SocketAddr);

#[derive(Debug, Clone, Default)]
/// In process network of [MemoryTransport]s, useful for deterministic tests.
///
/// Datagrams to addresses nobody is bound to are silently lost.
pub struct MemoryNetwork {
    endpoints: Arc<Mutex<HashMap<SocketAddr, Sender<Datagram>>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new transport receiving on `address`, replacing any previous one.
    pub fn bind(&self, address: SocketAddr) -> MemoryTransport {
        let (sender, receiver) = flume::unbounded();

        if let Ok(mut endpoints) = self.endpoints.lock() {
            endpoints.insert(address, sender.clone());
        }

        MemoryTransport {
            network: self.clone(),
            local_addr: address,
            sender,
            receiver,
        }
    }

    fn deliver(&self, from: SocketAddr, to: SocketAddr, bytes: &[u8]) {
        let endpoints = match self.endpoints.lock() {
            Ok(endpoints) => endpoints,
            Err(_) => return,
        };

        match endpoints.get(&to) {
            Some(sender) => {
                let _ = sender.send((bytes.to_vec(), from));
            }
            None => {
                trace!(?from, ?to, "Datagram sent to the void");
            }
        }
    }
}

#[derive(Debug)]
/// [Transport] attached to a [MemoryNetwork].
pub struct MemoryTransport {
    network: MemoryNetwork,
    local_addr: SocketAddr,
    sender: Sender<Datagram>,
    receiver: Receiver<Datagram>,
}

impl MemoryTransport {
    /// Number of datagrams waiting to be received.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

impl Transport for MemoryTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn send(&mut self, to: SocketAddr, bytes: &[u8]) -> io::Result<()> {
        check_size(bytes)?;

        self.network.deliver(self.local_addr, to, bytes);

        Ok(())
    }

    fn recv(&mut self) -> Option<(Vec<u8>, SocketAddr)> {
        if let Ok(datagram) = self.receiver.try_recv() {
            return Some(datagram);
        }

        self.receiver.recv_timeout(MAX_THREAD_BLOCK_DURATION).ok()
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        if let Ok(mut endpoints) = self.network.endpoints.lock() {
            // Only detach if nobody rebound the address since.
            if endpoints
                .get(&self.local_addr)
                .is_some_and(|sender| sender.same_channel(&self.sender))
            {
                endpoints.remove(&self.local_addr);
            }
        }
    }
}
