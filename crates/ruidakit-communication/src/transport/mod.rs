//! UDP transport for the Ruida action port
//!
//! Provides the packet layer every controller command goes through:
//! - swizzling with the controller's magic key
//! - chunking at the controller MTU with a checksum prefix per chunk
//! - ACK/NACK handling with bounded retries
//! - optional follow-on reply collection
//!
//! Sockets sit behind [`DatagramSocket`] and are created through a
//! [`SocketFactory`], so the transport can run against scripted sockets.

pub mod udp;

pub use udp::{RealSocketFactory, RealUdpSocket, UdpTransport};

use ruidakit_protocol::codec::DEFAULT_MAGIC;
use serde::{Deserialize, Serialize};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// Largest swizzled chunk sent in one datagram, before the checksum
pub const MTU: usize = 1470;

/// Controller action port
pub const DEFAULT_ACTION_PORT: u16 = 50200;

/// Local port the controller expects replies to go back to
pub const DEFAULT_SOURCE_PORT: u16 = 40200;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Retries per chunk after the first send
pub const MAX_RETRIES: u32 = 3;

/// Receive size for handshake bytes
pub(crate) const ACK_BUFFER: usize = 8;

/// Whether packets reach the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportMode {
    Live,
    /// Packets are logged instead of sent
    Offline,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Transport configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    /// Controller hostname or IP
    pub host: String,
    pub port: u16,
    pub source_port: u16,
    /// ACK and reply timeout
    pub timeout: Duration,
    /// Swizzle key
    pub magic: u8,
}

impl TransportConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.100".to_string(),
            port: DEFAULT_ACTION_PORT,
            source_port: DEFAULT_SOURCE_PORT,
            timeout: DEFAULT_TIMEOUT,
            magic: DEFAULT_MAGIC,
        }
    }
}

/// Low-level datagram socket
pub trait DatagramSocket: Send {
    /// Send one datagram
    fn send_to(&mut self, data: &[u8], target: SocketAddr) -> io::Result<usize>;

    /// Receive one datagram, waiting at most the configured timeout
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Set the receive timeout
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

/// Creates bound sockets
pub trait SocketFactory: Send {
    /// Bind a socket to a local port; 0 picks an ephemeral port
    fn bind(&self, port: u16) -> io::Result<Box<dyn DatagramSocket>>;
}

/// True for the error kinds a receive timeout surfaces as
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Bind `port`, falling back to an ephemeral port
///
/// Returns `None` when neither bind succeeds.
pub(crate) fn bind_with_fallback(
    factory: &dyn SocketFactory,
    port: u16,
    timeout: Duration,
    prefix: &str,
) -> Option<Box<dyn DatagramSocket>> {
    let mut socket = match factory.bind(port) {
        Ok(socket) => socket,
        Err(e) => {
            tracing::warn!(
                "{} Bind to source port {} failed ({}); falling back to an ephemeral port",
                prefix,
                port,
                e
            );
            match factory.bind(0) {
                Ok(socket) => socket,
                Err(e) => {
                    tracing::error!(
                        "{} Unable to bind UDP socket ({}); switching to offline mode",
                        prefix,
                        e
                    );
                    return None;
                }
            }
        }
    };
    if let Err(e) = socket.set_timeout(timeout) {
        tracing::warn!("{} Failed to set socket timeout: {}", prefix, e);
    }
    Some(socket)
}
