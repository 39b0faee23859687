//! UDP socket and the action-port client

use super::{
    bind_with_fallback, is_timeout, DatagramSocket, SocketFactory, TransportConfig,
    TransportMode, ACK_BUFFER, MAX_RETRIES, MTU,
};
use ruidakit_core::{Error, Result, TransportError};
use ruidakit_protocol::codec::{checksum, hex_string, swizzle, unswizzle, verify_chunk};
use ruidakit_protocol::tables::{ACK, ACK_ALT, NACK, NACK_ALT, SETTING, SETTING_READ, SETTING_WRITE};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Real socket backed by `std::net::UdpSocket`
pub struct RealUdpSocket {
    socket: UdpSocket,
}

impl RealUdpSocket {
    pub fn bind(port: u16) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port))?;
        Ok(Self { socket })
    }

    /// Local address the socket ended up on
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl DatagramSocket for RealUdpSocket {
    fn send_to(&mut self, data: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(data, target)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv_from(buf).map(|(n, _)| n)
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.socket.set_read_timeout(Some(timeout))
    }
}

/// Factory for [`RealUdpSocket`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RealSocketFactory;

impl SocketFactory for RealSocketFactory {
    fn bind(&self, port: u16) -> io::Result<Box<dyn DatagramSocket>> {
        Ok(Box::new(RealUdpSocket::bind(port)?))
    }
}

/// Why one chunk attempt failed
#[derive(Debug, Clone, Copy)]
enum AttemptFailure {
    Timeout,
    Empty,
    Nack,
    Unexpected(u8),
}

impl AttemptFailure {
    fn into_error(self, retries: u32) -> TransportError {
        match self {
            Self::Timeout => TransportError::AckTimeout { retries },
            Self::Empty => TransportError::EmptyResponse { retries },
            Self::Nack => TransportError::Nack { retries },
            Self::Unexpected(byte) => TransportError::UnexpectedResponse { byte, retries },
        }
    }
}

fn io_error(e: io::Error) -> Error {
    TransportError::Io {
        reason: e.to_string(),
    }
    .into()
}

/// Client for the controller action port
///
/// The socket is bound on the first send. If neither the configured source
/// port nor an ephemeral port can be bound the transport drops to
/// [`TransportMode::Offline`] for the rest of its life.
pub struct UdpTransport {
    config: TransportConfig,
    mode: TransportMode,
    factory: Box<dyn SocketFactory>,
    socket: Option<Box<dyn DatagramSocket>>,
    target: Option<SocketAddr>,
}

impl UdpTransport {
    /// Live transport using real sockets
    pub fn new(config: TransportConfig) -> Self {
        Self::with_factory(config, Box::new(RealSocketFactory))
    }

    /// Live transport using the given socket factory
    pub fn with_factory(config: TransportConfig, factory: Box<dyn SocketFactory>) -> Self {
        Self {
            config,
            mode: TransportMode::Live,
            factory,
            socket: None,
            target: None,
        }
    }

    /// Transport that never opens a socket
    pub fn offline(config: TransportConfig) -> Self {
        let mut transport = Self::new(config);
        transport.mode = TransportMode::Offline;
        transport
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    pub fn is_offline(&self) -> bool {
        self.mode == TransportMode::Offline
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn magic(&self) -> u8 {
        self.config.magic
    }

    fn resolve_target(&mut self) -> Result<SocketAddr> {
        if let Some(target) = self.target {
            return Ok(target);
        }
        let target = (self.config.host.as_str(), self.config.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| TransportError::InvalidAddress {
                host: self.config.host.clone(),
            })?;
        self.target = Some(target);
        Ok(target)
    }

    fn ensure_socket(&mut self) {
        if self.socket.is_some() || self.is_offline() {
            return;
        }
        match bind_with_fallback(
            self.factory.as_ref(),
            self.config.source_port,
            self.config.timeout,
            "[RUIDA UDP]",
        ) {
            Some(socket) => self.socket = Some(socket),
            None => self.mode = TransportMode::Offline,
        }
    }

    /// Send a payload and optionally collect the controller's reply
    ///
    /// Returns the unswizzled reply when `expect_reply` is set, `None`
    /// otherwise and always `None` when offline.
    pub fn send_packets(&mut self, payload: &[u8], expect_reply: bool) -> Result<Option<Vec<u8>>> {
        self.ensure_socket();
        let swizzled = swizzle(payload, self.config.magic);
        if self.is_offline() {
            info!("[RUIDA UDP DRY] {}", hex_string(&swizzled));
            return Ok(None);
        }
        let target = self.resolve_target()?;
        let timeout_ms = self.config.timeout.as_millis() as u64;
        let Some(socket) = self.socket.as_mut() else {
            info!("[RUIDA UDP DRY] {}", hex_string(&swizzled));
            return Ok(None);
        };

        let chunks: Vec<&[u8]> = swizzled.chunks(MTU).collect();
        debug!(
            "[RUIDA UDP] Sending {} bytes in {} chunk(s) to {}",
            payload.len(),
            chunks.len(),
            target
        );
        for chunk in chunks {
            let mut datagram = checksum(chunk).to_vec();
            datagram.extend_from_slice(chunk);
            send_chunk(socket.as_mut(), &datagram, target)?;
        }

        if !expect_reply {
            return Ok(None);
        }
        let mut buf = vec![0u8; MTU];
        let n = match socket.recv(&mut buf) {
            Ok(n) => n,
            Err(e) if is_timeout(&e) => {
                return Err(TransportError::ReplyTimeout { timeout_ms }.into());
            }
            Err(e) => return Err(io_error(e)),
        };
        let mut reply = &buf[..n];
        // Some firmware prefixes replies with a checksum like a request chunk
        if reply.len() > 2 && verify_chunk(reply) {
            reply = &reply[2..];
        }
        Ok(Some(unswizzle(reply, self.config.magic)))
    }

    /// Read a controller memory address
    pub fn read_memory(&mut self, address: u16, expected_len: usize) -> Result<Option<Vec<u8>>> {
        let addr = address.to_be_bytes();
        let payload = [SETTING, SETTING_READ, addr[0], addr[1]];
        let Some(reply) = self.send_packets(&payload, true)? else {
            return Ok(None);
        };

        let data = if reply.len() >= 4 && reply[..2] == [SETTING, SETTING_WRITE] && reply[2..4] == addr
        {
            &reply[4..]
        } else if reply.len() >= 2 && reply[..2] == addr {
            &reply[2..]
        } else {
            warn!(
                "[RUIDA UDP] Unexpected reply {} for address {:04X}",
                hex_string(&reply),
                address
            );
            return Ok(None);
        };

        if data.len() < expected_len {
            warn!(
                "[RUIDA UDP] Truncated reply for {:04X}: {}",
                address,
                hex_string(data)
            );
            return Ok(None);
        }
        Ok(Some(data[..expected_len].to_vec()))
    }

    /// Release the socket; the next send binds a new one
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("[RUIDA UDP] Socket closed");
        }
    }
}

fn send_chunk(socket: &mut dyn DatagramSocket, datagram: &[u8], target: SocketAddr) -> Result<()> {
    let mut buf = [0u8; ACK_BUFFER];
    let mut retries = 0;
    loop {
        socket.send_to(datagram, target).map_err(io_error)?;
        let failure = match socket.recv(&mut buf) {
            Ok(0) => AttemptFailure::Empty,
            Ok(_) if matches!(buf[0], ACK | ACK_ALT) => return Ok(()),
            Ok(_) if matches!(buf[0], NACK | NACK_ALT) => AttemptFailure::Nack,
            Ok(_) => AttemptFailure::Unexpected(buf[0]),
            Err(e) if is_timeout(&e) => AttemptFailure::Timeout,
            Err(e) => return Err(io_error(e)),
        };
        if retries == MAX_RETRIES {
            return Err(failure.into_error(retries).into());
        }
        retries += 1;
        warn!(
            "[RUIDA UDP] {:?} on chunk; resending ({}/{})",
            failure, retries, MAX_RETRIES
        );
    }
}
