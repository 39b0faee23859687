//! Panel port client
//!
//! The panel port (50207) takes short unswizzled keypad frames such as
//! `A5 50 09` and acknowledges each with `0xCC`. It is handy for jogging and
//! stopping without going through the action port. Reply problems are
//! logged, never returned.

use crate::transport::{bind_with_fallback, is_timeout, DatagramSocket, RealSocketFactory, SocketFactory, TransportMode};
use ruidakit_core::{Result, TransportError};
use ruidakit_protocol::codec::hex_string;
use ruidakit_protocol::tables::{key_code, ACK, KEYPAD, KEY_INTERFACE, KEY_PRESS, KEY_RELEASE};
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_PANEL_PORT: u16 = 50207;
pub const DEFAULT_PANEL_SOURCE_PORT: u16 = 40207;
pub const DEFAULT_PANEL_TIMEOUT: Duration = Duration::from_secs(2);

const PREFIX: &str = "[RUIDA PANEL]";

/// Named panel commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelCommand {
    Stop,
    Origin,
    Frame,
    YDown,
    YUp,
    ZDown,
    ZUp,
}

impl PanelCommand {
    pub const ALL: [PanelCommand; 7] = [
        Self::Stop,
        Self::Origin,
        Self::Frame,
        Self::YDown,
        Self::YUp,
        Self::ZDown,
        Self::ZUp,
    ];

    pub fn bytes(&self) -> [u8; 3] {
        match self {
            Self::Stop => [KEYPAD, KEY_PRESS, 0x09],
            Self::Origin => [KEYPAD, KEY_PRESS, 0x08],
            Self::Frame => [KEYPAD, KEY_INTERFACE, 0x00],
            Self::YDown => [KEYPAD, KEY_PRESS, 0x03],
            Self::YUp => [KEYPAD, KEY_RELEASE, 0x03],
            Self::ZDown => [KEYPAD, KEY_PRESS, 0x0A],
            Self::ZUp => [KEYPAD, KEY_RELEASE, 0x0A],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Origin => "origin",
            Self::Frame => "frame",
            Self::YDown => "y-down",
            Self::YUp => "y-up",
            Self::ZDown => "z-down",
            Self::ZUp => "z-up",
        }
    }
}

impl FromStr for PanelCommand {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .iter()
            .find(|c| c.name() == normalized)
            .copied()
            .ok_or_else(|| format!("Unknown panel command '{}'", s))
    }
}

impl std::fmt::Display for PanelCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Build a key press or release frame from a key name
pub fn key_frame(key: &str, pressed: bool) -> Option<[u8; 3]> {
    let sub = if pressed { KEY_PRESS } else { KEY_RELEASE };
    key_code(key).map(|code| [KEYPAD, sub, code])
}

/// Panel client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PanelConfig {
    pub host: String,
    pub port: u16,
    pub source_port: u16,
    pub timeout: Duration,
    /// Send a lone `0xCC` when the socket is first opened
    pub handshake: bool,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.100".to_string(),
            port: DEFAULT_PANEL_PORT,
            source_port: DEFAULT_PANEL_SOURCE_PORT,
            timeout: DEFAULT_PANEL_TIMEOUT,
            handshake: true,
        }
    }
}

/// Client for the panel port
pub struct PanelClient {
    config: PanelConfig,
    mode: TransportMode,
    factory: Box<dyn SocketFactory>,
    socket: Option<Box<dyn DatagramSocket>>,
    target: Option<SocketAddr>,
}

impl PanelClient {
    pub fn new(config: PanelConfig) -> Self {
        Self::with_factory(config, Box::new(RealSocketFactory))
    }

    pub fn with_factory(config: PanelConfig, factory: Box<dyn SocketFactory>) -> Self {
        Self {
            config,
            mode: TransportMode::Live,
            factory,
            socket: None,
            target: None,
        }
    }

    pub fn offline(config: PanelConfig) -> Self {
        let mut client = Self::new(config);
        client.mode = TransportMode::Offline;
        client
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    fn ensure_socket(&mut self) -> Result<()> {
        if self.socket.is_some() || self.mode == TransportMode::Offline {
            return Ok(());
        }
        let target = (self.config.host.as_str(), self.config.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| TransportError::InvalidAddress {
                host: self.config.host.clone(),
            })?;
        self.target = Some(target);

        let Some(mut socket) = bind_with_fallback(
            self.factory.as_ref(),
            self.config.source_port,
            self.config.timeout,
            PREFIX,
        ) else {
            self.mode = TransportMode::Offline;
            return Ok(());
        };

        if self.config.handshake {
            // Some controllers stay silent until a real command arrives
            let mut buf = [0u8; 8];
            let reply = socket
                .send_to(&[ACK], target)
                .and_then(|_| socket.recv(&mut buf));
            match reply {
                Ok(n) if n > 0 && buf[0] != ACK => {
                    debug!("{} Unexpected handshake response {}", PREFIX, hex_string(&buf[..n]));
                }
                Ok(_) => {}
                Err(e) => debug!("{} Handshake got no answer: {}", PREFIX, e),
            }
        }
        self.socket = Some(socket);
        Ok(())
    }

    /// Send a raw unswizzled frame and wait for the ACK
    pub fn send_command(&mut self, frame: &[u8]) -> Result<()> {
        self.ensure_socket()?;
        let (Some(socket), Some(target)) = (self.socket.as_mut(), self.target) else {
            info!("[RUIDA PANEL DRY] {}", hex_string(frame));
            return Ok(());
        };

        socket.send_to(frame, target).map_err(|e| TransportError::Io {
            reason: e.to_string(),
        })?;
        let mut buf = [0u8; 8];
        match socket.recv(&mut buf) {
            Ok(0) => warn!("{} Empty response for command {}", PREFIX, hex_string(frame)),
            Ok(n) if buf[0] != ACK => {
                warn!("{} Unexpected response {}", PREFIX, hex_string(&buf[..n]));
            }
            Ok(_) => debug!("{} ACK for {}", PREFIX, hex_string(frame)),
            Err(e) if is_timeout(&e) => {
                warn!("{} ACK timeout for command {}", PREFIX, hex_string(frame));
            }
            Err(e) => warn!("{} Receive failed for {}: {}", PREFIX, hex_string(frame), e),
        }
        Ok(())
    }

    /// Send a named command
    pub fn send(&mut self, command: PanelCommand) -> Result<()> {
        info!("{} {}", PREFIX, command.name().to_ascii_uppercase());
        self.send_command(&command.bytes())
    }

    pub fn close(&mut self) {
        self.socket = None;
    }
}
