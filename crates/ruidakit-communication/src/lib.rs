//! # RuidaKit Communication
//!
//! Talks to Ruida controllers over UDP.
//! - [`transport`]: swizzled, checksummed, ACKed packets on the action port
//! - [`readiness`]: status polling until the controller is idle
//! - [`panel`]: the unswizzled keypad port
//! - [`laser`]: the laser driver built on top of them
//! - [`interfaces`]: laser and rotary seams for planners

pub mod interfaces;
pub mod laser;
pub mod panel;
pub mod readiness;
pub mod transport;

pub use interfaces::{
    execute_commands, DummyLaser, DummyRotary, LaserCall, LaserInterface, RotaryInterface,
};
pub use laser::{LaserConfig, RuidaLaser};
pub use panel::{key_frame, PanelClient, PanelCommand, PanelConfig};
pub use readiness::{ReadinessMonitor, ReadinessPolicy, Sleeper, ThreadSleeper};
pub use transport::{
    DatagramSocket, RealSocketFactory, RealUdpSocket, SocketFactory, TransportConfig,
    TransportMode, UdpTransport,
};
