//! # RuidaKit
//!
//! A Rust toolkit for Ruida-family laser controllers:
//! - Swizzled, checksummed UDP transport with ACK/NACK retries
//! - RD job generation from straight-line moves
//! - A table-driven decoder for captured streams and RD files
//! - Readiness polling, a panel port client and a laser driver
//!
//! ## Architecture
//!
//! RuidaKit is organized as a workspace with multiple crates:
//!
//! 1. **ruidakit-core** - Planner commands, machine state, error taxonomy
//! 2. **ruidakit-protocol** - Wire codec, opcode tables, decoder, job builder
//! 3. **ruidakit-communication** - UDP transport, readiness, panel, laser driver
//! 4. **ruidakit-settings** - Configuration files
//! 5. **ruidakit** - The command line tool that ties them together

pub mod commands;

pub use ruidakit_communication::{
    execute_commands, DummyLaser, DummyRotary, LaserConfig, LaserInterface, PanelClient,
    PanelCommand, PanelConfig, ReadinessMonitor, ReadinessPolicy, RotaryInterface, RuidaLaser,
    TransportConfig, TransportMode, UdpTransport,
};
pub use ruidakit_core::{
    Command, CommandKind, Error, MachineState, ProtocolError, ReadinessError, Result,
    StatusFlags, TransportError,
};
pub use ruidakit_protocol::{
    build_job, decode, decode_swizzled, inspect, DecodeOutput, DecodedCommand, JobBuilder, Move,
    RdSummary, RuidaProfile,
};
pub use ruidakit_settings::{Config, SettingsError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

/// Initialize logging with the default configuration
///
/// Human-readable lines on stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

/// Initialize logging with one JSON object per event on stderr
pub fn init_logging_json() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let fmt_layer = fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_current_span(false);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}
