//! Building blocks of the `ruidakit` command line tool

use anyhow::Context;
use ruidakit_communication::UdpTransport;
use ruidakit_core::Command;
use ruidakit_protocol::codec::swizzle;
use ruidakit_protocol::{decode, decode_swizzled, inspect, DecodeOutput, JobBuilder, Move};
use ruidakit_settings::Config;
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

/// Parse a swizzle key given as `0x88` or `136`
pub fn parse_magic(text: &str) -> Result<u8, String> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => text.parse::<u8>(),
    };
    parsed.map_err(|e| format!("invalid magic '{}': {}", text, e))
}

/// Read a JSON array of moves
pub fn load_moves(path: &Path) -> anyhow::Result<Vec<Move>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read moves from {}", path.display()))?;
    let moves: Vec<Move> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid move list in {}", path.display()))?;
    Ok(moves)
}

/// Read a JSON array of planner commands
pub fn load_commands(path: &Path) -> anyhow::Result<Vec<Command>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read commands from {}", path.display()))?;
    let commands: Vec<Command> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid command list in {}", path.display()))?;
    Ok(commands)
}

/// Decode a captured stream or RD file
///
/// `magic` is the swizzle key when the file is still swizzled.
pub fn decode_file(path: &Path, magic: Option<u8>) -> anyhow::Result<DecodeOutput> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(match magic {
        Some(magic) => decode_swizzled(&bytes, magic),
        None => decode(&bytes),
    })
}

/// Text listing of a decode: commands, then diagnostics, then the summary
pub fn render_decode(output: &DecodeOutput, with_summary: bool) -> String {
    let mut text = String::new();
    for cmd in &output.commands {
        let _ = writeln!(text, "{:06X}  {}", cmd.offset, cmd);
    }
    if !output.diagnostics.is_empty() {
        let _ = writeln!(text, "\n{} diagnostic(s):", output.diagnostics.len());
        for diagnostic in &output.diagnostics {
            let _ = writeln!(text, "  {}", diagnostic);
        }
    }
    if with_summary {
        let _ = writeln!(text, "\n{}", inspect(output));
    }
    text
}

/// Job builder set up from the job settings
pub fn job_builder(config: &Config, job_z: Option<f64>) -> JobBuilder {
    JobBuilder::new()
        .with_air_assist(config.job.air_assist)
        .with_force_absolute_every(config.job.force_absolute_every)
        .with_job_z(job_z)
}

/// Build a job and write it swizzled, ready for the controller
///
/// Returns the number of bytes written.
pub fn write_job_file(
    moves: &[Move],
    job_z: Option<f64>,
    config: &Config,
    out: &Path,
) -> anyhow::Result<usize> {
    let payload = job_builder(config, job_z).build(moves)?;
    let swizzled = swizzle(&payload, config.connection.swizzle_magic());
    std::fs::write(out, &swizzled)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    info!("Wrote {} byte RD job to {}", swizzled.len(), out.display());
    Ok(swizzled.len())
}

/// Transport for the configured controller
pub fn open_transport(config: &Config) -> UdpTransport {
    let transport_config = config.transport_config();
    if config.connection.offline {
        UdpTransport::offline(transport_config)
    } else {
        UdpTransport::new(transport_config)
    }
}
