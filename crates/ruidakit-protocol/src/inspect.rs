//! Decoded job summary
//!
//! Replays decoded motion commands to recover what a job does: the extents
//! it covers, the Z offsets it applies and how many moves and layers it has.

use crate::decoder::{DecodeOutput, DecodedCommand};
use crate::job::BoundingBox;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// What a decoded job does
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RdSummary {
    /// Extents of every motion vertex
    pub bbox: Option<BoundingBox>,
    /// Every `80 03` offset, in order
    pub z_offsets: Vec<f64>,
    /// Laser-off motion commands
    pub moves: usize,
    /// Laser-on motion commands
    pub cuts: usize,
    pub layers: usize,
    pub cut_length_mm: f64,
    pub travel_length_mm: f64,
    /// `None` when the stream carried no file checksum
    pub checksum: Option<bool>,
}

impl RdSummary {
    /// Net Z change applied by the job
    pub fn net_z(&self) -> f64 {
        self.z_offsets.iter().sum()
    }
}

impl fmt::Display for RdSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.bbox {
            Some(b) => writeln!(
                f,
                "Bounds: ({:.3}, {:.3}) - ({:.3}, {:.3}) mm",
                b.min_x, b.min_y, b.max_x, b.max_y
            )?,
            None => writeln!(f, "Bounds: none")?,
        }
        writeln!(f, "Layers: {}", self.layers)?;
        writeln!(
            f,
            "Moves: {} ({:.3} mm), cuts: {} ({:.3} mm)",
            self.moves, self.travel_length_mm, self.cuts, self.cut_length_mm
        )?;
        if !self.z_offsets.is_empty() {
            let offsets: Vec<String> = self.z_offsets.iter().map(|z| format!("{:+.3}", z)).collect();
            writeln!(f, "Z offsets: {}", offsets.join(", "))?;
        }
        let checksum = match self.checksum {
            Some(true) => "OK",
            Some(false) => "MISMATCH",
            None => "absent",
        };
        write!(f, "Checksum: {}", checksum)
    }
}

#[derive(Default)]
struct Tracker {
    summary: RdSummary,
    x: f64,
    y: f64,
    parts: BTreeSet<u64>,
    max_layer: Option<u64>,
}

impl Tracker {
    fn visit(&mut self, cmd: &DecodedCommand) {
        if cmd.is_reply {
            return;
        }
        match (cmd.opcode, cmd.sub_opcode) {
            (0x88 | 0xA8, _) => {
                if let (Some(x), Some(y)) = (cmd.param_f64(0), cmd.param_f64(1)) {
                    self.step(cmd.opcode, x, y);
                }
            }
            (0x89 | 0xA9, _) => {
                if let (Some(dx), Some(dy)) = (cmd.param_f64(0), cmd.param_f64(1)) {
                    self.step(cmd.opcode, self.x + dx, self.y + dy);
                }
            }
            (0x8A | 0xAA, _) => {
                if let Some(dx) = cmd.param_f64(0) {
                    self.step(cmd.opcode, self.x + dx, self.y);
                }
            }
            (0x8B | 0xAB, _) => {
                if let Some(dy) = cmd.param_f64(0) {
                    self.step(cmd.opcode, self.x, self.y + dy);
                }
            }
            (0x80, Some(0x03)) => {
                if let Some(dz) = cmd.param_f64(0) {
                    self.summary.z_offsets.push(dz);
                }
            }
            (0xCA, Some(0x02)) | (0xC9, Some(0x04)) => {
                if let Some(part) = cmd.parameters.first().and_then(|p| p.as_u64()) {
                    self.parts.insert(part);
                }
            }
            (0xCA, Some(0x22)) => {
                self.max_layer = cmd.parameters.first().and_then(|p| p.as_u64());
            }
            _ => {}
        }
    }

    fn step(&mut self, opcode: u8, x: f64, y: f64) {
        let length = (x - self.x).hypot(y - self.y);
        if opcode & 0x20 != 0 {
            self.summary.cuts += 1;
            self.summary.cut_length_mm += length;
        } else {
            self.summary.moves += 1;
            self.summary.travel_length_mm += length;
        }
        match &mut self.summary.bbox {
            Some(b) => b.include(x, y),
            None => self.summary.bbox = Some(BoundingBox::at(x, y)),
        }
        self.x = x;
        self.y = y;
    }
}

/// Summarise a decoded stream
///
/// Relative moves seen before any absolute one are taken from the origin.
pub fn inspect(decoded: &DecodeOutput) -> RdSummary {
    let mut tracker = Tracker::default();
    for cmd in &decoded.commands {
        tracker.visit(cmd);
    }
    let mut summary = tracker.summary;
    summary.layers = match tracker.max_layer {
        Some(max) => max as usize + 1,
        None => tracker.parts.len(),
    };
    if !decoded.checksums.is_empty() {
        summary.checksum = Some(decoded.checksums.iter().all(|c| c.is_ok()));
    }
    summary
}
