//! Planner command model and controller state snapshots.
//!
//! The planner that produces [`Command`] sequences lives outside this
//! workspace; these types are the contract it shares with the laser driver.

use serde::{Deserialize, Serialize};

/// Axis moving bit in the machine status word
pub const STATUS_BIT_MOVING: u32 = 0x0100_0000;
/// Part finished bit
pub const STATUS_BIT_PART_END: u32 = 0x0000_0002;
/// Job running bit
pub const STATUS_BIT_JOB_RUNNING: u32 = 0x0000_0001;
/// Lower-byte move bit reported by some firmwares
pub const STATUS_BIT_MOVE_LOW: u32 = 0x0000_0010;

/// Controller is executing work when any of these bits is set
pub const BUSY_MASK: u32 = STATUS_BIT_MOVING | STATUS_BIT_JOB_RUNNING;

/// Kind of planner command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Travel with the laser off
    Move,
    /// Cut along a straight line
    CutLine,
    /// Change laser output power
    SetLaserPower,
    /// Turn the rotary jig
    Rotate,
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Move => write!(f, "MOVE"),
            Self::CutLine => write!(f, "CUT_LINE"),
            Self::SetLaserPower => write!(f, "SET_LASER_POWER"),
            Self::Rotate => write!(f, "ROTATE"),
        }
    }
}

/// Abstract motion / laser / rotary command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// What the command does
    pub kind: CommandKind,
    /// Target X in mm
    #[serde(default)]
    pub x: Option<f64>,
    /// Target Y in mm
    #[serde(default)]
    pub y: Option<f64>,
    /// Target Z in mm
    #[serde(default)]
    pub z: Option<f64>,
    /// Rotary angle in degrees
    #[serde(default)]
    pub angle_deg: Option<f64>,
    /// Feed speed in mm/s (deg/s for rotations)
    #[serde(default)]
    pub speed_mm_s: Option<f64>,
    /// Laser power percentage
    #[serde(default)]
    pub power_pct: Option<f64>,
    /// Free-form note from the planner
    #[serde(default)]
    pub comment: String,
}

impl Command {
    fn empty(kind: CommandKind) -> Self {
        Self {
            kind,
            x: None,
            y: None,
            z: None,
            angle_deg: None,
            speed_mm_s: None,
            power_pct: None,
            comment: String::new(),
        }
    }

    /// Travel move; axes are set with the `with_*` builders
    pub fn travel() -> Self {
        Self::empty(CommandKind::Move)
    }

    /// Cut to an XY target
    pub fn cut(x: f64, y: f64) -> Self {
        let mut cmd = Self::empty(CommandKind::CutLine);
        cmd.x = Some(x);
        cmd.y = Some(y);
        cmd
    }

    /// Set laser power
    pub fn power(power_pct: f64) -> Self {
        let mut cmd = Self::empty(CommandKind::SetLaserPower);
        cmd.power_pct = Some(power_pct);
        cmd
    }

    /// Rotate the jig to an absolute angle
    pub fn rotate(angle_deg: f64) -> Self {
        let mut cmd = Self::empty(CommandKind::Rotate);
        cmd.angle_deg = Some(angle_deg);
        cmd
    }

    /// Set the X target
    pub fn with_x(mut self, x: f64) -> Self {
        self.x = Some(x);
        self
    }

    /// Set the Y target
    pub fn with_y(mut self, y: f64) -> Self {
        self.y = Some(y);
        self
    }

    /// Set the Z target
    pub fn with_z(mut self, z: f64) -> Self {
        self.z = Some(z);
        self
    }

    /// Set the speed
    pub fn with_speed(mut self, speed_mm_s: f64) -> Self {
        self.speed_mm_s = Some(speed_mm_s);
        self
    }

    /// Attach a comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}

/// Snapshot of controller status and position
///
/// Produced by one readiness poll. A poll yields a full snapshot or none;
/// positions are `None` when they were not requested or not readable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineState {
    /// Raw machine status word
    pub status_bits: u32,
    /// X position in mm
    pub x: Option<f64>,
    /// Y position in mm
    pub y: Option<f64>,
    /// Z position in mm
    pub z: Option<f64>,
}

impl MachineState {
    /// Create a snapshot
    pub fn new(status_bits: u32, x: Option<f64>, y: Option<f64>, z: Option<f64>) -> Self {
        Self {
            status_bits,
            x,
            y,
            z,
        }
    }

    /// Moving or job-running bit asserted
    pub fn is_busy(&self) -> bool {
        self.status_bits & BUSY_MASK != 0
    }

    /// Decoded flag view
    pub fn flags(&self) -> StatusFlags {
        StatusFlags::from_bits(self.status_bits)
    }
}

/// Decoded view of the machine status word, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFlags {
    /// Raw status bits
    pub raw: u32,
    /// Busy mask asserted
    pub busy: bool,
    /// Axis moving bit
    pub moving: bool,
    /// Job running bit
    pub job_running: bool,
    /// Part end bit
    pub part_end: bool,
    /// Lower-byte move bit
    pub move_low: bool,
}

impl StatusFlags {
    /// Split a raw status word into named flags
    pub fn from_bits(raw: u32) -> Self {
        Self {
            raw,
            busy: raw & BUSY_MASK != 0,
            moving: raw & STATUS_BIT_MOVING != 0,
            job_running: raw & STATUS_BIT_JOB_RUNNING != 0,
            part_end: raw & STATUS_BIT_PART_END != 0,
            move_low: raw & STATUS_BIT_MOVE_LOW != 0,
        }
    }
}

impl std::fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "0x{:08X} busy={} moving={} job_running={} part_end={} low_move={}",
            self.raw, self.busy, self.moving, self.job_running, self.part_end, self.move_low
        )
    }
}
