//! # RuidaKit Core
//!
//! Core types and error handling shared by the RuidaKit crates.
//! Provides the planner command model consumed by the laser driver,
//! machine state snapshots produced by readiness polling, and the
//! layered error taxonomy.

pub mod error;
pub mod types;

pub use error::{Error, JobError, ProtocolError, ReadinessError, Result, TransportError};

pub use types::{
    Command, CommandKind, MachineState, StatusFlags, BUSY_MASK, STATUS_BIT_JOB_RUNNING,
    STATUS_BIT_MOVE_LOW, STATUS_BIT_MOVING, STATUS_BIT_PART_END,
};
