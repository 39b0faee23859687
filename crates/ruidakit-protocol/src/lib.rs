//! # RuidaKit Protocol
//!
//! Everything that turns Ruida bytes into meaning and back:
//! - [`codec`]: swizzling, packed integers, coordinates and checksums
//! - [`tables`]: opcode, memory and keypad tables
//! - [`decoder`]: the byte-level command decoder
//! - [`job`]: RD job generation
//! - [`inspect`]: summaries of decoded jobs
//! - [`profile`]: per-model settings

pub mod codec;
pub mod decoder;
pub mod inspect;
pub mod job;
pub mod profile;
pub mod tables;

pub use decoder::{
    decode, decode_swizzled, ChecksumCheck, CommandDecoder, DecodeOutput, DecodedCommand,
    DecoderState, Diagnostic, DiagnosticKind, ParamValue, Source,
};
pub use inspect::{inspect, RdSummary};
pub use job::{build_job, BoundingBox, JobBuilder, Layer, Move};
pub use profile::RuidaProfile;
