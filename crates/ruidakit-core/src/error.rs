//! Error handling for RuidaKit
//!
//! Provides error types for every layer of the controller stack:
//! - Transport errors (UDP handshake, retries, replies)
//! - Protocol errors (opcode tables, checksums, profiles)
//! - Job errors (RD file output)
//! - Readiness errors (status polling gave up)

use crate::types::MachineState;
use thiserror::Error;

/// Transport error type
///
/// Raised by the UDP transport once a chunk has exhausted its retries or a
/// reply never arrives.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// No ACK arrived before the socket timeout
    #[error("UDP ACK timeout after {retries} retries")]
    AckTimeout {
        /// Retries spent on the chunk.
        retries: u32,
    },

    /// Controller kept rejecting the chunk
    #[error("UDP NACK received after {retries} retries")]
    Nack {
        /// Retries spent on the chunk.
        retries: u32,
    },

    /// A byte that is neither ACK nor NACK arrived
    #[error("UDP unexpected response 0x{byte:02X} after {retries} retries")]
    UnexpectedResponse {
        /// First byte of the unexpected datagram.
        byte: u8,
        /// Retries spent on the chunk.
        retries: u32,
    },

    /// An empty datagram arrived where an ACK was expected
    #[error("UDP empty response after {retries} retries")]
    EmptyResponse {
        /// Retries spent on the chunk.
        retries: u32,
    },

    /// The follow-on reply never arrived
    #[error("UDP reply timeout after {timeout_ms}ms")]
    ReplyTimeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Controller address could not be resolved
    #[error("Invalid controller address: {host}")]
    InvalidAddress {
        /// The host string that failed to resolve.
        host: String,
    },

    /// Socket I/O failure outside the handshake
    #[error("UDP I/O error: {reason}")]
    Io {
        /// The reason for the I/O error.
        reason: String,
    },
}

/// Protocol error type
///
/// Represents problems with opcode tables, file checksums and controller
/// profiles. The decoder reports most of these as diagnostics rather than
/// returning them.
#[derive(Error, Debug, Clone)]
pub enum ProtocolError {
    /// Opcode not present in the command table
    #[error("Unknown opcode 0x{opcode:02X}")]
    UnknownOpcode {
        /// The opcode byte.
        opcode: u8,
    },

    /// Sub-opcode not present under its parent opcode
    #[error("Unknown sub-opcode 0x{opcode:02X} 0x{sub_opcode:02X}")]
    UnknownSubOpcode {
        /// The parent opcode.
        opcode: u8,
        /// The sub-opcode byte.
        sub_opcode: u8,
    },

    /// A command byte arrived where a data byte was expected
    #[error("Command byte 0x{byte:02X} where data expected")]
    UnexpectedCommandByte {
        /// The offending byte.
        byte: u8,
    },

    /// File checksum at EOF did not match the accumulated sum
    #[error("Checksum mismatch: decoded {expected}, accumulated {actual}")]
    ChecksumMismatch {
        /// Value carried by the file.
        expected: u64,
        /// Value accumulated while decoding.
        actual: u64,
    },

    /// No controller profile with this name
    #[error("Unknown Ruida profile '{name}'")]
    UnknownProfile {
        /// The requested profile name.
        name: String,
    },
}

/// Job error type
#[derive(Error, Debug, Clone)]
pub enum JobError {
    /// Saving an RD file failed
    #[error("Failed to write RD job {path}: {reason}")]
    Io {
        /// The target path.
        path: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Layer indices are single 7-bit bytes
    #[error("RD job needs {count} layers; at most {max} fit")]
    TooManyLayers {
        /// Distinct speed/power pairs in the job.
        count: usize,
        /// Largest layer count the format can address.
        max: usize,
    },
}

/// Readiness error type
#[derive(Error, Debug, Clone)]
pub enum ReadinessError {
    /// The controller never satisfied the readiness policy
    #[error("Ruida controller not ready after {attempts} attempts (last={last:?})")]
    NotReady {
        /// Number of polls issued.
        attempts: u32,
        /// The last snapshot observed, if any.
        last: Option<MachineState>,
    },
}

/// Main error type for RuidaKit
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Job error
    #[error(transparent)]
    Job(#[from] JobError),

    /// Readiness error
    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Transport(TransportError::AckTimeout { .. })
                | Error::Transport(TransportError::ReplyTimeout { .. })
        )
    }

    /// Check if this failure came from a single poll and may clear on the next one
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Check if this is a transport error
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Check if this is a readiness error
    pub fn is_readiness_error(&self) -> bool {
        matches!(self, Error::Readiness(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::UnexpectedResponse {
            byte: 0x5A,
            retries: 4,
        };
        assert_eq!(
            err.to_string(),
            "UDP unexpected response 0x5A after 4 retries"
        );

        let err = TransportError::ReplyTimeout { timeout_ms: 3000 };
        assert_eq!(err.to_string(), "UDP reply timeout after 3000ms");
    }

    #[test]
    fn test_unified_error_classification() {
        let err: Error = TransportError::AckTimeout { retries: 4 }.into();
        assert!(err.is_timeout());
        assert!(err.is_transport_error());

        let err: Error = ReadinessError::NotReady {
            attempts: 400,
            last: None,
        }
        .into();
        assert!(!err.is_timeout());
        assert!(!err.is_retryable());
        assert!(err.is_readiness_error());
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::UnknownSubOpcode {
            opcode: 0xC9,
            sub_opcode: 0x7F,
        };
        assert_eq!(err.to_string(), "Unknown sub-opcode 0xC9 0x7F");
    }
}
