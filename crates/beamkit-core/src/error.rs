//! Error handling for BeamKit
//!
//! Provides error types for all layers:
//! - Planner errors (job validation)
//! - Protocol errors (streaming/flow control)
//! - Session errors (state machine violations)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Planner error type
///
/// Raised at the optimizer's input boundary; the planner never attempts
/// partial repair of an invalid job.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlannerError {
    /// A path with no segments
    #[error("Path contains no segments")]
    EmptyPath,

    /// Consecutive segments within a path are not contiguous
    #[error("Path is discontiguous after segment {index}: gap of {gap:.6} mm")]
    Discontiguous {
        /// Index of the segment whose end does not meet the next start.
        index: usize,
        /// Distance between the mismatched endpoints in millimeters.
        gap: f64,
    },

    /// A coordinate is NaN or infinite
    #[error("Segment {index} has a non-finite coordinate")]
    NonFinite {
        /// Index of the offending segment.
        index: usize,
    },
}

/// Protocol error type
///
/// Represents faults in the streaming protocol: flow-control violations and
/// link-level failures.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The device acknowledged a line we never sent
    #[error("Received acknowledgment with no line outstanding")]
    UnexpectedAck,

    /// No response for the oldest in-flight line within the watchdog interval
    #[error("No response from device for {elapsed_ms}ms; treating link as lost")]
    Watchdog {
        /// Milliseconds since the last device response.
        elapsed_ms: u64,
    },

    /// Byte-stream read or write failure
    #[error("Link I/O failure: {0}")]
    Link(#[from] std::io::Error),

    /// The serial port could not be opened
    #[error("Failed to open port {port}: {reason}")]
    Open {
        /// Port name that failed to open.
        port: String,
        /// Underlying failure description.
        reason: String,
    },
}

/// Session error type
///
/// State machine violations surfaced to the control surface caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Operation requires a live connection
    #[error("Session not connected")]
    NotConnected,

    /// Start requested with no program loaded
    #[error("No program loaded")]
    NoProgram,

    /// The requested transition is not legal from the current state
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        /// Name of the current state.
        from: String,
        /// Name of the requested state.
        to: String,
    },

    /// A program line can never fit the device receive buffer
    #[error("Line {line} is {len} bytes on the wire, larger than the {capacity}-byte device buffer")]
    LineTooLong {
        /// Sequence number of the offending line.
        line: u32,
        /// Wire length of the line in bytes.
        len: usize,
        /// Configured device buffer capacity.
        capacity: usize,
    },
}

/// Top-level error type unifying all BeamKit error domains.
#[derive(Error, Debug)]
pub enum Error {
    /// Job validation failure
    #[error(transparent)]
    Planner(#[from] PlannerError),

    /// Streaming protocol fault
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Session state machine violation
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a generic error from a message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Result alias used throughout BeamKit.
pub type Result<T> = std::result::Result<T, Error>;
