//! Event system for session observation
//!
//! Provides:
//! - Event types for session state, position, and progress changes
//! - A broadcast dispatcher for publishing events to subscribers
//!
//! The session layer publishes; UIs and CLIs subscribe. Events are
//! best-effort: a lagging subscriber drops old events rather than applying
//! backpressure to the IO loop.

use crate::geometry::MachinePosition;
use crate::state::{MachineState, SessionState};
use tokio::sync::broadcast;

/// Session event types
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Session state changed
    StateChanged(SessionState),
    /// Device reported a new position
    PositionChanged {
        /// Machine position from MPos.
        machine: MachinePosition,
        /// Work position (machine minus work coordinate offset).
        work: MachinePosition,
    },
    /// Device machine state word changed
    MachineStateChanged(MachineState),
    /// Lines acknowledged so far out of the program total
    Progress {
        /// Lines acknowledged by the device.
        acked: u32,
        /// Total lines in the program.
        total: u32,
    },
    /// The device rejected a specific line; the session stays operable
    LineRejected {
        /// Sequence number of the rejected line.
        line: u32,
        /// GRBL error code.
        code: u8,
        /// Decoded description.
        message: String,
    },
    /// Transition into `Error` or `Disconnected`, with the reason
    Fault(String),
    /// The device violated the protocol (e.g. an acknowledgment with no
    /// line outstanding); reported, never silently ignored
    ProtocolViolation(String),
    /// The program finished and every line was acknowledged
    Completed,
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StateChanged(state) => write!(f, "State: {}", state),
            Self::PositionChanged { machine, work } => write!(
                f,
                "Position - Machine: ({:.3}, {:.3}), Work: ({:.3}, {:.3})",
                machine.x, machine.y, work.x, work.y
            ),
            Self::MachineStateChanged(state) => write!(f, "Machine: {}", state),
            Self::Progress { acked, total } => write!(f, "Progress: {}/{}", acked, total),
            Self::LineRejected {
                line,
                code,
                message,
            } => {
                write!(f, "Line {} rejected (error:{}): {}", line, code, message)
            }
            Self::Fault(reason) => write!(f, "Fault: {}", reason),
            Self::ProtocolViolation(detail) => write!(f, "Protocol violation: {}", detail),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

/// Broadcast dispatcher for session events
#[derive(Clone)]
pub struct EventDispatcher {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventDispatcher {
    /// Create a new dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Size of the broadcast buffer (default 100)
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size);
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of receivers the event reached; zero subscribers
    /// is not an error.
    pub fn publish(&self, event: SessionEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}
