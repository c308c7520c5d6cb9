//! Session and machine state enums

use serde::{Deserialize, Serialize};

/// State of a streaming session as seen by the operator.
///
/// Transitions are owned by the session layer; everything else only reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// Connected, no program running
    #[default]
    Idle,
    /// Streaming program lines
    Running,
    /// Feed hold issued, sending suppressed
    Paused,
    /// Stop requested, waiting for the reset to take effect
    Stopping,
    /// A fatal device error was reported; requires explicit reset
    Error,
    /// Link lost or closed; terminal until a new connection
    Disconnected,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
            Self::Paused => write!(f, "Paused"),
            Self::Stopping => write!(f, "Stopping"),
            Self::Error => write!(f, "Error"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// Machine state word from a GRBL status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MachineState {
    /// Ready for commands
    Idle,
    /// Executing motion
    Run,
    /// Feed hold active
    Hold,
    /// Alarm lockout
    Alarm,
    /// Jogging
    Jog,
    /// Homing cycle
    Home,
    /// Safety door interlock
    Door,
    /// Check mode (dry run)
    Check,
    /// Low-power sleep
    Sleep,
    /// Anything the parser didn't recognize
    #[default]
    Unknown,
}

impl MachineState {
    /// Parse the leading state word of a status report.
    ///
    /// GRBL may suffix sub-state (`Hold:0`, `Door:1`); the prefix decides.
    pub fn parse(word: &str) -> Self {
        match word {
            s if s.starts_with("Idle") => Self::Idle,
            s if s.starts_with("Run") => Self::Run,
            s if s.starts_with("Hold") => Self::Hold,
            s if s.starts_with("Alarm") => Self::Alarm,
            s if s.starts_with("Jog") => Self::Jog,
            s if s.starts_with("Home") => Self::Home,
            s if s.starts_with("Door") => Self::Door,
            s if s.starts_with("Check") => Self::Check,
            s if s.starts_with("Sleep") => Self::Sleep,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Run => write!(f, "Run"),
            Self::Hold => write!(f, "Hold"),
            Self::Alarm => write!(f, "Alarm"),
            Self::Jog => write!(f, "Jog"),
            Self::Home => write!(f, "Home"),
            Self::Door => write!(f, "Door"),
            Self::Check => write!(f, "Check"),
            Self::Sleep => write!(f, "Sleep"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}
