//! Real-time control bytes
//!
//! Single bytes the controller handles immediately, outside buffered
//! command processing and outside flow-control accounting.

/// Feed hold: pause motion at the next planned stop
pub const FEED_HOLD: u8 = b'!';

/// Cycle start / resume after a feed hold
pub const CYCLE_RESUME: u8 = b'~';

/// Soft reset (Ctrl-X): aborts motion and empties the receive buffer
pub const SOFT_RESET: u8 = 0x18;

/// Request an immediate status report
pub const STATUS_QUERY: u8 = b'?';

/// Cancel an in-progress jog motion
pub const JOG_CANCEL: u8 = 0x85;
