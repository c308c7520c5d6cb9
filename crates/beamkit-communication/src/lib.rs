#![allow(dead_code)]
//! # BeamKit Communication
//!
//! GRBL streaming protocol and session management for BeamKit.
//! Implements character-counting flow control against the device receive
//! buffer, real-time control-byte injection, response classification, and
//! the run/pause/resume/stop session state machine.

pub mod link;
pub mod protocol;
pub mod session;
pub mod streamer;

pub use link::{Link, LinkConfig, SerialLink, SharedLink};
pub use protocol::realtime;
pub use protocol::response::{classify, DeviceResponse, StatusReport};
pub use session::{Session, SessionConfig};
pub use streamer::{Streamer, StreamerConfig};
