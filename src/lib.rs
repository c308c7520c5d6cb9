//! # BeamKit
//!
//! A Rust-based G-code streamer for GRBL laser engravers:
//! - Idle-travel path optimization with selectable effort levels
//! - Character-counting streaming protocol with real-time control bytes
//! - Run/pause/resume/stop session management over a serial link
//!
//! ## Architecture
//!
//! BeamKit is organized as a workspace with multiple crates:
//!
//! 1. **beamkit-core** - Core types, events, error taxonomy
//! 2. **beamkit-planner** - Path optimizer and program encoder
//! 3. **beamkit-communication** - Flow control, GRBL protocol, sessions
//! 4. **beamkit** - Library facade and the CLI binary

#![allow(dead_code)]

pub use beamkit_core::{
    Error, EventDispatcher, MachineState, Path, PendingLine, Point, Program, ProgramLine, Result,
    Segment, SegmentKind, SessionEvent, SessionState,
};

pub use beamkit_planner::{
    encode, idle_travel, optimize, EncoderConfig, OptimizeLevel, OptimizerConfig,
};

pub use beamkit_communication::{
    classify, DeviceResponse, Link, LinkConfig, SerialLink, Session, SessionConfig, StatusReport,
    Streamer, StreamerConfig,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with console output and RUST_LOG
/// environment variable support.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}
