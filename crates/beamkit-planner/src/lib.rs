//! # BeamKit Planner
//!
//! Turns an unordered set of draw paths into a streamable G-code program:
//!
//! 1. [`optimizer`] re-sequences and optionally reverses paths to minimize
//!    idle (laser-off) travel, with selectable effort levels.
//! 2. [`encoder`] linearizes the ordered paths into a numbered command
//!    program with laser on/off bracketing.

pub mod encoder;
pub mod optimizer;

pub use encoder::{encode, EncoderConfig};
pub use optimizer::{idle_travel, optimize, OptimizeLevel, OptimizerConfig};
