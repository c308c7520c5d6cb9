//! Program encoding.
//!
//! Linearizes an ordered path sequence into a numbered G-code program:
//! a rapid move to each path's start with the laser off, a laser-on
//! directive, the path's cut moves in their chosen orientation, and a
//! laser-off directive before the next rapid. Coordinates are emitted with
//! four decimals and feeds with one, matching what the target controller
//! family accepts.

use beamkit_core::{Path, Point, Program, SegmentKind};
use serde::{Deserialize, Serialize};

/// Encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Feed rate for cut moves (mm/min) when a segment has no override
    pub cut_feed: f64,
    /// Feed rate announced for travel moves (mm/min)
    pub idle_feed: f64,
    /// Laser power S word when a segment has no override
    pub laser_power: f64,
    /// Use dynamic power mode (M4) instead of constant (M3)
    pub dynamic_power: bool,
    /// Finish with a rapid back to the origin
    pub return_home: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            cut_feed: 1000.0,
            idle_feed: 3000.0,
            laser_power: 1000.0,
            dynamic_power: false,
            return_home: false,
        }
    }
}

const POSITION_TOL: f64 = 1e-6;

/// Encode ordered paths into a streamable program.
///
/// Invariants: the laser is off during every rapid, on during every cut
/// move, and line numbers increase monotonically from 1.
pub fn encode(paths: &[Path], config: &EncoderConfig) -> Program {
    let mut out: Vec<String> = Vec::new();

    // Modal setup: millimeters, absolute positioning, laser off.
    out.push("G21".to_string());
    out.push("G90".to_string());
    out.push("M5".to_string());

    let laser_on = if config.dynamic_power { "M4" } else { "M3" };
    let mut cursor: Option<Point> = None;

    for path in paths {
        let target = path.start();
        let at_target = cursor.is_some_and(|c| c.approx_eq(&target, POSITION_TOL));
        if !at_target {
            out.push(format!("G0 X{:.4} Y{:.4}", target.x, target.y));
        }

        out.push(format!("{} S{:.0}", laser_on, config.laser_power));

        let mut modal_feed: Option<f64> = None;
        for segment in path.segments() {
            if segment.kind == SegmentKind::Idle {
                // Mid-path travel would mean an invalid path; the planner
                // rejects those before encoding.
                continue;
            }
            let feed = segment.feed_rate.unwrap_or(config.cut_feed);
            let mut line = format!("G1 X{:.4} Y{:.4}", segment.end.x, segment.end.y);
            if modal_feed != Some(feed) {
                line.push_str(&format!(" F{:.1}", feed));
                modal_feed = Some(feed);
            }
            if let Some(power) = segment.power {
                line.push_str(&format!(" S{:.0}", power));
            }
            out.push(line);
        }

        out.push("M5".to_string());
        cursor = Some(path.end());
    }

    if config.return_home && !paths.is_empty() {
        out.push(format!("G0 X{:.4} Y{:.4}", 0.0, 0.0));
    }

    Program::from_texts(out)
}
