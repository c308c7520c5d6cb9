//! Device response classification
//!
//! Every line read from the device is classified exactly once at the reader
//! boundary into a [`DeviceResponse`]; nothing downstream re-parses text.
//! The grammar follows the GRBL 1.1 reporting format: `ok`, `error:N`,
//! `ALARM:N`, and bracketed status reports
//! `<State|MPos:x,y,z|WPos:x,y,z|WCO:x,y,z|FS:f,s>`.

use beamkit_core::geometry::MachinePosition;
use beamkit_core::MachineState;
use serde::{Deserialize, Serialize};

/// A classified device response line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceResponse {
    /// Acknowledgment for the oldest in-flight line
    Ok,
    /// The oldest in-flight line was rejected with this code
    Error(u8),
    /// Alarm lockout with this code
    Alarm(u8),
    /// Periodic status report
    Status(StatusReport),
    /// Welcome banners, feedback messages, anything informational
    Message(String),
}

/// Parsed fields of a bracketed status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Machine state word
    pub state: MachineState,
    /// Machine position (MPos)
    pub machine_pos: Option<MachinePosition>,
    /// Work position (WPos)
    pub work_pos: Option<MachinePosition>,
    /// Work coordinate offset (WCO)
    pub work_coord_offset: Option<MachinePosition>,
    /// Current feed rate (F or FS)
    pub feed_rate: Option<f64>,
    /// Current spindle/laser level (FS)
    pub spindle_speed: Option<f64>,
}

/// Classify one response line.
///
/// Returns `None` for blank lines. Unrecognized but non-empty lines come
/// back as [`DeviceResponse::Message`] so nothing is silently dropped.
pub fn classify(line: &str) -> Option<DeviceResponse> {
    let line = line.trim();

    if line.is_empty() {
        return None;
    }

    if line == "ok" {
        return Some(DeviceResponse::Ok);
    }

    if let Some(stripped) = line.strip_prefix("error:") {
        if let Ok(code) = stripped.trim().parse::<u8>() {
            return Some(DeviceResponse::Error(code));
        }
    }

    if let Some(stripped) = line
        .strip_prefix("ALARM:")
        .or_else(|| line.strip_prefix("alarm:"))
    {
        if let Ok(code) = stripped.trim().parse::<u8>() {
            return Some(DeviceResponse::Alarm(code));
        }
    }

    if let Some(body) = line.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
        return Some(DeviceResponse::Status(parse_status_report(body)));
    }

    Some(DeviceResponse::Message(line.to_string()))
}

/// Parse the pipe-separated fields of a status report body.
fn parse_status_report(body: &str) -> StatusReport {
    let mut parts = body.split('|');

    let state = parts
        .next()
        .map(MachineState::parse)
        .unwrap_or(MachineState::Unknown);

    let mut report = StatusReport {
        state,
        machine_pos: None,
        work_pos: None,
        work_coord_offset: None,
        feed_rate: None,
        spindle_speed: None,
    };

    for part in parts {
        let part = part.trim();

        if let Some(pos) = part.strip_prefix("MPos:") {
            report.machine_pos = parse_position(pos);
        } else if let Some(pos) = part.strip_prefix("WPos:") {
            report.work_pos = parse_position(pos);
        } else if let Some(pos) = part.strip_prefix("WCO:") {
            report.work_coord_offset = parse_position(pos);
        } else if let Some(fs) = part.strip_prefix("FS:") {
            let mut values = fs.split(',').filter_map(|s| s.trim().parse::<f64>().ok());
            report.feed_rate = values.next();
            report.spindle_speed = values.next();
        } else if let Some(f) = part.strip_prefix("F:") {
            report.feed_rate = f.trim().parse::<f64>().ok();
        }
        // Remaining fields (Bf:, Ln:, Pn:, Ov:, A:) are not needed here.
    }

    report
}

/// Parse a comma-separated coordinate triple.
fn parse_position(pos_str: &str) -> Option<MachinePosition> {
    let coords: Vec<f64> = pos_str
        .split(',')
        .filter_map(|s| s.trim().parse::<f64>().ok())
        .collect();

    if coords.len() < 2 {
        return None;
    }

    Some(MachinePosition {
        x: coords[0],
        y: coords[1],
        z: coords.get(2).copied().unwrap_or(0.0),
    })
}
