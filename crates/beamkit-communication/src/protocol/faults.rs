//! GRBL error and alarm code tables
//!
//! Converts numeric codes to human-readable messages and classifies each
//! error as recoverable (only the offending line was rejected) or fatal
//! (the device cannot continue with the rest of the program). Unknown codes
//! are treated as fatal; all alarms are fatal.

/// Severity of a device-reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The rejected line is lost, but streaming may continue
    Recoverable,
    /// The session must stop and be explicitly reset
    Fatal,
}

/// Classify a GRBL error code.
///
/// Codes describing a rejected command line are recoverable. Codes
/// describing a device state that cannot accept further commands (lockout,
/// door, homing requirements) are fatal, as is anything unknown.
pub fn error_severity(code: u8) -> Severity {
    match code {
        1..=7 | 11 | 14..=17 | 20..=38 => Severity::Recoverable,
        _ => Severity::Fatal,
    }
}

/// Decode a GRBL error code to a human-readable message.
pub fn decode_error(code: u8) -> String {
    match code {
        1 => "G-code words consist of a letter and a value. Letter was not found.".to_string(),
        2 => "Numeric value format is not valid or missing an expected value.".to_string(),
        3 => "Grbl '$' system command was not recognized or supported.".to_string(),
        4 => "Negative value received for an expected positive value.".to_string(),
        5 => "Homing cycle is not enabled via settings.".to_string(),
        6 => "Minimum step pulse time must be greater than 3µs.".to_string(),
        7 => "EEPROM read failed. Reset and restored to default values.".to_string(),
        8 => "Grbl '$' command cannot be used unless Grbl is IDLE.".to_string(),
        9 => "G-code locked out during alarm or jog state.".to_string(),
        10 => "Soft limits cannot be enabled without homing also enabled.".to_string(),
        11 => "Max characters per line exceeded. Line was not processed and executed.".to_string(),
        12 => "Grbl '$' setting value exceeds the maximum step rate supported.".to_string(),
        13 => "Safety door detected as opened and door state initiated.".to_string(),
        14 => "Build info or startup line exceeded EEPROM line length limit.".to_string(),
        15 => "Jog target exceeds machine travel. Command ignored.".to_string(),
        16 => "Jog command with no '=' or contains prohibited g-code.".to_string(),
        17 => "Laser mode requires PWM output.".to_string(),
        20 => "Unsupported or invalid g-code command found in block.".to_string(),
        21 => "More than one g-code command from same modal group found in block.".to_string(),
        22 => "Feed rate has not yet been set or is undefined.".to_string(),
        23 => "G-code command in block requires an integer value.".to_string(),
        24 => "Two G-code commands that both require the use of the XYZ axis words were detected in the block.".to_string(),
        25 => "A G-code word was repeated in the block.".to_string(),
        26 => "A G-code command implicitly or explicitly requires XYZ axis words in the block, but none were detected.".to_string(),
        27 => "N line number value is not within the valid range of 1 - 9,999,999.".to_string(),
        28 => "A G-code command was sent, but is missing some required P or L value words in the line.".to_string(),
        29 => "Grbl supports six work coordinate systems G54-G59. G59.1, G59.2, and G59.3 are not supported.".to_string(),
        30 => "The G53 G-code command requires either a G0 seek or G1 feed motion mode to be active.".to_string(),
        31 => "There are unused axis words in the block and G80 motion mode cancel is active.".to_string(),
        32 => "A G2 or G3 arc was commanded but there are no XYZ axis words in the selected plane to trace the arc.".to_string(),
        33 => "The motion command has an invalid target.".to_string(),
        34 => "A G2 or G3 arc, traced with the radius definition, had a mathematical error when computing the arc geometry.".to_string(),
        35 => "A G2 or G3 arc, traced with the offset definition, is missing the IJK offset word in the selected plane to trace the arc.".to_string(),
        36 => "There are unused, leftover G-code words that aren't used by any command in the block.".to_string(),
        37 => "The G43.1 dynamic tool length offset command cannot apply an offset to an axis other than its configured axis.".to_string(),
        38 => "Tool number greater than max supported value.".to_string(),
        _ => format!("Unknown error code: {}", code),
    }
}

/// Decode a GRBL alarm code to a human-readable message.
pub fn decode_alarm(code: u8) -> String {
    match code {
        1 => "Hard limit triggered. Machine position is likely lost. Re-homing is highly recommended.".to_string(),
        2 => "Soft limit: G-code motion target exceeds machine travel. Machine position safely retained.".to_string(),
        3 => "Reset while in motion. Grbl cannot guarantee position. Lost steps are likely.".to_string(),
        4 => "Probe fail. The probe is not in the expected initial state before starting probe cycle.".to_string(),
        5 => "Probe fail. Probe did not contact the workpiece within the programmed travel.".to_string(),
        6 => "Homing fail. Reset during active homing cycle.".to_string(),
        7 => "Homing fail. Safety door was opened during active homing cycle.".to_string(),
        8 => "Homing fail. Cycle failed to clear limit switch when pulling off.".to_string(),
        9 => "Homing fail. Could not find limit switch within search distance.".to_string(),
        _ => format!("Unknown alarm code: {}", code),
    }
}

/// Format an error message with code and description.
pub fn format_error(code: u8) -> String {
    format!("error:{} - {}", code, decode_error(code))
}

/// Format an alarm message with code and description.
pub fn format_alarm(code: u8) -> String {
    format!("ALARM:{} - {}", code, decode_alarm(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error() {
        assert_eq!(
            decode_error(22),
            "Feed rate has not yet been set or is undefined."
        );
        assert!(decode_error(255).contains("Unknown error code"));
    }

    #[test]
    fn test_severity_table() {
        // Rejected-line family stays recoverable.
        assert_eq!(error_severity(1), Severity::Recoverable);
        assert_eq!(error_severity(20), Severity::Recoverable);
        assert_eq!(error_severity(38), Severity::Recoverable);
        // Lockout family and everything unknown is fatal.
        assert_eq!(error_severity(9), Severity::Fatal);
        assert_eq!(error_severity(13), Severity::Fatal);
        assert_eq!(error_severity(200), Severity::Fatal);
    }

    #[test]
    fn test_format_messages() {
        assert!(format_error(1).starts_with("error:1"));
        assert!(format_alarm(1).contains("Hard limit"));
    }
}
