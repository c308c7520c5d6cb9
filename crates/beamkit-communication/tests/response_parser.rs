use beamkit_communication::protocol::faults;
use beamkit_communication::{classify, DeviceResponse};
use beamkit_core::MachineState;

#[test]
fn test_parse_ok() {
    assert_eq!(classify("ok"), Some(DeviceResponse::Ok));
    assert_eq!(classify("ok\r"), Some(DeviceResponse::Ok));
}

#[test]
fn test_parse_error() {
    assert_eq!(classify("error:1"), Some(DeviceResponse::Error(1)));
    assert_eq!(classify("error:23"), Some(DeviceResponse::Error(23)));
}

#[test]
fn test_parse_alarm() {
    assert_eq!(classify("ALARM:1"), Some(DeviceResponse::Alarm(1)));
    assert_eq!(classify("alarm:6"), Some(DeviceResponse::Alarm(6)));
}

#[test]
fn test_parse_status_report() {
    let response = classify("<Idle|MPos:0.000,0.000,0.000|WPos:0.000,0.000,0.000>");

    let Some(DeviceResponse::Status(status)) = response else {
        panic!("expected a status report");
    };
    assert_eq!(status.state, MachineState::Idle);
    let mpos = status.machine_pos.expect("machine position");
    assert_eq!(mpos.x, 0.0);
    let wpos = status.work_pos.expect("work position");
    assert_eq!(wpos.y, 0.0);
}

#[test]
fn test_parse_status_with_feed_and_spindle() {
    let response = classify("<Run|MPos:10.000,5.000,2.500|FS:1500.0,800>");

    let Some(DeviceResponse::Status(status)) = response else {
        panic!("expected a status report");
    };
    assert_eq!(status.state, MachineState::Run);
    assert_eq!(status.feed_rate, Some(1500.0));
    assert_eq!(status.spindle_speed, Some(800.0));
}

#[test]
fn test_parse_status_with_hold_substate() {
    let response = classify("<Hold:0|MPos:1.000,2.000,0.000>");

    let Some(DeviceResponse::Status(status)) = response else {
        panic!("expected a status report");
    };
    assert_eq!(status.state, MachineState::Hold);
}

#[test]
fn test_parse_welcome_banner_is_a_message() {
    assert!(matches!(
        classify("Grbl 1.1h ['$' for help]"),
        Some(DeviceResponse::Message(_))
    ));
}

#[test]
fn test_parse_empty_line() {
    assert_eq!(classify(""), None);
    assert_eq!(classify("\r"), None);
}

#[test]
fn test_error_severity_boundary() {
    // The rejected-line family is recoverable.
    for code in [1u8, 2, 20, 22, 33, 38] {
        assert_eq!(
            faults::error_severity(code),
            faults::Severity::Recoverable,
            "code {}",
            code
        );
    }
    // Lockout-family and unknown codes are fatal.
    for code in [8u8, 9, 13, 39, 99, 255] {
        assert_eq!(
            faults::error_severity(code),
            faults::Severity::Fatal,
            "code {}",
            code
        );
    }
}

#[test]
fn test_decoded_messages() {
    assert!(faults::format_error(9).contains("locked out"));
    assert!(faults::format_alarm(1).contains("Hard limit"));
    assert!(faults::decode_error(250).contains("Unknown error code"));
    assert!(faults::decode_alarm(42).contains("Unknown alarm code"));
}
