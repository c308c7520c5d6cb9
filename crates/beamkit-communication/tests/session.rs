//! Behavioral tests for the session state machine and IO loop, driven
//! through an in-memory mock link.

use beamkit_communication::link::Link;
use beamkit_communication::session::{Session, SessionConfig};
use beamkit_communication::streamer::StreamerConfig;
use beamkit_core::{Program, SessionEvent, SessionState};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// How the mock answers completed command lines.
#[derive(Clone, Copy)]
enum AckMode {
    /// Never respond; the test injects responses by hand
    Silent,
    /// Answer `ok` to every line
    Auto,
    /// Answer `error:<code>` to the nth (0-based) line, `ok` otherwise
    ErrorOnLine(usize, u8),
}

/// Shared observation handles for a mock link.
#[derive(Clone, Default)]
struct MockHandles {
    incoming: Arc<Mutex<VecDeque<u8>>>,
    lines: Arc<Mutex<Vec<String>>>,
    realtime: Arc<Mutex<Vec<u8>>>,
}

impl MockHandles {
    fn push_response(&self, line: &str) {
        let mut incoming = self.incoming.lock();
        incoming.extend(line.bytes());
        incoming.push_back(b'\n');
    }

    fn sent_lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    fn realtime_bytes(&self) -> Vec<u8> {
        self.realtime.lock().clone()
    }
}

const REALTIME_BYTES: [u8; 5] = [b'!', b'~', b'?', 0x18, 0x85];

/// In-memory link: records written lines and real-time bytes, feeds back
/// scripted responses.
struct MockLink {
    handles: MockHandles,
    mode: AckMode,
    partial: String,
    line_count: usize,
}

impl MockLink {
    fn new(mode: AckMode) -> (Self, MockHandles) {
        let handles = MockHandles::default();
        (
            Self {
                handles: handles.clone(),
                mode,
                partial: String::new(),
                line_count: 0,
            },
            handles,
        )
    }

    fn complete_line(&mut self) {
        let line = std::mem::take(&mut self.partial);
        let index = self.line_count;
        self.line_count += 1;
        self.handles.lines.lock().push(line);

        match self.mode {
            AckMode::Silent => {}
            AckMode::Auto => self.handles.push_response("ok"),
            AckMode::ErrorOnLine(target, code) => {
                if index == target {
                    self.handles.push_response(&format!("error:{}", code));
                } else {
                    self.handles.push_response("ok");
                }
            }
        }
    }
}

impl Link for MockLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut incoming = self.handles.incoming.lock();
        if incoming.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(incoming.len());
        for slot in buf.iter_mut().take(n) {
            *slot = incoming.pop_front().unwrap_or_default();
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        // Single real-time bytes arrive between lines, never inside one.
        if data.len() == 1 && self.partial.is_empty() && REALTIME_BYTES.contains(&data[0]) {
            self.handles.realtime.lock().push(data[0]);
            return Ok(());
        }
        for &byte in data {
            if byte == b'\n' {
                self.complete_line();
            } else {
                self.partial.push(byte as char);
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn config(buffer_capacity: usize) -> SessionConfig {
    SessionConfig {
        flow: StreamerConfig {
            buffer_capacity,
            watchdog: Duration::from_secs(5),
            poll_interval: Duration::from_secs(60),
        },
    }
}

fn three_line_program() -> Program {
    // Each line is 3 characters, 4 bytes on the wire.
    Program::from_texts(["X10", "X20", "X30"])
}

async fn wait_until(mut cond: impl FnMut() -> bool, what: &str) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {}", what);
}

fn collect_events(session: &Session) -> Arc<Mutex<Vec<SessionEvent>>> {
    let mut rx = session.subscribe();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            sink.lock().push(event);
        }
    });
    events
}

#[tokio::test]
async fn test_program_streams_to_completion() {
    let (link, handles) = MockLink::new(AckMode::Auto);
    let mut session = Session::new(config(128));
    session.connect(Box::new(link)).unwrap();
    let events = collect_events(&session);

    session.load(three_line_program()).unwrap();
    session.start().await.unwrap();

    wait_until(|| session.state() == SessionState::Idle, "completion").await;
    assert_eq!(handles.sent_lines(), vec!["X10", "X20", "X30"]);
    assert!(events
        .lock()
        .iter()
        .any(|e| matches!(e, SessionEvent::Completed)));
}

#[tokio::test]
async fn test_flow_control_withholds_lines_beyond_capacity() {
    // Capacity 10, three 4-byte lines: the first two fit (8 <= 10), the
    // third must wait until an acknowledgment frees room.
    let (link, handles) = MockLink::new(AckMode::Silent);
    let mut session = Session::new(config(10));
    session.connect(Box::new(link)).unwrap();

    session.load(three_line_program()).unwrap();
    session.start().await.unwrap();

    wait_until(|| handles.sent_lines().len() == 2, "first two lines").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handles.sent_lines().len(), 2, "third line must be withheld");

    handles.push_response("ok");
    wait_until(|| handles.sent_lines().len() == 3, "third line after ack").await;
}

#[tokio::test]
async fn test_pause_suppresses_sending_but_realtime_flows() {
    let (link, handles) = MockLink::new(AckMode::Silent);
    let mut session = Session::new(config(10));
    session.connect(Box::new(link)).unwrap();

    session.load(three_line_program()).unwrap();
    session.start().await.unwrap();
    wait_until(|| handles.sent_lines().len() == 2, "first two lines").await;

    session.pause().unwrap();
    assert_eq!(session.state(), SessionState::Paused);
    assert!(handles.realtime_bytes().contains(&b'!'));

    // Free buffer space while paused: nothing new may be sent.
    handles.push_response("ok");
    handles.push_response("ok");
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(handles.sent_lines().len(), 2, "paused session sent a line");

    // A further real-time byte still goes through while the writer is idle.
    session.query_status().unwrap();
    assert!(handles.realtime_bytes().contains(&b'?'));

    session.resume().unwrap();
    assert!(handles.realtime_bytes().contains(&b'~'));
    wait_until(|| handles.sent_lines().len() == 3, "third line after resume").await;
}

#[tokio::test]
async fn test_stop_clears_pending_and_returns_to_idle() {
    let (link, handles) = MockLink::new(AckMode::Silent);
    let mut session = Session::new(config(10));
    session.connect(Box::new(link)).unwrap();

    session.load(three_line_program()).unwrap();
    session.start().await.unwrap();
    wait_until(|| handles.sent_lines().len() == 2, "first two lines").await;

    session.stop().await.unwrap();
    assert!(handles.realtime_bytes().contains(&0x18));
    wait_until(|| session.state() == SessionState::Idle, "idle after stop").await;

    // Acks for discarded lines change nothing; the rest of the program is
    // never sent.
    handles.push_response("ok");
    handles.push_response("ok");
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(handles.sent_lines().len(), 2);
}

#[tokio::test]
async fn test_fatal_error_faults_the_session() {
    // error:9 (locked out) is fatal: the session enters Error, discards
    // the remaining queue, and surfaces the reason.
    let (link, handles) = MockLink::new(AckMode::ErrorOnLine(0, 9));
    let mut session = Session::new(config(10));
    session.connect(Box::new(link)).unwrap();
    let events = collect_events(&session);

    session.load(three_line_program()).unwrap();
    session.start().await.unwrap();

    wait_until(|| session.state() == SessionState::Error, "error state").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(handles.sent_lines().len(), 2, "third line must be discarded");
    let events = events.lock();
    assert!(events.iter().any(
        |e| matches!(e, SessionEvent::LineRejected { line: 1, code: 9, .. })
    ));
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::Fault(reason) if reason.contains("error:9"))));
}

#[tokio::test]
async fn test_recoverable_error_keeps_session_running() {
    // error:22 (undefined feed rate) rejects one line; streaming goes on.
    let (link, handles) = MockLink::new(AckMode::ErrorOnLine(1, 22));
    let mut session = Session::new(config(128));
    session.connect(Box::new(link)).unwrap();
    let events = collect_events(&session);

    session.load(three_line_program()).unwrap();
    session.start().await.unwrap();

    wait_until(|| session.state() == SessionState::Idle, "completion").await;
    assert_eq!(handles.sent_lines().len(), 3);
    assert!(events.lock().iter().any(
        |e| matches!(e, SessionEvent::LineRejected { line: 2, code: 22, .. })
    ));
}

#[tokio::test]
async fn test_watchdog_declares_link_lost() {
    let (link, _handles) = MockLink::new(AckMode::Silent);
    let mut session = Session::new(SessionConfig {
        flow: StreamerConfig {
            buffer_capacity: 128,
            watchdog: Duration::from_millis(100),
            poll_interval: Duration::from_secs(60),
        },
    });
    session.connect(Box::new(link)).unwrap();
    let events = collect_events(&session);

    session.load(three_line_program()).unwrap();
    session.start().await.unwrap();

    wait_until(
        || session.state() == SessionState::Disconnected,
        "watchdog disconnect",
    )
    .await;
    assert!(events
        .lock()
        .iter()
        .any(|e| matches!(e, SessionEvent::Fault(reason) if reason.contains("No response"))));
}

#[tokio::test]
async fn test_unexpected_ack_is_reported() {
    let (link, handles) = MockLink::new(AckMode::Silent);
    let mut session = Session::new(config(128));
    session.connect(Box::new(link)).unwrap();
    let events = collect_events(&session);

    handles.push_response("ok");
    wait_until(
        || {
            events
                .lock()
                .iter()
                .any(|e| matches!(e, SessionEvent::ProtocolViolation(_)))
        },
        "protocol violation report",
    )
    .await;
}

#[tokio::test]
async fn test_status_report_updates_position() {
    let (link, handles) = MockLink::new(AckMode::Silent);
    let mut session = Session::new(config(128));
    session.connect(Box::new(link)).unwrap();
    let events = collect_events(&session);

    handles.push_response("<Run|MPos:5.000,6.000,0.000|WCO:1.000,1.000,0.000>");
    wait_until(
        || {
            events
                .lock()
                .iter()
                .any(|e| matches!(e, SessionEvent::PositionChanged { .. }))
        },
        "position event",
    )
    .await;

    let (machine, work) = session.position();
    assert_eq!((machine.x, machine.y), (5.0, 6.0));
    assert_eq!((work.x, work.y), (4.0, 5.0));
}

#[tokio::test]
async fn test_control_surface_preconditions() {
    let mut session = Session::new(config(128));

    // Not connected: everything is rejected.
    assert!(session.start().await.is_err());
    assert!(session.pause().is_err());

    let (link, _handles) = MockLink::new(AckMode::Auto);
    session.connect(Box::new(link)).unwrap();

    // Connected but no program.
    assert!(session.start().await.is_err());
    // Pause is only legal while running.
    assert!(session.pause().is_err());
    // Resume is only legal while paused.
    assert!(session.resume().is_err());
}
