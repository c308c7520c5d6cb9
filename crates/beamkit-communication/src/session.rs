//! Session state machine and IO loop
//!
//! A [`Session`] is the control surface over one connection: it owns the
//! link, the streaming state, and the run/pause/resume/stop lifecycle.
//!
//! Concurrency model: one spawned IO task owns the [`Streamer`] and is the
//! only place that mutates flow-control state. Public methods communicate
//! with it over an mpsc channel. Real-time control bytes take a separate
//! path straight to the shared link, bypassing both the channel and the
//! buffer accounting, so pause/resume/reset/status work in every state
//! including while the writer is withholding lines.
//!
//! The IO loop runs phases each turn: drain control commands, read and
//! classify device lines, check the response watchdog, send what flow
//! control permits, and issue the periodic status query.

use crate::link::{shared, Link, SharedLink};
use crate::protocol::faults::{self, Severity};
use crate::protocol::realtime;
use crate::protocol::response::{classify, DeviceResponse, StatusReport};
use crate::streamer::{Streamer, StreamerConfig};
use beamkit_core::geometry::MachinePosition;
use beamkit_core::{
    Error, EventDispatcher, MachineState, Program, ProtocolError, Result, SessionError,
    SessionEvent, SessionState,
};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Session configuration. Currently flow control and timing only.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Flow control and timing
    pub flow: StreamerConfig,
}

/// Mutable state shared between the session handle and the IO task.
#[derive(Debug, Clone, Default)]
struct SharedState {
    state: SessionState,
    machine_state: MachineState,
    machine_pos: MachinePosition,
    work_offset: MachinePosition,
}

/// Commands from the session handle to the IO task.
enum IoCommand {
    Start(Program),
    ClearAndIdle,
    Immediate(String),
    Shutdown,
}

/// Control surface for one streaming session.
pub struct Session {
    config: SessionConfig,
    link: Option<SharedLink>,
    state: Arc<RwLock<SharedState>>,
    events: EventDispatcher,
    command_tx: Option<mpsc::Sender<IoCommand>>,
    io_task: Option<JoinHandle<()>>,
    program: Option<Program>,
}

impl Session {
    /// Create a session; starts out disconnected.
    pub fn new(config: SessionConfig) -> Self {
        let state = SharedState {
            state: SessionState::Disconnected,
            ..Default::default()
        };
        Self {
            config,
            link: None,
            state: Arc::new(RwLock::new(state)),
            events: EventDispatcher::default(),
            command_tx: None,
            io_task: None,
            program: None,
        }
    }

    /// Attach a connected link and start the IO loop. The session becomes
    /// `Idle` and is ready for a program.
    pub fn connect(&mut self, link: Box<dyn Link>) -> Result<()> {
        if self.link.is_some() {
            return Err(self.transition_error(SessionState::Idle));
        }

        let link = shared(link);
        let (command_tx, command_rx) = mpsc::channel(32);

        let io = IoLoop {
            link: link.clone(),
            state: self.state.clone(),
            events: self.events.clone(),
            config: self.config.flow.clone(),
            command_rx,
        };
        self.io_task = Some(tokio::spawn(io.run()));

        self.link = Some(link);
        self.command_tx = Some(command_tx);
        self.set_state(SessionState::Idle);
        Ok(())
    }

    /// Tear down the IO loop and drop the link.
    pub fn disconnect(&mut self) {
        if let Some(tx) = self.command_tx.take() {
            let _ = tx.try_send(IoCommand::Shutdown);
        }
        if let Some(task) = self.io_task.take() {
            task.abort();
        }
        self.link = None;
        if self.state.read().state != SessionState::Disconnected {
            self.set_state(SessionState::Disconnected);
        }
    }

    /// Load a program. Replaces any previously loaded program; only legal
    /// when nothing is running.
    pub fn load(&mut self, program: Program) -> Result<()> {
        match self.state.read().state {
            SessionState::Idle | SessionState::Disconnected => {}
            other => {
                return Err(SessionError::InvalidTransition {
                    from: other.to_string(),
                    to: SessionState::Idle.to_string(),
                }
                .into())
            }
        }

        // Catch lines that could never be streamed before any IO happens.
        let capacity = self.config.flow.buffer_capacity;
        for line in program.lines() {
            if line.wire_len() > capacity {
                return Err(SessionError::LineTooLong {
                    line: line.number,
                    len: line.wire_len(),
                    capacity,
                }
                .into());
            }
        }

        self.program = Some(program);
        Ok(())
    }

    /// Begin streaming the loaded program.
    pub async fn start(&mut self) -> Result<()> {
        if self.state.read().state != SessionState::Idle {
            return Err(self.transition_error(SessionState::Running));
        }
        let program = self.program.clone().ok_or(SessionError::NoProgram)?;
        let tx = self.command_tx.as_ref().ok_or(SessionError::NotConnected)?;

        tx.send(IoCommand::Start(program))
            .await
            .map_err(|_| SessionError::NotConnected)?;
        self.set_state(SessionState::Running);
        Ok(())
    }

    /// Feed hold: stop motion and suppress further buffered sends.
    pub fn pause(&mut self) -> Result<()> {
        if self.state.read().state != SessionState::Running {
            return Err(self.transition_error(SessionState::Paused));
        }
        self.send_realtime(realtime::FEED_HOLD)?;
        self.set_state(SessionState::Paused);
        Ok(())
    }

    /// Release a feed hold and resume sending.
    pub fn resume(&mut self) -> Result<()> {
        if self.state.read().state != SessionState::Paused {
            return Err(self.transition_error(SessionState::Running));
        }
        self.send_realtime(realtime::CYCLE_RESUME)?;
        self.set_state(SessionState::Running);
        Ok(())
    }

    /// Abort the run: soft-reset the device and discard every pending line
    /// without waiting for acknowledgments (none will arrive after a
    /// reset).
    pub async fn stop(&mut self) -> Result<()> {
        match self.state.read().state {
            SessionState::Running | SessionState::Paused => {}
            _ => return Err(self.transition_error(SessionState::Stopping)),
        }
        self.set_state(SessionState::Stopping);
        self.send_realtime(realtime::SOFT_RESET)?;
        self.send_command(IoCommand::ClearAndIdle).await
    }

    /// Recover from `Error`: soft-reset and return to `Idle`.
    pub async fn reset(&mut self) -> Result<()> {
        if self.state.read().state != SessionState::Error {
            return Err(self.transition_error(SessionState::Idle));
        }
        self.send_realtime(realtime::SOFT_RESET)?;
        self.send_command(IoCommand::ClearAndIdle).await
    }

    /// Run the homing cycle.
    pub async fn home(&mut self) -> Result<()> {
        self.immediate("$H").await
    }

    /// Clear an alarm lockout.
    pub async fn unlock(&mut self) -> Result<()> {
        self.immediate("$X").await
    }

    /// Zero the work coordinate system at the current position.
    pub async fn set_work_zero(&mut self) -> Result<()> {
        self.immediate("G92 X0 Y0").await
    }

    /// Rapid back to the work zero.
    pub async fn return_to_work_zero(&mut self) -> Result<()> {
        self.immediate("G0 X0 Y0").await
    }

    /// Jog one axis by a signed distance.
    pub async fn jog(&mut self, axis: char, distance: f64, feed_rate: f64) -> Result<()> {
        let cmd = format!("$J=G91 G0 {}{:.3} F{:.0}", axis, distance, feed_rate);
        self.immediate(&cmd).await
    }

    /// Cancel an in-progress jog.
    pub fn jog_cancel(&mut self) -> Result<()> {
        self.send_realtime(realtime::JOG_CANCEL)
    }

    /// Request an immediate status report.
    pub fn query_status(&mut self) -> Result<()> {
        self.send_realtime(realtime::STATUS_QUERY)
    }

    /// Subscribe to the session event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state.read().state
    }

    /// Last reported machine state word.
    pub fn machine_state(&self) -> MachineState {
        self.state.read().machine_state
    }

    /// Last reported machine position and the derived work position.
    pub fn position(&self) -> (MachinePosition, MachinePosition) {
        let shared = self.state.read();
        let m = shared.machine_pos;
        let o = shared.work_offset;
        (m, MachinePosition::new(m.x - o.x, m.y - o.y, m.z - o.z))
    }

    /// Send a one-off command line; only legal while idle.
    async fn immediate(&mut self, text: &str) -> Result<()> {
        if self.state.read().state != SessionState::Idle {
            return Err(self.transition_error(SessionState::Idle));
        }
        self.send_command(IoCommand::Immediate(text.to_string()))
            .await
    }

    async fn send_command(&self, command: IoCommand) -> Result<()> {
        let tx = self.command_tx.as_ref().ok_or(SessionError::NotConnected)?;
        tx.send(command)
            .await
            .map_err(|_| SessionError::NotConnected)?;
        Ok(())
    }

    /// Write one real-time byte, outside the queue and the accounting.
    fn send_realtime(&self, byte: u8) -> Result<()> {
        let link = self.link.as_ref().ok_or(SessionError::NotConnected)?;
        let mut guard = link.lock();
        guard
            .write_all(&[byte])
            .and_then(|_| guard.flush())
            .map_err(|e| Error::Protocol(ProtocolError::Link(e)))
    }

    fn set_state(&self, state: SessionState) {
        self.state.write().state = state;
        self.events.publish(SessionEvent::StateChanged(state));
    }

    fn transition_error(&self, to: SessionState) -> Error {
        SessionError::InvalidTransition {
            from: self.state.read().state.to_string(),
            to: to.to_string(),
        }
        .into()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(task) = self.io_task.take() {
            task.abort();
        }
    }
}

/// The IO task: exclusive owner of the streamer and the read buffer.
struct IoLoop {
    link: SharedLink,
    state: Arc<RwLock<SharedState>>,
    events: EventDispatcher,
    config: StreamerConfig,
    command_rx: mpsc::Receiver<IoCommand>,
}

impl IoLoop {
    async fn run(mut self) {
        let mut streamer = Streamer::new(self.config.buffer_capacity);
        let mut immediates: VecDeque<String> = VecDeque::new();
        let mut rx_buffer = String::new();
        let mut last_response = Instant::now();
        let mut last_poll = Instant::now();
        let loop_delay = Duration::from_millis(10);

        loop {
            // 1. Control commands from the session handle.
            loop {
                match self.command_rx.try_recv() {
                    Ok(IoCommand::Start(program)) => {
                        // Oversized lines were rejected at load(); a failure
                        // here means the handle and loop disagree on config.
                        if let Err(e) = streamer.load_job(program) {
                            self.fault_to(SessionState::Error, e.to_string(), &mut streamer);
                        } else {
                            last_response = Instant::now();
                        }
                    }
                    Ok(IoCommand::ClearAndIdle) => {
                        streamer.clear();
                        immediates.clear();
                        self.set_state(SessionState::Idle);
                    }
                    Ok(IoCommand::Immediate(text)) => immediates.push_back(text),
                    Ok(IoCommand::Shutdown) => return,
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => return,
                }
            }

            // 2. Read and classify device lines.
            let mut chunk = [0u8; 256];
            let read = self.link.lock().read(&mut chunk);
            match read {
                Ok(0) => {}
                Ok(n) => {
                    rx_buffer.push_str(&String::from_utf8_lossy(&chunk[..n]));
                    while let Some(pos) = rx_buffer.find('\n') {
                        let raw: String = rx_buffer.drain(..=pos).collect();
                        if let Some(response) = classify(&raw) {
                            last_response = Instant::now();
                            self.handle_response(response, &mut streamer);
                        }
                    }
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::TimedOut
                        || e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    self.fault_to(
                        SessionState::Disconnected,
                        ProtocolError::Link(e).to_string(),
                        &mut streamer,
                    );
                    return;
                }
            }

            // 3. Watchdog: a pending line with no response means a lost
            // link, never a retry.
            if streamer.pending_count() > 0 && last_response.elapsed() > self.config.watchdog {
                let fault = ProtocolError::Watchdog {
                    elapsed_ms: last_response.elapsed().as_millis() as u64,
                };
                self.fault_to(SessionState::Disconnected, fault.to_string(), &mut streamer);
                return;
            }

            // 4. Write phase. Immediate commands first, then program lines
            // while the session is running and flow control permits.
            while immediates
                .front()
                .is_some_and(|text| streamer.fits(text))
            {
                if let Some(text) = immediates.pop_front() {
                    if let Err(e) = self.write_line(&text) {
                        self.fault_to(
                            SessionState::Disconnected,
                            ProtocolError::Link(e).to_string(),
                            &mut streamer,
                        );
                        return;
                    }
                    streamer.track_immediate(&text);
                }
            }

            if self.state.read().state == SessionState::Running {
                while let Some(line) = streamer.peek_sendable() {
                    let text = line.text.clone();
                    if let Err(e) = self.write_line(&text) {
                        self.fault_to(
                            SessionState::Disconnected,
                            ProtocolError::Link(e).to_string(),
                            &mut streamer,
                        );
                        return;
                    }
                    streamer.mark_sent();
                }

                if streamer.is_complete() {
                    streamer.clear();
                    self.events.publish(SessionEvent::Completed);
                    self.set_state(SessionState::Idle);
                }
            }

            // 5. Periodic status query; bypasses accounting.
            if last_poll.elapsed() >= self.config.poll_interval {
                if let Err(e) = self.write_byte(realtime::STATUS_QUERY) {
                    self.fault_to(
                        SessionState::Disconnected,
                        ProtocolError::Link(e).to_string(),
                        &mut streamer,
                    );
                    return;
                }
                last_poll = Instant::now();
            }

            tokio::time::sleep(loop_delay).await;
        }
    }

    fn handle_response(&self, response: DeviceResponse, streamer: &mut Streamer) {
        match response {
            DeviceResponse::Ok => match streamer.acknowledge() {
                Ok(line) => {
                    if line.number > 0 {
                        if let Some((acked, total)) = streamer.progress() {
                            self.events.publish(SessionEvent::Progress { acked, total });
                        }
                    }
                }
                Err(violation) => {
                    tracing::warn!("{}", violation);
                    self.events
                        .publish(SessionEvent::ProtocolViolation(violation.to_string()));
                }
            },
            DeviceResponse::Error(code) => match streamer.reject() {
                Ok(line) => {
                    let message = faults::decode_error(code);
                    tracing::error!(line = line.number, code, "device rejected line: {}", message);
                    self.events.publish(SessionEvent::LineRejected {
                        line: line.number,
                        code,
                        message,
                    });
                    if faults::error_severity(code) == Severity::Fatal {
                        self.fault_to(SessionState::Error, faults::format_error(code), streamer);
                    }
                }
                Err(violation) => {
                    tracing::warn!("{}", violation);
                    self.events
                        .publish(SessionEvent::ProtocolViolation(violation.to_string()));
                }
            },
            DeviceResponse::Alarm(code) => {
                self.fault_to(SessionState::Error, faults::format_alarm(code), streamer);
            }
            DeviceResponse::Status(report) => self.handle_status(report),
            DeviceResponse::Message(message) => {
                tracing::debug!("device message: {}", message);
            }
        }
    }

    fn handle_status(&self, report: StatusReport) {
        let mut shared = self.state.write();

        if shared.machine_state != report.state {
            shared.machine_state = report.state;
            self.events
                .publish(SessionEvent::MachineStateChanged(report.state));
        }
        if let Some(wco) = report.work_coord_offset {
            shared.work_offset = wco;
        }
        if let Some(mpos) = report.machine_pos {
            shared.machine_pos = mpos;
            let o = shared.work_offset;
            let work = MachinePosition::new(mpos.x - o.x, mpos.y - o.y, mpos.z - o.z);
            drop(shared);
            self.events.publish(SessionEvent::PositionChanged {
                machine: mpos,
                work,
            });
        }
    }

    /// Enter `Error` or `Disconnected`: publish the reason, discard all
    /// pending lines, announce the transition.
    fn fault_to(&self, state: SessionState, reason: String, streamer: &mut Streamer) {
        tracing::error!("session fault: {}", reason);
        self.events.publish(SessionEvent::Fault(reason));
        streamer.clear();
        self.set_state(state);
    }

    fn write_line(&self, text: &str) -> std::io::Result<()> {
        let mut link = self.link.lock();
        link.write_all(text.as_bytes())?;
        link.write_all(b"\n")?;
        link.flush()
    }

    fn write_byte(&self, byte: u8) -> std::io::Result<()> {
        let mut link = self.link.lock();
        link.write_all(&[byte])?;
        link.flush()
    }

    fn set_state(&self, state: SessionState) {
        self.state.write().state = state;
        self.events.publish(SessionEvent::StateChanged(state));
    }
}
