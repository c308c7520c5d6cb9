//! Character-counting flow control
//!
//! Tracks the exact number of unacknowledged bytes in the device receive
//! buffer so the sender can stream ahead of acknowledgments without ever
//! overrunning the buffer. The streamer is sans-IO: it decides what may be
//! sent and accounts for responses; the session's IO task moves the bytes.
//!
//! Correctness invariants:
//! - `bytes_in_flight` never exceeds the configured capacity; the send path
//!   is gated on capacity before a line is released, so an overrun is
//!   unrepresentable rather than checked at runtime.
//! - Pending lines are consumed in strict FIFO order. The device answers
//!   buffered lines in the order they were sent, so the oldest pending line
//!   is always the one being acknowledged or rejected.
//! - There is no retry path. A line that was rejected or lost is never
//!   re-sent; duplicating a motion command is a safety hazard.

use beamkit_core::{PendingLine, Program, ProgramLine, ProtocolError, SessionError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// GRBL's stock serial receive buffer, in bytes.
pub const GRBL_RX_BUFFER: usize = 128;

/// Flow control and timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamerConfig {
    /// Device receive buffer capacity in bytes
    pub buffer_capacity: usize,
    /// How long a pending line may wait for a response before the link is
    /// declared lost
    pub watchdog: Duration,
    /// Interval between automatic status queries
    pub poll_interval: Duration,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: GRBL_RX_BUFFER,
            watchdog: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Flow-controlled program cursor and pending-line ledger.
pub struct Streamer {
    capacity: usize,
    pending: VecDeque<PendingLine>,
    bytes_in_flight: usize,
    job: Option<Job>,
}

/// The program being streamed and the cursor into it.
struct Job {
    program: Program,
    cursor: usize,
    acked: u32,
}

impl Streamer {
    /// Create a streamer with the given device buffer capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pending: VecDeque::new(),
            bytes_in_flight: 0,
            job: None,
        }
    }

    /// Load a program for streaming.
    ///
    /// Rejects a program containing any line that could never fit the
    /// device buffer even when it is empty.
    pub fn load_job(&mut self, program: Program) -> Result<(), SessionError> {
        for line in program.lines() {
            if line.wire_len() > self.capacity {
                return Err(SessionError::LineTooLong {
                    line: line.number,
                    len: line.wire_len(),
                    capacity: self.capacity,
                });
            }
        }
        self.job = Some(Job {
            program,
            cursor: 0,
            acked: 0,
        });
        Ok(())
    }

    /// Drop the current job, keeping pending accounting intact.
    pub fn clear_job(&mut self) {
        self.job = None;
    }

    /// A job is loaded and not yet fully sent
    pub fn has_unsent_lines(&self) -> bool {
        self.job
            .as_ref()
            .is_some_and(|job| job.cursor < job.program.len())
    }

    /// The next program line, only if flow control permits sending it now.
    pub fn peek_sendable(&self) -> Option<&ProgramLine> {
        let job = self.job.as_ref()?;
        let line = job.program.get(job.cursor)?;
        if self.bytes_in_flight + line.wire_len() <= self.capacity {
            Some(line)
        } else {
            None
        }
    }

    /// Record that the line returned by [`Self::peek_sendable`] was written
    /// to the device: start tracking it and advance the cursor.
    pub fn mark_sent(&mut self) {
        let Some(job) = self.job.as_mut() else {
            return;
        };
        let Some(line) = job.program.get(job.cursor) else {
            return;
        };
        debug_assert!(self.bytes_in_flight + line.wire_len() <= self.capacity);
        self.pending.push_back(PendingLine::from_line(line));
        self.bytes_in_flight += line.wire_len();
        job.cursor += 1;
    }

    /// Track a line sent outside any job (an immediate command). The caller
    /// must have checked [`Self::fits`] first.
    pub fn track_immediate(&mut self, text: &str) {
        let wire_len = text.len() + 1;
        debug_assert!(self.bytes_in_flight + wire_len <= self.capacity);
        // Sequence number 0 marks non-program lines.
        self.pending.push_back(PendingLine {
            number: 0,
            wire_len,
            text: text.to_string(),
        });
        self.bytes_in_flight += wire_len;
    }

    /// Whether a command of this text length currently fits the buffer.
    pub fn fits(&self, text: &str) -> bool {
        self.bytes_in_flight + text.len() + 1 <= self.capacity
    }

    /// Consume an `ok`: pop the oldest pending line and release its bytes.
    pub fn acknowledge(&mut self) -> Result<PendingLine, ProtocolError> {
        let line = self.pending.pop_front().ok_or(ProtocolError::UnexpectedAck)?;
        self.bytes_in_flight -= line.wire_len;
        if line.number > 0 {
            if let Some(job) = self.job.as_mut() {
                job.acked += 1;
            }
        }
        Ok(line)
    }

    /// Consume an `error:N`: the oldest pending line is popped and its
    /// bytes released like an acknowledgment, but the acknowledgment mark
    /// does not advance past the rejected line. The popped line is handed
    /// back for fault routing; it is never re-sent.
    pub fn reject(&mut self) -> Result<PendingLine, ProtocolError> {
        let line = self.pending.pop_front().ok_or(ProtocolError::UnexpectedAck)?;
        self.bytes_in_flight -= line.wire_len;
        Ok(line)
    }

    /// Discard all pending lines and reset accounting. Used after a soft
    /// reset, which empties the device buffer; the discarded lines will
    /// never be acknowledged.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.bytes_in_flight = 0;
        self.job = None;
    }

    /// The job is fully sent and fully answered
    pub fn is_complete(&self) -> bool {
        match &self.job {
            Some(job) => job.cursor >= job.program.len() && self.pending.is_empty(),
            None => false,
        }
    }

    /// Bytes currently awaiting acknowledgment
    pub fn bytes_in_flight(&self) -> usize {
        self.bytes_in_flight
    }

    /// Number of sent-but-unanswered lines
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// (acknowledged, total) program lines, when a job is loaded
    pub fn progress(&self) -> Option<(u32, u32)> {
        self.job
            .as_ref()
            .map(|job| (job.acked, job.program.len() as u32))
    }
}
