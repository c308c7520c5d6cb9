//! Job model: segments, paths, and encoded programs
//!
//! A job flows through three representations:
//! 1. `Segment`s grouped into `Path`s, as delivered by an upstream parser.
//! 2. An ordered/oriented sequence of `Path`s, produced by the optimizer.
//! 3. A numbered `Program` of command lines, produced by the encoder and
//!    consumed by the streaming engine.

use crate::error::PlannerError;
use crate::geometry::Point;
use serde::{Deserialize, Serialize};

/// Tolerance used when checking that consecutive segments are contiguous.
pub const CONTIGUITY_TOL: f64 = 1e-6;

/// Whether a segment is drawn with the laser on or is a repositioning move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentKind {
    /// Laser on, drawing
    Cut,
    /// Laser off, travel only
    Idle,
}

/// An atomic motion command.
///
/// Immutable once produced by the upstream parser; the optimizer only ever
/// swaps endpoints via [`Segment::reversed`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Where the motion starts
    pub start: Point,
    /// Where the motion ends
    pub end: Point,
    /// Cut or idle travel
    pub kind: SegmentKind,
    /// Per-segment feed rate override (mm/min)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_rate: Option<f64>,
    /// Per-segment laser power override (S word)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<f64>,
}

impl Segment {
    /// Create a cut segment between two points
    pub fn cut(start: Point, end: Point) -> Self {
        Self {
            start,
            end,
            kind: SegmentKind::Cut,
            feed_rate: None,
            power: None,
        }
    }

    /// Create an idle (travel) segment between two points
    pub fn idle(start: Point, end: Point) -> Self {
        Self {
            start,
            end,
            kind: SegmentKind::Idle,
            feed_rate: None,
            power: None,
        }
    }

    /// Set the feed rate override
    pub fn with_feed_rate(mut self, feed_rate: f64) -> Self {
        self.feed_rate = Some(feed_rate);
        self
    }

    /// Set the power override
    pub fn with_power(mut self, power: f64) -> Self {
        self.power = Some(power);
        self
    }

    /// The same segment traversed in the opposite direction
    pub fn reversed(&self) -> Self {
        Self {
            start: self.end,
            end: self.start,
            ..*self
        }
    }

    /// Length of the segment
    pub fn length(&self) -> f64 {
        self.start.distance_to(&self.end)
    }
}

/// One continuous cut operation: a non-empty run of contiguous segments.
///
/// Paths are the unit the optimizer reorders. A path may be reversed as a
/// whole without changing the geometry it draws.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// Build a path from segments, validating non-emptiness, finiteness,
    /// and the contiguity invariant.
    pub fn new(segments: Vec<Segment>) -> Result<Self, PlannerError> {
        let path = Self { segments };
        path.validate()?;
        Ok(path)
    }

    /// Check the path invariants, reporting the first violation.
    pub fn validate(&self) -> Result<(), PlannerError> {
        if self.segments.is_empty() {
            return Err(PlannerError::EmptyPath);
        }
        for (i, seg) in self.segments.iter().enumerate() {
            if !seg.start.is_finite() || !seg.end.is_finite() {
                return Err(PlannerError::NonFinite { index: i });
            }
        }
        for (i, pair) in self.segments.windows(2).enumerate() {
            let gap = pair[0].end.distance_to(&pair[1].start);
            if gap > CONTIGUITY_TOL {
                return Err(PlannerError::Discontiguous { index: i, gap });
            }
        }
        Ok(())
    }

    /// The segments in traversal order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false for a validated path
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// First point of the path
    pub fn start(&self) -> Point {
        self.segments[0].start
    }

    /// Last point of the path
    pub fn end(&self) -> Point {
        self.segments[self.segments.len() - 1].end
    }

    /// Total cut length
    pub fn cut_length(&self) -> f64 {
        self.segments.iter().map(Segment::length).sum()
    }

    /// The same path traversed end-to-start: segment order and every
    /// segment's endpoints are flipped.
    pub fn reversed(&self) -> Self {
        Self {
            segments: self.segments.iter().rev().map(Segment::reversed).collect(),
        }
    }
}

/// One encoded command line with its 1-based sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramLine {
    /// 1-based sequence number
    pub number: u32,
    /// Command text, without line terminator
    pub text: String,
}

impl ProgramLine {
    /// Bytes this line occupies in the device receive buffer,
    /// including the newline terminator.
    pub fn wire_len(&self) -> usize {
        self.text.len() + 1
    }
}

/// An ordered, read-only sequence of encoded command lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    lines: Vec<ProgramLine>,
}

impl Program {
    /// Build a program from raw command texts, assigning sequence numbers.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| ProgramLine {
                number: (i + 1) as u32,
                text: text.into(),
            })
            .collect();
        Self { lines }
    }

    /// All lines in order
    pub fn lines(&self) -> &[ProgramLine] {
        &self.lines
    }

    /// Line count
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True when the program has no lines
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line at a 0-based cursor position
    pub fn get(&self, cursor: usize) -> Option<&ProgramLine> {
        self.lines.get(cursor)
    }

    /// Total wire bytes of the whole program
    pub fn wire_size(&self) -> usize {
        self.lines.iter().map(ProgramLine::wire_len).sum()
    }
}

/// A sent-but-unacknowledged command line.
///
/// Owned exclusively by the streaming engine; entries are consumed in strict
/// FIFO order by device acknowledgments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLine {
    /// Sequence number of the originating program line
    pub number: u32,
    /// Bytes charged against the device receive buffer
    pub wire_len: usize,
    /// Original command text
    pub text: String,
}

impl PendingLine {
    /// Track a program line that was just written to the device
    pub fn from_line(line: &ProgramLine) -> Self {
        Self {
            number: line.number,
            wire_len: line.wire_len(),
            text: line.text.clone(),
        }
    }
}
