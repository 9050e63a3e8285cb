//! Framing state machine
//!
//! The accumulator never touches I/O or the clock; callers pass `now` in.
//! `StreamSplitter` drives one accumulator per direction, except for the
//! by-direction strategy where both directions share one so a turnaround
//! can close the frame of the other side.

use std::time::Duration;

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::config::{SplitStrategy, SplitterConfig};
use crate::detector::{Protocol, ProtocolDetector};
use crate::frame::{Direction, Frame};

#[derive(Debug)]
pub struct FrameAccumulator {
    direction: Direction,
    strategy: SplitStrategy,
    time_gap: Duration,
    size_limit: Option<usize>,
    protocol_aware: bool,
    detector: ProtocolDetector,
    buffer: BytesMut,
    started_at: Option<DateTime<Utc>>,
    last_data_at: Option<Instant>,
}

impl FrameAccumulator {
    pub fn new(direction: Direction, config: &SplitterConfig) -> Self {
        Self {
            direction,
            strategy: config.strategy,
            time_gap: config.time_gap_threshold,
            size_limit: config.size_limit(),
            protocol_aware: config.protocol_aware_split,
            detector: ProtocolDetector::new(),
            buffer: BytesMut::with_capacity(config.size_limit().unwrap_or(0)),
            started_at: None,
            last_data_at: None,
        }
    }

    /// Direction of the bytes currently buffered (or of the last frame)
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Bytes buffered but not yet emitted
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one read. Returns the frames completed by it, oldest first.
    pub fn push(&mut self, data: &[u8], now: Instant) -> Vec<Frame> {
        let mut frames = Vec::new();
        if data.is_empty() {
            return frames;
        }

        if self.strategy == SplitStrategy::Passthrough {
            self.append(data);
            frames.extend(self.take_frame(false));
            return frames;
        }

        if self.strategy == SplitStrategy::TimeGap && self.gap_elapsed(now, false) {
            frames.extend(self.take_frame(false));
        }
        if self.protocol_aware && self.opens_message(data) {
            frames.extend(self.take_frame(false));
        }
        self.last_data_at = Some(now);

        let mut rest = data;
        if let Some(limit) = self.size_limit {
            while self.buffer.len() + rest.len() > limit {
                let take = limit.saturating_sub(self.buffer.len());
                self.append(&rest[..take]);
                rest = &rest[take..];
                frames.extend(self.take_frame(true));
            }
        }
        self.append(rest);
        frames
    }

    /// Feed one read that travelled in `direction`.
    ///
    /// A frame never mixes directions: a turnaround first closes whatever
    /// the other side had buffered.
    pub fn push_from(&mut self, direction: Direction, data: &[u8], now: Instant) -> Vec<Frame> {
        let mut frames = Vec::new();
        if data.is_empty() {
            return frames;
        }
        if direction != self.direction {
            frames.extend(self.take_frame(false));
            self.direction = direction;
            self.last_data_at = None;
        }
        frames.extend(self.push(data, now));
        frames
    }

    /// Instant at which the buffered bytes become a frame if nothing else arrives
    pub fn idle_deadline(&self) -> Option<Instant> {
        if self.strategy != SplitStrategy::TimeGap || self.buffer.is_empty() {
            return None;
        }
        self.last_data_at.map(|last| last + self.time_gap)
    }

    /// Flush the buffer when the stream has been quiet for the time gap
    pub fn flush_idle(&mut self, now: Instant) -> Option<Frame> {
        if self.strategy == SplitStrategy::TimeGap && self.gap_elapsed(now, true) {
            self.take_frame(false)
        } else {
            None
        }
    }

    /// End of stream: whatever is buffered becomes the last frame
    pub fn finish(&mut self) -> Option<Frame> {
        self.last_data_at = None;
        self.take_frame(false)
    }

    fn gap_elapsed(&self, now: Instant, inclusive: bool) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        match self.last_data_at {
            Some(last) => {
                let idle = now.saturating_duration_since(last);
                if inclusive {
                    idle >= self.time_gap
                } else {
                    idle > self.time_gap
                }
            }
            None => false,
        }
    }

    fn opens_message(&self, data: &[u8]) -> bool {
        !self.buffer.is_empty() && self.detector.detect(data) != Protocol::Unknown
    }

    fn append(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        if self.buffer.is_empty() {
            self.started_at = Some(Utc::now());
        }
        self.buffer.extend_from_slice(data);
    }

    fn take_frame(&mut self, force_split: bool) -> Option<Frame> {
        if self.buffer.is_empty() {
            return None;
        }
        let payload = self.buffer.split().freeze();
        let mut frame = Frame::new(payload, self.direction);
        if let Some(started_at) = self.started_at.take() {
            frame = frame.with_timestamp(started_at);
        }
        frame.set_unknown_protocol(force_split);
        Some(frame)
    }
}
