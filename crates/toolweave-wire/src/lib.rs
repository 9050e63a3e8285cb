//! # Toolweave Wire
//!
//! Stream framing and protocol sniffing for proxied connections.
//!
//! A [`StreamSplitter`] reads raw bytes on a background task and cuts them
//! into [`Frame`]s, either on read pauses (time gap), at a fixed size, when
//! the traffic turns around, or per read. Frames cut at a size limit are
//! flagged as unknown protocol. Optionally a read that opens with a known
//! protocol message starts a new frame.
//! [`ProtocolDetector`] then tags each frame from its leading bytes.
//!
//! Parsing frame contents is left to the caller.

pub mod accumulator;
pub mod config;
pub mod detector;
pub mod error;
pub mod frame;
pub mod splitter;

pub use accumulator::FrameAccumulator;
pub use config::{
    SplitStrategy, SplitterConfig, DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_BUFFER_SIZE,
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_READ_BUFFER_SIZE, DEFAULT_TIME_GAP_THRESHOLD, TIME_GAP_100MS,
    TIME_GAP_200MS, TIME_GAP_300MS, TIME_GAP_50MS,
};
pub use detector::{Protocol, ProtocolDetector};
pub use error::SplitterError;
pub use frame::{Direction, Frame};
pub use splitter::{FrameResult, StreamSplitter};
