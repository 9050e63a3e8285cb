use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const TIME_GAP_50MS: Duration = Duration::from_millis(50);
pub const TIME_GAP_100MS: Duration = Duration::from_millis(100);
pub const TIME_GAP_200MS: Duration = Duration::from_millis(200);
pub const TIME_GAP_300MS: Duration = Duration::from_millis(300);

pub const DEFAULT_TIME_GAP_THRESHOLD: Duration = TIME_GAP_100MS;
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 8 * 1024;
pub const DEFAULT_MAX_FRAME_SIZE: usize = 8 * 1024;
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// How a byte stream is cut into frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Split on read pauses, with `max_buffer_size` as a hard cap
    #[default]
    TimeGap,
    /// Split every `max_frame_size` bytes
    FixedSize,
    /// Split when traffic turns around, with `max_buffer_size` as a hard cap
    ByDirection,
    /// One frame per read
    Passthrough,
}

impl SplitStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitStrategy::TimeGap => "time_gap",
            SplitStrategy::FixedSize => "fixed_size",
            SplitStrategy::ByDirection => "by_direction",
            SplitStrategy::Passthrough => "passthrough",
        }
    }
}

impl fmt::Display for SplitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SplitStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "time_gap" | "timegap" => Ok(SplitStrategy::TimeGap),
            "fixed_size" | "fixedsize" | "size" => Ok(SplitStrategy::FixedSize),
            "by_direction" | "bydirection" | "direction" => Ok(SplitStrategy::ByDirection),
            "passthrough" | "none" => Ok(SplitStrategy::Passthrough),
            other => Err(format!("unknown split strategy '{}'", other)),
        }
    }
}

/// Splitter tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitterConfig {
    pub strategy: SplitStrategy,
    /// Pause after which buffered bytes are flushed as a frame
    pub time_gap_threshold: Duration,
    /// Force-split limit for the time-gap strategy
    pub max_buffer_size: usize,
    /// Frame length for the fixed-size strategy
    pub max_frame_size: usize,
    pub read_buffer_size: usize,
    pub channel_capacity: usize,
    /// Also cut where a read opens with a recognizable protocol message
    pub protocol_aware_split: bool,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            strategy: SplitStrategy::default(),
            time_gap_threshold: DEFAULT_TIME_GAP_THRESHOLD,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            protocol_aware_split: false,
        }
    }
}

impl SplitterConfig {
    /// Time-gap strategy with the given threshold and default limits
    pub fn with_time_gap(gap: Duration) -> Self {
        Self {
            strategy: SplitStrategy::TimeGap,
            time_gap_threshold: gap,
            ..Self::default()
        }
    }

    pub fn fixed_size(max_frame_size: usize) -> Self {
        Self {
            strategy: SplitStrategy::FixedSize,
            max_frame_size,
            ..Self::default()
        }
    }

    pub fn by_direction() -> Self {
        Self {
            strategy: SplitStrategy::ByDirection,
            ..Self::default()
        }
    }

    pub fn passthrough() -> Self {
        Self {
            strategy: SplitStrategy::Passthrough,
            ..Self::default()
        }
    }

    pub fn with_strategy(mut self, strategy: SplitStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }

    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_protocol_aware_split(mut self, enabled: bool) -> Self {
        self.protocol_aware_split = enabled;
        self
    }

    /// Size at which the active strategy cuts a frame, `None` when it never does
    pub fn size_limit(&self) -> Option<usize> {
        match self.strategy {
            SplitStrategy::TimeGap | SplitStrategy::ByDirection => {
                Some(self.max_buffer_size.max(1))
            }
            SplitStrategy::FixedSize => Some(self.max_frame_size.max(1)),
            SplitStrategy::Passthrough => None,
        }
    }
}
