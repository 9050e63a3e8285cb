//! # Toolweave Config
//!
//! Single-file configuration for toolweave.
//! A `toolweave.yaml` tunes the executor, the stream splitter, diagram
//! rendering and observability. Every section is optional.

mod loader;

pub use loader::{load_config, parse_config, validate_config, ConfigError};

use std::time::Duration;

use serde::Deserialize;
use toolweave_core::render::{MermaidDirection, MermaidOptions};
use toolweave_wire::{SplitStrategy, SplitterConfig};

/// Default config file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "toolweave.yaml";

/// Top-level configuration schema.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolweaveConfig {
    /// Config schema version.
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub splitter: SplitterSection,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for ToolweaveConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            app: AppConfig::default(),
            executor: ExecutorConfig::default(),
            splitter: SplitterSection::default(),
            render: RenderConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
        }
    }
}

fn default_app_name() -> String {
    "toolweave".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    /// Upper bound on handlers running at once.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
        }
    }
}

fn default_max_parallel() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct SplitterSection {
    /// `time_gap`, `fixed_size`, `by_direction` or `passthrough`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_time_gap_ms")]
    pub time_gap_ms: u64,
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Cut where a read opens with a recognizable protocol message.
    #[serde(default)]
    pub protocol_aware_split: bool,
}

impl Default for SplitterSection {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            time_gap_ms: default_time_gap_ms(),
            max_buffer_size: default_max_buffer_size(),
            max_frame_size: default_max_frame_size(),
            read_buffer_size: default_read_buffer_size(),
            channel_capacity: default_channel_capacity(),
            protocol_aware_split: false,
        }
    }
}

impl SplitterSection {
    pub fn strategy(&self) -> Result<SplitStrategy, ConfigError> {
        self.strategy.parse::<SplitStrategy>().map_err(|_| {
            ConfigError::Invalid(format!(
                "splitter.strategy must be one of time_gap, fixed_size, by_direction, passthrough (got '{}')",
                self.strategy
            ))
        })
    }

    /// Runtime splitter settings for this section.
    pub fn splitter_config(&self) -> Result<SplitterConfig, ConfigError> {
        Ok(SplitterConfig {
            strategy: self.strategy()?,
            time_gap_threshold: Duration::from_millis(self.time_gap_ms),
            max_buffer_size: self.max_buffer_size,
            max_frame_size: self.max_frame_size,
            read_buffer_size: self.read_buffer_size,
            channel_capacity: self.channel_capacity,
            protocol_aware_split: self.protocol_aware_split,
        })
    }
}

fn default_strategy() -> String {
    SplitStrategy::default().as_str().to_string()
}

fn default_time_gap_ms() -> u64 {
    toolweave_wire::DEFAULT_TIME_GAP_THRESHOLD.as_millis() as u64
}

fn default_max_buffer_size() -> usize {
    toolweave_wire::DEFAULT_MAX_BUFFER_SIZE
}

fn default_max_frame_size() -> usize {
    toolweave_wire::DEFAULT_MAX_FRAME_SIZE
}

fn default_read_buffer_size() -> usize {
    toolweave_wire::DEFAULT_READ_BUFFER_SIZE
}

fn default_channel_capacity() -> usize {
    toolweave_wire::DEFAULT_CHANNEL_CAPACITY
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    /// Mermaid flowchart direction (TB, TD, BT, LR, RL).
    #[serde(default = "default_direction")]
    pub direction: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub with_styles: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            direction: default_direction(),
            title: None,
            with_styles: false,
        }
    }
}

impl RenderConfig {
    pub fn direction(&self) -> Result<MermaidDirection, ConfigError> {
        MermaidDirection::parse(&self.direction).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "render.direction must be one of TB, TD, BT, LR, RL (got '{}')",
                self.direction
            ))
        })
    }

    pub fn mermaid_options(&self) -> Result<MermaidOptions, ConfigError> {
        let mut options = MermaidOptions::default().with_direction(self.direction()?);
        if let Some(title) = &self.title {
            options = options.with_title(title.clone());
        }
        if self.with_styles {
            options = options.with_styles();
        }
        Ok(options)
    }
}

fn default_direction() -> String {
    MermaidDirection::default().as_str().to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
