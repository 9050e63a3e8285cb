//! Configuration loading and validation.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::ToolweaveConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Load and validate configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<ToolweaveConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    tracing::debug!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Parse and validate configuration from YAML text. Blank text yields defaults.
pub fn parse_config(content: &str) -> Result<ToolweaveConfig, ConfigError> {
    let config: ToolweaveConfig = if content.trim().is_empty() {
        ToolweaveConfig::default()
    } else {
        serde_yaml::from_str(content)?
    };
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &ToolweaveConfig) -> Result<(), ConfigError> {
    if config.version == 0 {
        return Err(ConfigError::Invalid(
            "version must be greater than 0".to_string(),
        ));
    }

    if config.app.name.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "app.name must not be empty".to_string(),
        ));
    }

    if config.executor.max_parallel == 0 {
        return Err(ConfigError::Invalid(
            "executor.max_parallel must be > 0".to_string(),
        ));
    }

    validate_splitter(config)?;
    config.render.direction()?;

    let level = config.observability.log_level.trim().to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(ConfigError::Invalid(format!(
            "observability.log_level must be one of trace, debug, info, warn, error (got '{}')",
            config.observability.log_level
        )));
    }

    Ok(())
}

fn validate_splitter(config: &ToolweaveConfig) -> Result<(), ConfigError> {
    let splitter = &config.splitter;
    let strategy = splitter.strategy()?;

    if splitter.max_buffer_size == 0 {
        return Err(ConfigError::Invalid(
            "splitter.max_buffer_size must be > 0".to_string(),
        ));
    }
    if splitter.max_frame_size == 0 {
        return Err(ConfigError::Invalid(
            "splitter.max_frame_size must be > 0".to_string(),
        ));
    }
    if splitter.read_buffer_size == 0 {
        return Err(ConfigError::Invalid(
            "splitter.read_buffer_size must be > 0".to_string(),
        ));
    }
    if splitter.channel_capacity == 0 {
        return Err(ConfigError::Invalid(
            "splitter.channel_capacity must be > 0".to_string(),
        ));
    }
    if strategy == toolweave_wire::SplitStrategy::TimeGap && splitter.time_gap_ms == 0 {
        return Err(ConfigError::Invalid(
            "splitter.time_gap_ms must be > 0 for the time_gap strategy".to_string(),
        ));
    }
    Ok(())
}
