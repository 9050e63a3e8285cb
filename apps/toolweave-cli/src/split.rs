use std::time::Duration;

use anyhow::Context;
use serde::Serialize;
use tokio::io::AsyncRead;
use toolweave_config::ToolweaveConfig;
use toolweave_wire::{
    Direction, Frame, ProtocolDetector, SplitStrategy, SplitterConfig, StreamSplitter,
};

use crate::cli::SplitArgs;

/// One output line per frame
#[derive(Debug, Serialize)]
struct FrameLine {
    index: usize,
    direction: Direction,
    size: usize,
    protocol: String,
    encrypted: bool,
    force_split: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

impl FrameLine {
    fn new(index: usize, frame: &Frame, detector: &ProtocolDetector) -> Self {
        let protocol = detector.detect_from_frame(frame);
        Self {
            index,
            direction: frame.direction(),
            size: frame.size(),
            protocol: protocol.to_string(),
            encrypted: detector.is_encrypted(protocol),
            force_split: frame.is_unknown_protocol(),
            timestamp: frame.timestamp().map(|ts| ts.to_rfc3339()),
        }
    }
}

/// Config file values with command line overrides applied
fn splitter_config(config: &ToolweaveConfig, args: &SplitArgs) -> anyhow::Result<SplitterConfig> {
    let mut splitter = config.splitter.splitter_config()?;
    if let Some(strategy) = &args.strategy {
        splitter.strategy = strategy
            .parse::<SplitStrategy>()
            .map_err(anyhow::Error::msg)?;
    }
    if let Some(gap) = args.time_gap_ms {
        if gap == 0 && splitter.strategy == SplitStrategy::TimeGap {
            anyhow::bail!("--time-gap-ms must be > 0 for the time_gap strategy");
        }
        splitter.time_gap_threshold = Duration::from_millis(gap);
    }
    if let Some(size) = args.max_buffer_size {
        if size == 0 {
            anyhow::bail!("--max-buffer-size must be > 0");
        }
        splitter.max_buffer_size = size;
        splitter.max_frame_size = size;
    }
    if args.protocol_aware {
        splitter.protocol_aware_split = true;
    }
    Ok(splitter)
}

pub async fn run(config: &ToolweaveConfig, args: &SplitArgs) -> anyhow::Result<()> {
    let splitter_config = splitter_config(config, args)?;
    let reader: Box<dyn AsyncRead + Unpin + Send> = match &args.input {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open '{}'", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };
    tracing::info!(
        strategy = %splitter_config.strategy,
        protocol_aware = splitter_config.protocol_aware_split,
        time_gap_ms = splitter_config.time_gap_threshold.as_millis() as u64,
        max_buffer_size = splitter_config.max_buffer_size,
        "splitting stream"
    );

    let lines = split_stream(reader, splitter_config).await?;
    for line in &lines {
        println!("{}", serde_json::to_string(line)?);
    }
    tracing::info!(frames = lines.len(), "stream finished");
    Ok(())
}

async fn split_stream<R>(reader: R, config: SplitterConfig) -> anyhow::Result<Vec<FrameLine>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let detector = ProtocolDetector::new();
    let mut splitter = StreamSplitter::spawn(reader, Direction::ClientToServer, config);
    let mut lines = Vec::new();
    while let Some(item) = splitter.next_frame().await {
        let frame = item.context("stream read failed")?;
        lines.push(FrameLine::new(lines.len(), &frame, &detector));
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tokio::io::AsyncWriteExt;

    use super::*;

    fn args() -> SplitArgs {
        SplitArgs {
            input: None,
            strategy: None,
            time_gap_ms: None,
            max_buffer_size: None,
            protocol_aware: false,
        }
    }

    #[test]
    fn test_overrides_apply_on_top_of_config() {
        let config = ToolweaveConfig::default();
        let mut overrides = args();
        overrides.strategy = Some("fixed_size".to_string());
        overrides.max_buffer_size = Some(256);

        let splitter = splitter_config(&config, &overrides).unwrap();
        assert_eq!(splitter.strategy, SplitStrategy::FixedSize);
        assert_eq!(splitter.max_frame_size, 256);
        assert_eq!(splitter.time_gap_threshold, Duration::from_millis(100));
    }

    #[test]
    fn test_by_direction_and_protocol_aware_overrides() {
        let config = ToolweaveConfig::default();
        let mut overrides = args();
        overrides.strategy = Some("direction".to_string());
        overrides.protocol_aware = true;

        let splitter = splitter_config(&config, &overrides).unwrap();
        assert_eq!(splitter.strategy, SplitStrategy::ByDirection);
        assert!(splitter.protocol_aware_split);
        assert!(!splitter_config(&config, &args()).unwrap().protocol_aware_split);
    }

    #[test]
    fn test_invalid_overrides_are_rejected() {
        let config = ToolweaveConfig::default();
        let mut overrides = args();
        overrides.time_gap_ms = Some(0);
        assert!(splitter_config(&config, &overrides).is_err());

        let mut overrides = args();
        overrides.strategy = Some("chunked".to_string());
        assert!(splitter_config(&config, &overrides).is_err());

        let mut overrides = args();
        overrides.input = Some(PathBuf::from("capture.bin"));
        overrides.max_buffer_size = Some(0);
        assert!(splitter_config(&config, &overrides).is_err());
    }

    #[tokio::test]
    async fn test_split_stream_tags_frames() {
        let (mut tx, rx) = tokio::io::duplex(1024);
        let config = SplitterConfig::with_time_gap(Duration::from_secs(10)).with_max_buffer_size(16);

        tx.write_all(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n")
            .await
            .unwrap();
        drop(tx);

        let lines = split_stream(rx, config).await.unwrap();
        assert_eq!(lines[0].protocol, "HTTP");
        assert!(lines[0].force_split);
        assert!(!lines[0].encrypted);
        assert!(!lines.last().unwrap().force_split);
        assert_eq!(lines.iter().map(|l| l.size).sum::<usize>(), 37);

        let json = serde_json::to_value(&lines[0]).unwrap();
        assert_eq!(json["direction"], "client_to_server");
        assert_eq!(json["index"], 0);
    }

    #[tokio::test]
    async fn test_split_stream_marks_tls_encrypted() {
        let (mut tx, rx) = tokio::io::duplex(64);
        tx.write_all(&[0x16, 0x03, 0x01, 0x00, 0x05, 0x01]).await.unwrap();
        drop(tx);

        let lines = split_stream(rx, SplitterConfig::default()).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].protocol, "TLS");
        assert!(lines[0].encrypted);
    }
}
