use std::fs::{create_dir_all, File, OpenOptions};
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use toolweave_config::ObservabilityConfig;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Install the global subscriber once. Logs go to stderr (or the configured
/// file) so stdout stays machine-readable.
pub fn init_tracing_if_needed(observability: &ObservabilityConfig, verbose: bool) {
    TRACING_INIT.get_or_init(|| {
        let log_file_path = std::env::var("TOOLWEAVE_LOG_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| observability.log_file.clone());
        let file_writer = log_file_path.as_deref().and_then(create_log_writer);
        let level = if verbose {
            "debug"
        } else {
            observability.log_level.trim()
        };
        let make_filter = || {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| level_filter(level))
        };

        match file_writer {
            Some(writer) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(make_filter())
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(writer)
                    .try_init();
            }
            None => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(make_filter())
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .try_init();
            }
        }

        tracing::debug!(
            log_level = level,
            log_file = log_file_path.as_deref().unwrap_or("(stderr)"),
            "tracing initialized"
        );
    });
}

/// Filter for the configured level; anything `EnvFilter` rejects means info.
fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|err| {
        eprintln!("invalid log level '{}': {}; using info", level, err);
        EnvFilter::new("info")
    })
}

fn create_log_writer(path: &str) -> Option<Mutex<File>> {
    let file_path = Path::new(path);
    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = create_dir_all(parent) {
                eprintln!(
                    "failed to create log directory '{}': {}",
                    parent.display(),
                    err
                );
                return None;
            }
        }
    }
    match OpenOptions::new().create(true).append(true).open(file_path) {
        Ok(file) => Some(Mutex::new(file)),
        Err(err) => {
            eprintln!("failed to open log file '{}': {}", file_path.display(), err);
            None
        }
    }
}
