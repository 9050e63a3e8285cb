use thiserror::Error;

/// Terminal errors of a splitter worker
#[derive(Debug, Error)]
pub enum SplitterError {
    #[error("{direction} read failed: {source}")]
    Read {
        direction: crate::Direction,
        source: std::io::Error,
    },

    #[error("{direction} forward write failed: {source}")]
    Forward {
        direction: crate::Direction,
        source: std::io::Error,
    },
}

impl SplitterError {
    pub fn direction(&self) -> crate::Direction {
        match self {
            SplitterError::Read { direction, .. } | SplitterError::Forward { direction, .. } => {
                *direction
            }
        }
    }

    pub fn io_error(&self) -> &std::io::Error {
        match self {
            SplitterError::Read { source, .. } | SplitterError::Forward { source, .. } => source,
        }
    }
}
