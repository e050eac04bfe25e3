use std::path::PathBuf;
use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that abort a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// The feed file itself could not be read
    #[error("Cannot read feed {path}: {source}")]
    Feed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The report file could not be created or written
    #[error("Cannot write report {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A transform rejected an item
    #[error("Stage {stage} failed on {item}: {reason}")]
    Stage {
        stage: String,
        item: String,
        reason: String,
    },

    /// A worker thread panicked or could not be joined
    #[error("Worker thread error: {0}")]
    Worker(String),
}

/// Per-item admission failures. These skip the item, never the run.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File ended before both matrices were read
    #[error("Expected {expected} data rows, found {found}")]
    TooFewRows { expected: usize, found: usize },

    /// A row had the wrong number of values
    #[error("Row {row} has {found} values, expected {expected}")]
    RowLength {
        row: usize,
        found: usize,
        expected: usize,
    },

    /// A value failed to parse as a float
    #[error("Row {row}: invalid value {value:?}")]
    BadValue { row: usize, value: String },
}
