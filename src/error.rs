use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KafviewError {
    #[error("Worker count must be at least 1, got {0}")]
    InvalidWorkerCount(usize),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Cannot read config file {path}: {source}")]
    ConfigRead { path: String, source: std::io::Error },
    #[error("Cannot parse config file {path}: {source}")]
    ConfigParse { path: String, source: serde_yaml::Error },
    #[error("Cannot parse record on line {line}: {source}")]
    RecordParse { line: usize, source: serde_json::Error },
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, KafviewError>;

/// Failure reported by a [`MessageFilter`](crate::interface::MessageFilter) for one record.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("{0}")]
    Script(String),
    #[error("filter code exceeded its time budget of {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
