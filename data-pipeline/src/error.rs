//! FILENAME: data-pipeline/src/error.rs

use thiserror::Error;

/// Failure reported by a `DataSource`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("data source unavailable: {0}")]
    Unavailable(String),

    #[error("no record with {field} = {key}")]
    KeyNotFound { field: String, key: String },

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("no primary key column is defined")]
    MissingPrimaryKey,
}
