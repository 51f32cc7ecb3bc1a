//! FILENAME: datagrid/src/error.rs

use data_pipeline::PipelineError;
use edit_engine::EditError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid grid settings: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("cannot read settings from {path}: {message}")]
    Io { path: String, message: String },

    #[error("pageSize must be at least 1")]
    InvalidPageSize,

    #[error("currentPage is 1-based")]
    InvalidCurrentPage,

    #[error("aggregate column '{0}' has no field")]
    AggregateWithoutField(String),
}

#[derive(Debug, Error)]
pub enum GridError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Edit(#[from] EditError),
}
