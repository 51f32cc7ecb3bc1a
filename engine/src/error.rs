//! FILENAME: engine/src/error.rs
//! PURPOSE: Error types for column declaration loading.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ColumnError {
    #[error("Invalid column declarations: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Column declarations must be a JSON array")]
    NotAnArray,
}
