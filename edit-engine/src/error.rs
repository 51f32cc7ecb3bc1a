//! FILENAME: edit-engine/src/error.rs

use crate::session::EditState;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EditError {
    #[error("no primary key column is defined")]
    MissingPrimaryKey,

    #[error("{0} is disabled by the edit settings")]
    NotAllowed(&'static str),

    #[error("cannot {operation} while {state:?}")]
    InvalidState { operation: &'static str, state: EditState },

    #[error("row {0} is outside the current page")]
    RowOutOfRange(usize),

    #[error("no row is selected")]
    NoRowSelected,

    #[error("no edit session is active")]
    NoSession,

    #[error("another dialog is already open")]
    DialogBusy,
}
