//! FILENAME: engine/src/lib.rs
//! Shared core of the data grid.
//!
//! Every other grid crate depends on this one for the record model, the
//! compiled column model and the event surface.
//!
//! Layers:
//! - `value`: records and dotted field paths
//! - `column`: declarations as supplied by the host (WHAT a column IS)
//! - `format`: formatters/parsers resolved per column
//! - `compiler`: declarations -> positioned, diffable column model
//! - `events`: begin/complete notifications and the observer bus
//! - `localization`: UI constants
//! - `logging`: unified `seq|level|category|message` log lines

pub mod logging;
pub mod value;
pub mod column;
pub mod format;
pub mod compiler;
pub mod events;
pub mod localization;
pub mod error;

pub use value::*;
pub use column::*;
pub use format::{NumberPattern, ValueFormatter, ValueParser};
pub use compiler::{compile, next_uid, ColumnDiff, ColumnModel, CompiledColumn};
pub use events::*;
pub use localization::{DefaultLocalizer, Localizer, MapLocalizer};
pub use error::ColumnError;

/// Parse a JSON array of column declarations.
pub fn parse_declarations(json: &str) -> Result<Vec<ColumnDeclaration>, ColumnError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    if !value.is_array() {
        return Err(ColumnError::NotAnArray);
    }
    Ok(serde_json::from_value(value)?)
}
