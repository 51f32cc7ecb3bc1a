//! FILENAME: aggregate-engine/src/lib.rs
//! Summary (footer) aggregates for the data grid.
//!
//! Layers:
//! - `definition`: Serializable configuration (which columns use which operations)
//! - `engine`: Pure computation of summary records from a result set

pub mod definition;
pub mod engine;

pub use definition::*;
pub use engine::{compute, summary_key, ResultSet, SummaryRecord};
