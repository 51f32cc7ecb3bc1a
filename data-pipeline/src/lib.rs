//! FILENAME: data-pipeline/src/lib.rs
//! Data pipeline for the grid.
//!
//! Turns paging, sorting, filtering, searching and refresh actions into
//! queries against a `DataSource`, and commits the results (with page
//! overflow correction and stale-result guarding) together with the row
//! selection that belongs to the committed page.

pub mod coordinator;
pub mod error;
pub mod filter;
pub mod query;
pub mod selection;
pub mod settings;
pub mod source;

pub use coordinator::{ActionOutcome, Completion, DataPipeline, QueryTicket};
pub use error::{PipelineError, SourceError};
pub use filter::{fold_text, matches_all, matches_search};
pub use query::*;
pub use selection::{RowSelection, SelectionMode};
pub use settings::*;
pub use source::{DataSource, InMemorySource};
