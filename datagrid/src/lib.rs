//! FILENAME: datagrid/src/lib.rs
//! Interactive data grid: settings, the `Grid` facade and the re-exported
//! building blocks.
//!
//! Layers:
//! - `config`: JSON settings document
//! - `grid`: pipeline, edit session, aggregates and layout behind one object
//! - `error`: facade-level errors

pub mod config;
pub mod error;
pub mod grid;

pub use config::GridSettings;
pub use error::{ConfigError, GridError};
pub use grid::{Grid, GridBuilder};

pub use aggregate_engine::{AggregateColumn, AggregateRow, AggregateType, SummaryRecord};
pub use data_pipeline::{
    ActionOutcome, DataPage, DataSource, FilterOperator, FilterPredicate, InMemorySource, PipelineError,
    PredicateLogic, Query, SelectionMode, SourceError,
};
pub use edit_engine::{
    AutoConfirm, Confirm, DialogKind, DialogRequest, EditCommand, EditError, EditMode, EditOutcome,
    EditSettings, EditState, FocusRequest, NewRowPosition, ScriptedConfirm, TabOutcome,
};
pub use engine::{
    BeginEvent, ColumnDeclaration, ColumnDiff, ColumnModel, ColumnType, DefaultLocalizer, EventRecorder,
    GridEvent, GridObserver, Localizer, MapLocalizer, Record, RequestType, SortDirection,
};
pub use layout_engine::{CellDescriptor, RowDescriptor, RowKind};
