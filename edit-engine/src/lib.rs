//! FILENAME: edit-engine/src/lib.rs
//! Edit session state machine for the grid.
//!
//! One row at a time is added or edited through an isolated working copy.
//! Field rules are compiled from the column model; saves, deletes and
//! direct updates come out as `EditCommand`s for the data pipeline to
//! persist. Tabbing out of the form at either edge saves it.

pub mod dialog;
pub mod error;
pub mod navigation;
pub mod session;
pub mod settings;
pub mod validation;

pub use dialog::{AutoConfirm, Confirm, DialogGate, DialogKind, DialogRequest, ScriptedConfirm};
pub use error::EditError;
pub use navigation::{editable_fields, first_focus_field, is_boundary, TabDirection, TabOutcome};
pub use session::{
    EditCommand, EditContext, EditEngine, EditMode, EditOutcome, EditSession, EditState, FocusRequest,
};
pub use settings::{EditSettings, NewRowPosition};
pub use validation::{CompiledRule, ValidationRuleSet};
