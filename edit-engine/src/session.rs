//! FILENAME: edit-engine/src/session.rs
//! PURPOSE: Add/edit/delete lifecycle of the single row being edited.
//! CONTEXT: `EditEngine` owns at most one `EditSession`. Persisting is done by
//! the caller: operations that change records return an `EditCommand` and
//! park the engine in `Saving` until `finish_save`, `finish_delete` or
//! `abort_save` is called. Confirmations go through the host's `Confirm`.

use crate::dialog::{Confirm, DialogGate, DialogRequest};
use crate::error::EditError;
use crate::navigation::{editable_fields, first_focus_field, is_boundary, TabDirection, TabOutcome};
use crate::settings::{EditSettings, NewRowPosition};
use crate::validation::ValidationRuleSet;
use engine::{
    field_value, log_debug, log_info, log_warn, next_uid, set_field, value_to_text, BeginEvent,
    ColumnModel, ColumnType, EventBus, GridEvent, Localizer, Record, RequestType,
};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditState {
    Idle,
    Adding,
    Editing,
    Validating,
    /// A command was handed out and awaits its result.
    Saving,
    Cancelling,
    /// The always-visible add row holds a draft.
    PersistentAdd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    Add,
    Edit,
}

/// The row being edited and its isolated working copy.
#[derive(Debug, Clone, PartialEq)]
pub struct EditSession {
    mode: EditMode,
    row_index: Option<usize>,
    row_uid: String,
    data: Record,
    original: Option<Record>,
    baseline: Record,
    errors: FxHashMap<String, String>,
    dirty: bool,
    persistent: bool,
}

impl EditSession {
    fn open(mode: EditMode, row_index: Option<usize>, row_uid: String, data: Record, original: Option<Record>) -> Self {
        EditSession {
            mode,
            row_index,
            row_uid,
            baseline: data.clone(),
            data,
            original,
            errors: FxHashMap::default(),
            dirty: false,
            persistent: false,
        }
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    /// Page-relative row being edited, or the insert position when adding.
    pub fn row_index(&self) -> Option<usize> {
        self.row_index
    }

    pub fn row_uid(&self) -> &str {
        &self.row_uid
    }

    pub fn data(&self) -> &Record {
        &self.data
    }

    /// Snapshot taken when editing started. `None` when adding.
    pub fn original(&self) -> Option<&Record> {
        self.original.as_ref()
    }

    pub fn errors(&self) -> &FxHashMap<String, String> {
        &self.errors
    }

    pub fn error_for(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }
}

/// Page data an operation needs to resolve rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditContext<'a> {
    pub records: &'a [Record],
    /// Selected page-relative row indexes.
    pub selected: &'a [usize],
}

/// Record mutation for the data pipeline to persist.
#[derive(Debug, Clone, PartialEq)]
pub enum EditCommand {
    /// `index` is page-relative; `None` appends.
    Insert { record: Record, index: Option<usize> },
    Update { key_field: String, record: Record, row_index: usize },
    Delete { key_field: String, keys: Vec<Value>, records: Vec<Record> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    Applied,
    /// Persist the command, then report back with `finish_save` /
    /// `finish_delete`, or `abort_save` on failure.
    Ready(EditCommand),
    /// A begin event was vetoed.
    Canceled,
    /// The confirmation was declined.
    Declined,
    /// Validation failed; messages are on the session.
    Invalid,
}

/// Deferred focus move for the host to apply after layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FocusRequest {
    EditField { field: String },
    Cell { row_index: usize, field: Option<String> },
}

#[derive(Debug)]
struct Pending {
    request_type: RequestType,
    data: Record,
    resume_state: EditState,
    resume_session: Option<EditSession>,
    /// Saving the open session closes it on success.
    closes_session: bool,
    focus_field: Option<String>,
}

fn same_value(a: &Value, b: &Value) -> bool {
    a == b || (!a.is_null() && !b.is_null() && value_to_text(a) == value_to_text(b))
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct EditEngine {
    settings: EditSettings,
    events: EventBus,
    localizer: Arc<dyn Localizer>,
    confirm: Arc<dyn Confirm>,
    dialogs: DialogGate,
    columns: ColumnModel,
    rules: ValidationRuleSet,
    state: EditState,
    session: Option<EditSession>,
    /// Persistent-add draft put aside while a row is edited.
    suspended: Option<EditSession>,
    pending: Option<Pending>,
    focus: VecDeque<FocusRequest>,
    focus_last_field: bool,
}

impl EditEngine {
    pub fn new(
        settings: EditSettings,
        events: EventBus,
        localizer: Arc<dyn Localizer>,
        confirm: Arc<dyn Confirm>,
    ) -> Self {
        EditEngine {
            settings,
            events,
            localizer,
            confirm,
            dialogs: DialogGate::new(),
            columns: ColumnModel::default(),
            rules: ValidationRuleSet::default(),
            state: EditState::Idle,
            session: None,
            suspended: None,
            pending: None,
            focus: VecDeque::new(),
            focus_last_field: false,
        }
    }

    pub fn settings(&self) -> &EditSettings {
        &self.settings
    }

    pub fn state(&self) -> EditState {
        self.state
    }

    pub fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    pub fn rules(&self) -> &ValidationRuleSet {
        &self.rules
    }

    pub fn dialogs(&self) -> &DialogGate {
        &self.dialogs
    }

    /// True while a row is being added or edited (a pristine persistent
    /// draft does not count).
    pub fn is_editing(&self) -> bool {
        match self.state {
            EditState::Adding | EditState::Editing => true,
            EditState::PersistentAdd => self.is_dirty(),
            _ => false,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.session.as_ref().map_or(false, |s| s.dirty)
    }

    /// Replace the column model and recompile validation rules.
    pub fn set_columns(&mut self, columns: ColumnModel) {
        self.rules = ValidationRuleSet::compile(&columns);
        self.columns = columns;
        log_debug!("EDIT", "validation rules compiled for {} field(s)", self.rules.fields().len());
        if self.state == EditState::Idle {
            self.arm_persistent_add();
        }
    }

    /// Next deferred focus move, in request order.
    pub fn take_focus_request(&mut self) -> Option<FocusRequest> {
        self.focus.pop_front()
    }

    /// Focus the last editable field of the next row opened for editing.
    pub fn request_focus_last_field(&mut self) {
        self.focus_last_field = true;
    }

    // ------------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------------

    fn is_idle_like(&self) -> bool {
        match self.state {
            EditState::Idle => true,
            EditState::PersistentAdd => !self.is_dirty(),
            _ => false,
        }
    }

    fn has_open_session(&self) -> bool {
        matches!(self.state, EditState::Adding | EditState::Editing | EditState::PersistentAdd)
            && self.session.is_some()
    }

    fn invalid(&self, operation: &'static str) -> EditError {
        log_warn!("EDIT", "cannot {} while {:?}", operation, self.state);
        EditError::InvalidState { operation, state: self.state }
    }

    fn key_field(&self) -> Result<String, EditError> {
        match self.columns.primary_key_field() {
            Some(field) => Ok(field.to_string()),
            None => {
                log_warn!("EDIT", "no primary key column; edit operations are unavailable");
                Err(EditError::MissingPrimaryKey)
            }
        }
    }

    /// Record holding every declared default. String columns store the
    /// default's text form.
    fn default_record(&self) -> Record {
        let mut record = Record::new();
        for column in &self.columns.leaves {
            let (Some(field), Some(default)) = (column.field.as_deref(), column.default_value.as_ref()) else {
                continue;
            };
            let value = match column.column_type {
                Some(ColumnType::String) => Value::String(value_to_text(default)),
                _ => default.clone(),
            };
            set_field(&mut record, field, value);
        }
        record
    }

    fn insert_position(&self, index: Option<usize>) -> Option<usize> {
        index.or(match self.settings.new_row_position {
            NewRowPosition::Top => Some(0),
            NewRowPosition::Bottom => None,
        })
    }

    fn new_draft(&self, index: Option<usize>) -> EditSession {
        EditSession::open(
            EditMode::Add,
            self.insert_position(index),
            next_uid("grid-add-row"),
            self.default_record(),
            None,
        )
    }

    fn arm_persistent_add(&mut self) {
        let armed = self.settings.show_add_new_row
            && self.settings.allow_add
            && self.columns.primary_key().is_some();
        if armed {
            let mut draft = self.new_draft(None);
            draft.persistent = true;
            self.session = Some(draft);
            self.state = EditState::PersistentAdd;
        } else {
            self.session = None;
            self.state = EditState::Idle;
        }
    }

    /// Back to rest: a suspended draft, a fresh persistent draft, or idle.
    fn settle(&mut self) {
        match self.suspended.take() {
            Some(draft) => {
                self.session = Some(draft);
                self.state = EditState::PersistentAdd;
            }
            None => self.arm_persistent_add(),
        }
    }

    fn park(&mut self, request_type: RequestType, data: Record, closes_session: bool, focus_field: Option<String>) {
        let resume_session = if closes_session { self.session.take() } else { self.session.clone() };
        self.pending = Some(Pending {
            request_type,
            data,
            resume_state: self.state,
            resume_session,
            closes_session,
            focus_field,
        });
        self.state = EditState::Saving;
    }

    fn take_pending(&mut self, operation: &'static str) -> Result<Pending, EditError> {
        if self.state != EditState::Saving {
            return Err(self.invalid(operation));
        }
        self.pending.take().ok_or_else(|| self.invalid(operation))
    }

    // ------------------------------------------------------------------------
    // Opening sessions
    // ------------------------------------------------------------------------

    /// Open the row at `index` (or the first selected row) for editing.
    pub fn edit_row(&mut self, index: Option<usize>, ctx: EditContext<'_>) -> Result<EditOutcome, EditError> {
        if !self.is_idle_like() {
            return Err(self.invalid("edit a row"));
        }
        let key_field = self.key_field()?;
        if !self.settings.allow_edit {
            return Err(EditError::NotAllowed("editing"));
        }
        let row_index = index
            .or_else(|| ctx.selected.first().copied())
            .ok_or(EditError::NoRowSelected)?;
        let record = ctx.records.get(row_index).ok_or(EditError::RowOutOfRange(row_index))?;

        if !self.events.begin(BeginEvent::RowEditStart { row_index, record: record.clone() }) {
            log_debug!("EDIT", "edit of row {} canceled by observer", row_index);
            return Ok(EditOutcome::Canceled);
        }

        if self.state == EditState::PersistentAdd {
            self.suspended = self.session.take();
        }
        let row_uid = value_to_text(&field_value(record, &key_field));
        self.session = Some(EditSession::open(
            EditMode::Edit,
            Some(row_index),
            row_uid,
            record.clone(),
            Some(record.clone()),
        ));
        self.state = EditState::Editing;

        let from_end = std::mem::take(&mut self.focus_last_field);
        if let Some(field) = first_focus_field(&self.columns, EditMode::Edit, from_end) {
            self.focus.push_back(FocusRequest::EditField { field });
        }
        self.events.emit(GridEvent::RowEditStarted { row_index });
        log_info!("EDIT", "editing row {}", row_index);
        Ok(EditOutcome::Applied)
    }

    /// With `data`, hand out an insert command directly. Without, open an add
    /// session seeded with column defaults.
    pub fn add_record(&mut self, data: Option<Record>, index: Option<usize>) -> Result<EditOutcome, EditError> {
        if !self.is_idle_like() {
            return Err(self.invalid("add a record"));
        }
        if !self.settings.allow_add {
            return Err(EditError::NotAllowed("adding"));
        }
        self.key_field()?;

        if let Some(record) = data {
            if !self.events.begin(BeginEvent::RowAddStart { record: record.clone() }) {
                return Ok(EditOutcome::Canceled);
            }
            let index = self.insert_position(index);
            self.park(RequestType::Add, record.clone(), false, None);
            log_info!("EDIT", "inserting record directly at {:?}", index);
            return Ok(EditOutcome::Ready(EditCommand::Insert { record, index }));
        }

        if self.state == EditState::PersistentAdd {
            if let Some(field) = first_focus_field(&self.columns, EditMode::Add, false) {
                self.focus.push_back(FocusRequest::EditField { field });
            }
            return Ok(EditOutcome::Applied);
        }

        let draft = self.new_draft(index);
        if !self.events.begin(BeginEvent::RowAddStart { record: draft.data.clone() }) {
            return Ok(EditOutcome::Canceled);
        }
        self.session = Some(draft);
        self.state = EditState::Adding;
        if let Some(field) = first_focus_field(&self.columns, EditMode::Add, false) {
            self.focus.push_back(FocusRequest::EditField { field });
        }
        self.events.emit(GridEvent::RowAddStarted);
        log_info!("EDIT", "add session opened");
        Ok(EditOutcome::Applied)
    }

    // ------------------------------------------------------------------------
    // Working copy
    // ------------------------------------------------------------------------

    /// Set one field of the working copy. Fields already showing an error
    /// are re-validated.
    pub fn update_edit_data(&mut self, field: &str, value: Value) -> Result<(), EditError> {
        if !self.has_open_session() {
            return Err(EditError::NoSession);
        }
        let Some(session) = self.session.as_mut() else {
            return Err(EditError::NoSession);
        };
        set_field(&mut session.data, field, value);
        session.dirty = session.data != session.baseline;
        if session.errors.contains_key(field) {
            match self.rules.validate_field(field, &session.data) {
                Some(message) => {
                    session.errors.insert(field.to_string(), message);
                }
                None => {
                    session.errors.remove(field);
                }
            }
        }
        Ok(())
    }

    /// Set a field from editor text, parsed through the column's parser.
    pub fn update_edit_text(&mut self, field: &str, text: &str) -> Result<(), EditError> {
        let value = match self.columns.leaf_by_field(field).and_then(|c| c.parser.as_ref()) {
            Some(parser) => parser.parse(text),
            None => Value::String(text.to_string()),
        };
        self.update_edit_data(field, value)
    }

    /// Validate one field of the working copy. True when valid or when no
    /// session is open.
    pub fn validate_field(&mut self, field: &str) -> bool {
        let Some(session) = self.session.as_mut() else {
            return true;
        };
        match self.rules.validate_field(field, &session.data) {
            Some(message) => {
                session.errors.insert(field.to_string(), message);
                false
            }
            None => {
                session.errors.remove(field);
                true
            }
        }
    }

    pub fn validate_edit_form(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return true;
        };
        session.errors = self.rules.validate(&session.data);
        session.errors.is_empty()
    }

    // ------------------------------------------------------------------------
    // Save / cancel
    // ------------------------------------------------------------------------

    /// Confirm, validate and hand out the insert or update for the open
    /// session. `direction` picks the saved row's cell that gets focus.
    pub async fn save_changes(&mut self, direction: Option<TabDirection>) -> Result<EditOutcome, EditError> {
        if !self.has_open_session() {
            return Err(self.invalid("save"));
        }
        let key_field = self.key_field()?;

        if self.settings.confirm_on_edit {
            let request = DialogRequest::save(self.localizer.as_ref());
            if !self.dialogs.ask(self.confirm.as_ref(), request).await? {
                log_debug!("EDIT", "save declined");
                return Ok(EditOutcome::Declined);
            }
        }

        let resume = self.state;
        self.state = EditState::Validating;
        let valid = self.validate_edit_form();
        self.state = resume;
        if !valid {
            log_debug!("EDIT", "save blocked by validation");
            return Ok(EditOutcome::Invalid);
        }

        let session = self.session.as_ref().ok_or(EditError::NoSession)?;
        let data = session.data.clone();
        let (request_type, command) = match session.mode {
            EditMode::Add => (
                RequestType::Add,
                EditCommand::Insert { record: data.clone(), index: session.row_index },
            ),
            EditMode::Edit => (
                RequestType::Save,
                EditCommand::Update {
                    key_field,
                    record: data.clone(),
                    row_index: session.row_index.unwrap_or_default(),
                },
            ),
        };
        let begin = BeginEvent::Saving {
            request_type,
            data: data.clone(),
            previous: session.original.clone(),
        };
        if !self.events.begin(begin) {
            return Ok(EditOutcome::Canceled);
        }

        let focus_field = direction.and_then(|d| {
            let fields = editable_fields(&self.columns, EditMode::Edit);
            match d {
                TabDirection::Forward => fields.last().cloned(),
                TabDirection::Backward => fields.first().cloned(),
            }
        });
        self.park(request_type, data, true, focus_field);
        log_info!("EDIT", "save ready ({:?})", request_type);
        Ok(EditOutcome::Ready(command))
    }

    /// Discard the open session. Dirty sessions ask first when
    /// `confirm_on_edit` is set.
    pub async fn cancel_changes(&mut self) -> Result<EditOutcome, EditError> {
        if !self.has_open_session() {
            return Err(self.invalid("cancel"));
        }
        let (dirty, row_index) = match self.session.as_ref() {
            Some(s) => (s.dirty, if s.mode == EditMode::Edit { s.row_index } else { None }),
            None => return Err(EditError::NoSession),
        };
        if dirty && self.settings.confirm_on_edit {
            let request = DialogRequest::cancel_edit(self.localizer.as_ref());
            if !self.dialogs.ask(self.confirm.as_ref(), request).await? {
                return Ok(EditOutcome::Declined);
            }
        }
        self.discard(row_index);
        if let Some(row_index) = row_index {
            self.focus.push_back(FocusRequest::Cell { row_index, field: None });
        }
        Ok(EditOutcome::Applied)
    }

    fn discard(&mut self, row_index: Option<usize>) {
        self.state = EditState::Cancelling;
        self.session = None;
        self.events.emit(GridEvent::EditCancelled { row_index });
        self.settle();
        log_info!("EDIT", "edit session discarded");
    }

    /// True when navigation may proceed. A dirty session prompts first (when
    /// `confirm_on_edit` is set); proceeding discards it.
    pub async fn check_unsaved_changes(&mut self) -> Result<bool, EditError> {
        if !self.has_open_session() {
            return Ok(true);
        }
        let (dirty, row_index) = match self.session.as_ref() {
            Some(s) => (s.dirty, if s.mode == EditMode::Edit { s.row_index } else { None }),
            None => return Ok(true),
        };
        if self.state == EditState::PersistentAdd && !dirty {
            return Ok(true);
        }
        if dirty && self.settings.confirm_on_edit {
            let request = DialogRequest::unsaved_changes(self.localizer.as_ref());
            if !self.dialogs.ask(self.confirm.as_ref(), request).await? {
                return Ok(false);
            }
        }
        self.discard(row_index);
        Ok(true)
    }

    /// Tab handling for the edit form. At the form's edge the key press is
    /// turned into exactly one save.
    pub async fn handle_tab(&mut self, field: &str, direction: TabDirection) -> Result<TabOutcome, EditError> {
        if !self.has_open_session() {
            return Ok(TabOutcome::Continue);
        }
        let Some(mode) = self.session.as_ref().map(|s| s.mode) else {
            return Ok(TabOutcome::Continue);
        };
        let fields = editable_fields(&self.columns, mode);
        if !is_boundary(&fields, field, direction) {
            return Ok(TabOutcome::Continue);
        }
        log_debug!("EDIT", "tab {:?} from '{}' leaves the form; saving", direction, field);
        Ok(TabOutcome::Saved(self.save_changes(Some(direction)).await?))
    }

    // ------------------------------------------------------------------------
    // Direct record operations
    // ------------------------------------------------------------------------

    /// Delete records whose `field` (default: the key) equals `value`, or the
    /// selected records when no value is given.
    pub async fn delete_record(
        &mut self,
        field: Option<&str>,
        value: Option<Value>,
        ctx: EditContext<'_>,
    ) -> Result<EditOutcome, EditError> {
        if !self.is_idle_like() {
            return Err(self.invalid("delete"));
        }
        let key_field = self.key_field()?;
        if !self.settings.allow_delete {
            return Err(EditError::NotAllowed("deleting"));
        }

        let records: Vec<Record> = match value.as_ref() {
            Some(value) => {
                let field = field.unwrap_or(&key_field);
                ctx.records
                    .iter()
                    .filter(|r| same_value(&field_value(r, field), value))
                    .cloned()
                    .collect()
            }
            None => ctx
                .selected
                .iter()
                .filter_map(|i| ctx.records.get(*i))
                .cloned()
                .collect(),
        };
        let mut keys: Vec<Value> = records.iter().map(|r| field_value(r, &key_field)).collect();
        if keys.is_empty() && field.map_or(true, |f| f == key_field) {
            // key not on the current page
            keys.extend(value);
        }
        if keys.is_empty() {
            return Err(EditError::NoRowSelected);
        }

        if self.settings.confirm_on_delete {
            let request = DialogRequest::delete(self.localizer.as_ref());
            if !self.dialogs.ask(self.confirm.as_ref(), request).await? {
                return Ok(EditOutcome::Declined);
            }
        }
        if !self.events.begin(BeginEvent::RowDeleteStart { records: records.clone() }) {
            return Ok(EditOutcome::Canceled);
        }
        self.park(RequestType::Delete, Record::new(), false, None);
        log_info!("EDIT", "delete ready for {} key(s)", keys.len());
        Ok(EditOutcome::Ready(EditCommand::Delete { key_field, keys, records }))
    }

    /// Merge `data` into the record at `index` and hand out the update.
    pub fn update_row(&mut self, index: usize, data: Record, ctx: EditContext<'_>) -> Result<EditOutcome, EditError> {
        if !self.is_idle_like() {
            return Err(self.invalid("update a row"));
        }
        let key_field = self.key_field()?;
        let original = ctx.records.get(index).ok_or(EditError::RowOutOfRange(index))?;
        let mut merged = original.clone();
        for (k, v) in data {
            merged.insert(k, v);
        }
        let begin = BeginEvent::Saving {
            request_type: RequestType::Save,
            data: merged.clone(),
            previous: Some(original.clone()),
        };
        if !self.events.begin(begin) {
            return Ok(EditOutcome::Canceled);
        }
        self.park(RequestType::Save, merged.clone(), false, None);
        Ok(EditOutcome::Ready(EditCommand::Update { key_field, record: merged, row_index: index }))
    }

    // ------------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------------

    /// The handed-out insert/update was persisted. `saved_row` is where the
    /// record landed on the reloaded page, if it is visible.
    pub fn finish_save(&mut self, saved_row: Option<usize>) -> Result<(), EditError> {
        let pending = self.take_pending("finish saving")?;
        self.events.emit(GridEvent::Saved {
            request_type: pending.request_type,
            data: pending.data,
        });
        if pending.closes_session {
            self.session = None;
            self.settle();
            if let Some(row_index) = saved_row {
                self.focus.push_back(FocusRequest::Cell { row_index, field: pending.focus_field });
            }
        } else {
            self.state = pending.resume_state;
            self.session = pending.resume_session;
        }
        log_info!("EDIT", "save completed; state {:?}", self.state);
        Ok(())
    }

    /// The handed-out delete was persisted.
    pub fn finish_delete(&mut self, removed: Vec<Record>) -> Result<(), EditError> {
        let pending = self.take_pending("finish deleting")?;
        self.events.emit(GridEvent::Deleted { records: removed });
        self.state = pending.resume_state;
        self.session = pending.resume_session;
        Ok(())
    }

    /// Persisting failed: return to the state before the command was issued.
    pub fn abort_save(&mut self) -> Result<(), EditError> {
        let pending = self.take_pending("abort saving")?;
        self.state = pending.resume_state;
        self.session = pending.resume_session;
        log_warn!("EDIT", "persist failed; back to {:?}", self.state);
        Ok(())
    }
}
