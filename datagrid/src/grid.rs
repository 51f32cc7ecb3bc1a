//! FILENAME: datagrid/src/grid.rs
//! PURPOSE: The `Grid` aggregate: one object wiring the pipeline, the edit
//! engine, aggregates and layout around a shared event bus.
//! CONTEXT: Data actions first clear any open edit session through
//! `check_unsaved_changes`. Edit commands are persisted through the pipeline
//! and acknowledged back to the edit engine, or aborted on failure.

use crate::config::GridSettings;
use crate::error::GridError;
use aggregate_engine::{aggregates_changed, compute, AggregateRow, ResultSet, SummaryRecord};
use data_pipeline::{
    ActionOutcome, DataPipeline, DataSource, FilterOperator, PredicateLogic,
};
use edit_engine::{
    AutoConfirm, Confirm, EditCommand, EditContext, EditEngine, EditOutcome, EditState, FocusRequest,
    TabDirection, TabOutcome,
};
use engine::{
    compile, field_value, log_debug, log_info, value_to_text, ColumnDeclaration, ColumnDiff,
    ColumnModel, DefaultLocalizer, EventBus, GridObserver, Localizer, Record, SortDirection,
};
use layout_engine::{LayoutContext, RowDescriptor};
use serde_json::Value;
use std::sync::Arc;

// ============================================================================
// BUILDER
// ============================================================================

pub struct GridBuilder {
    settings: GridSettings,
    source: Arc<dyn DataSource>,
    localizer: Arc<dyn Localizer>,
    confirm: Arc<dyn Confirm>,
    events: EventBus,
}

impl GridBuilder {
    pub fn new(settings: GridSettings, source: Arc<dyn DataSource>) -> Self {
        GridBuilder {
            settings,
            source,
            localizer: Arc::new(DefaultLocalizer),
            confirm: Arc::new(AutoConfirm(true)),
            events: EventBus::new(),
        }
    }

    pub fn localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.localizer = localizer;
        self
    }

    /// Host prompt used for save, cancel and delete confirmations.
    pub fn confirm(mut self, confirm: Arc<dyn Confirm>) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn observer<O: GridObserver + 'static>(self, observer: O) -> Self {
        self.events.subscribe(observer);
        self
    }

    pub fn build(self) -> Grid {
        let model = compile(&self.settings.columns, None);
        let mut pipeline = DataPipeline::new(self.source, self.settings.pipeline_settings(), self.events.clone());
        pipeline.set_columns(model.clone());
        let mut edit = EditEngine::new(
            self.settings.edit_settings.clone(),
            self.events.clone(),
            Arc::clone(&self.localizer),
            self.confirm,
        );
        let synced = column_signature(&model);
        edit.set_columns(model);
        log_info!(
            "GRID",
            "grid built: {} declared column(s), {} aggregate row(s)",
            self.settings.columns.len(),
            self.settings.aggregates.len()
        );
        Grid {
            aggregates: self.settings.aggregates.clone(),
            settings: self.settings,
            events: self.events,
            localizer: self.localizer,
            pipeline,
            edit,
            synced,
        }
    }
}

fn column_signature(model: &ColumnModel) -> (usize, bool) {
    (model.leaf_count(), model.types_inferred())
}

// ============================================================================
// GRID
// ============================================================================

pub struct Grid {
    settings: GridSettings,
    events: EventBus,
    localizer: Arc<dyn Localizer>,
    pipeline: DataPipeline,
    edit: EditEngine,
    aggregates: Vec<AggregateRow>,
    /// Column shape last handed to the edit engine.
    synced: (usize, bool),
}

impl Grid {
    pub fn builder(settings: GridSettings, source: Arc<dyn DataSource>) -> GridBuilder {
        GridBuilder::new(settings, source)
    }

    pub fn settings(&self) -> &GridSettings {
        &self.settings
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn pipeline(&self) -> &DataPipeline {
        &self.pipeline
    }

    pub fn edit(&self) -> &EditEngine {
        &self.edit
    }

    pub fn columns(&self) -> &ColumnModel {
        self.pipeline.columns()
    }

    pub fn records(&self) -> &[Record] {
        self.pipeline.records()
    }

    pub fn current_page(&self) -> usize {
        self.pipeline.current_page()
    }

    pub fn total_count(&self) -> usize {
        self.pipeline.total_count()
    }

    pub fn edit_state(&self) -> EditState {
        self.edit.state()
    }

    /// Columns generated or typed from loaded data reach the edit engine
    /// here.
    fn sync_columns(&mut self) {
        let signature = column_signature(self.pipeline.columns());
        if signature != self.synced {
            self.edit.set_columns(self.pipeline.columns().clone());
            self.synced = signature;
        }
    }

    /// Resolve an open edit session before a data action. False when the
    /// user chose to stay.
    async fn leave_edit(&mut self) -> Result<bool, GridError> {
        let proceed = self.edit.check_unsaved_changes().await?;
        if !proceed {
            log_debug!("GRID", "data action blocked by unsaved changes");
        }
        Ok(proceed)
    }

    // ------------------------------------------------------------------------
    // Columns and aggregates
    // ------------------------------------------------------------------------

    /// Recompile columns against the current model. Only data-affecting
    /// changes re-query the source.
    pub async fn set_columns(&mut self, declarations: Vec<ColumnDeclaration>) -> Result<ColumnDiff, GridError> {
        let model = compile(&declarations, Some(self.pipeline.columns()));
        let diff = model.diff;
        self.settings.columns = declarations;
        self.synced = column_signature(&model);
        self.pipeline.set_columns(model.clone());
        self.edit.set_columns(model);

        if diff.data_affecting && self.pipeline.is_loaded() {
            log_debug!("GRID", "column change affects data; refreshing");
            self.pipeline.refresh().await?;
            self.sync_columns();
        } else if diff.display_only {
            log_debug!("GRID", "display-only column change; no re-query");
        }
        Ok(diff)
    }

    /// Replace the aggregate configuration. Returns whether summaries change.
    pub fn set_aggregates(&mut self, rows: Vec<AggregateRow>) -> bool {
        let changed = aggregates_changed(&self.aggregates, &rows);
        self.aggregates = rows.clone();
        self.settings.aggregates = rows;
        changed
    }

    /// Summary records for the committed page.
    pub fn summaries(&self) -> Vec<SummaryRecord> {
        let page = self.pipeline.page();
        let mut result = ResultSet::new(&page.result);
        if let Some(aggregates) = page.aggregates.as_ref() {
            result = result.with_aggregates(aggregates);
        }
        compute(&self.aggregates, &result)
    }

    // ------------------------------------------------------------------------
    // Layout
    // ------------------------------------------------------------------------

    fn layout_context(&self) -> LayoutContext<'_> {
        let mut ctx = LayoutContext::new(self.pipeline.columns(), self.localizer.as_ref());
        ctx.sort_enabled = self.settings.sort_settings.enabled;
        ctx.filter_bar = self.settings.filter_settings.show_filter_bar;
        ctx
    }

    pub fn header_rows(&self) -> Vec<RowDescriptor> {
        layout_engine::header_rows(&self.layout_context())
    }

    pub fn filter_row(&self) -> Option<RowDescriptor> {
        let ctx = self.layout_context();
        ctx.filter_bar.then(|| layout_engine::filter_row(&ctx))
    }

    pub fn content_rows(&self) -> Vec<RowDescriptor> {
        layout_engine::content_rows(self.pipeline.records(), &self.layout_context())
    }

    pub fn summary_rows(&self) -> Vec<RowDescriptor> {
        let summaries = self.summaries();
        // an empty page still renders its empty-state row
        let content_count = self.pipeline.records().len().max(1);
        layout_engine::summary_rows(&self.aggregates, &summaries, content_count, &self.layout_context())
    }

    // ------------------------------------------------------------------------
    // Data actions
    // ------------------------------------------------------------------------

    pub async fn load(&mut self) -> Result<ActionOutcome, GridError> {
        let outcome = self.pipeline.load().await?;
        self.sync_columns();
        Ok(outcome)
    }

    pub async fn go_to_page(&mut self, page: usize) -> Result<ActionOutcome, GridError> {
        if !self.leave_edit().await? {
            return Ok(ActionOutcome::Canceled);
        }
        let outcome = self.pipeline.go_to_page(page).await?;
        self.sync_columns();
        Ok(outcome)
    }

    pub async fn sort_by_column(
        &mut self,
        field: &str,
        direction: SortDirection,
        multi: bool,
    ) -> Result<ActionOutcome, GridError> {
        if !self.leave_edit().await? {
            return Ok(ActionOutcome::Canceled);
        }
        let outcome = self.pipeline.sort_by_column(field, direction, multi).await?;
        self.sync_columns();
        Ok(outcome)
    }

    pub async fn remove_sort_column(&mut self, field: &str) -> Result<ActionOutcome, GridError> {
        if !self.leave_edit().await? {
            return Ok(ActionOutcome::Canceled);
        }
        Ok(self.pipeline.remove_sort_column(field).await?)
    }

    pub async fn clear_sort(&mut self) -> Result<ActionOutcome, GridError> {
        if !self.leave_edit().await? {
            return Ok(ActionOutcome::Canceled);
        }
        Ok(self.pipeline.clear_sort().await?)
    }

    /// Filter with the grid's case and accent settings.
    pub async fn filter_by_column(
        &mut self,
        field: &str,
        operator: FilterOperator,
        value: Value,
    ) -> Result<ActionOutcome, GridError> {
        self.filter_by_column_with(field, operator, value, PredicateLogic::And, None, None)
            .await
    }

    pub async fn filter_by_column_with(
        &mut self,
        field: &str,
        operator: FilterOperator,
        value: Value,
        predicate: PredicateLogic,
        case_sensitive: Option<bool>,
        ignore_accent: Option<bool>,
    ) -> Result<ActionOutcome, GridError> {
        if !self.leave_edit().await? {
            return Ok(ActionOutcome::Canceled);
        }
        let outcome = self
            .pipeline
            .filter_by_column(field, operator, value, predicate, case_sensitive, ignore_accent)
            .await?;
        self.sync_columns();
        Ok(outcome)
    }

    /// Clear the given fields' filters, or every filter when empty.
    pub async fn clear_filter(&mut self, fields: &[&str]) -> Result<ActionOutcome, GridError> {
        if !self.leave_edit().await? {
            return Ok(ActionOutcome::Canceled);
        }
        Ok(self.pipeline.clear_filter(fields).await?)
    }

    pub async fn remove_filtered_cols_by_field(&mut self, field: &str) -> Result<ActionOutcome, GridError> {
        if !self.leave_edit().await? {
            return Ok(ActionOutcome::Canceled);
        }
        Ok(self.pipeline.remove_filtered_cols_by_field(field).await?)
    }

    pub async fn search(&mut self, term: &str) -> Result<ActionOutcome, GridError> {
        if !self.leave_edit().await? {
            return Ok(ActionOutcome::Canceled);
        }
        let outcome = self.pipeline.search(term).await?;
        self.sync_columns();
        Ok(outcome)
    }

    pub async fn refresh(&mut self) -> Result<ActionOutcome, GridError> {
        if !self.leave_edit().await? {
            return Ok(ActionOutcome::Canceled);
        }
        let outcome = self.pipeline.refresh().await?;
        self.sync_columns();
        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    pub fn select_row(&mut self, index: usize, toggle: bool) {
        self.pipeline.select_row(index, toggle);
    }

    pub fn select_rows(&mut self, indexes: &[usize]) {
        self.pipeline.select_rows(indexes);
    }

    pub fn select_row_by_range(&mut self, start: usize, end: usize) {
        self.pipeline.select_row_by_range(start, end);
    }

    pub fn clear_row_selection(&mut self, indexes: &[usize]) {
        self.pipeline.clear_row_selection(indexes);
    }

    pub fn clear_selection(&mut self) {
        self.pipeline.clear_selection();
    }

    pub fn selected_row_indexes(&self) -> Vec<usize> {
        self.pipeline.selected_row_indexes()
    }

    pub fn selected_records(&self) -> Vec<Record> {
        self.pipeline.selected_records()
    }

    // ------------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------------

    /// Open a row for editing: `index`, else the first selected row.
    pub async fn edit_row(&mut self, index: Option<usize>) -> Result<EditOutcome, GridError> {
        if self.edit.is_editing() && !self.leave_edit().await? {
            return Ok(EditOutcome::Declined);
        }
        let selected = self.pipeline.selected_row_indexes();
        let ctx = EditContext {
            records: self.pipeline.records(),
            selected: &selected,
        };
        Ok(self.edit.edit_row(index, ctx)?)
    }

    /// Without `data`, open an add session. With `data`, insert it directly.
    pub async fn add_record(&mut self, data: Option<Record>, index: Option<usize>) -> Result<EditOutcome, GridError> {
        if self.edit.is_editing() && !self.leave_edit().await? {
            return Ok(EditOutcome::Declined);
        }
        let outcome = self.edit.add_record(data, index)?;
        self.persist(outcome).await
    }

    pub fn update_edit_data(&mut self, field: &str, value: Value) -> Result<(), GridError> {
        Ok(self.edit.update_edit_data(field, value)?)
    }

    pub fn update_edit_text(&mut self, field: &str, text: &str) -> Result<(), GridError> {
        Ok(self.edit.update_edit_text(field, text)?)
    }

    pub fn validate_field(&mut self, field: &str) -> bool {
        self.edit.validate_field(field)
    }

    pub fn validate_edit_form(&mut self) -> bool {
        self.edit.validate_edit_form()
    }

    pub async fn save_changes(&mut self) -> Result<EditOutcome, GridError> {
        let outcome = self.edit.save_changes(None).await?;
        self.persist(outcome).await
    }

    pub async fn cancel_changes(&mut self) -> Result<EditOutcome, GridError> {
        Ok(self.edit.cancel_changes().await?)
    }

    /// Delete by `field` = `value` (key field by default), or the selected
    /// rows when no value is given.
    pub async fn delete_record(&mut self, field: Option<&str>, value: Option<Value>) -> Result<EditOutcome, GridError> {
        let selected = self.pipeline.selected_row_indexes();
        let ctx = EditContext {
            records: self.pipeline.records(),
            selected: &selected,
        };
        let outcome = self.edit.delete_record(field, value, ctx).await?;
        self.persist(outcome).await
    }

    /// Merge `data` into the record at page row `index` and persist it.
    pub async fn update_row(&mut self, index: usize, data: Record) -> Result<EditOutcome, GridError> {
        let selected = self.pipeline.selected_row_indexes();
        let ctx = EditContext {
            records: self.pipeline.records(),
            selected: &selected,
        };
        let outcome = self.edit.update_row(index, data, ctx)?;
        self.persist(outcome).await
    }

    /// Tab / Shift+Tab from `field` inside the edit form.
    pub async fn handle_tab(&mut self, field: &str, shift: bool) -> Result<TabOutcome, GridError> {
        match self.edit.handle_tab(field, TabDirection::from_shift(shift)).await? {
            TabOutcome::Saved(outcome) => Ok(TabOutcome::Saved(self.persist(outcome).await?)),
            TabOutcome::Continue => Ok(TabOutcome::Continue),
        }
    }

    pub fn take_focus_request(&mut self) -> Option<FocusRequest> {
        self.edit.take_focus_request()
    }

    pub fn request_focus_last_field(&mut self) {
        self.edit.request_focus_last_field();
    }

    async fn persist(&mut self, outcome: EditOutcome) -> Result<EditOutcome, GridError> {
        let EditOutcome::Ready(command) = outcome else {
            return Ok(outcome);
        };
        let result = match &command {
            EditCommand::Insert { record, index } => {
                self.pipeline.insert(record.clone(), *index).await.map(|_| None)
            }
            EditCommand::Update { record, .. } => self.pipeline.update(record.clone()).await.map(|_| None),
            EditCommand::Delete { keys, .. } => self.pipeline.remove(keys).await.map(Some),
        };
        match result {
            Ok(Some(removed)) => self.edit.finish_delete(removed)?,
            Ok(None) => {
                let row = self.row_of(&command);
                self.edit.finish_save(row)?;
            }
            Err(e) => {
                self.edit.abort_save()?;
                return Err(e.into());
            }
        }
        self.sync_columns();
        Ok(EditOutcome::Ready(command))
    }

    /// Page row now holding the record a command saved.
    fn row_of(&self, command: &EditCommand) -> Option<usize> {
        let record = match command {
            EditCommand::Insert { record, .. } | EditCommand::Update { record, .. } => record,
            EditCommand::Delete { .. } => return None,
        };
        let key_field = self.pipeline.columns().primary_key_field()?;
        let key = value_to_text(&field_value(record, key_field));
        self.pipeline
            .records()
            .iter()
            .position(|r| value_to_text(&field_value(r, key_field)) == key)
    }
}
