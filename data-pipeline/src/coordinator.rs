//! FILENAME: data-pipeline/src/coordinator.rs
//! PURPOSE: Turns grid actions into queries and reconciles their results.
//! CONTEXT: Every public operation raises its cancelable begin event, folds
//! the action into a candidate `QueryState`, and runs it. A run issues a
//! generation-stamped ticket, awaits the data source, and completes the
//! ticket: stale tickets are dropped, an empty page with a positive count is
//! redirected to the last valid page, anything else is committed.

use crate::error::{PipelineError, SourceError};
use crate::query::{
    DataPage, FilterOperator, FilterPredicate, Paging, PredicateLogic, Query, QueryAction, SearchQuery,
    SortDescriptor,
};
use crate::selection::RowSelection;
use crate::settings::PipelineSettings;
use crate::source::DataSource;
use engine::{
    compile, infer_declarations, log_debug, log_error, log_info, log_warn, BeginEvent, ColumnModel,
    CompiledColumn, EventBus, GridEvent, Record, RequestType, SortDirection,
};
use serde_json::Value;
use std::sync::Arc;

// ============================================================================
// TYPES
// ============================================================================

/// Sort, filter, search and page state the next query is built from.
#[derive(Debug, Clone, PartialEq)]
struct QueryState {
    current_page: usize,
    sorts: Vec<SortDescriptor>,
    filters: Vec<FilterPredicate>,
    search_key: String,
}

/// An issued query awaiting its result.
#[derive(Debug, Clone)]
pub struct QueryTicket {
    generation: u64,
    action: QueryAction,
    query: Query,
}

impl QueryTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn action(&self) -> &QueryAction {
        &self.action
    }

    pub fn query(&self) -> &Query {
        &self.query
    }
}

/// What `complete` did with a result.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Committed,
    /// A newer ticket was issued; the result was discarded.
    Stale,
    /// Empty page past the end; re-run with this paging action.
    Redirect(QueryAction),
}

/// Result of a public pipeline operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Committed,
    /// A begin event was vetoed.
    Canceled,
    /// Disabled feature, disallowed column or no-op request.
    Ignored,
    Stale,
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct DataPipeline {
    source: Arc<dyn DataSource>,
    events: EventBus,
    settings: PipelineSettings,
    columns: ColumnModel,
    state: QueryState,
    generation: u64,
    last_action: Option<QueryAction>,
    page: DataPage,
    total_count: usize,
    selection: RowSelection,
    loaded: bool,
}

impl DataPipeline {
    pub fn new(source: Arc<dyn DataSource>, settings: PipelineSettings, events: EventBus) -> Self {
        let state = QueryState {
            current_page: settings.page.current_page.max(1),
            sorts: settings.sort.columns.clone(),
            filters: settings.filter.columns.clone(),
            search_key: settings.search.key.clone(),
        };
        DataPipeline {
            source,
            events,
            selection: RowSelection::new(settings.selection.mode),
            settings,
            columns: ColumnModel::default(),
            state,
            generation: 0,
            last_action: None,
            page: DataPage::default(),
            total_count: 0,
            loaded: false,
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn columns(&self) -> &ColumnModel {
        &self.columns
    }

    /// Replace the column model. Re-querying is the caller's decision.
    pub fn set_columns(&mut self, columns: ColumnModel) {
        self.columns = columns;
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn records(&self) -> &[Record] {
        &self.page.result
    }

    /// The committed page, including pass-through aggregates.
    pub fn page(&self) -> &DataPage {
        &self.page
    }

    pub fn current_page(&self) -> usize {
        self.state.current_page
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn total_pages(&self) -> usize {
        if !self.settings.page.enabled {
            return 1;
        }
        pages_for(self.total_count, self.settings.page.page_size)
    }

    pub fn sorts(&self) -> &[SortDescriptor] {
        &self.state.sorts
    }

    pub fn filters(&self) -> &[FilterPredicate] {
        &self.state.filters
    }

    pub fn search_key(&self) -> &str {
        &self.state.search_key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_action(&self) -> Option<&QueryAction> {
        self.last_action.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Absolute index of the first record on the current page.
    pub fn page_offset(&self) -> usize {
        if self.settings.page.enabled {
            (self.state.current_page - 1) * self.settings.page.page_size
        } else {
            0
        }
    }

    // ------------------------------------------------------------------------
    // Query building
    // ------------------------------------------------------------------------

    fn query_for(&self, state: &QueryState) -> Query {
        let paging = if self.settings.page.enabled {
            Some(Paging {
                page: state.current_page,
                size: self.settings.page.page_size,
            })
        } else {
            None
        };

        let search = if state.search_key.is_empty() {
            None
        } else {
            let fields = if self.settings.search.fields.is_empty() {
                self.columns
                    .leaves
                    .iter()
                    .filter(|c| c.allow_search)
                    .filter_map(|c| c.field.clone())
                    .collect()
            } else {
                self.settings.search.fields.clone()
            };
            Some(SearchQuery {
                term: state.search_key.clone(),
                fields,
                operator: self.settings.search.operator,
                case_sensitive: self.settings.search.case_sensitive,
                ignore_accent: self.settings.search.ignore_accent,
            })
        };

        Query {
            paging,
            sorts: state.sorts.clone(),
            filters: state.filters.clone(),
            search,
            requires_count: self.settings.page.enabled,
        }
    }

    /// Query for the current state.
    pub fn build_query(&self) -> Query {
        self.query_for(&self.state)
    }

    // ------------------------------------------------------------------------
    // Issue / complete
    // ------------------------------------------------------------------------

    /// Stamp a new generation and build the query for `action`. Any ticket
    /// issued earlier becomes stale.
    pub fn issue(&mut self, action: QueryAction) -> QueryTicket {
        self.generation += 1;
        let query = self.build_query();
        log_debug!(
            "PIPELINE",
            "issue gen={} action={:?} page={}",
            self.generation,
            action.request_type(),
            self.state.current_page
        );
        QueryTicket {
            generation: self.generation,
            action,
            query,
        }
    }

    /// Reconcile a data source result with the ticket it answers.
    pub fn complete(
        &mut self,
        ticket: QueryTicket,
        result: Result<DataPage, SourceError>,
    ) -> Result<Completion, PipelineError> {
        if ticket.generation != self.generation {
            log_debug!(
                "PIPELINE",
                "dropping stale result gen={} current={}",
                ticket.generation,
                self.generation
            );
            return Ok(Completion::Stale);
        }

        let page = match result {
            Ok(page) => page,
            Err(e) => return Err(self.fail(e)),
        };

        let request_type = ticket.action.request_type();
        let count = page.total_count();
        if page.result.is_empty()
            && count > 0
            && self.settings.page.enabled
            && request_type != RequestType::Paging
        {
            if matches!(
                request_type,
                RequestType::Filtering | RequestType::ClearFiltering | RequestType::Searching
            ) {
                self.emit_completed(&ticket.action);
            }
            let last = pages_for(count, self.settings.page.page_size);
            let previous = self.state.current_page;
            self.state.current_page = last;
            log_info!(
                "PIPELINE",
                "page {} is past the end of {} records; moving to page {}",
                previous,
                count,
                last
            );
            return Ok(Completion::Redirect(QueryAction::Paging {
                current_page: last,
                previous_page: previous,
            }));
        }

        self.commit(ticket.action, page);
        Ok(Completion::Committed)
    }

    fn fail(&self, error: SourceError) -> PipelineError {
        log_error!("PIPELINE", "data source failed: {}", error);
        self.events.emit(GridEvent::Error {
            message: error.to_string(),
        });
        PipelineError::Source(error)
    }

    fn commit(&mut self, action: QueryAction, page: DataPage) {
        self.total_count = page.total_count();
        self.selection.clear();

        if let Some(first) = page.result.first() {
            if self.columns.leaves.is_empty() {
                self.columns = compile(&infer_declarations(first), None);
            }
            if !self.columns.types_inferred() {
                self.columns.infer_types(first);
            }
        }

        let rows = page.result.len();
        self.page = page;
        self.last_action = Some(action.clone());
        log_debug!(
            "PIPELINE",
            "commit gen={} rows={} total={}",
            self.generation,
            rows,
            self.total_count
        );

        self.events.emit(GridEvent::DataLoaded {
            total_count: self.total_count,
            rows,
        });
        if !self.loaded {
            self.loaded = true;
            self.events.emit(GridEvent::RenderComplete);
        }
        self.emit_completed(&action);
        self.events.emit(GridEvent::ActionComplete {
            request_type: action.request_type(),
        });
    }

    fn emit_completed(&self, action: &QueryAction) {
        let event = match action {
            QueryAction::Paging {
                current_page,
                previous_page,
            } => GridEvent::PageChanged {
                current_page: *current_page,
                previous_page: *previous_page,
            },
            QueryAction::Sorting { field, .. } => GridEvent::Sorted {
                field: Some(field.clone()),
            },
            QueryAction::ClearSorting { field } => GridEvent::Sorted { field: field.clone() },
            QueryAction::Filtering { .. } | QueryAction::ClearFiltering { .. } => GridEvent::Filtered {
                field: action.field().map(str::to_string),
            },
            QueryAction::Searching { term } => GridEvent::Searched { term: term.clone() },
            QueryAction::Refresh => GridEvent::Refreshed,
            QueryAction::Reload { .. } => return,
        };
        self.events.emit(event);
    }

    /// Adopt `next` and run `action` through to commit, following overflow
    /// redirects. A failed query puts the previous state back, so the query
    /// state always describes the page in `records`.
    async fn run(&mut self, action: QueryAction, next: QueryState) -> Result<ActionOutcome, PipelineError> {
        if !self.events.begin(BeginEvent::DataLoadStart {
            request_type: action.request_type(),
        }) {
            log_info!("PIPELINE", "data load for {:?} canceled", action.request_type());
            return Ok(ActionOutcome::Canceled);
        }
        let previous = std::mem::replace(&mut self.state, next);

        let mut ticket = self.issue(action);
        loop {
            let result = self.source.execute(ticket.query()).await;
            match self.complete(ticket, result) {
                Ok(Completion::Committed) => return Ok(ActionOutcome::Committed),
                Ok(Completion::Stale) => return Ok(ActionOutcome::Stale),
                Ok(Completion::Redirect(redirect)) => ticket = self.issue(redirect),
                Err(e) => {
                    log_debug!("PIPELINE", "restoring query state after failed load");
                    self.state = previous;
                    return Err(e);
                }
            }
        }
    }

    fn column_allows(&self, field: &str, flag: fn(&CompiledColumn) -> bool) -> bool {
        if self.columns.leaves.is_empty() {
            return true;
        }
        match self.columns.leaf_by_field(field) {
            Some(column) => flag(column),
            None => {
                log_warn!("PIPELINE", "no column bound to field '{}'", field);
                false
            }
        }
    }

    // ------------------------------------------------------------------------
    // Public operations
    // ------------------------------------------------------------------------

    /// Initial load of the current query state.
    pub async fn load(&mut self) -> Result<ActionOutcome, PipelineError> {
        let next = self.state.clone();
        self.run(
            QueryAction::Reload {
                request_type: RequestType::Refresh,
            },
            next,
        )
        .await
    }

    pub async fn go_to_page(&mut self, page: usize) -> Result<ActionOutcome, PipelineError> {
        let previous = self.state.current_page;
        if !self.settings.page.enabled
            || page == 0
            || page == previous
            || (self.loaded && page > self.total_pages())
        {
            log_debug!("PIPELINE", "go_to_page {} ignored (current={})", page, previous);
            return Ok(ActionOutcome::Ignored);
        }
        if !self.events.begin(BeginEvent::PageChanging {
            current_page: page,
            previous_page: previous,
        }) {
            return Ok(ActionOutcome::Canceled);
        }

        let mut next = self.state.clone();
        next.current_page = page;
        self.run(
            QueryAction::Paging {
                current_page: page,
                previous_page: previous,
            },
            next,
        )
        .await
    }

    /// Sort by a column. `multi` adds to (or updates within) the existing
    /// sort order instead of replacing it.
    pub async fn sort_by_column(
        &mut self,
        field: &str,
        direction: SortDirection,
        multi: bool,
    ) -> Result<ActionOutcome, PipelineError> {
        if !self.settings.sort.enabled || !self.column_allows(field, |c| c.allow_sort) {
            log_debug!("PIPELINE", "sort on '{}' not allowed", field);
            return Ok(ActionOutcome::Ignored);
        }
        if !self.events.begin(BeginEvent::Sorting {
            field: Some(field.to_string()),
            direction: Some(direction),
        }) {
            return Ok(ActionOutcome::Canceled);
        }

        let mut next = self.state.clone();
        if multi {
            match next.sorts.iter_mut().find(|s| s.field == field) {
                Some(existing) => existing.direction = direction,
                None => next.sorts.push(SortDescriptor::new(field, direction)),
            }
        } else {
            next.sorts = vec![SortDescriptor::new(field, direction)];
        }
        self.run(
            QueryAction::Sorting {
                field: field.to_string(),
                direction,
                multi,
            },
            next,
        )
        .await
    }

    pub async fn remove_sort_column(&mut self, field: &str) -> Result<ActionOutcome, PipelineError> {
        if !self.state.sorts.iter().any(|s| s.field == field) {
            return Ok(ActionOutcome::Ignored);
        }
        if !self.events.begin(BeginEvent::Sorting {
            field: Some(field.to_string()),
            direction: None,
        }) {
            return Ok(ActionOutcome::Canceled);
        }
        let mut next = self.state.clone();
        next.sorts.retain(|s| s.field != field);
        self.run(
            QueryAction::ClearSorting {
                field: Some(field.to_string()),
            },
            next,
        )
        .await
    }

    pub async fn clear_sort(&mut self) -> Result<ActionOutcome, PipelineError> {
        if self.state.sorts.is_empty() {
            return Ok(ActionOutcome::Ignored);
        }
        if !self.events.begin(BeginEvent::Sorting {
            field: None,
            direction: None,
        }) {
            return Ok(ActionOutcome::Canceled);
        }
        let mut next = self.state.clone();
        next.sorts.clear();
        self.run(QueryAction::ClearSorting { field: None }, next).await
    }

    /// Filter a column. An `And` predicate replaces earlier predicates on the
    /// field; an `Or` predicate joins them. Case and accent sensitivity fall
    /// back to the filter settings.
    pub async fn filter_by_column(
        &mut self,
        field: &str,
        operator: FilterOperator,
        value: Value,
        predicate: PredicateLogic,
        case_sensitive: Option<bool>,
        ignore_accent: Option<bool>,
    ) -> Result<ActionOutcome, PipelineError> {
        if !self.settings.filter.enabled || !self.column_allows(field, |c| c.allow_filter) {
            log_debug!("PIPELINE", "filter on '{}' not allowed", field);
            return Ok(ActionOutcome::Ignored);
        }
        if !self.events.begin(BeginEvent::Filtering {
            field: Some(field.to_string()),
        }) {
            return Ok(ActionOutcome::Canceled);
        }

        let filter = FilterPredicate {
            field: field.to_string(),
            operator,
            value,
            predicate,
            case_sensitive: case_sensitive.unwrap_or(self.settings.filter.case_sensitive),
            ignore_accent: ignore_accent.unwrap_or(self.settings.filter.ignore_accent),
        };
        let mut next = self.state.clone();
        if predicate == PredicateLogic::And {
            next.filters.retain(|f| f.field != field);
        }
        next.filters.push(filter.clone());
        self.run(QueryAction::Filtering { predicate: filter }, next).await
    }

    /// Clear the predicates on `fields`, or all predicates when empty.
    pub async fn clear_filter(&mut self, fields: &[&str]) -> Result<ActionOutcome, PipelineError> {
        let cleared: Vec<String> = {
            let mut cleared: Vec<String> = Vec::new();
            for f in &self.state.filters {
                if (fields.is_empty() || fields.contains(&f.field.as_str())) && !cleared.contains(&f.field) {
                    cleared.push(f.field.clone());
                }
            }
            cleared
        };
        if cleared.is_empty() {
            return Ok(ActionOutcome::Ignored);
        }
        let single = if cleared.len() == 1 { Some(cleared[0].clone()) } else { None };
        if !self.events.begin(BeginEvent::Filtering { field: single }) {
            return Ok(ActionOutcome::Canceled);
        }
        let mut next = self.state.clone();
        next.filters.retain(|f| !cleared.contains(&f.field));
        self.run(QueryAction::ClearFiltering { fields: cleared }, next).await
    }

    pub async fn remove_filtered_cols_by_field(&mut self, field: &str) -> Result<ActionOutcome, PipelineError> {
        self.clear_filter(&[field]).await
    }

    pub async fn search(&mut self, term: &str) -> Result<ActionOutcome, PipelineError> {
        if !self.settings.search.enabled || term == self.state.search_key {
            return Ok(ActionOutcome::Ignored);
        }
        if !self.events.begin(BeginEvent::Searching { term: term.to_string() }) {
            return Ok(ActionOutcome::Canceled);
        }
        let mut next = self.state.clone();
        next.search_key = term.to_string();
        self.run(QueryAction::Searching { term: term.to_string() }, next).await
    }

    /// Re-run the current query.
    pub async fn refresh(&mut self) -> Result<ActionOutcome, PipelineError> {
        if !self.events.begin(BeginEvent::Refreshing) {
            return Ok(ActionOutcome::Canceled);
        }
        let next = self.state.clone();
        self.run(QueryAction::Refresh, next).await
    }

    async fn reload(&mut self, request_type: RequestType) -> Result<ActionOutcome, PipelineError> {
        let next = self.state.clone();
        self.run(QueryAction::Reload { request_type }, next).await
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    fn key_field(&self) -> Result<String, PipelineError> {
        self.columns
            .primary_key_field()
            .map(str::to_string)
            .ok_or(PipelineError::MissingPrimaryKey)
    }

    /// Insert a record at a page-relative index (appended when `None`) and
    /// reload.
    pub async fn insert(&mut self, record: Record, index: Option<usize>) -> Result<ActionOutcome, PipelineError> {
        let absolute = index.map(|i| self.page_offset() + i);
        if let Err(e) = self.source.insert(record, absolute).await {
            return Err(self.fail(e));
        }
        self.reload(RequestType::Save).await
    }

    /// Persist an edited record by primary key and reload.
    pub async fn update(&mut self, record: Record) -> Result<ActionOutcome, PipelineError> {
        let key_field = self.key_field()?;
        if let Err(e) = self.source.update(&key_field, record).await {
            return Err(self.fail(e));
        }
        self.reload(RequestType::Save).await
    }

    /// Delete records by primary key and reload. Returns the removed records.
    pub async fn remove(&mut self, keys: &[Value]) -> Result<Vec<Record>, PipelineError> {
        let key_field = self.key_field()?;
        let removed = match self.source.remove(&key_field, keys).await {
            Ok(removed) => removed,
            Err(e) => return Err(self.fail(e)),
        };
        self.reload(RequestType::Delete).await?;
        Ok(removed)
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    pub fn select_row(&mut self, index: usize, toggle: bool) {
        if index >= self.page.result.len() {
            log_debug!("PIPELINE", "select_row {} out of range", index);
            return;
        }
        self.selection.select_row(index, toggle);
    }

    pub fn select_rows(&mut self, indexes: &[usize]) {
        let len = self.page.result.len();
        let valid: Vec<usize> = indexes.iter().copied().filter(|i| *i < len).collect();
        self.selection.select_rows(&valid);
    }

    pub fn select_row_by_range(&mut self, start: usize, end: usize) {
        let len = self.page.result.len();
        if len == 0 || start >= len {
            return;
        }
        self.selection.select_range(start, end.min(len - 1));
    }

    pub fn clear_row_selection(&mut self, indexes: &[usize]) {
        self.selection.deselect(indexes);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selected_row_indexes(&self) -> Vec<usize> {
        self.selection.indexes()
    }

    pub fn selected_records(&self) -> Vec<Record> {
        self.selection
            .indexes()
            .into_iter()
            .filter_map(|i| self.page.result.get(i).cloned())
            .collect()
    }
}

fn pages_for(count: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 1;
    }
    ((count + page_size - 1) / page_size).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::SelectionMode;
    use crate::source::InMemorySource;
    use async_trait::async_trait;
    use engine::{ColumnDeclaration, ColumnType, EventRecorder};
    use serde_json::json;

    fn people() -> Vec<Record> {
        (1..=12)
            .map(|i| {
                let dept = if i % 3 == 0 { "Ops" } else { "Eng" };
                match json!({"id": i, "name": format!("P{:02}", i), "dept": dept, "salary": 50 + i}) {
                    Value::Object(m) => m,
                    _ => unreachable!(),
                }
            })
            .collect()
    }

    fn paged(size: usize) -> PipelineSettings {
        let mut settings = PipelineSettings::default();
        settings.page.enabled = true;
        settings.page.page_size = size;
        settings
    }

    fn pipeline(settings: PipelineSettings) -> (DataPipeline, Arc<InMemorySource>, EventRecorder) {
        let source = Arc::new(InMemorySource::new(people()));
        let events = EventBus::new();
        let recorder = EventRecorder::new();
        events.subscribe(recorder.clone());
        let pipeline = DataPipeline::new(source.clone(), settings, events);
        (pipeline, source, recorder)
    }

    struct FailingSource;

    #[async_trait]
    impl DataSource for FailingSource {
        async fn execute(&self, _query: &Query) -> Result<DataPage, SourceError> {
            Err(SourceError::Unavailable("connection refused".into()))
        }
        async fn insert(&self, _record: Record, _index: Option<usize>) -> Result<(), SourceError> {
            Ok(())
        }
        async fn update(&self, _key_field: &str, _record: Record) -> Result<(), SourceError> {
            Ok(())
        }
        async fn remove(&self, _key_field: &str, _keys: &[Value]) -> Result<Vec<Record>, SourceError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_initial_load_generates_and_types_columns() {
        let (mut p, _, recorder) = pipeline(paged(5));
        assert_eq!(p.load().await.unwrap(), ActionOutcome::Committed);
        assert_eq!(p.records().len(), 5);
        assert_eq!(p.total_count(), 12);
        assert_eq!(p.total_pages(), 3);

        let fields: Vec<_> = p.columns().leaves.iter().filter_map(|c| c.field.clone()).collect();
        assert_eq!(fields, vec!["id", "name", "dept", "salary"]);
        assert_eq!(p.columns().leaf_by_field("id").unwrap().column_type, Some(ColumnType::Number));
        assert!(p.columns().types_inferred());

        let events = recorder.events();
        assert_eq!(events[0], GridEvent::DataLoaded { total_count: 12, rows: 5 });
        assert_eq!(events[1], GridEvent::RenderComplete);
        assert_eq!(recorder.count(|e| *e == GridEvent::RenderComplete), 1);
    }

    #[tokio::test]
    async fn test_paging_bounds() {
        let (mut p, _, recorder) = pipeline(paged(5));
        p.load().await.unwrap();
        assert_eq!(p.go_to_page(3).await.unwrap(), ActionOutcome::Committed);
        assert_eq!(p.records().len(), 2);
        assert_eq!(p.current_page(), 3);
        assert!(recorder.events().contains(&GridEvent::PageChanged { current_page: 3, previous_page: 1 }));

        assert_eq!(p.go_to_page(4).await.unwrap(), ActionOutcome::Ignored);
        assert_eq!(p.go_to_page(0).await.unwrap(), ActionOutcome::Ignored);
        assert_eq!(p.go_to_page(3).await.unwrap(), ActionOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_page_change_can_be_vetoed() {
        let (mut p, _, recorder) = pipeline(paged(5));
        p.load().await.unwrap();
        recorder.veto_when(|e| matches!(e, BeginEvent::PageChanging { .. }));
        let generation = p.generation();
        assert_eq!(p.go_to_page(2).await.unwrap(), ActionOutcome::Canceled);
        assert_eq!(p.current_page(), 1);
        assert_eq!(p.generation(), generation);
    }

    #[tokio::test]
    async fn test_overflow_correction_moves_to_last_page() {
        let (mut p, _, recorder) = pipeline(paged(5));
        p.load().await.unwrap();
        p.go_to_page(3).await.unwrap();
        recorder.clear();

        // Ops holds 4 records: page 3 no longer exists
        let outcome = p
            .filter_by_column("dept", FilterOperator::Equal, json!("Ops"), PredicateLogic::And, None, None)
            .await
            .unwrap();
        assert_eq!(outcome, ActionOutcome::Committed);
        assert_eq!(p.current_page(), 1);
        assert_eq!(p.records().len(), 4);
        assert_eq!(p.total_count(), 4);

        let events = recorder.events();
        let filtered = events.iter().position(|e| matches!(e, GridEvent::Filtered { .. })).unwrap();
        let paged = events
            .iter()
            .position(|e| *e == GridEvent::PageChanged { current_page: 1, previous_page: 3 })
            .unwrap();
        assert!(filtered < paged);
        assert_eq!(recorder.count(|e| matches!(e, GridEvent::DataLoaded { .. })), 1);
    }

    #[tokio::test]
    async fn test_filter_to_nothing_keeps_page() {
        let (mut p, _, _) = pipeline(paged(5));
        p.load().await.unwrap();
        p.go_to_page(2).await.unwrap();
        p.filter_by_column("name", FilterOperator::Equal, json!("nobody"), PredicateLogic::And, None, None)
            .await
            .unwrap();
        assert_eq!(p.current_page(), 2);
        assert!(p.records().is_empty());
        assert_eq!(p.total_count(), 0);

        p.remove_filtered_cols_by_field("name").await.unwrap();
        assert_eq!(p.records().len(), 5);
        assert!(p.filters().is_empty());
    }

    #[tokio::test]
    async fn test_stale_results_are_dropped() {
        let (mut p, source, _) = pipeline(PipelineSettings::default());
        let first = p.issue(QueryAction::Refresh);
        let second = p.issue(QueryAction::Refresh);
        let stale_page = source.query(first.query()).unwrap();
        assert_eq!(p.complete(first, Ok(stale_page)).unwrap(), Completion::Stale);
        assert!(p.records().is_empty());

        let page = source.query(second.query()).unwrap();
        assert_eq!(p.complete(second, Ok(page)).unwrap(), Completion::Committed);
        assert_eq!(p.records().len(), 12);
    }

    #[tokio::test]
    async fn test_source_failure_emits_error() {
        let events = EventBus::new();
        let recorder = EventRecorder::new();
        events.subscribe(recorder.clone());
        let mut p = DataPipeline::new(Arc::new(FailingSource), PipelineSettings::default(), events);

        let err = p.load().await.unwrap_err();
        assert!(matches!(err, PipelineError::Source(SourceError::Unavailable(_))));
        assert_eq!(recorder.count(|e| matches!(e, GridEvent::Error { .. })), 1);
        assert!(!p.is_loaded());
    }

    /// Answers `budget` queries from `people()`, then fails every query.
    struct BudgetedSource {
        inner: InMemorySource,
        budget: std::sync::atomic::AtomicUsize,
    }

    impl BudgetedSource {
        fn new(budget: usize) -> Self {
            BudgetedSource {
                inner: InMemorySource::new(people()),
                budget: std::sync::atomic::AtomicUsize::new(budget),
            }
        }
    }

    #[async_trait]
    impl DataSource for BudgetedSource {
        async fn execute(&self, query: &Query) -> Result<DataPage, SourceError> {
            use std::sync::atomic::Ordering;
            let left = self.budget.load(Ordering::SeqCst);
            if left == 0 {
                return Err(SourceError::Unavailable("connection reset".into()));
            }
            self.budget.store(left - 1, Ordering::SeqCst);
            self.inner.query(query)
        }
        async fn insert(&self, record: Record, index: Option<usize>) -> Result<(), SourceError> {
            self.inner.insert(record, index).await
        }
        async fn update(&self, key_field: &str, record: Record) -> Result<(), SourceError> {
            self.inner.update(key_field, record).await
        }
        async fn remove(&self, key_field: &str, keys: &[Value]) -> Result<Vec<Record>, SourceError> {
            self.inner.remove(key_field, keys).await
        }
    }

    #[tokio::test]
    async fn test_failed_action_keeps_previous_state() {
        let mut p = DataPipeline::new(Arc::new(BudgetedSource::new(1)), paged(5), EventBus::new());
        p.load().await.unwrap();

        assert!(p.go_to_page(2).await.is_err());
        assert!(p
            .filter_by_column("name", FilterOperator::Equal, json!("P03"), PredicateLogic::And, None, None)
            .await
            .is_err());
        assert!(p.sort_by_column("id", SortDirection::Descending, false).await.is_err());
        assert!(p.search("P1").await.is_err());

        assert_eq!(p.current_page(), 1);
        assert!(p.filters().is_empty());
        assert!(p.sorts().is_empty());
        assert_eq!(p.search_key(), "");
        assert_eq!(p.records()[0]["id"], json!(1));
        assert_eq!(p.total_count(), 12);
    }

    #[tokio::test]
    async fn test_failed_redirect_keeps_previous_page() {
        // load, page 3, then the filter query succeeds and its redirect fails
        let mut p = DataPipeline::new(Arc::new(BudgetedSource::new(3)), paged(5), EventBus::new());
        p.load().await.unwrap();
        p.go_to_page(3).await.unwrap();

        let err = p
            .filter_by_column("dept", FilterOperator::Equal, json!("Ops"), PredicateLogic::And, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Source(_)));
        assert_eq!(p.current_page(), 3);
        assert!(p.filters().is_empty());
        assert_eq!(p.records()[0]["id"], json!(11));
    }

    #[tokio::test]
    async fn test_sorting() {
        let (mut p, _, _) = pipeline(PipelineSettings::default());
        p.set_columns(compile(
            &[
                ColumnDeclaration::new("id", "ID"),
                ColumnDeclaration::new("dept", "Dept"),
                ColumnDeclaration::new("salary", "Salary").with_allow_sort(false),
            ],
            None,
        ));
        p.load().await.unwrap();

        p.sort_by_column("dept", SortDirection::Descending, false).await.unwrap();
        p.sort_by_column("id", SortDirection::Descending, true).await.unwrap();
        assert_eq!(p.sorts().len(), 2);
        assert_eq!(p.records()[0]["id"], json!(12));
        assert_eq!(p.records()[0]["dept"], json!("Ops"));

        assert_eq!(
            p.sort_by_column("salary", SortDirection::Ascending, false).await.unwrap(),
            ActionOutcome::Ignored
        );
        assert_eq!(
            p.sort_by_column("unknown", SortDirection::Ascending, false).await.unwrap(),
            ActionOutcome::Ignored
        );

        p.remove_sort_column("dept").await.unwrap();
        assert_eq!(p.sorts(), &[SortDescriptor::new("id", SortDirection::Descending)]);
        p.clear_sort().await.unwrap();
        assert!(p.sorts().is_empty());
        assert_eq!(p.records()[0]["id"], json!(1));
        assert_eq!(p.clear_sort().await.unwrap(), ActionOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_or_predicates_and_clear() {
        let (mut p, _, _) = pipeline(PipelineSettings::default());
        p.load().await.unwrap();
        p.filter_by_column("id", FilterOperator::Equal, json!(1), PredicateLogic::And, None, None)
            .await
            .unwrap();
        p.filter_by_column("id", FilterOperator::Equal, json!(2), PredicateLogic::Or, None, None)
            .await
            .unwrap();
        assert_eq!(p.records().len(), 2);
        p.filter_by_column("id", FilterOperator::GreaterThan, json!(10), PredicateLogic::And, None, None)
            .await
            .unwrap();
        assert_eq!(p.filters().len(), 1);
        assert_eq!(p.records().len(), 2);

        assert_eq!(p.clear_filter(&[]).await.unwrap(), ActionOutcome::Committed);
        assert_eq!(p.records().len(), 12);
        assert_eq!(p.clear_filter(&[]).await.unwrap(), ActionOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_search_and_selection_reset() {
        let mut settings = PipelineSettings::default();
        settings.selection.mode = SelectionMode::Multiple;
        let (mut p, _, recorder) = pipeline(settings);
        p.load().await.unwrap();
        p.select_rows(&[0, 2, 40]);
        assert_eq!(p.selected_row_indexes(), vec![0, 2]);
        assert_eq!(p.selected_records()[1]["id"], json!(3));

        p.search("p1").await.unwrap();
        assert_eq!(p.records().len(), 3);
        assert!(p.selected_row_indexes().is_empty());
        assert!(recorder.events().contains(&GridEvent::Searched { term: "p1".into() }));
        assert_eq!(p.search("p1").await.unwrap(), ActionOutcome::Ignored);

        p.select_row_by_range(1, 9);
        assert_eq!(p.selected_row_indexes(), vec![1, 2]);
        p.clear_row_selection(&[1]);
        assert_eq!(p.selected_row_indexes(), vec![2]);
        p.clear_selection();
        assert!(p.selected_records().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let (mut p, source, recorder) = pipeline(paged(5));
        p.set_columns(compile(
            &[ColumnDeclaration::new("id", "ID").primary_key(), ColumnDeclaration::new("name", "Name")],
            None,
        ));
        p.load().await.unwrap();

        let new = match json!({"id": 13, "name": "New"}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        p.insert(new, Some(0)).await.unwrap();
        assert_eq!(p.records()[0]["id"], json!(13));
        assert_eq!(source.len(), 13);

        let patch = match json!({"id": 13, "name": "Renamed"}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        p.update(patch).await.unwrap();
        assert_eq!(p.records()[0]["name"], json!("Renamed"));

        let removed = p.remove(&[json!(13)]).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(p.total_count(), 12);
        assert!(recorder.events().contains(&GridEvent::ActionComplete { request_type: RequestType::Delete }));
    }

    #[tokio::test]
    async fn test_delete_last_row_of_last_page_moves_back() {
        let (mut p, _, _) = pipeline(paged(5));
        p.set_columns(compile(&[ColumnDeclaration::new("id", "ID").primary_key()], None));
        p.load().await.unwrap();
        p.go_to_page(3).await.unwrap();
        p.remove(&[json!(11), json!(12)]).await.unwrap();
        assert_eq!(p.current_page(), 2);
        assert_eq!(p.records().len(), 5);
    }
}
