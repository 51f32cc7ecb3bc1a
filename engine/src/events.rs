//! FILENAME: engine/src/events.rs
//! PURPOSE: Grid event surface shared by the pipeline and the edit session.
//! CONTEXT: Begin events carry a cancel flag that any observer may set;
//! completion events are notifications only. Observers are registered on an
//! `EventBus`, which every subsystem holds a clone of.

use crate::value::Record;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};

/// Kind of action being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestType {
    Paging,
    Sorting,
    ClearSorting,
    Filtering,
    ClearFiltering,
    Searching,
    Refresh,
    BeginEdit,
    Add,
    Save,
    Delete,
    Cancel,
}

/// Sort order of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl Default for SortDirection {
    fn default() -> Self {
        SortDirection::Ascending
    }
}

/// Cancelable notification raised before an action takes effect.
#[derive(Debug, Clone, PartialEq)]
pub enum BeginEvent {
    PageChanging { current_page: usize, previous_page: usize },
    Sorting { field: Option<String>, direction: Option<SortDirection> },
    Filtering { field: Option<String> },
    Searching { term: String },
    Refreshing,
    DataLoadStart { request_type: RequestType },
    RowEditStart { row_index: usize, record: Record },
    RowAddStart { record: Record },
    RowDeleteStart { records: Vec<Record> },
    Saving { request_type: RequestType, data: Record, previous: Option<Record> },
}

/// Arguments handed to observers for a begin event.
#[derive(Debug, Clone, PartialEq)]
pub struct BeginArgs {
    pub event: BeginEvent,
    pub cancel: bool,
}

/// Completion notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    PageChanged { current_page: usize, previous_page: usize },
    Sorted { field: Option<String> },
    Filtered { field: Option<String> },
    Searched { term: String },
    Refreshed,
    /// A page was committed.
    DataLoaded { total_count: usize, rows: usize },
    ActionComplete { request_type: RequestType },
    /// First successful load only.
    RenderComplete,
    RowEditStarted { row_index: usize },
    RowAddStarted,
    Saved { request_type: RequestType, data: Record },
    Deleted { records: Vec<Record> },
    EditCancelled { row_index: Option<usize> },
    Error { message: String },
}

/// Receives grid events. Both hooks default to no-ops.
pub trait GridObserver: Send {
    fn before_action(&mut self, _args: &mut BeginArgs) {}
    fn after_action(&mut self, _event: &GridEvent) {}
}

// ============================================================================
// EVENT BUS
// ============================================================================

/// Shared observer list.
#[derive(Clone, Default)]
pub struct EventBus {
    observers: Arc<Mutex<Vec<Box<dyn GridObserver>>>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.observers.lock().map(|o| o.len()).unwrap_or(0);
        f.debug_struct("EventBus").field("observers", &count).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<O: GridObserver + 'static>(&self, observer: O) {
        if let Ok(mut observers) = self.observers.lock() {
            observers.push(Box::new(observer));
        }
    }

    /// Raise a begin event. Returns `false` when an observer canceled it.
    pub fn begin(&self, event: BeginEvent) -> bool {
        let mut args = BeginArgs { event, cancel: false };
        if let Ok(mut observers) = self.observers.lock() {
            for observer in observers.iter_mut() {
                observer.before_action(&mut args);
            }
        }
        !args.cancel
    }

    pub fn emit(&self, event: GridEvent) {
        if let Ok(mut observers) = self.observers.lock() {
            for observer in observers.iter_mut() {
                observer.after_action(&event);
            }
        }
    }
}

// ============================================================================
// RECORDER
// ============================================================================

type VetoFn = dyn Fn(&BeginEvent) -> bool + Send;

#[derive(Default)]
struct RecorderState {
    begun: Vec<BeginEvent>,
    events: Vec<GridEvent>,
    vetoes: Vec<Box<VetoFn>>,
}

/// Observer that keeps every event it sees and can veto begin events.
/// Clones share the same history.
#[derive(Clone, Default)]
pub struct EventRecorder {
    state: Arc<Mutex<RecorderState>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel every begin event for which `predicate` returns true.
    pub fn veto_when<F>(&self, predicate: F)
    where
        F: Fn(&BeginEvent) -> bool + Send + 'static,
    {
        if let Ok(mut state) = self.state.lock() {
            state.vetoes.push(Box::new(predicate));
        }
    }

    pub fn clear_vetoes(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.vetoes.clear();
        }
    }

    pub fn events(&self) -> Vec<GridEvent> {
        self.state.lock().map(|s| s.events.clone()).unwrap_or_default()
    }

    pub fn begun(&self) -> Vec<BeginEvent> {
        self.state.lock().map(|s| s.begun.clone()).unwrap_or_default()
    }

    pub fn count<F: Fn(&GridEvent) -> bool>(&self, predicate: F) -> usize {
        self.state
            .lock()
            .map(|s| s.events.iter().filter(|e| predicate(e)).count())
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.begun.clear();
            state.events.clear();
        }
    }
}

impl GridObserver for EventRecorder {
    fn before_action(&mut self, args: &mut BeginArgs) {
        if let Ok(mut state) = self.state.lock() {
            state.begun.push(args.event.clone());
            if state.vetoes.iter().any(|veto| veto(&args.event)) {
                args.cancel = true;
            }
        }
    }

    fn after_action(&mut self, event: &GridEvent) {
        if let Ok(mut state) = self.state.lock() {
            state.events.push(event.clone());
        }
    }
}
