//! FILENAME: tests/common/mod.rs
//! Test harness and fixtures for grid integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use datagrid::{
    ColumnDeclaration, Confirm, DataPage, DataSource, EventRecorder, Grid, GridSettings, InMemorySource,
    Query, Record, ScriptedConfirm, SourceError,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// In-memory source that counts queries and can be told to fail queries or writes.
#[derive(Default)]
pub struct CountingSource {
    pub inner: InMemorySource,
    queries: AtomicUsize,
    fail_queries: AtomicBool,
    fail_writes: AtomicBool,
}

impl CountingSource {
    pub fn new(records: Vec<Record>) -> Self {
        CountingSource {
            inner: InMemorySource::new(records),
            ..Default::default()
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writes(&self) -> Result<(), SourceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("write rejected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DataSource for CountingSource {
    async fn execute(&self, query: &Query) -> Result<DataPage, SourceError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("query rejected".to_string()));
        }
        self.inner.query(query)
    }

    async fn insert(&self, record: Record, index: Option<usize>) -> Result<(), SourceError> {
        self.check_writes()?;
        self.inner.insert(record, index).await
    }

    async fn update(&self, key_field: &str, record: Record) -> Result<(), SourceError> {
        self.check_writes()?;
        self.inner.update(key_field, record).await
    }

    async fn remove(&self, key_field: &str, keys: &[Value]) -> Result<Vec<Record>, SourceError> {
        self.check_writes()?;
        self.inner.remove(key_field, keys).await
    }
}

/// Test harness holding a grid and handles on its source and events.
pub struct TestHarness {
    pub grid: Grid,
    pub source: Arc<CountingSource>,
    pub events: EventRecorder,
}

impl TestHarness {
    /// Grid over `records` with the given settings. Dialogs are confirmed.
    pub fn new(settings: GridSettings, records: Vec<Record>) -> Self {
        Self::with_confirm(settings, records, Arc::new(ScriptedConfirm::new(&[], true)))
    }

    pub fn with_confirm(settings: GridSettings, records: Vec<Record>, confirm: Arc<dyn Confirm>) -> Self {
        let source = Arc::new(CountingSource::new(records));
        let events = EventRecorder::new();
        let grid = Grid::builder(settings, source.clone())
            .confirm(confirm)
            .observer(events.clone())
            .build();
        TestHarness { grid, source, events }
    }

    /// Employees fixture with editing enabled and paging by `page_size`.
    pub fn employees(count: usize, page_size: usize) -> Self {
        let mut settings = EmployeeFixture::settings();
        settings.page_settings.enabled = true;
        settings.page_settings.page_size = page_size;
        Self::new(settings, EmployeeFixture::records(count))
    }

    /// Loaded employees fixture.
    pub async fn loaded_employees(count: usize, page_size: usize) -> Self {
        let mut harness = Self::employees(count, page_size);
        harness.grid.load().await.unwrap();
        harness
    }

    pub fn stored(&self) -> Vec<Record> {
        self.source.inner.records()
    }

    pub fn stored_by_id(&self, id: i64) -> Option<Record> {
        self.stored().into_iter().find(|r| r.get("id") == Some(&json!(id)))
    }
}

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {}", other),
    }
}

/// Employee records: id, name, department, age, active.
pub struct EmployeeFixture;

impl EmployeeFixture {
    pub fn columns() -> Vec<ColumnDeclaration> {
        vec![
            ColumnDeclaration::new("id", "ID").primary_key().with_type("number"),
            ColumnDeclaration::new("name", "Name"),
            ColumnDeclaration::new("department", "Department"),
            ColumnDeclaration::new("age", "Age").with_type("number"),
            ColumnDeclaration::new("active", "Active").with_type("boolean"),
        ]
    }

    pub fn settings() -> GridSettings {
        let mut settings = GridSettings {
            columns: Self::columns(),
            ..Default::default()
        };
        settings.edit_settings.allow_add = true;
        settings.edit_settings.allow_edit = true;
        settings.edit_settings.allow_delete = true;
        settings
    }

    pub fn records(count: usize) -> Vec<Record> {
        let departments = ["Sales", "Support", "Research"];
        (1..=count)
            .map(|i| {
                record(json!({
                    "id": i,
                    "name": format!("Employee {}", i),
                    "department": departments[(i - 1) % departments.len()],
                    "age": 20 + i,
                    "active": i % 2 == 0,
                }))
            })
            .collect()
    }
}
