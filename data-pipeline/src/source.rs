//! FILENAME: data-pipeline/src/source.rs
//! PURPOSE: Data source contract and the local in-memory implementation.
//! CONTEXT: The coordinator suspends only at this boundary. Remote adaptors
//! implement `DataSource` over their transport; `InMemorySource` runs the
//! whole query (filter, search, sort, count, page) over a local vector.

use crate::error::SourceError;
use crate::filter::{matches_all, matches_search};
use crate::query::{DataPage, Query};
use async_trait::async_trait;
use engine::{compare_values, field_value, log_debug, value_to_text, Record, SortDirection};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::{Mutex, MutexGuard};

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Produce the page described by `query`.
    async fn execute(&self, query: &Query) -> Result<DataPage, SourceError>;

    /// Insert a record at an absolute position, or append when `None`.
    async fn insert(&self, record: Record, index: Option<usize>) -> Result<(), SourceError>;

    /// Merge `record` into the stored record with the same key.
    async fn update(&self, key_field: &str, record: Record) -> Result<(), SourceError>;

    /// Remove every record whose key is in `keys`; returns the removed records.
    async fn remove(&self, key_field: &str, keys: &[Value]) -> Result<Vec<Record>, SourceError>;
}

// ============================================================================
// IN-MEMORY SOURCE
// ============================================================================

#[derive(Debug, Default)]
pub struct InMemorySource {
    records: Mutex<Vec<Record>>,
}

fn same_key(a: &Value, b: &Value) -> bool {
    a == b || (!a.is_null() && !b.is_null() && value_to_text(a) == value_to_text(b))
}

impl InMemorySource {
    pub fn new(records: Vec<Record>) -> Self {
        InMemorySource {
            records: Mutex::new(records),
        }
    }

    /// Parse a JSON array of records.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(InMemorySource::new(serde_json::from_str(json)?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Record>>, SourceError> {
        self.records
            .lock()
            .map_err(|_| SourceError::Unavailable("record store poisoned".to_string()))
    }

    /// Snapshot of all stored records.
    pub fn records(&self) -> Vec<Record> {
        self.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run a query synchronously.
    pub fn query(&self, query: &Query) -> Result<DataPage, SourceError> {
        let records = self.lock()?;

        let mut matched: Vec<&Record> = records
            .iter()
            .filter(|r| matches_all(r, &query.filters))
            .filter(|r| query.search.as_ref().map_or(true, |s| matches_search(r, s)))
            .collect();

        if !query.sorts.is_empty() {
            // sort_by is stable, so equal keys keep source order
            matched.sort_by(|a, b| {
                for sort in &query.sorts {
                    let ord = compare_values(&field_value(a, &sort.field), &field_value(b, &sort.field));
                    let ord = match sort.direction {
                        SortDirection::Ascending => ord,
                        SortDirection::Descending => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let count = matched.len();
        let result: Vec<Record> = match query.paging {
            Some(paging) if paging.size > 0 => matched
                .into_iter()
                .skip(paging.skip())
                .take(paging.size)
                .cloned()
                .collect(),
            Some(_) => return Err(SourceError::InvalidQuery("page size must be positive".to_string())),
            None => matched.into_iter().cloned().collect(),
        };

        log_debug!(
            "PIPELINE",
            "in-memory query filters={} sorts={} matched={} returned={}",
            query.filters.len(),
            query.sorts.len(),
            count,
            result.len()
        );

        Ok(DataPage {
            result,
            count: if query.requires_count { Some(count) } else { None },
            aggregates: None,
        })
    }
}

#[async_trait]
impl DataSource for InMemorySource {
    async fn execute(&self, query: &Query) -> Result<DataPage, SourceError> {
        self.query(query)
    }

    async fn insert(&self, record: Record, index: Option<usize>) -> Result<(), SourceError> {
        let mut records = self.lock()?;
        match index {
            Some(i) => {
                let at = i.min(records.len());
                records.insert(at, record);
            }
            None => records.push(record),
        }
        Ok(())
    }

    async fn update(&self, key_field: &str, record: Record) -> Result<(), SourceError> {
        let key = field_value(&record, key_field);
        let mut records = self.lock()?;
        let target = records
            .iter_mut()
            .find(|r| same_key(&field_value(r, key_field), &key))
            .ok_or_else(|| SourceError::KeyNotFound {
                field: key_field.to_string(),
                key: value_to_text(&key),
            })?;
        for (k, v) in record {
            target.insert(k, v);
        }
        Ok(())
    }

    async fn remove(&self, key_field: &str, keys: &[Value]) -> Result<Vec<Record>, SourceError> {
        let mut records = self.lock()?;
        let (removed, kept): (Vec<Record>, Vec<Record>) = records
            .drain(..)
            .partition(|r| {
                let key = field_value(r, key_field);
                keys.iter().any(|k| same_key(&key, k))
            });
        *records = kept;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{FilterOperator, FilterPredicate, Paging, SearchQuery, SortDescriptor};
    use serde_json::json;

    fn source() -> InMemorySource {
        InMemorySource::from_json(
            r#"[
                {"id": 1, "name": "Ada", "dept": "Eng", "salary": 120},
                {"id": 2, "name": "Bob", "dept": "Ops", "salary": 90},
                {"id": 3, "name": "Cy", "dept": "Eng", "salary": 100},
                {"id": 4, "name": "Di", "dept": "Eng", "salary": 100},
                {"id": 5, "name": "Ed", "dept": "Ops", "salary": 80}
            ]"#,
        )
        .unwrap()
    }

    fn ids(page: &DataPage) -> Vec<i64> {
        page.result.iter().map(|r| r["id"].as_i64().unwrap()).collect()
    }

    #[test]
    fn test_filter_sort_page_count() {
        let query = Query {
            paging: Some(Paging { page: 1, size: 2 }),
            sorts: vec![SortDescriptor::new("salary", SortDirection::Descending)],
            filters: vec![FilterPredicate::new("dept", FilterOperator::Equal, json!("eng"))],
            search: None,
            requires_count: true,
        };
        let page = source().query(&query).unwrap();
        assert_eq!(page.count, Some(3));
        assert_eq!(ids(&page), vec![1, 3]);

        let page = source().query(&Query { paging: Some(Paging { page: 2, size: 2 }), ..query }).unwrap();
        assert_eq!(ids(&page), vec![4]);
    }

    #[test]
    fn test_multi_sort_is_stable() {
        let query = Query {
            sorts: vec![
                SortDescriptor::new("dept", SortDirection::Ascending),
                SortDescriptor::new("salary", SortDirection::Ascending),
            ],
            ..Default::default()
        };
        let page = source().query(&query).unwrap();
        assert_eq!(ids(&page), vec![3, 4, 1, 5, 2]);
        assert_eq!(page.count, None);
    }

    #[test]
    fn test_search() {
        let query = Query {
            search: Some(SearchQuery {
                term: "o".into(),
                fields: vec!["name".into()],
                operator: FilterOperator::Contains,
                case_sensitive: false,
                ignore_accent: false,
            }),
            ..Default::default()
        };
        assert_eq!(ids(&source().query(&query).unwrap()), vec![2]);
    }

    #[test]
    fn test_zero_page_size_is_rejected() {
        let query = Query {
            paging: Some(Paging { page: 1, size: 0 }),
            ..Default::default()
        };
        assert!(matches!(source().query(&query), Err(SourceError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn test_crud() {
        let src = source();
        let new = match json!({"id": 6, "name": "Fay"}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        src.insert(new, Some(0)).await.unwrap();
        assert_eq!(src.records()[0]["name"], json!("Fay"));

        let patch = match json!({"id": "2", "name": "Bea"}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        src.update("id", patch).await.unwrap();
        assert!(src.records().iter().any(|r| r["name"] == json!("Bea") && r["dept"] == json!("Ops")));

        let removed = src.remove("id", &[json!(1), json!(5)]).await.unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(src.len(), 4);

        let missing = match json!({"id": 99}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        assert!(matches!(src.update("id", missing).await, Err(SourceError::KeyNotFound { .. })));
    }
}
