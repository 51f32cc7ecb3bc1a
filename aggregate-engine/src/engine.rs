//! FILENAME: aggregate-engine/src/engine.rs
//! PURPOSE: Summary computation.
//! CONTEXT: `compute` is a pure function of the aggregate configuration and
//! the committed result set. It produces one summary record per configured
//! row, keyed by display column name. Each column entry holds the raw value
//! under `"{field} - {type}"` and the formatted value under the type label.

use crate::definition::{AggregateColumn, AggregateRow, AggregateType, CustomAggregate};
use engine::{as_number, get_field, log_debug, Record, ValueFormatter};
use rustc_hash::FxHashMap;
use serde_json::{Map, Number, Value};

/// One computed summary row: display column name -> entry object.
pub type SummaryRecord = Record;

/// Committed page the aggregates are computed over.
#[derive(Debug, Clone, Copy)]
pub struct ResultSet<'a> {
    pub records: &'a [Record],
    /// Aggregates computed by the data source, keyed `"{field} - {type}"`.
    pub aggregates: Option<&'a Record>,
}

impl<'a> ResultSet<'a> {
    pub fn new(records: &'a [Record]) -> Self {
        ResultSet { records, aggregates: None }
    }

    pub fn with_aggregates(mut self, aggregates: &'a Record) -> Self {
        self.aggregates = Some(aggregates);
        self
    }
}

/// Raw-entry key, e.g. `"price - sum"`.
pub fn summary_key(field: &str, aggregate: AggregateType) -> String {
    format!("{} - {}", field, aggregate.key())
}

fn number(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

/// Per-field numeric values, extracted once and shared by every aggregate
/// column reading the same field.
struct FieldValues {
    numbers: Vec<f64>,
    true_count: usize,
    false_count: usize,
}

fn extract(records: &[Record], field: &str) -> FieldValues {
    let mut numbers = Vec::with_capacity(records.len());
    let mut true_count = 0;
    let mut false_count = 0;
    for record in records {
        let value = get_field(record, field).unwrap_or(&Value::Null);
        if let Some(n) = as_number(value) {
            numbers.push(n);
        }
        match value {
            Value::Bool(true) => true_count += 1,
            Value::Bool(false) => false_count += 1,
            _ => {}
        }
    }
    FieldValues { numbers, true_count, false_count }
}

fn built_in(aggregate: AggregateType, records: &[Record], values: &FieldValues, field: &str) -> Value {
    match aggregate {
        AggregateType::Sum => number(values.numbers.iter().sum()),
        AggregateType::Average => {
            if records.is_empty() {
                Value::Null
            } else {
                number(values.numbers.iter().sum::<f64>() / records.len() as f64)
            }
        }
        AggregateType::Min | AggregateType::Max => extreme(aggregate, records, values, field),
        AggregateType::Count => Value::from(records.len()),
        AggregateType::TrueCount => Value::from(values.true_count),
        AggregateType::FalseCount => Value::from(values.false_count),
        AggregateType::Custom => Value::Null,
    }
}

/// Min/max over numbers; falls back to text/date comparison for fields
/// without numeric values.
fn extreme(aggregate: AggregateType, records: &[Record], values: &FieldValues, field: &str) -> Value {
    let want_max = aggregate == AggregateType::Max;
    if !values.numbers.is_empty() {
        let folded = values.numbers.iter().copied().fold(None, |acc: Option<f64>, n| match acc {
            None => Some(n),
            Some(a) if want_max => Some(a.max(n)),
            Some(a) => Some(a.min(n)),
        });
        return folded.map(number).unwrap_or(Value::Null);
    }
    let texts = records
        .iter()
        .filter_map(|r| get_field(r, field))
        .filter_map(|v| v.as_str());
    let picked = if want_max { texts.max() } else { texts.min() };
    picked.map(|s| Value::String(s.to_string())).unwrap_or(Value::Null)
}

fn custom(column: &AggregateColumn, records: &[Record]) -> Value {
    match &column.custom_aggregate {
        Some(CustomAggregate::Text(text)) => Value::String(text.clone()),
        Some(CustomAggregate::Compute(f)) => (f.get())(records, column),
        None => Value::String(String::new()),
    }
}

fn format_entry(formatter: Option<&ValueFormatter>, raw: &Value) -> Value {
    if raw.is_null() {
        return Value::String(String::new());
    }
    match formatter {
        Some(f) => match f.format(raw) {
            Some(text) => Value::String(text),
            None => raw.clone(),
        },
        None => raw.clone(),
    }
}

/// Compute summary records for every configured row that has columns.
pub fn compute(rows: &[AggregateRow], result: &ResultSet<'_>) -> Vec<SummaryRecord> {
    let mut cache: FxHashMap<&str, FieldValues> = FxHashMap::default();
    let mut summaries = Vec::with_capacity(rows.len());

    for row in rows.iter().filter(|r| !r.columns.is_empty()) {
        let mut single = Map::new();
        for column in &row.columns {
            let formatter = column
                .format
                .as_deref()
                .and_then(|f| ValueFormatter::resolve(None, f));
            let entry = single
                .entry(column.display_column().to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            let entry = match entry {
                Value::Object(map) => map,
                _ => continue,
            };

            for aggregate in column.types.iter().copied() {
                let key = summary_key(&column.field, aggregate);
                let precomputed = if aggregate == AggregateType::Custom {
                    None
                } else {
                    result.aggregates.and_then(|a| a.get(&key)).cloned()
                };
                let raw = match precomputed {
                    Some(value) => value,
                    None if aggregate == AggregateType::Custom => custom(column, result.records),
                    None => {
                        let values = cache
                            .entry(column.field.as_str())
                            .or_insert_with(|| extract(result.records, &column.field));
                        built_in(aggregate, result.records, values, &column.field)
                    }
                };
                let formatted = format_entry(formatter.as_ref(), &raw);
                entry.insert(key, raw);
                entry.insert(aggregate.label().to_string(), formatted);
            }
        }
        summaries.push(single);
    }

    log_debug!(
        "AGGREGATE",
        "compute rows={} records={} summaries={}",
        rows.len(),
        result.records.len(),
        summaries.len()
    );
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records() -> Vec<Record> {
        [
            json!({"item": "A", "price": 10.0, "qty": 2, "paid": true, "region": "North"}),
            json!({"item": "B", "price": 20.5, "qty": 5, "paid": false, "region": "South"}),
            json!({"item": "C", "price": 4.5, "qty": 1, "paid": true, "region": "East"}),
        ]
        .into_iter()
        .map(|v| match v {
            Value::Object(map) => map,
            _ => unreachable!(),
        })
        .collect()
    }

    #[test]
    fn test_sum_and_formatted_entry() {
        let data = records();
        let rows = vec![AggregateRow::new(vec![
            AggregateColumn::new("price", AggregateType::Sum).with_format("C2"),
        ])];
        let out = compute(&rows, &ResultSet::new(&data));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["price"]["price - sum"], json!(35.0));
        assert_eq!(out[0]["price"]["Sum"], json!("$35.00"));
    }

    #[test]
    fn test_multiple_types_on_one_column() {
        let data = records();
        let rows = vec![AggregateRow::new(vec![AggregateColumn::with_types(
            "qty",
            &[AggregateType::Min, AggregateType::Max, AggregateType::Average, AggregateType::Count],
        )])];
        let out = compute(&rows, &ResultSet::new(&data));
        let entry = &out[0]["qty"];
        assert_eq!(entry["qty - min"], json!(1.0));
        assert_eq!(entry["qty - max"], json!(5.0));
        assert_eq!(entry["qty - average"], json!(8.0 / 3.0));
        assert_eq!(entry["qty - count"], json!(3));
        // No format: the formatted entry is the raw value
        assert_eq!(entry["Count"], json!(3));
    }

    #[test]
    fn test_true_false_counts() {
        let data = records();
        let rows = vec![AggregateRow::new(vec![AggregateColumn::with_types(
            "paid",
            &[AggregateType::TrueCount, AggregateType::FalseCount],
        )])];
        let out = compute(&rows, &ResultSet::new(&data));
        assert_eq!(out[0]["paid"]["paid - truecount"], json!(2));
        assert_eq!(out[0]["paid"]["paid - falsecount"], json!(1));
    }

    #[test]
    fn test_custom_function_receives_result_set_and_column() {
        let data = records();
        let column = AggregateColumn::new("region", AggregateType::Custom)
            .with_column_name("item")
            .with_custom(CustomAggregate::compute(|records, column| {
                json!(format!("{}:{}", column.field, records.len()))
            }));
        let rows = vec![AggregateRow::new(vec![column])];
        let out = compute(&rows, &ResultSet::new(&data));
        assert_eq!(out[0]["item"]["region - custom"], json!("region:3"));
        assert_eq!(out[0]["item"]["Custom"], json!("region:3"));
    }

    #[test]
    fn test_custom_literal_text() {
        let data = records();
        let column = AggregateColumn::new("item", AggregateType::Custom)
            .with_custom(CustomAggregate::Text("n/a".to_string()));
        let out = compute(&[AggregateRow::new(vec![column])], &ResultSet::new(&data));
        assert_eq!(out[0]["item"]["Custom"], json!("n/a"));
    }

    #[test]
    fn test_rows_without_columns_are_skipped() {
        let data = records();
        let rows = vec![
            AggregateRow::default(),
            AggregateRow::new(vec![AggregateColumn::new("qty", AggregateType::Sum)]),
        ];
        let out = compute(&rows, &ResultSet::new(&data));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_precomputed_aggregates_win_for_built_ins() {
        let data = records();
        let remote = match json!({"price - sum": 999.0}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let rows = vec![AggregateRow::new(vec![AggregateColumn::new("price", AggregateType::Sum)])];
        let out = compute(&rows, &ResultSet::new(&data).with_aggregates(&remote));
        assert_eq!(out[0]["price"]["price - sum"], json!(999.0));
    }

    #[test]
    fn test_compute_is_pure() {
        let data = records();
        let rows = vec![AggregateRow::new(vec![
            AggregateColumn::with_types("price", &[AggregateType::Sum, AggregateType::Max]).with_format("N1"),
        ])];
        let first = compute(&rows, &ResultSet::new(&data));
        let second = compute(&rows, &ResultSet::new(&data));
        assert_eq!(first, second);
        assert_eq!(first[0]["price"]["Max"], json!("20.5"));
    }

    #[test]
    fn test_empty_result_set() {
        let rows = vec![AggregateRow::new(vec![AggregateColumn::with_types(
            "price",
            &[AggregateType::Sum, AggregateType::Average, AggregateType::Min],
        )])];
        let out = compute(&rows, &ResultSet::new(&[]));
        assert_eq!(out[0]["price"]["price - sum"], json!(0.0));
        assert_eq!(out[0]["price"]["price - average"], Value::Null);
        assert_eq!(out[0]["price"]["Min"], json!(""));
    }
}
