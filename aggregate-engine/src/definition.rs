//! FILENAME: aggregate-engine/src/definition.rs
//! PURPOSE: Summary row configuration.
//! CONTEXT: Declares which columns carry which aggregate operations in each
//! footer row. Custom functions and footer templates are attached in code
//! and skipped by serde.

use engine::{Callback, Record, Template};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use smallvec::{smallvec, SmallVec};
use std::sync::Arc;

// ============================================================================
// AGGREGATE TYPES
// ============================================================================

/// Aggregation function applied to a column's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateType {
    Sum,
    Average,
    Min,
    Max,
    Count,
    TrueCount,
    FalseCount,
    Custom,
}

impl Default for AggregateType {
    fn default() -> Self {
        AggregateType::Sum
    }
}

impl AggregateType {
    /// Lowercased registry key, used in `"{field} - {key}"` entries.
    pub fn key(&self) -> &'static str {
        match self {
            AggregateType::Sum => "sum",
            AggregateType::Average => "average",
            AggregateType::Min => "min",
            AggregateType::Max => "max",
            AggregateType::Count => "count",
            AggregateType::TrueCount => "truecount",
            AggregateType::FalseCount => "falsecount",
            AggregateType::Custom => "custom",
        }
    }

    /// Display label, used as the key of the formatted entry.
    pub fn label(&self) -> &'static str {
        match self {
            AggregateType::Sum => "Sum",
            AggregateType::Average => "Average",
            AggregateType::Min => "Min",
            AggregateType::Max => "Max",
            AggregateType::Count => "Count",
            AggregateType::TrueCount => "TrueCount",
            AggregateType::FalseCount => "FalseCount",
            AggregateType::Custom => "Custom",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn parse(name: &str) -> Option<AggregateType> {
        let lower = name.trim().to_ascii_lowercase();
        [
            AggregateType::Sum,
            AggregateType::Average,
            AggregateType::Min,
            AggregateType::Max,
            AggregateType::Count,
            AggregateType::TrueCount,
            AggregateType::FalseCount,
            AggregateType::Custom,
        ]
        .into_iter()
        .find(|t| t.key() == lower)
    }
}

pub type AggregateTypes = SmallVec<[AggregateType; 2]>;

/// Accepts `"Sum"` or `["Sum", "Max"]`, case-insensitively.
fn one_or_many<'de, D>(deserializer: D) -> Result<AggregateTypes, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    let names = match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(name) => vec![name],
        OneOrMany::Many(names) => names,
    };
    names
        .iter()
        .map(|n| {
            AggregateType::parse(n)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown aggregate type '{}'", n)))
        })
        .collect()
}

// ============================================================================
// CUSTOM AGGREGATES
// ============================================================================

/// Custom aggregate function, called with the full result set and the
/// declaring column.
pub type CustomAggregateFn = dyn Fn(&[Record], &AggregateColumn) -> Value + Send + Sync;

#[derive(Debug, Clone, PartialEq)]
pub enum CustomAggregate {
    /// Literal value shown as-is
    Text(String),
    Compute(Callback<CustomAggregateFn>),
}

impl CustomAggregate {
    pub fn compute<F>(f: F) -> Self
    where
        F: Fn(&[Record], &AggregateColumn) -> Value + Send + Sync + 'static,
    {
        CustomAggregate::Compute(Callback(Arc::new(f)))
    }
}

// ============================================================================
// AGGREGATE ROWS / COLUMNS
// ============================================================================

/// One column of a summary row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateColumn {
    /// Source field the values are read from.
    pub field: String,
    /// Column the result is displayed under. Defaults to `field`.
    #[serde(default)]
    pub column_name: Option<String>,
    #[serde(rename = "type", deserialize_with = "one_or_many")]
    pub types: AggregateTypes,
    /// Number format (`N2`, `C2`) or date pattern for the formatted entry.
    #[serde(default)]
    pub format: Option<String>,
    #[serde(skip)]
    pub custom_aggregate: Option<CustomAggregate>,
    #[serde(skip)]
    pub footer_template: Option<Template>,
}

impl AggregateColumn {
    pub fn new(field: &str, aggregate: AggregateType) -> Self {
        AggregateColumn {
            field: field.to_string(),
            types: smallvec![aggregate],
            ..Default::default()
        }
    }

    pub fn with_types(field: &str, types: &[AggregateType]) -> Self {
        AggregateColumn {
            field: field.to_string(),
            types: types.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn with_column_name(mut self, column_name: &str) -> Self {
        self.column_name = Some(column_name.to_string());
        self
    }

    pub fn with_format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }

    pub fn with_custom(mut self, custom: CustomAggregate) -> Self {
        self.custom_aggregate = Some(custom);
        self
    }

    pub fn with_footer_template(mut self, template: Template) -> Self {
        self.footer_template = Some(template);
        self
    }

    /// Display column name, falling back to the field.
    pub fn display_column(&self) -> &str {
        self.column_name.as_deref().unwrap_or(&self.field)
    }

    /// Compare the keys that change computed output: types, format,
    /// display column and field.
    pub fn same_definition(&self, other: &AggregateColumn) -> bool {
        self.types == other.types
            && self.format == other.format
            && self.display_column() == other.display_column()
            && self.field == other.field
    }
}

/// One summary (footer) row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRow {
    #[serde(default)]
    pub columns: Vec<AggregateColumn>,
}

impl AggregateRow {
    pub fn new(columns: Vec<AggregateColumn>) -> Self {
        AggregateRow { columns }
    }

    /// Aggregate column displayed under `column_name`, if any.
    pub fn column_for(&self, column_name: &str) -> Option<&AggregateColumn> {
        self.columns.iter().find(|c| c.display_column() == column_name)
    }
}

/// Whether two aggregate configurations would compute different output.
pub fn aggregates_changed(previous: &[AggregateRow], next: &[AggregateRow]) -> bool {
    previous.len() != next.len()
        || previous.iter().zip(next.iter()).any(|(a, b)| {
            a.columns.len() != b.columns.len()
                || a.columns.iter().zip(b.columns.iter()).any(|(x, y)| !x.same_definition(y))
        })
}
