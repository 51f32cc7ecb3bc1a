//! FILENAME: data-pipeline/src/query.rs
//! PURPOSE: Query model - actions, sort/filter/search descriptors, pages.
//! CONTEXT: A `QueryAction` names what the user asked for; the coordinator
//! folds it into its query state and hands the resulting `Query` to the
//! `DataSource`. Actions are immutable; vetoes travel in begin-event args.

use engine::{Record, RequestType, SortDirection};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// FILTER OPERATORS
// ============================================================================

/// Comparison applied by a filter predicate or a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    DoesNotContain,
    StartsWith,
    EndsWith,
    IsNull,
    IsNotNull,
    IsEmpty,
    IsNotEmpty,
    In,
    NotIn,
    /// `*` and `?` wildcards
    Wildcard,
    /// SQL-style `%` wildcards
    Like,
}

impl Default for FilterOperator {
    fn default() -> Self {
        FilterOperator::Equal
    }
}

impl FilterOperator {
    /// Operators that ignore the predicate value.
    pub fn is_unary(&self) -> bool {
        matches!(
            self,
            FilterOperator::IsNull | FilterOperator::IsNotNull | FilterOperator::IsEmpty | FilterOperator::IsNotEmpty
        )
    }
}

/// How a predicate combines with earlier predicates on the same field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredicateLogic {
    And,
    Or,
}

impl Default for PredicateLogic {
    fn default() -> Self {
        PredicateLogic::And
    }
}

// ============================================================================
// DESCRIPTORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortDescriptor {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortDescriptor {
    pub fn new(field: &str, direction: SortDirection) -> Self {
        SortDescriptor {
            field: field.to_string(),
            direction,
        }
    }
}

/// One column filter condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterPredicate {
    pub field: String,
    #[serde(default)]
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub predicate: PredicateLogic,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub ignore_accent: bool,
}

impl FilterPredicate {
    pub fn new(field: &str, operator: FilterOperator, value: Value) -> Self {
        FilterPredicate {
            field: field.to_string(),
            operator,
            value,
            predicate: PredicateLogic::And,
            case_sensitive: false,
            ignore_accent: false,
        }
    }

    pub fn or(mut self) -> Self {
        self.predicate = PredicateLogic::Or;
        self
    }
}

/// Search across several fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub term: String,
    pub fields: Vec<String>,
    pub operator: FilterOperator,
    pub case_sensitive: bool,
    pub ignore_accent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paging {
    /// 1-based page number
    pub page: usize,
    pub size: usize,
}

impl Paging {
    pub fn skip(&self) -> usize {
        self.page.saturating_sub(1) * self.size
    }
}

/// Everything a data source needs to produce one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub paging: Option<Paging>,
    pub sorts: Vec<SortDescriptor>,
    pub filters: Vec<FilterPredicate>,
    pub search: Option<SearchQuery>,
    /// Ask the source for the total match count, set when paging is on.
    pub requires_count: bool,
}

/// One page returned by a data source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPage {
    pub result: Vec<Record>,
    /// Total matches across all pages, when requested.
    #[serde(default)]
    pub count: Option<usize>,
    /// Source-computed aggregates keyed `"{field} - {type}"`.
    #[serde(default)]
    pub aggregates: Option<Record>,
}

impl DataPage {
    pub fn new(result: Vec<Record>, count: usize) -> Self {
        DataPage {
            result,
            count: Some(count),
            aggregates: None,
        }
    }

    pub fn total_count(&self) -> usize {
        self.count.unwrap_or(self.result.len())
    }
}

// ============================================================================
// ACTIONS
// ============================================================================

/// A user or host request that produces a new page.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryAction {
    Paging { current_page: usize, previous_page: usize },
    Sorting { field: String, direction: SortDirection, multi: bool },
    ClearSorting { field: Option<String> },
    Filtering { predicate: FilterPredicate },
    ClearFiltering { fields: Vec<String> },
    Searching { term: String },
    Refresh,
    /// Reload after a persisted edit.
    Reload { request_type: RequestType },
}

impl QueryAction {
    pub fn request_type(&self) -> RequestType {
        match self {
            QueryAction::Paging { .. } => RequestType::Paging,
            QueryAction::Sorting { .. } => RequestType::Sorting,
            QueryAction::ClearSorting { .. } => RequestType::ClearSorting,
            QueryAction::Filtering { .. } => RequestType::Filtering,
            QueryAction::ClearFiltering { .. } => RequestType::ClearFiltering,
            QueryAction::Searching { .. } => RequestType::Searching,
            QueryAction::Refresh => RequestType::Refresh,
            QueryAction::Reload { request_type } => *request_type,
        }
    }

    /// Field the action targets, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            QueryAction::Sorting { field, .. } => Some(field),
            QueryAction::ClearSorting { field } => field.as_deref(),
            QueryAction::Filtering { predicate } => Some(&predicate.field),
            QueryAction::ClearFiltering { fields } if fields.len() == 1 => Some(&fields[0]),
            _ => None,
        }
    }
}
