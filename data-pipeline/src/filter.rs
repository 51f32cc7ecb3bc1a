//! FILENAME: data-pipeline/src/filter.rs
//! PURPOSE: Record matching for filter predicates and search.
//! CONTEXT: Used by `InMemorySource`. Remote sources translate the same
//! `Query` into their own dialect.

use crate::query::{FilterOperator, FilterPredicate, PredicateLogic, SearchQuery};
use engine::format::{looks_like_iso_date, parse_date_text};
use engine::{as_bool, field_value, value_to_text, Record};
use serde_json::Value;
use std::cmp::Ordering;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// TEXT FOLDING
// ============================================================================

/// Fold text for comparison: accents stripped through NFD when
/// `ignore_accent`, lowercased unless `case_sensitive`.
pub fn fold_text(text: &str, case_sensitive: bool, ignore_accent: bool) -> String {
    let stripped: String = if ignore_accent {
        text.nfd().filter(|c| !is_combining_mark(*c)).collect()
    } else {
        text.to_string()
    };
    if case_sensitive {
        stripped
    } else {
        stripped.to_lowercase()
    }
}

/// Simple wildcard matching (supports * and ?).
fn wildcard_match(value: &str, pattern: &str) -> bool {
    let v: Vec<char> = value.chars().collect();
    let p: Vec<char> = pattern.chars().collect();

    fn helper(v: &[char], vi: usize, p: &[char], pi: usize) -> bool {
        if pi == p.len() {
            return vi == v.len();
        }
        if p[pi] == '*' {
            // * matches zero or more characters
            for i in vi..=v.len() {
                if helper(v, i, p, pi + 1) {
                    return true;
                }
            }
            return false;
        }
        if vi < v.len() && (p[pi] == '?' || p[pi] == v[vi]) {
            return helper(v, vi + 1, p, pi + 1);
        }
        false
    }

    helper(&v, 0, &p, 0)
}

// ============================================================================
// VALUE COMPARISON
// ============================================================================

struct Folding {
    case_sensitive: bool,
    ignore_accent: bool,
}

impl Folding {
    fn text(&self, value: &Value) -> String {
        fold_text(&value_to_text(value), self.case_sensitive, self.ignore_accent)
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Order `actual` against `expected`. `None` when either side is null or the
/// kinds cannot be compared.
fn compare(actual: &Value, expected: &Value, folding: &Folding) -> Option<Ordering> {
    if actual.is_null() || expected.is_null() {
        return None;
    }
    if let Value::Number(a) = actual {
        let a = a.as_f64()?;
        let e = numeric(expected)?;
        return a.partial_cmp(&e);
    }
    if let Value::Bool(a) = actual {
        return as_bool(expected).map(|e| a.cmp(&e));
    }
    if let (Value::String(a), Value::String(e)) = (actual, expected) {
        if looks_like_iso_date(a) {
            if let (Some(a), Some(e)) = (parse_date_text(a), parse_date_text(e)) {
                return Some(a.cmp(&e));
            }
        }
    }
    Some(folding.text(actual).cmp(&folding.text(expected)))
}

fn values_equal(actual: &Value, expected: &Value, folding: &Folding) -> bool {
    match (actual.is_null(), expected.is_null()) {
        (true, true) => true,
        (true, false) | (false, true) => false,
        _ => compare(actual, expected, folding) == Some(Ordering::Equal),
    }
}

fn matches_operator(actual: &Value, operator: FilterOperator, expected: &Value, folding: &Folding) -> bool {
    match operator {
        FilterOperator::Equal => values_equal(actual, expected, folding),
        FilterOperator::NotEqual => !values_equal(actual, expected, folding),
        FilterOperator::GreaterThan => compare(actual, expected, folding) == Some(Ordering::Greater),
        FilterOperator::GreaterThanOrEqual => matches!(
            compare(actual, expected, folding),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOperator::LessThan => compare(actual, expected, folding) == Some(Ordering::Less),
        FilterOperator::LessThanOrEqual => matches!(
            compare(actual, expected, folding),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOperator::Contains => !actual.is_null() && folding.text(actual).contains(&folding.text(expected)),
        FilterOperator::DoesNotContain => actual.is_null() || !folding.text(actual).contains(&folding.text(expected)),
        FilterOperator::StartsWith => !actual.is_null() && folding.text(actual).starts_with(&folding.text(expected)),
        FilterOperator::EndsWith => !actual.is_null() && folding.text(actual).ends_with(&folding.text(expected)),
        FilterOperator::IsNull => actual.is_null(),
        FilterOperator::IsNotNull => !actual.is_null(),
        FilterOperator::IsEmpty => matches!(actual, Value::String(s) if s.is_empty()),
        FilterOperator::IsNotEmpty => !matches!(actual, Value::String(s) if s.is_empty()),
        FilterOperator::In => match expected {
            Value::Array(items) => items.iter().any(|e| values_equal(actual, e, folding)),
            single => values_equal(actual, single, folding),
        },
        FilterOperator::NotIn => !matches_operator(actual, FilterOperator::In, expected, folding),
        FilterOperator::Wildcard => {
            !actual.is_null() && wildcard_match(&folding.text(actual), &folding.text(expected))
        }
        FilterOperator::Like => {
            let pattern = folding.text(expected).replace('%', "*");
            !actual.is_null() && wildcard_match(&folding.text(actual), &pattern)
        }
    }
}

// ============================================================================
// PREDICATES
// ============================================================================

impl FilterPredicate {
    /// Evaluate this predicate alone against a record.
    pub fn matches(&self, record: &Record) -> bool {
        let folding = Folding {
            case_sensitive: self.case_sensitive,
            ignore_accent: self.ignore_accent,
        };
        matches_operator(&field_value(record, &self.field), self.operator, &self.value, &folding)
    }
}

/// Evaluate a predicate list. Predicates on the same field combine with
/// their own and/or logic in declaration order; different fields are and-ed.
pub fn matches_all(record: &Record, predicates: &[FilterPredicate]) -> bool {
    let mut fields: Vec<&str> = Vec::new();
    for p in predicates {
        if !fields.contains(&p.field.as_str()) {
            fields.push(&p.field);
        }
    }
    fields.into_iter().all(|field| {
        let mut result: Option<bool> = None;
        for p in predicates.iter().filter(|p| p.field == field) {
            let hit = p.matches(record);
            result = Some(match (result, p.predicate) {
                (None, _) => hit,
                (Some(acc), PredicateLogic::Or) => acc || hit,
                (Some(acc), PredicateLogic::And) => acc && hit,
            });
        }
        result.unwrap_or(true)
    })
}

/// Whether any searched field matches the term.
pub fn matches_search(record: &Record, search: &SearchQuery) -> bool {
    if search.term.is_empty() {
        return true;
    }
    let folding = Folding {
        case_sensitive: search.case_sensitive,
        ignore_accent: search.ignore_accent,
    };
    let term = Value::String(search.term.clone());
    search.fields.iter().any(|field| {
        let actual = field_value(record, field);
        !actual.is_null() && matches_operator(&actual, search.operator, &term, &folding)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn hit(r: &Record, field: &str, op: FilterOperator, value: Value) -> bool {
        FilterPredicate::new(field, op, value).matches(r)
    }

    #[test]
    fn test_fold_text() {
        assert_eq!(fold_text("Café", false, true), "cafe");
        assert_eq!(fold_text("Café", true, false), "Café");
        assert_eq!(fold_text("ÅSE", false, false), "åse");
    }

    #[test]
    fn test_comparison_operators() {
        let r = record(json!({"qty": 5, "name": "Widget", "when": "2024-03-01", "ok": true, "none": null}));
        assert!(hit(&r, "qty", FilterOperator::Equal, json!(5)));
        assert!(hit(&r, "qty", FilterOperator::Equal, json!("5")));
        assert!(hit(&r, "qty", FilterOperator::GreaterThan, json!(4)));
        assert!(!hit(&r, "qty", FilterOperator::LessThan, json!(5)));
        assert!(hit(&r, "qty", FilterOperator::LessThanOrEqual, json!(5)));
        assert!(hit(&r, "name", FilterOperator::Equal, json!("widget")));
        assert!(hit(&r, "name", FilterOperator::NotEqual, json!("gadget")));
        assert!(hit(&r, "when", FilterOperator::GreaterThan, json!("2024-02-28")));
        assert!(hit(&r, "ok", FilterOperator::Equal, json!(true)));
        assert!(!hit(&r, "none", FilterOperator::Equal, json!(1)));
        assert!(hit(&r, "none", FilterOperator::NotEqual, json!(1)));
    }

    #[test]
    fn test_text_operators() {
        let r = record(json!({"name": "Crème Brûlée", "code": ""}));
        assert!(hit(&r, "name", FilterOperator::Contains, json!("brû")));
        assert!(!hit(&r, "name", FilterOperator::Contains, json!("brul")));
        assert!(hit(&r, "name", FilterOperator::StartsWith, json!("crème")));
        assert!(hit(&r, "name", FilterOperator::EndsWith, json!("LÉE")));
        assert!(hit(&r, "name", FilterOperator::DoesNotContain, json!("tart")));
        assert!(hit(&r, "name", FilterOperator::Wildcard, json!("cr*br?l*")));
        assert!(hit(&r, "name", FilterOperator::Like, json!("%brûlée")));
        assert!(hit(&r, "code", FilterOperator::IsEmpty, Value::Null));
        assert!(hit(&r, "name", FilterOperator::IsNotEmpty, Value::Null));
        assert!(hit(&r, "missing", FilterOperator::IsNull, Value::Null));

        let mut p = FilterPredicate::new("name", FilterOperator::Contains, json!("brulee"));
        p.ignore_accent = true;
        assert!(p.matches(&r));
        p.case_sensitive = true;
        assert!(!p.matches(&r));
    }

    #[test]
    fn test_in_operator() {
        let r = record(json!({"region": "North"}));
        assert!(hit(&r, "region", FilterOperator::In, json!(["South", "north"])));
        assert!(hit(&r, "region", FilterOperator::NotIn, json!(["South", "East"])));
    }

    #[test]
    fn test_same_field_or_logic() {
        let north = record(json!({"region": "North", "qty": 1}));
        let east = record(json!({"region": "East", "qty": 9}));
        let predicates = vec![
            FilterPredicate::new("region", FilterOperator::Equal, json!("North")),
            FilterPredicate::new("region", FilterOperator::Equal, json!("East")).or(),
            FilterPredicate::new("qty", FilterOperator::GreaterThan, json!(5)),
        ];
        assert!(!matches_all(&north, &predicates));
        assert!(matches_all(&east, &predicates));
        assert!(matches_all(&north, &[]));
    }

    #[test]
    fn test_search_across_fields() {
        let r = record(json!({"name": "Ada", "city": "London", "age": 36}));
        let search = SearchQuery {
            term: "lond".into(),
            fields: vec!["name".into(), "city".into()],
            operator: FilterOperator::Contains,
            case_sensitive: false,
            ignore_accent: false,
        };
        assert!(matches_search(&r, &search));
        let search = SearchQuery { term: "36".into(), ..search };
        assert!(!matches_search(&r, &search));
    }
}
