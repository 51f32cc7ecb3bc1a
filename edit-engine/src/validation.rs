//! FILENAME: edit-engine/src/validation.rs
//! PURPOSE: Field validation rules compiled from the column model.
//! CONTEXT: Rules are compiled once per column model and evaluated against the
//! edit session's working copy. Every check yields a message or nothing;
//! validation never fails with an error.

use engine::format::parse_date_text;
use engine::{
    as_number, field_value, is_blank, log_warn, number_to_text, value_to_text, Callback,
    ColumnModel, ColumnType, CompiledColumn, Record, ValidatorFn,
};
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde_json::Value;

static EMAIL: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());
static URL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)^(https?|ftp)://[^\s/$.?#][^\s]*$").ok());
static DIGITS: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[0-9]*$").ok());
static TEL: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[+]?[0-9]{9,13}$").ok());

fn pattern_matches(pattern: &Lazy<Option<Regex>>, text: &str) -> bool {
    match &**pattern {
        Some(re) => re.is_match(text),
        None => true,
    }
}

// ============================================================================
// RULES
// ============================================================================

/// One compiled check.
#[derive(Debug, Clone)]
pub enum CompiledRule {
    Required,
    MinLength(usize),
    MaxLength(usize),
    Min(f64),
    Max(f64),
    Range(f64, f64),
    RangeLength(usize, usize),
    Pattern(Regex),
    Email,
    Url,
    Digits,
    CreditCard,
    Tel,
    /// Must equal the value of another field
    EqualTo(String),
    /// Implied by number columns
    Number,
    /// Implied by date columns
    Date,
    Custom(Callback<ValidatorFn>),
}

impl CompiledRule {
    /// Blank values pass every rule except `Required` and custom validators.
    fn skips_blank(&self) -> bool {
        !matches!(self, CompiledRule::Required | CompiledRule::Custom(_))
    }

    /// Check `value` (the field's value in `record`). Returns the error
    /// message when the rule fails.
    pub fn check(&self, value: &Value, record: &Record) -> Option<String> {
        if self.skips_blank() && is_blank(value) {
            return None;
        }
        let text = value_to_text(value);
        let length = text.chars().count();

        match self {
            CompiledRule::Required => {
                let empty = is_blank(value) || matches!(value, Value::Array(a) if a.is_empty());
                empty.then(|| "This field is required.".to_string())
            }
            CompiledRule::MinLength(n) => {
                (length < *n).then(|| format!("Please enter at least {} characters.", n))
            }
            CompiledRule::MaxLength(n) => {
                (length > *n).then(|| format!("Please enter no more than {} characters.", n))
            }
            CompiledRule::Min(min) => match as_number(value) {
                Some(v) if v >= *min => None,
                _ => Some(format!(
                    "Please enter a value greater than or equal to {}.",
                    number_to_text(*min)
                )),
            },
            CompiledRule::Max(max) => match as_number(value) {
                Some(v) if v <= *max => None,
                _ => Some(format!(
                    "Please enter a value less than or equal to {}.",
                    number_to_text(*max)
                )),
            },
            CompiledRule::Range(lo, hi) => match as_number(value) {
                Some(v) if v >= *lo && v <= *hi => None,
                _ => Some(format!(
                    "Please enter a value in between {} and {}.",
                    number_to_text(*lo),
                    number_to_text(*hi)
                )),
            },
            CompiledRule::RangeLength(lo, hi) => (length < *lo || length > *hi)
                .then(|| format!("Please enter between {} and {} characters.", lo, hi)),
            CompiledRule::Pattern(re) => {
                (!re.is_match(&text)).then(|| "This field format is invalid.".to_string())
            }
            CompiledRule::Email => (!pattern_matches(&EMAIL, &text))
                .then(|| "Please enter a valid email.".to_string()),
            CompiledRule::Url => {
                (!pattern_matches(&URL, &text)).then(|| "Please enter a valid url.".to_string())
            }
            CompiledRule::Digits => (!pattern_matches(&DIGITS, &text))
                .then(|| "Please enter digits(0-9) only.".to_string()),
            CompiledRule::CreditCard => (!is_credit_card(&text))
                .then(|| "Please enter a valid creditcard number.".to_string()),
            CompiledRule::Tel => (!pattern_matches(&TEL, &text))
                .then(|| "Please enter a valid telephone number.".to_string()),
            CompiledRule::EqualTo(other) => {
                let expected = field_value(record, other);
                (value_to_text(&expected) != text).then(|| {
                    format!("This field value not matches with {} field value.", other)
                })
            }
            CompiledRule::Number => {
                let valid = match value {
                    Value::Number(_) => true,
                    Value::String(s) => s.trim().replace(',', "").parse::<f64>().is_ok(),
                    _ => false,
                };
                (!valid).then(|| "Please enter a valid number.".to_string())
            }
            CompiledRule::Date => {
                let valid = match value {
                    Value::Number(_) => true,
                    Value::String(s) => parse_date_text(s).is_some(),
                    _ => false,
                };
                (!valid).then(|| "Please enter a valid date.".to_string())
            }
            CompiledRule::Custom(validator) => match (validator.get())(value) {
                Ok(message) => message,
                Err(e) => Some(format!("Validation error: {}", e)),
            },
        }
    }
}

/// 13 to 16 digits (spaces and dashes ignored) passing the Luhn checksum.
fn is_credit_card(text: &str) -> bool {
    let digits: Vec<u32> = text
        .chars()
        .filter(|c| *c != ' ' && *c != '-')
        .map(|c| c.to_digit(10))
        .collect::<Option<Vec<u32>>>()
        .unwrap_or_default();
    if !(13..=16).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                *d
            }
        })
        .sum();
    sum % 10 == 0
}

// ============================================================================
// RULE SET
// ============================================================================

/// Compiled rules for every validated field, in column order.
#[derive(Debug, Clone, Default)]
pub struct ValidationRuleSet {
    order: Vec<String>,
    rules: FxHashMap<String, Vec<CompiledRule>>,
}

fn column_rules(column: &CompiledColumn) -> Vec<CompiledRule> {
    let mut rules = Vec::new();
    let declared = column.validation_rules.as_ref();

    if let Some(declared) = declared {
        if declared.required == Some(true) {
            rules.push(CompiledRule::Required);
        }
    }

    match column.column_type {
        Some(ColumnType::Number) => rules.push(CompiledRule::Number),
        Some(ColumnType::Date) => rules.push(CompiledRule::Date),
        _ => {}
    }

    let Some(declared) = declared else {
        return rules;
    };
    if let Some(n) = declared.min_length {
        rules.push(CompiledRule::MinLength(n));
    }
    if let Some(n) = declared.max_length {
        rules.push(CompiledRule::MaxLength(n));
    }
    if let Some(min) = declared.min {
        rules.push(CompiledRule::Min(min));
    }
    if let Some(max) = declared.max {
        rules.push(CompiledRule::Max(max));
    }
    if let Some((lo, hi)) = declared.range {
        rules.push(CompiledRule::Range(lo, hi));
    }
    if let Some((lo, hi)) = declared.range_length {
        rules.push(CompiledRule::RangeLength(lo, hi));
    }
    if let Some(pattern) = &declared.regex {
        match Regex::new(pattern) {
            Ok(re) => rules.push(CompiledRule::Pattern(re)),
            Err(e) => log_warn!(
                "EDIT",
                "column '{}': ignoring invalid regex '{}': {}",
                column.field.as_deref().unwrap_or(""),
                pattern,
                e
            ),
        }
    }
    let flags = [
        (declared.email, CompiledRule::Email),
        (declared.url, CompiledRule::Url),
        (declared.digits, CompiledRule::Digits),
        (declared.credit_card, CompiledRule::CreditCard),
        (declared.tel, CompiledRule::Tel),
    ];
    for (flag, rule) in flags {
        if flag == Some(true) {
            rules.push(rule);
        }
    }
    if let Some(other) = &declared.equal_to {
        rules.push(CompiledRule::EqualTo(other.clone()));
    }
    if let Some(validator) = &declared.custom_validator {
        rules.push(CompiledRule::Custom(validator.clone()));
    }
    rules
}

impl ValidationRuleSet {
    /// Compile rules for visible leaves with a field. A column is validated
    /// when it declares rules, has a resolved type or declares an edit config.
    pub fn compile(model: &ColumnModel) -> Self {
        let mut set = ValidationRuleSet::default();
        for column in &model.leaves {
            let Some(field) = column.field.as_deref() else {
                continue;
            };
            let participates = column.validation_rules.is_some()
                || column.column_type.is_some()
                || column.declaration().edit.is_some();
            if !column.visible || !participates {
                continue;
            }
            let rules = column_rules(column);
            if rules.is_empty() {
                continue;
            }
            set.order.push(field.to_string());
            set.rules.insert(field.to_string(), rules);
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Validated fields in column order.
    pub fn fields(&self) -> &[String] {
        &self.order
    }

    pub fn rules_for(&self, field: &str) -> &[CompiledRule] {
        self.rules.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First failing rule's message for one field.
    pub fn validate_field(&self, field: &str, record: &Record) -> Option<String> {
        let value = field_value(record, field);
        self.rules_for(field)
            .iter()
            .find_map(|rule| rule.check(&value, record))
    }

    /// Messages for every failing field.
    pub fn validate(&self, record: &Record) -> FxHashMap<String, String> {
        self.order
            .iter()
            .filter_map(|field| {
                self.validate_field(field, record)
                    .map(|message| (field.clone(), message))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{compile, ColumnDeclaration, ValidationRules};
    use serde_json::json;
    use std::sync::Arc;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    fn rules(field: &str, rules: ValidationRules) -> ValidationRuleSet {
        let model = compile(&[ColumnDeclaration::new(field, field).with_rules(rules)], None);
        ValidationRuleSet::compile(&model)
    }

    #[test]
    fn test_required_runs_first() {
        let set = rules(
            "name",
            ValidationRules {
                required: Some(true),
                min_length: Some(3),
                ..Default::default()
            },
        );
        let r = record(json!({"name": ""}));
        assert_eq!(set.validate_field("name", &r), Some("This field is required.".into()));
        let r = record(json!({"name": "ab"}));
        assert_eq!(
            set.validate_field("name", &r),
            Some("Please enter at least 3 characters.".into())
        );
        let r = record(json!({"name": "abc"}));
        assert_eq!(set.validate_field("name", &r), None);
    }

    #[test]
    fn test_blank_skips_optional_rules() {
        let set = rules(
            "age",
            ValidationRules {
                min: Some(18.0),
                ..Default::default()
            },
        );
        assert!(set.validate(&record(json!({"age": null}))).is_empty());
        assert_eq!(
            set.validate_field("age", &record(json!({"age": 4}))),
            Some("Please enter a value greater than or equal to 18.".into())
        );
    }

    #[test]
    fn test_range_messages() {
        let set = rules(
            "qty",
            ValidationRules {
                range: Some((1.0, 10.5)),
                range_length: Some((1, 2)),
                ..Default::default()
            },
        );
        assert_eq!(
            set.validate_field("qty", &record(json!({"qty": 11}))),
            Some("Please enter a value in between 1 and 10.5.".into())
        );
        assert_eq!(
            set.validate_field("qty", &record(json!({"qty": "5.25"}))),
            Some("Please enter between 1 and 2 characters.".into())
        );
    }

    #[test]
    fn test_format_rules() {
        let set = rules(
            "v",
            ValidationRules {
                email: Some(true),
                ..Default::default()
            },
        );
        assert!(set.validate_field("v", &record(json!({"v": "a@b.io"}))).is_none());
        assert_eq!(
            set.validate_field("v", &record(json!({"v": "nope"}))),
            Some("Please enter a valid email.".into())
        );

        let tel = rules("t", ValidationRules { tel: Some(true), ..Default::default() });
        assert!(tel.validate_field("t", &record(json!({"t": "+4612345678"}))).is_none());
        assert!(tel.validate_field("t", &record(json!({"t": "12-34"}))).is_some());

        let digits = rules("d", ValidationRules { digits: Some(true), ..Default::default() });
        assert_eq!(
            digits.validate_field("d", &record(json!({"d": "12a"}))),
            Some("Please enter digits(0-9) only.".into())
        );

        let url = rules("u", ValidationRules { url: Some(true), ..Default::default() });
        assert!(url.validate_field("u", &record(json!({"u": "https://example.com/x"}))).is_none());
        assert!(url.validate_field("u", &record(json!({"u": "example"}))).is_some());
    }

    #[test]
    fn test_credit_card_luhn() {
        assert!(is_credit_card("4111 1111 1111 1111"));
        assert!(!is_credit_card("4111 1111 1111 1112"));
        assert!(!is_credit_card("4111"));
        assert!(!is_credit_card("4111-1111-1111-111x"));
    }

    #[test]
    fn test_regex_and_equal_to() {
        let set = rules(
            "code",
            ValidationRules {
                regex: Some("^[A-Z]{3}$".into()),
                equal_to: Some("confirm".into()),
                ..Default::default()
            },
        );
        let r = record(json!({"code": "abc", "confirm": "abc"}));
        assert_eq!(set.validate_field("code", &r), Some("This field format is invalid.".into()));
        let r = record(json!({"code": "ABC", "confirm": "XYZ"}));
        assert_eq!(
            set.validate_field("code", &r),
            Some("This field value not matches with confirm field value.".into())
        );
    }

    #[test]
    fn test_invalid_regex_is_skipped() {
        let set = rules(
            "code",
            ValidationRules {
                regex: Some("([".into()),
                ..Default::default()
            },
        );
        assert!(set.is_empty());
    }

    #[test]
    fn test_implicit_type_rules() {
        let model = compile(
            &[
                ColumnDeclaration::new("price", "Price").with_type("number"),
                ColumnDeclaration::new("due", "Due").with_type("date"),
                ColumnDeclaration::new("note", "Note"),
            ],
            None,
        );
        let set = ValidationRuleSet::compile(&model);
        assert_eq!(set.fields(), &["price".to_string(), "due".to_string()]);

        let errors = set.validate(&record(json!({"price": "abc", "due": "never"})));
        assert_eq!(errors["price"], "Please enter a valid number.");
        assert_eq!(errors["due"], "Please enter a valid date.");
        assert!(set.validate(&record(json!({"price": "1,200.5", "due": "2024-03-01"}))).is_empty());
    }

    #[test]
    fn test_hidden_columns_are_not_validated() {
        let model = compile(
            &[ColumnDeclaration::new("x", "X")
                .with_visible(false)
                .with_rules(ValidationRules { required: Some(true), ..Default::default() })],
            None,
        );
        assert!(ValidationRuleSet::compile(&model).is_empty());
    }

    #[test]
    fn test_custom_validator() {
        let validator: Arc<ValidatorFn> = Arc::new(|v: &Value| match v.as_str() {
            Some("boom") => Err("backend down".to_string()),
            Some("bad") => Ok(Some("Bad value".to_string())),
            _ => Ok(None),
        });
        let set = rules(
            "v",
            ValidationRules {
                custom_validator: Some(Callback(validator)),
                ..Default::default()
            },
        );
        assert_eq!(set.validate_field("v", &record(json!({"v": "bad"}))), Some("Bad value".into()));
        assert_eq!(
            set.validate_field("v", &record(json!({"v": "boom"}))),
            Some("Validation error: backend down".into())
        );
        assert_eq!(set.validate_field("v", &record(json!({"v": "ok"}))), None);
    }
}
