//! FILENAME: engine/src/format.rs
//! PURPOSE: Value formatters and parsers resolved per column.
//! CONTEXT: The column compiler picks a `ValueFormatter` / `ValueParser` once
//! from the column type and format string. Rendering and editing then
//! dispatch on the tagged variant instead of re-inspecting the type per cell.

use crate::column::{Callback, ColumnType, FormatFn, ParseFn};
use crate::value::{as_number, number_to_text, value_to_text};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde_json::Value;

// ============================================================================
// NUMBER PATTERNS
// ============================================================================

/// Number display pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum NumberPattern {
    General,
    /// `N2`: fixed decimals with grouping
    Number { decimal_places: u8, use_thousands_separator: bool },
    /// `C2`: currency, negatives in parentheses
    Currency { decimal_places: u8, symbol: String },
    /// `P1`: value times one hundred with a percent sign
    Percentage { decimal_places: u8 },
    /// `E3`
    Scientific { decimal_places: u8 },
}

impl NumberPattern {
    /// Parse a standard (`N2`, `c0`, `P`) or custom (`#,##0.00`) pattern.
    pub fn parse(format: &str) -> Option<NumberPattern> {
        let trimmed = format.trim();
        if trimmed.is_empty() {
            return None;
        }
        let mut chars = trimmed.chars();
        let letter = chars.next()?.to_ascii_uppercase();
        let rest: String = chars.collect();
        let places = if rest.is_empty() {
            Some(None)
        } else {
            rest.parse::<u8>().ok().map(Some)
        };

        if let Some(places) = places {
            match letter {
                'N' => {
                    return Some(NumberPattern::Number {
                        decimal_places: places.unwrap_or(2),
                        use_thousands_separator: true,
                    })
                }
                'C' => {
                    return Some(NumberPattern::Currency {
                        decimal_places: places.unwrap_or(2),
                        symbol: "$".to_string(),
                    })
                }
                'P' => {
                    return Some(NumberPattern::Percentage {
                        decimal_places: places.unwrap_or(2),
                    })
                }
                'E' => {
                    return Some(NumberPattern::Scientific {
                        decimal_places: places.unwrap_or(6),
                    })
                }
                _ => {}
            }
        }

        if trimmed.chars().all(|c| matches!(c, '#' | '0' | ',' | '.')) {
            let decimal_places = match trimmed.find('.') {
                Some(dot) => trimmed[dot + 1..]
                    .chars()
                    .take_while(|c| *c == '0' || *c == '#')
                    .count() as u8,
                None => 0,
            };
            return Some(NumberPattern::Number {
                decimal_places,
                use_thousands_separator: trimmed.contains(','),
            });
        }
        None
    }

    pub fn format(&self, value: f64) -> String {
        match self {
            NumberPattern::General => format_general(value),
            NumberPattern::Number {
                decimal_places,
                use_thousands_separator,
            } => format_decimal(value, *decimal_places, *use_thousands_separator),
            NumberPattern::Currency {
                decimal_places,
                symbol,
            } => format_currency(value, *decimal_places, symbol),
            NumberPattern::Percentage { decimal_places } => format_percentage(value, *decimal_places),
            NumberPattern::Scientific { decimal_places } => format_scientific(value, *decimal_places),
        }
    }
}

fn format_general(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let abs_value = value.abs();
    if abs_value >= 1e15 || abs_value < 1e-6 {
        return format!("{:e}", value);
    }
    number_to_text(value)
}

fn format_decimal(value: f64, decimal_places: u8, use_thousands_separator: bool) -> String {
    let rounded = format!("{:.prec$}", value, prec = decimal_places as usize);
    if use_thousands_separator {
        add_thousands_separator(&rounded)
    } else {
        rounded
    }
}

/// Insert `,` every three integer digits of a plain numeric string.
fn add_thousands_separator(s: &str) -> String {
    let (integer_part, decimal_part) = match s.split_once('.') {
        Some((int, dec)) => (int, Some(dec)),
        None => (s, None),
    };

    let negative = integer_part.starts_with('-');
    let digits: Vec<char> = integer_part.chars().filter(|c| c.is_ascii_digit()).collect();

    let mut result = String::with_capacity(s.len() + digits.len() / 3);
    if negative {
        result.push('-');
    }
    let len = digits.len();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    if let Some(decimal) = decimal_part {
        result.push('.');
        result.push_str(decimal);
    }
    result
}

fn format_currency(value: f64, decimal_places: u8, symbol: &str) -> String {
    let formatted = add_thousands_separator(&format!(
        "{:.prec$}",
        value.abs(),
        prec = decimal_places as usize
    ));
    if value < 0.0 {
        format!("({}{})", symbol, formatted)
    } else {
        format!("{}{}", symbol, formatted)
    }
}

fn format_percentage(value: f64, decimal_places: u8) -> String {
    format!("{:.prec$}%", value * 100.0, prec = decimal_places as usize)
}

fn format_scientific(value: f64, decimal_places: u8) -> String {
    format!("{:.prec$e}", value, prec = decimal_places as usize).replace('e', "E")
}

// ============================================================================
// DATE PATTERNS
// ============================================================================

/// Named date skeletons and their expanded patterns.
const DATE_SKELETONS: &[(&str, &str)] = &[
    ("short", "M/d/yy"),
    ("medium", "MMM d, y"),
    ("long", "MMMM d, y"),
    ("full", "EEEE, MMMM d, y"),
    ("d", "d"),
    ("E", "EEE"),
    ("Ed", "d EEE"),
    ("Hm", "HH:mm"),
    ("Hms", "HH:mm:ss"),
    ("hm", "h:mm a"),
    ("hms", "h:mm:ss a"),
    ("M", "L"),
    ("Md", "M/d"),
    ("MEd", "EEE, M/d"),
    ("MMM", "LLL"),
    ("MMMd", "MMM d"),
    ("MMMEd", "EEE, MMM d"),
    ("y", "y"),
    ("yM", "M/y"),
    ("yMd", "M/d/y"),
    ("yMEd", "EEE, M/d/y"),
    ("yMMM", "MMM y"),
    ("yMMMd", "MMM d, y"),
    ("yMMMEd", "EEE, MMM d, y"),
    ("yMMMM", "MMMM y"),
    ("yMdHm", "M/d/y HH:mm"),
];

/// Convert an LDML-style pattern (`dd/MM/yyyy HH:mm`) to a chrono format.
pub fn to_chrono_pattern(pattern: &str) -> String {
    let expanded = DATE_SKELETONS
        .iter()
        .find(|(name, _)| *name == pattern)
        .map(|(_, p)| *p)
        .unwrap_or(pattern);

    let chars: Vec<char> = expanded.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            i += 1;
            while i < chars.len() && chars[i] != '\'' {
                push_literal(&mut out, chars[i]);
                i += 1;
            }
            i += 1;
            continue;
        }
        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }
        let token = match (c, run) {
            ('y', 2) => Some("%y"),
            ('y', _) => Some("%Y"),
            ('M' | 'L', 1) => Some("%-m"),
            ('M' | 'L', 2) => Some("%m"),
            ('M' | 'L', 3) => Some("%b"),
            ('M' | 'L', _) => Some("%B"),
            ('d', 1) => Some("%-d"),
            ('d', _) => Some("%d"),
            ('E', 4) => Some("%A"),
            ('E', _) => Some("%a"),
            ('H', 1) => Some("%-H"),
            ('H', _) => Some("%H"),
            ('h', 1) => Some("%-I"),
            ('h', _) => Some("%I"),
            ('m', _) => Some("%M"),
            ('s', _) => Some("%S"),
            ('a', _) => Some("%p"),
            _ => None,
        };
        match token {
            Some(t) => out.push_str(t),
            None => {
                for _ in 0..run {
                    push_literal(&mut out, c);
                }
            }
        }
        i += run;
    }
    out
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

/// Interpret a value as a point in time.
///
/// Accepts ISO dates, ISO date-times (with or without offset), slash or dash
/// separated `y m d` strings, and epoch milliseconds.
pub fn parse_date_value(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Number(n) => {
            let millis = n.as_f64()? as i64;
            Utc.timestamp_millis_opt(millis).single().map(|dt| dt.naive_utc())
        }
        Value::String(s) => parse_date_text(s),
        _ => None,
    }
}

/// Text form of `parse_date_value`.
pub fn parse_date_text(text: &str) -> Option<NaiveDateTime> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, pattern) {
            return Some(dt);
        }
    }
    parse_date_only(s).map(|d| d.and_time(NaiveTime::MIN))
}

/// Split on non-digits and read year, month, day.
pub fn parse_date_only(text: &str) -> Option<NaiveDate> {
    let parts: Vec<u32> = text
        .split(|c: char| !c.is_ascii_digit())
        .filter(|p| !p.is_empty())
        .take(3)
        .filter_map(|p| p.parse::<u32>().ok())
        .collect();
    if parts.len() < 3 {
        return None;
    }
    NaiveDate::from_ymd_opt(parts[0] as i32, parts[1], parts[2])
}

/// Whether the text looks like an ISO date (`2024-03-01`) with an optional time.
pub fn looks_like_iso_date(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() >= 10
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[5..7].iter().all(u8::is_ascii_digit)
        && bytes[7] == b'-'
        && bytes[8..10].iter().all(u8::is_ascii_digit)
        && parse_date_text(text).is_some()
}

// ============================================================================
// FORMATTER / PARSER DISPATCH
// ============================================================================

/// Display formatter chosen at compile time.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueFormatter {
    Number(NumberPattern),
    /// chrono format string
    Date(String),
    Custom(Callback<FormatFn>),
}

impl ValueFormatter {
    /// Pick a formatter from the column type and format string. Untyped
    /// columns guess from the format: number patterns win, otherwise a date
    /// pattern is assumed.
    pub fn resolve(column_type: Option<ColumnType>, format: &str) -> Option<ValueFormatter> {
        if format.trim().is_empty() {
            return None;
        }
        match column_type {
            Some(t) if t.is_temporal() => Some(ValueFormatter::Date(to_chrono_pattern(format))),
            Some(ColumnType::Number) => NumberPattern::parse(format).map(ValueFormatter::Number),
            Some(_) => None,
            None => match NumberPattern::parse(format) {
                Some(pattern) => Some(ValueFormatter::Number(pattern)),
                None => Some(ValueFormatter::Date(to_chrono_pattern(format))),
            },
        }
    }

    /// Format a value. `None` when the value does not fit the formatter,
    /// in which case callers fall back to plain text.
    pub fn format(&self, value: &Value) -> Option<String> {
        match self {
            ValueFormatter::Number(pattern) => as_number(value).map(|n| pattern.format(n)),
            ValueFormatter::Date(pattern) => {
                parse_date_value(value).map(|dt| dt.format(pattern).to_string())
            }
            ValueFormatter::Custom(f) => Some((f.get())(value)),
        }
    }
}

/// Edit-text parser chosen at compile time.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueParser {
    /// Numbers rounded to the given decimal places
    Number { decimal_places: Option<u8> },
    Date,
    DateTime,
    DateOnly,
    Custom(Callback<ParseFn>),
}

impl ValueParser {
    pub fn for_type(column_type: ColumnType, format: Option<&str>) -> Option<ValueParser> {
        match column_type {
            ColumnType::Number => {
                let decimal_places = match format.and_then(NumberPattern::parse) {
                    Some(NumberPattern::Number { decimal_places, .. })
                    | Some(NumberPattern::Currency { decimal_places, .. }) => Some(decimal_places),
                    _ => None,
                };
                Some(ValueParser::Number { decimal_places })
            }
            ColumnType::Date => Some(ValueParser::Date),
            ColumnType::DateTime => Some(ValueParser::DateTime),
            ColumnType::DateOnly => Some(ValueParser::DateOnly),
            _ => None,
        }
    }

    /// Parse edit text. Unparsable numbers and dates yield an empty string.
    pub fn parse(&self, text: &str) -> Value {
        let empty = Value::String(String::new());
        match self {
            ValueParser::Number { decimal_places } => {
                let cleaned: String = text.chars().filter(|c| *c != ',').collect();
                match cleaned.trim().parse::<f64>() {
                    Ok(n) if n.is_finite() => {
                        let n = match decimal_places {
                            Some(places) => {
                                let factor = 10f64.powi(*places as i32);
                                (n * factor).round() / factor
                            }
                            None => n,
                        };
                        serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(empty)
                    }
                    _ => empty,
                }
            }
            ValueParser::Date => match parse_date_text(text) {
                Some(dt) => Value::String(dt.date().format("%Y-%m-%d").to_string()),
                None => empty,
            },
            ValueParser::DateTime => match parse_date_text(text) {
                Some(dt) => Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
                None => empty,
            },
            ValueParser::DateOnly => match parse_date_only(text) {
                Some(d) => Value::String(d.format("%Y-%m-%d").to_string()),
                None => empty,
            },
            ValueParser::Custom(f) => (f.get())(text),
        }
    }
}

/// Plain text for a value, used when no formatter applies.
pub fn plain_text(value: &Value) -> String {
    value_to_text(value)
}
