//! FILENAME: engine/src/column.rs
//! PURPOSE: Column declarations as supplied by the host.
//! CONTEXT: Declarations are the serializable input to the column-model
//! compiler. Callbacks (templates, accessors, custom format/parse functions,
//! custom validators) cannot be serialized and are attached programmatically.

use crate::compiler::CompiledColumn;
use crate::value::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// CALLBACKS
// ============================================================================

/// Shared host callback. Two callbacks are equal only when they are the same
/// allocation, which is what change detection needs.
pub struct Callback<F: ?Sized>(pub Arc<F>);

impl<F: ?Sized> Callback<F> {
    pub fn get(&self) -> &F {
        &self.0
    }
}

impl<F: ?Sized> Clone for Callback<F> {
    fn clone(&self) -> Self {
        Callback(Arc::clone(&self.0))
    }
}

impl<F: ?Sized> fmt::Debug for Callback<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

impl<F: ?Sized> PartialEq for Callback<F> {
    fn eq(&self, other: &Self) -> bool {
        Arc::as_ptr(&self.0) as *const () == Arc::as_ptr(&other.0) as *const ()
    }
}

/// Arguments handed to template callbacks.
pub struct TemplateArgs<'a> {
    pub column: &'a CompiledColumn,
    /// Source record for data cells.
    pub record: Option<&'a Record>,
    /// Row ordinal for data cells, column ordinal for header cells.
    pub index: usize,
    /// Aggregate entry of the column for summary cells.
    pub summary: Option<&'a Record>,
}

pub type TemplateFn = dyn Fn(&TemplateArgs<'_>) -> String + Send + Sync;
pub type ValueAccessorFn = dyn Fn(&str, &Record, &CompiledColumn) -> Value + Send + Sync;
pub type HeaderAccessorFn = dyn Fn(&CompiledColumn) -> String + Send + Sync;
pub type FormatFn = dyn Fn(&Value) -> String + Send + Sync;
pub type ParseFn = dyn Fn(&str) -> Value + Send + Sync;
/// Custom field validator. `Ok(Some(msg))` is a failure, `Err` is reported
/// as "Validation error: {err}".
pub type ValidatorFn = dyn Fn(&Value) -> Result<Option<String>, String> + Send + Sync;

/// Cell, header or footer template.
#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    /// Literal content rendered as-is
    Text(String),
    /// Content produced per cell
    Render(Callback<TemplateFn>),
}

impl Template {
    pub fn render<F>(f: F) -> Self
    where
        F: Fn(&TemplateArgs<'_>) -> String + Send + Sync + 'static,
    {
        Template::Render(Callback(Arc::new(f)))
    }

    pub fn produce(&self, args: &TemplateArgs<'_>) -> String {
        match self {
            Template::Text(text) => text.clone(),
            Template::Render(callback) => (callback.get())(args),
        }
    }
}

// ============================================================================
// ENUMS
// ============================================================================

/// Resolved data type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Number,
    Boolean,
    Date,
    DateTime,
    DateOnly,
}

impl ColumnType {
    /// Case-insensitive parse. `None` for unknown names.
    pub fn parse(name: &str) -> Option<ColumnType> {
        match name.trim().to_ascii_lowercase().as_str() {
            "string" => Some(ColumnType::String),
            "number" => Some(ColumnType::Number),
            "boolean" => Some(ColumnType::Boolean),
            "date" => Some(ColumnType::Date),
            "datetime" => Some(ColumnType::DateTime),
            "dateonly" => Some(ColumnType::DateOnly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Number => "number",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
            ColumnType::DateOnly => "dateonly",
        }
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, ColumnType::Date | ColumnType::DateTime | ColumnType::DateOnly)
    }
}

/// What the declaration says about the column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredType {
    /// Not given; inferred from the first record.
    Infer,
    /// Explicitly `none`: no inference, no automatic formatting.
    Untyped,
    Typed(ColumnType),
}

impl DeclaredType {
    pub fn from_declaration(raw: Option<&str>) -> DeclaredType {
        match raw {
            None => DeclaredType::Infer,
            Some(name) if name.trim().eq_ignore_ascii_case("none") => DeclaredType::Untyped,
            Some(name) => match ColumnType::parse(name) {
                Some(t) => DeclaredType::Typed(t),
                None => DeclaredType::Infer,
            },
        }
    }
}

/// Horizontal alignment of cell content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextAlign {
    Left,
    Right,
    Center,
    Justify,
}

impl Default for TextAlign {
    fn default() -> Self {
        TextAlign::Left
    }
}

impl TextAlign {
    /// CSS class carried by aligned cells, e.g. `sf-rightalign`.
    pub fn class_name(&self) -> &'static str {
        match self {
            TextAlign::Left => "sf-leftalign",
            TextAlign::Right => "sf-rightalign",
            TextAlign::Center => "sf-centeralign",
            TextAlign::Justify => "sf-justifyalign",
        }
    }
}

/// Overflow handling for cell content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClipMode {
    Clip,
    Ellipsis,
    EllipsisWithTooltip,
}

impl Default for ClipMode {
    fn default() -> Self {
        ClipMode::Ellipsis
    }
}

/// Input widget used by the inline edit form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditType {
    TextBox,
    NumericTextBox,
    DatePicker,
    CheckBox,
    DropDownList,
}

impl Default for EditType {
    fn default() -> Self {
        EditType::TextBox
    }
}

// ============================================================================
// DECLARATION PIECES
// ============================================================================

/// Column width as declared: pixels or any CSS length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnWidth {
    Pixels(f64),
    Length(String),
}

impl ColumnWidth {
    /// Normalized unit string: numbers become `"{n}px"`, bare numeric strings
    /// get `px` appended, anything else is kept.
    pub fn to_unit(&self) -> String {
        match self {
            ColumnWidth::Pixels(px) => format!("{}px", crate::value::number_to_text(*px)),
            ColumnWidth::Length(s) => {
                let trimmed = s.trim();
                if !trimmed.is_empty() && trimmed.parse::<f64>().is_ok() {
                    format!("{}px", trimmed)
                } else {
                    trimmed.to_string()
                }
            }
        }
    }
}

/// Edit widget configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditConfig {
    #[serde(rename = "type")]
    pub edit_type: EditType,
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateSettings {
    /// Accessible label announced for templated cells.
    pub aria_label: String,
}

/// Field validation rules declared on a column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationRules {
    pub required: Option<bool>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub range: Option<(f64, f64)>,
    pub range_length: Option<(usize, usize)>,
    pub regex: Option<String>,
    pub email: Option<bool>,
    pub url: Option<bool>,
    pub digits: Option<bool>,
    pub credit_card: Option<bool>,
    pub tel: Option<bool>,
    /// Field whose value this field must equal
    pub equal_to: Option<String>,
    #[serde(skip)]
    pub custom_validator: Option<Callback<ValidatorFn>>,
}

// ============================================================================
// COLUMN DECLARATION
// ============================================================================

/// Declarative description of one column (or column group).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnDeclaration {
    pub uid: Option<String>,
    pub field: Option<String>,
    pub header_text: Option<String>,
    /// Type name, case-insensitive; `"none"` disables inference.
    #[serde(rename = "type")]
    pub column_type: Option<String>,
    /// Number format (`N2`, `C2`, `P1`, `#,##0.00`) or date pattern
    /// (`yMd`, `dd/MM/yyyy HH:mm`).
    pub format: Option<String>,
    pub width: Option<ColumnWidth>,
    pub text_align: Option<TextAlign>,
    pub header_text_align: Option<TextAlign>,
    pub clip_mode: Option<ClipMode>,
    pub visible: Option<bool>,
    pub allow_sort: Option<bool>,
    pub allow_filter: Option<bool>,
    pub allow_search: Option<bool>,
    pub allow_edit: Option<bool>,
    pub is_primary_key: bool,
    pub default_value: Option<Value>,
    pub display_as_check_box: bool,
    pub disable_html_encode: Option<bool>,
    pub edit: Option<EditConfig>,
    pub validation_rules: Option<ValidationRules>,
    pub custom_attributes: BTreeMap<String, String>,
    pub template_settings: Option<TemplateSettings>,
    /// Child declarations. A non-empty list makes this a group header.
    pub columns: Vec<ColumnDeclaration>,

    #[serde(skip)]
    pub template: Option<Template>,
    #[serde(skip)]
    pub header_template: Option<Template>,
    #[serde(skip)]
    pub value_accessor: Option<Callback<ValueAccessorFn>>,
    #[serde(skip)]
    pub header_value_accessor: Option<Callback<HeaderAccessorFn>>,
    #[serde(skip)]
    pub format_fn: Option<Callback<FormatFn>>,
    #[serde(skip)]
    pub parse_fn: Option<Callback<ParseFn>>,
}

impl ColumnDeclaration {
    /// Leaf column bound to `field`.
    pub fn new(field: &str, header_text: &str) -> Self {
        ColumnDeclaration {
            field: Some(field.to_string()),
            header_text: Some(header_text.to_string()),
            ..Default::default()
        }
    }

    /// Group header spanning `children`.
    pub fn group(header_text: &str, children: Vec<ColumnDeclaration>) -> Self {
        ColumnDeclaration {
            header_text: Some(header_text.to_string()),
            columns: children,
            ..Default::default()
        }
    }

    pub fn with_type(mut self, column_type: &str) -> Self {
        self.column_type = Some(column_type.to_string());
        self
    }

    pub fn with_format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }

    pub fn with_width(mut self, width: ColumnWidth) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_text_align(mut self, align: TextAlign) -> Self {
        self.text_align = Some(align);
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = Some(visible);
        self
    }

    pub fn with_allow_sort(mut self, allow: bool) -> Self {
        self.allow_sort = Some(allow);
        self
    }

    pub fn with_allow_filter(mut self, allow: bool) -> Self {
        self.allow_filter = Some(allow);
        self
    }

    pub fn with_allow_edit(mut self, allow: bool) -> Self {
        self.allow_edit = Some(allow);
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_rules(mut self, rules: ValidationRules) -> Self {
        self.validation_rules = Some(rules);
        self
    }

    pub fn with_template(mut self, template: Template) -> Self {
        self.template = Some(template);
        self
    }

    pub fn with_header_template(mut self, template: Template) -> Self {
        self.header_template = Some(template);
        self
    }

    pub fn with_value_accessor<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &Record, &CompiledColumn) -> Value + Send + Sync + 'static,
    {
        self.value_accessor = Some(Callback(Arc::new(f)));
        self
    }

    pub fn with_format_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.format_fn = Some(Callback(Arc::new(f)));
        self
    }

    pub fn with_parse_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Value + Send + Sync + 'static,
    {
        self.parse_fn = Some(Callback(Arc::new(f)));
        self
    }

    pub fn is_group(&self) -> bool {
        !self.columns.is_empty()
    }
}

/// Columns inferred from a record when none are declared: one per key,
/// header text equal to the key.
pub fn infer_declarations(record: &Record) -> Vec<ColumnDeclaration> {
    record
        .keys()
        .map(|key| ColumnDeclaration::new(key, key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_declared_type_normalization() {
        assert_eq!(DeclaredType::from_declaration(None), DeclaredType::Infer);
        assert_eq!(DeclaredType::from_declaration(Some("none")), DeclaredType::Untyped);
        assert_eq!(
            DeclaredType::from_declaration(Some("NUMBER")),
            DeclaredType::Typed(ColumnType::Number)
        );
        assert_eq!(
            DeclaredType::from_declaration(Some("DateOnly")),
            DeclaredType::Typed(ColumnType::DateOnly)
        );
    }

    #[test]
    fn test_width_units() {
        assert_eq!(ColumnWidth::Pixels(120.0).to_unit(), "120px");
        assert_eq!(ColumnWidth::Length("80".into()).to_unit(), "80px");
        assert_eq!(ColumnWidth::Length("25%".into()).to_unit(), "25%");
    }

    #[test]
    fn test_declaration_from_json() {
        let decl: ColumnDeclaration = serde_json::from_value(json!({
            "field": "price",
            "headerText": "Price",
            "type": "Number",
            "format": "C2",
            "width": 100,
            "textAlign": "Right",
            "isPrimaryKey": false,
            "validationRules": { "required": true, "range": [1, 10] }
        }))
        .unwrap();
        assert_eq!(decl.field.as_deref(), Some("price"));
        assert_eq!(decl.text_align, Some(TextAlign::Right));
        assert_eq!(decl.width, Some(ColumnWidth::Pixels(100.0)));
        let rules = decl.validation_rules.unwrap();
        assert_eq!(rules.required, Some(true));
        assert_eq!(rules.range, Some((1.0, 10.0)));
    }

    #[test]
    fn test_infer_declarations_follow_key_order() {
        let record = match json!({"id": 1, "name": "A", "active": true}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let decls = infer_declarations(&record);
        let fields: Vec<_> = decls.iter().filter_map(|d| d.field.clone()).collect();
        assert_eq!(fields, vec!["id", "name", "active"]);
        assert_eq!(decls[1].header_text.as_deref(), Some("name"));
    }

    #[test]
    fn test_callback_equality_is_identity() {
        let a = Template::render(|_| "x".to_string());
        let b = a.clone();
        let c = Template::render(|_| "x".to_string());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
