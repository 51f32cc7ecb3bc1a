//! FILENAME: engine/src/compiler.rs
//! PURPOSE: Column-model compiler.
//! CONTEXT: Turns a (possibly nested) list of column declarations into a
//! positioned model: the group tree, the flattened leaves in display order,
//! the header depth, and a diff against the previously compiled model so the
//! grid can tell a re-query apart from a re-render. Unchanged columns keep
//! their previous `Arc`, so identity comparison is enough downstream.

use crate::column::{
    Callback, ClipMode, ColumnDeclaration, ColumnType, DeclaredType, EditConfig, HeaderAccessorFn,
    Template, TemplateSettings, TextAlign, ValidationRules, ValueAccessorFn,
};
use crate::format::{looks_like_iso_date, ValueFormatter, ValueParser};
use crate::value::{field_value, get_field, Record};
use crate::{log_debug, log_warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static COLUMN_UID_SEQ: AtomicU64 = AtomicU64::new(0);

/// Generate a process-unique uid with the given prefix, e.g. `grid-column-7`.
pub fn next_uid(prefix: &str) -> String {
    let n = COLUMN_UID_SEQ.fetch_add(1, Ordering::SeqCst) + 1;
    format!("{}-{}", prefix, n)
}

// ============================================================================
// COMPILED TYPES
// ============================================================================

/// A column after defaults, normalization and formatter resolution.
#[derive(Debug, Clone)]
pub struct CompiledColumn {
    pub uid: String,
    /// Bound field path. `None` for groups and unbound template columns.
    pub field: Option<String>,
    pub header_text: String,
    pub declared_type: DeclaredType,
    /// Resolved type; `None` until inferred or when declared `none`.
    pub column_type: Option<ColumnType>,
    pub format: Option<String>,
    pub formatter: Option<ValueFormatter>,
    pub parser: Option<ValueParser>,
    /// Normalized width (`"120px"`), empty when not declared.
    pub width: String,
    pub text_align: TextAlign,
    pub header_text_align: Option<TextAlign>,
    pub clip_mode: ClipMode,
    pub visible: bool,
    pub allow_sort: bool,
    pub allow_filter: bool,
    pub allow_search: bool,
    pub allow_edit: bool,
    pub is_primary_key: bool,
    pub default_value: Option<Value>,
    pub display_as_check_box: bool,
    pub disable_html_encode: bool,
    pub edit: EditConfig,
    pub validation_rules: Option<ValidationRules>,
    pub custom_attributes: BTreeMap<String, String>,
    pub template_settings: TemplateSettings,
    pub template: Option<Template>,
    pub header_template: Option<Template>,
    pub value_accessor: Option<Callback<ValueAccessorFn>>,
    pub header_value_accessor: Option<Callback<HeaderAccessorFn>>,
    /// `sf-{align}align` for data cells.
    pub align_class: &'static str,
    /// Header alignment class, falling back to the cell alignment.
    pub header_align_class: &'static str,
    /// `sf-hide` when not visible.
    pub hidden_class: Option<&'static str>,
    pub children: Vec<Arc<CompiledColumn>>,
    /// Nesting level, 0 for top-level columns.
    pub level: usize,
    /// Sibling positions of every ancestor group, outermost first.
    pub group_path: Vec<usize>,
    /// Number of leaf descendants (1 for a leaf).
    pub leaf_count: usize,
    source: ColumnDeclaration,
}

impl CompiledColumn {
    pub fn is_group(&self) -> bool {
        !self.children.is_empty()
    }

    /// Cell value for a record: the custom accessor, else the field path.
    pub fn value_of(&self, record: &Record) -> Value {
        let field = self.field.as_deref().unwrap_or("");
        match &self.value_accessor {
            Some(accessor) => (accessor.get())(field, record, self),
            None if field.is_empty() => Value::Null,
            None => field_value(record, field),
        }
    }

    /// Header content: the custom accessor, else header text.
    pub fn header_value(&self) -> String {
        match &self.header_value_accessor {
            Some(accessor) => (accessor.get())(self),
            None => self.header_text.clone(),
        }
    }

    /// The declaration this column was compiled from (children stripped).
    pub fn declaration(&self) -> &ColumnDeclaration {
        &self.source
    }

    fn with_inferred_type(&self, column_type: ColumnType) -> CompiledColumn {
        let mut next = self.clone();
        next.column_type = Some(column_type);
        if column_type == ColumnType::DateOnly && next.format.is_none() {
            next.format = Some("yMd".to_string());
        }
        let (formatter, parser) = resolve_codecs(&next.source, Some(column_type), next.format.as_deref());
        next.formatter = formatter;
        next.parser = parser;
        next
    }
}

/// Result of comparing a compiled model with its predecessor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnDiff {
    /// Sort/filter/search participation or the tree shape changed; a re-query
    /// is needed.
    pub data_affecting: bool,
    /// Only presentation changed; a re-render is enough.
    pub display_only: bool,
}

impl ColumnDiff {
    pub fn is_unchanged(&self) -> bool {
        !self.data_affecting && !self.display_only
    }
}

/// Compiled column model.
#[derive(Debug, Clone)]
pub struct ColumnModel {
    /// Top-level columns with their group children.
    pub columns: Vec<Arc<CompiledColumn>>,
    /// Leaves in display order.
    pub leaves: Vec<Arc<CompiledColumn>>,
    /// Number of header rows.
    pub depth: usize,
    pub diff: ColumnDiff,
    types_inferred: bool,
}

impl Default for ColumnModel {
    fn default() -> Self {
        ColumnModel {
            columns: Vec::new(),
            leaves: Vec::new(),
            depth: 1,
            diff: ColumnDiff::default(),
            types_inferred: false,
        }
    }
}

impl ColumnModel {
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn leaf_by_field(&self, field: &str) -> Option<&Arc<CompiledColumn>> {
        self.leaves.iter().find(|c| c.field.as_deref() == Some(field))
    }

    /// Leaf flagged as primary key, if any.
    pub fn primary_key(&self) -> Option<&Arc<CompiledColumn>> {
        self.leaves.iter().find(|c| c.is_primary_key && c.field.is_some())
    }

    pub fn primary_key_field(&self) -> Option<&str> {
        self.primary_key().and_then(|c| c.field.as_deref())
    }

    /// Whether type inference already ran for this column set.
    pub fn types_inferred(&self) -> bool {
        self.types_inferred
    }

    /// Back-fill types of inferable leaves from the first record. Runs once
    /// per column set; later calls are no-ops.
    pub fn infer_types(&mut self, record: &Record) {
        if self.types_inferred {
            return;
        }
        self.types_inferred = true;

        let mut changed = 0usize;
        let columns = std::mem::take(&mut self.columns);
        self.columns = columns
            .iter()
            .map(|col| rebuild_with_types(col, record, &mut changed))
            .collect();
        self.leaves = collect_leaves(&self.columns);
        log_debug!("COLUMNS", "infer_types updated={}", changed);
    }
}

fn infer_type_of(value: &Value) -> Option<ColumnType> {
    match value {
        Value::Number(_) => Some(ColumnType::Number),
        Value::Bool(_) => Some(ColumnType::Boolean),
        Value::String(s) if looks_like_iso_date(s) => {
            let has_time = s.len() > 10
                && crate::format::parse_date_text(s)
                    .map(|dt| dt.time() != chrono::NaiveTime::MIN)
                    .unwrap_or(false);
            Some(if has_time { ColumnType::DateTime } else { ColumnType::Date })
        }
        Value::String(_) => Some(ColumnType::String),
        _ => None,
    }
}

fn rebuild_with_types(
    col: &Arc<CompiledColumn>,
    record: &Record,
    changed: &mut usize,
) -> Arc<CompiledColumn> {
    if col.is_group() {
        let children: Vec<Arc<CompiledColumn>> = col
            .children
            .iter()
            .map(|c| rebuild_with_types(c, record, changed))
            .collect();
        if children.iter().zip(col.children.iter()).all(|(a, b)| Arc::ptr_eq(a, b)) {
            return Arc::clone(col);
        }
        let mut next = (**col).clone();
        next.children = children;
        return Arc::new(next);
    }

    if col.declared_type != DeclaredType::Infer || col.column_type.is_some() {
        return Arc::clone(col);
    }
    let inferred = col
        .field
        .as_deref()
        .and_then(|f| get_field(record, f))
        .and_then(infer_type_of);
    match inferred {
        Some(t) => {
            *changed += 1;
            Arc::new(col.with_inferred_type(t))
        }
        None => Arc::clone(col),
    }
}

fn collect_leaves(columns: &[Arc<CompiledColumn>]) -> Vec<Arc<CompiledColumn>> {
    let mut leaves = Vec::new();
    fn walk(cols: &[Arc<CompiledColumn>], out: &mut Vec<Arc<CompiledColumn>>) {
        for col in cols {
            if col.is_group() {
                walk(&col.children, out);
            } else {
                out.push(Arc::clone(col));
            }
        }
    }
    walk(columns, &mut leaves);
    leaves
}

// ============================================================================
// COMPILATION
// ============================================================================

fn resolve_codecs(
    decl: &ColumnDeclaration,
    column_type: Option<ColumnType>,
    format: Option<&str>,
) -> (Option<ValueFormatter>, Option<ValueParser>) {
    let formatter = match &decl.format_fn {
        Some(f) => Some(ValueFormatter::Custom(f.clone())),
        None => format.and_then(|f| ValueFormatter::resolve(column_type, f)),
    };
    let parser = match &decl.parse_fn {
        Some(p) => Some(ValueParser::Custom(p.clone())),
        None => match column_type {
            // Number columns without a format still parse to two places
            Some(ColumnType::Number) if format.is_none() => Some(ValueParser::Number {
                decimal_places: Some(2),
            }),
            Some(t) => ValueParser::for_type(t, format),
            None => None,
        },
    };
    (formatter, parser)
}

/// Keys whose change requires a re-query. Every other declaration key
/// (alignment, width, visibility, header text, templates, format, edit
/// config, accessors) only affects presentation. Flags compare resolved, so
/// an explicit `true` equals an omitted one.
fn data_props_equal(a: &ColumnDeclaration, b: &ColumnDeclaration) -> bool {
    let resolved = |flag: Option<bool>| flag.unwrap_or(true);
    resolved(a.allow_sort) == resolved(b.allow_sort)
        && resolved(a.allow_filter) == resolved(b.allow_filter)
        && resolved(a.allow_search) == resolved(b.allow_search)
}

struct Compiler<'p> {
    previous: Option<&'p ColumnModel>,
    leaf_index: usize,
    max_level: usize,
    diff: ColumnDiff,
}

impl<'p> Compiler<'p> {
    fn previous_leaf(&self, field: Option<&str>) -> Option<&'p Arc<CompiledColumn>> {
        self.previous
            .and_then(|m| m.leaves.get(self.leaf_index))
            .filter(|c| c.field.as_deref() == field)
    }

    fn compile_list(
        &mut self,
        decls: &[ColumnDeclaration],
        level: usize,
        group_path: &[usize],
        previous_siblings: Option<&'p [Arc<CompiledColumn>]>,
    ) -> Vec<Arc<CompiledColumn>> {
        let mut out = Vec::with_capacity(decls.len());
        for (position, decl) in decls.iter().enumerate() {
            let previous_sibling = previous_siblings.and_then(|s| s.get(position));
            if let Some(col) = self.compile_one(decl, level, group_path, position, previous_sibling) {
                out.push(col);
            }
        }
        out
    }

    fn compile_one(
        &mut self,
        decl: &ColumnDeclaration,
        level: usize,
        group_path: &[usize],
        position: usize,
        previous_sibling: Option<&'p Arc<CompiledColumn>>,
    ) -> Option<Arc<CompiledColumn>> {
        let mut source = decl.clone();
        source.columns = Vec::new();

        if decl.is_group() {
            if let Some(field) = &decl.field {
                log_warn!(
                    "COLUMNS",
                    "column '{}' declares both a field and children; field ignored",
                    field
                );
                source.field = None;
            }
            let mut path = group_path.to_vec();
            path.push(position);
            let previous_group = previous_sibling.filter(|g| g.is_group());
            let children = self.compile_list(
                &decl.columns,
                level + 1,
                &path,
                previous_group.map(|g| g.children.as_slice()),
            );
            if children.is_empty() {
                log_warn!("COLUMNS", "group '{}' has no usable children; skipped",
                    decl.header_text.as_deref().unwrap_or(""));
                return None;
            }

            if let Some(prev) = previous_group {
                let same_children = prev.children.len() == children.len()
                    && prev.children.iter().zip(children.iter()).all(|(a, b)| Arc::ptr_eq(a, b));
                if same_children && prev.source == source {
                    return Some(Arc::clone(prev));
                }
                if prev.source != source {
                    self.diff.display_only = true;
                }
            }

            let mut col = build_column(&source, level, group_path.to_vec());
            if let (None, Some(prev)) = (&decl.uid, previous_group) {
                col.uid = prev.uid.clone();
            }
            col.leaf_count = children.iter().map(|c| c.leaf_count).sum();
            col.children = children;
            return Some(Arc::new(col));
        }

        let field = match &decl.field {
            Some(f) if !f.is_empty() => Some(f.clone()),
            _ => None,
        };
        if field.is_none() && decl.template.is_none() {
            log_warn!(
                "COLUMNS",
                "column '{}' has neither field, children nor template; skipped",
                decl.header_text.as_deref().unwrap_or("")
            );
            return None;
        }

        self.max_level = self.max_level.max(level);
        let previous = self.previous_leaf(field.as_deref());
        self.leaf_index += 1;

        if let Some(prev) = previous {
            if prev.group_path != group_path {
                self.diff.data_affecting = true;
            } else if prev.source == source {
                return Some(Arc::clone(prev));
            } else if !data_props_equal(&prev.source, &source) {
                self.diff.data_affecting = true;
            } else {
                // Presentation keys, validation rules and defaults all land here
                self.diff.display_only = true;
            }
        }

        let mut col = build_column(&source, level, group_path.to_vec());
        if let (None, Some(prev)) = (&decl.uid, previous) {
            col.uid = prev.uid.clone();
            if let (DeclaredType::Infer, Some(t)) = (col.declared_type, prev.column_type) {
                col = col.with_inferred_type(t);
            }
        }
        Some(Arc::new(col))
    }
}

fn build_column(decl: &ColumnDeclaration, level: usize, group_path: Vec<usize>) -> CompiledColumn {
    let declared_type = DeclaredType::from_declaration(decl.column_type.as_deref());
    let column_type = match declared_type {
        DeclaredType::Typed(t) => Some(t),
        _ => None,
    };
    let mut format = decl.format.clone();
    if column_type == Some(ColumnType::DateOnly) && format.is_none() {
        format = Some("yMd".to_string());
    }
    let (formatter, parser) = resolve_codecs(decl, column_type, format.as_deref());

    let text_align = decl.text_align.unwrap_or_default();
    let visible = decl.visible.unwrap_or(true);
    let mut custom_attributes = decl.custom_attributes.clone();
    if !visible {
        custom_attributes.insert("style".to_string(), "display: none".to_string());
    }

    CompiledColumn {
        uid: decl.uid.clone().unwrap_or_else(|| next_uid("grid-column")),
        field: decl.field.clone().filter(|f| !f.is_empty()),
        header_text: decl
            .header_text
            .clone()
            .or_else(|| decl.field.clone())
            .unwrap_or_default(),
        declared_type,
        column_type,
        format,
        formatter,
        parser,
        width: decl.width.as_ref().map(|w| w.to_unit()).unwrap_or_default(),
        text_align,
        header_text_align: decl.header_text_align,
        clip_mode: decl.clip_mode.unwrap_or_default(),
        visible,
        allow_sort: decl.allow_sort.unwrap_or(true),
        allow_filter: decl.allow_filter.unwrap_or(true),
        allow_search: decl.allow_search.unwrap_or(true),
        allow_edit: decl.allow_edit.unwrap_or(true),
        is_primary_key: decl.is_primary_key,
        default_value: decl.default_value.clone(),
        display_as_check_box: decl.display_as_check_box,
        disable_html_encode: decl.disable_html_encode.unwrap_or(true),
        edit: decl.edit.clone().unwrap_or_default(),
        validation_rules: decl.validation_rules.clone(),
        custom_attributes,
        template_settings: decl.template_settings.clone().unwrap_or_default(),
        template: decl.template.clone(),
        header_template: decl.header_template.clone(),
        value_accessor: decl.value_accessor.clone(),
        header_value_accessor: decl.header_value_accessor.clone(),
        align_class: text_align.class_name(),
        header_align_class: decl.header_text_align.unwrap_or(text_align).class_name(),
        hidden_class: if visible { None } else { Some("sf-hide") },
        children: Vec::new(),
        level,
        group_path,
        leaf_count: 1,
        source: decl.clone(),
    }
}

/// Compile declarations into a column model, diffing against `previous`.
///
/// Leaves are compared positionally, and only where the field at that
/// position is the same. A different leaf count or field sequence is a shape
/// change and reported as data-affecting.
pub fn compile(declarations: &[ColumnDeclaration], previous: Option<&ColumnModel>) -> ColumnModel {
    let mut compiler = Compiler {
        previous,
        leaf_index: 0,
        max_level: 0,
        diff: ColumnDiff::default(),
    };

    let columns = compiler.compile_list(declarations, 0, &[], previous.map(|m| m.columns.as_slice()));
    let leaves = collect_leaves(&columns);
    let depth = compiler.max_level + 1;
    let mut diff = compiler.diff;

    let mut types_inferred = false;
    if let Some(prev) = previous {
        let prev_fields: Vec<Option<&str>> = prev.leaves.iter().map(|c| c.field.as_deref()).collect();
        let fields: Vec<Option<&str>> = leaves.iter().map(|c| c.field.as_deref()).collect();
        if prev_fields != fields || prev.depth != depth {
            diff.data_affecting = true;
        }
        types_inferred = prev.types_inferred && !diff.data_affecting;
    }

    log_debug!(
        "COLUMNS",
        "compile leaves={} depth={} data_affecting={} display_only={}",
        leaves.len(),
        depth,
        diff.data_affecting,
        diff.display_only
    );

    ColumnModel {
        columns,
        leaves,
        depth,
        diff,
        types_inferred,
    }
}
