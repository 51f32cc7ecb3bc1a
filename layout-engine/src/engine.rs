//! FILENAME: layout-engine/src/engine.rs
//! PURPOSE: Row/cell layout functions.
//! CONTEXT: Header rows come from the column tree (one row per nesting
//! level), the filter row and content rows from the leaves, summary rows from
//! the aggregate configuration plus computed summary records.

use crate::view::*;
use aggregate_engine::{AggregateRow, SummaryRecord};
use engine::{
    next_uid, value_to_text, ColumnModel, ColumnType, CompiledColumn, Localizer, Record, TemplateArgs,
};
use serde_json::Value;
use smallvec::SmallVec;
use std::sync::Arc;

/// Everything the layout functions read besides the row itself.
pub struct LayoutContext<'a> {
    pub model: &'a ColumnModel,
    pub localizer: &'a dyn Localizer,
    /// Sorting enabled grid-wide; drives the header cursor class.
    pub sort_enabled: bool,
    /// Whether a filter row is rendered below the headers.
    pub filter_bar: bool,
}

impl<'a> LayoutContext<'a> {
    pub fn new(model: &'a ColumnModel, localizer: &'a dyn Localizer) -> Self {
        LayoutContext {
            model,
            localizer,
            sort_enabled: true,
            filter_bar: false,
        }
    }

    fn header_row_count(&self) -> usize {
        self.model.depth + usize::from(self.filter_bar)
    }

    /// 1-based position of the first leaf under `column`.
    fn col_index_of(&self, column: &Arc<CompiledColumn>) -> usize {
        let mut first = column;
        while let Some(child) = first.children.first() {
            first = child;
        }
        self.model
            .leaves
            .iter()
            .position(|leaf| Arc::ptr_eq(leaf, first))
            .map(|i| i + 1)
            .unwrap_or(1)
    }
}

/// Row being laid out.
#[derive(Debug, Clone, Copy)]
pub struct RowInput<'a> {
    pub kind: RowKind,
    /// Header-row level for header rows, ordinal otherwise.
    pub index: usize,
    /// Source record (content) or summary record (summary).
    pub record: Option<&'a Record>,
    /// Aggregate configuration of a summary row.
    pub aggregate_row: Option<&'a AggregateRow>,
}

// ============================================================================
// VALUE FORMATTING
// ============================================================================

/// Display text of a data value for a column.
///
/// Uses the compiled formatter when one exists. Boolean columns show the
/// localized true/false labels unless rendered as a checkbox. A number
/// column holding non-numeric text displays as empty.
pub fn format_cell_value(column: &CompiledColumn, value: &Value, localizer: &dyn Localizer) -> String {
    if value.is_null() {
        return String::new();
    }

    let mut text: Option<String> = None;
    if let Some(formatter) = &column.formatter {
        if column.column_type == Some(ColumnType::Number) {
            if let Value::String(s) = value {
                if s.trim().parse::<f64>().is_err() {
                    return String::new();
                }
            }
        }
        text = formatter.format(value);
    }

    if column.column_type == Some(ColumnType::Boolean) && !column.display_as_check_box {
        let raw = text.unwrap_or_else(|| value_to_text(value));
        return match raw.as_str() {
            "true" => localizer.constant("booleanTrueLabel"),
            "false" => localizer.constant("booleanFalseLabel"),
            _ => raw,
        };
    }

    text.unwrap_or_else(|| value_to_text(value))
}

// ============================================================================
// CELL LAYOUT
// ============================================================================

fn header_classes(column: &CompiledColumn, ctx: &LayoutContext<'_>, is_last: bool) -> SmallVec<[&'static str; 6]> {
    let mut classes: SmallVec<[&'static str; 6]> = SmallVec::new();
    classes.push(CSS_HEADER_CELL);
    classes.push(if column.allow_sort && ctx.sort_enabled {
        CSS_MOUSE_POINTER
    } else {
        CSS_DEFAULT_CURSOR
    });
    if column.field.is_some() {
        classes.push(CSS_SORT_ICON);
    }
    classes.push(column.header_align_class);
    if is_last {
        classes.push(CSS_LAST_CELL);
    }
    classes
}

/// Lay out one row's cells for `columns`.
///
/// Header rows pass the columns of one tree level; every other row kind
/// passes the leaves.
pub fn layout_row(
    row: &RowInput<'_>,
    columns: &[Arc<CompiledColumn>],
    ctx: &LayoutContext<'_>,
) -> Vec<CellDescriptor> {
    let kind = CellKind::from(row.kind);
    let last = columns.len().saturating_sub(1);

    columns
        .iter()
        .enumerate()
        .map(|(position, column)| {
            let is_last = position == last && matches!(row.kind, RowKind::Header | RowKind::Summary);
            let col_span = if row.kind == RowKind::Header && column.is_group() {
                column.leaf_count
            } else {
                1
            };
            let row_span = if row.kind == RowKind::Header && !column.is_group() {
                ctx.model.depth.saturating_sub(row.index).max(1)
            } else {
                1
            };
            let role = match row.kind {
                RowKind::Header | RowKind::Filter => CellRole::ColumnHeader,
                _ => CellRole::GridCell,
            };

            let aggregate_column = match (row.kind, row.aggregate_row, column.field.as_deref()) {
                (RowKind::Summary, Some(agg), Some(field)) => agg.column_for(field),
                _ => None,
            };

            let (is_template, is_data_cell) = match row.kind {
                RowKind::Header => (column.header_template.is_some(), false),
                RowKind::Filter => (false, false),
                RowKind::Content => (column.template.is_some(), true),
                RowKind::Summary => (
                    aggregate_column.map_or(false, |a| a.footer_template.is_some()),
                    aggregate_column.is_some(),
                ),
            };

            let mut classes: SmallVec<[&'static str; 6]> = match row.kind {
                RowKind::Header => header_classes(column, ctx, is_last),
                RowKind::Filter => SmallVec::from_slice(&[CSS_FILTER_CELL]),
                RowKind::Summary => SmallVec::from_slice(&[CSS_SUMMARY_CELL, column.align_class]),
                RowKind::Content => SmallVec::from_slice(&[CSS_ROW_CELL, column.align_class]),
            };
            if let Some(hidden) = column.hidden_class {
                classes.push(hidden);
            }

            let label = match row.kind {
                RowKind::Content
                    if column.template.is_some() && !column.template_settings.aria_label.is_empty() =>
                {
                    Some(column.template_settings.aria_label.clone())
                }
                _ => None,
            };

            let title = match row.kind {
                RowKind::Filter => Some(format!(
                    "{}{}",
                    if column.header_text.is_empty() {
                        column.field.as_deref().unwrap_or("")
                    } else {
                        column.header_text.as_str()
                    },
                    ctx.localizer.constant("filterBarTooltip")
                )),
                _ => None,
            };

            let value = match row.kind {
                RowKind::Header => match &column.header_template {
                    Some(template) => template.produce(&TemplateArgs {
                        column,
                        record: None,
                        index: position,
                        summary: None,
                    }),
                    None => column.header_value(),
                },
                RowKind::Filter => String::new(),
                RowKind::Content => match (row.record, &column.template) {
                    (Some(record), Some(template)) => template.produce(&TemplateArgs {
                        column,
                        record: Some(record),
                        index: row.index,
                        summary: None,
                    }),
                    (Some(record), None) => {
                        format_cell_value(column, &column.value_of(record), ctx.localizer)
                    }
                    (None, _) => String::new(),
                },
                RowKind::Summary => summary_value(column, aggregate_column, row.record, position),
            };

            CellDescriptor {
                column_uid: column.uid.clone(),
                field: column.field.clone(),
                kind,
                visible: column.visible,
                is_template,
                is_data_cell,
                row_span,
                col_span,
                aria: AriaAttributes {
                    role,
                    col_index: if row.kind == RowKind::Header {
                        ctx.col_index_of(column)
                    } else {
                        position + 1
                    },
                    col_span: if col_span > 1 { Some(col_span) } else { None },
                    label,
                    tab_index: -1,
                },
                classes,
                is_last,
                title,
                custom_attributes: column.custom_attributes.clone(),
                value,
            }
        })
        .collect()
}

/// Joins the formatted values of a multi-operation summary cell.
const SUMMARY_SEPARATOR: &str = " | ";

/// Summary cell content: footer template, else the formatted values of every
/// declared operation in declaration order.
fn summary_value(
    column: &CompiledColumn,
    aggregate: Option<&aggregate_engine::AggregateColumn>,
    summary: Option<&SummaryRecord>,
    position: usize,
) -> String {
    let aggregate = match aggregate {
        Some(a) => a,
        None => return String::new(),
    };
    let entry = summary
        .and_then(|s| s.get(aggregate.display_column()))
        .and_then(Value::as_object);

    if let Some(template) = &aggregate.footer_template {
        return template.produce(&TemplateArgs {
            column,
            record: None,
            index: position,
            summary: entry,
        });
    }

    let entry = match entry {
        Some(entry) => entry,
        None => return String::new(),
    };
    aggregate
        .types
        .iter()
        .filter_map(|t| entry.get(t.label()).map(value_to_text))
        .collect::<Vec<_>>()
        .join(SUMMARY_SEPARATOR)
}

// ============================================================================
// ROW BUILDERS
// ============================================================================

fn columns_at_level(columns: &[Arc<CompiledColumn>], level: usize, out: &mut Vec<Arc<CompiledColumn>>) {
    for column in columns {
        if column.level == level {
            out.push(Arc::clone(column));
        } else if column.level < level && column.is_group() {
            columns_at_level(&column.children, level, out);
        }
    }
}

/// One header row per nesting level.
pub fn header_rows(ctx: &LayoutContext<'_>) -> Vec<RowDescriptor> {
    (0..ctx.model.depth)
        .map(|level| {
            let mut columns = Vec::new();
            columns_at_level(&ctx.model.columns, level, &mut columns);
            let input = RowInput {
                kind: RowKind::Header,
                index: level,
                record: None,
                aggregate_row: None,
            };
            RowDescriptor {
                uid: next_uid("grid-header-row"),
                kind: RowKind::Header,
                record: None,
                index: level,
                aria_row_index: level + 1,
                cells: layout_row(&input, &columns, ctx),
                is_empty_row: false,
            }
        })
        .collect()
}

/// The filter bar row under the headers.
pub fn filter_row(ctx: &LayoutContext<'_>) -> RowDescriptor {
    let input = RowInput {
        kind: RowKind::Filter,
        index: ctx.model.depth,
        record: None,
        aggregate_row: None,
    };
    RowDescriptor {
        uid: next_uid("grid-filter-row"),
        kind: RowKind::Filter,
        record: None,
        index: 0,
        aria_row_index: ctx.model.depth + 1,
        cells: layout_row(&input, &ctx.model.leaves, ctx),
        is_empty_row: false,
    }
}

fn empty_row(ctx: &LayoutContext<'_>) -> RowDescriptor {
    let visible = ctx.model.leaves.iter().filter(|c| c.visible).count().max(1);
    let cell = CellDescriptor {
        column_uid: String::new(),
        field: None,
        kind: CellKind::Data,
        visible: true,
        is_template: false,
        is_data_cell: false,
        row_span: 1,
        col_span: visible,
        aria: AriaAttributes {
            role: CellRole::GridCell,
            col_index: 1,
            col_span: if visible > 1 { Some(visible) } else { None },
            label: None,
            tab_index: -1,
        },
        classes: SmallVec::new(),
        is_last: false,
        title: None,
        custom_attributes: Default::default(),
        value: ctx.localizer.constant("emptyRecord"),
    };
    RowDescriptor {
        uid: EMPTY_ROW_UID.to_string(),
        kind: RowKind::Content,
        record: None,
        index: 0,
        aria_row_index: ctx.header_row_count() + 1,
        cells: vec![cell],
        is_empty_row: true,
    }
}

/// Content rows for a committed page; a single empty-state row when the
/// page has no records.
pub fn content_rows(records: &[Record], ctx: &LayoutContext<'_>) -> Vec<RowDescriptor> {
    if records.is_empty() {
        return vec![empty_row(ctx)];
    }
    let offset = ctx.header_row_count();
    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let input = RowInput {
                kind: RowKind::Content,
                index,
                record: Some(record),
                aggregate_row: None,
            };
            RowDescriptor {
                uid: next_uid("grid-row"),
                kind: RowKind::Content,
                record: Some(record.clone()),
                index,
                aria_row_index: offset + index + 1,
                cells: layout_row(&input, &ctx.model.leaves, ctx),
                is_empty_row: false,
            }
        })
        .collect()
}

/// Summary rows: one per aggregate row with columns, paired with the
/// computed summary records in the same order. `content_count` is the number
/// of rendered content rows; summary rows are numbered after them.
pub fn summary_rows(
    aggregate_rows: &[AggregateRow],
    summaries: &[SummaryRecord],
    content_count: usize,
    ctx: &LayoutContext<'_>,
) -> Vec<RowDescriptor> {
    let offset = ctx.header_row_count() + content_count;
    aggregate_rows
        .iter()
        .filter(|r| !r.columns.is_empty())
        .zip(summaries.iter())
        .enumerate()
        .map(|(index, (aggregate_row, summary))| {
            let input = RowInput {
                kind: RowKind::Summary,
                index,
                record: Some(summary),
                aggregate_row: Some(aggregate_row),
            };
            RowDescriptor {
                uid: next_uid("grid-row"),
                kind: RowKind::Summary,
                record: Some(summary.clone()),
                index,
                aria_row_index: offset + index + 1,
                cells: layout_row(&input, &ctx.model.leaves, ctx),
                is_empty_row: false,
            }
        })
        .collect()
}
