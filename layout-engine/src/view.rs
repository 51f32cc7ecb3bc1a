//! FILENAME: layout-engine/src/view.rs
//! Grid View - Renderable row and cell descriptors.
//!
//! Descriptors are output only: the layout engine builds them, the host
//! renders them.

use engine::Record;
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// Uid of the placeholder row shown when a page has no records.
pub const EMPTY_ROW_UID: &str = "empty-row-uid";

pub const CSS_HEADER_CELL: &str = "sf-headercell";
pub const CSS_FILTER_CELL: &str = "sf-filterbarcell";
pub const CSS_SUMMARY_CELL: &str = "sf-summarycell";
pub const CSS_ROW_CELL: &str = "sf-rowcell";
pub const CSS_LAST_CELL: &str = "sf-lastcell";
pub const CSS_DEFAULT_CURSOR: &str = "sf-defaultcursor";
pub const CSS_MOUSE_POINTER: &str = "sf-mousepointer";
pub const CSS_SORT_ICON: &str = "sf-sorticon";
pub const CSS_CELL_HIDE: &str = "sf-hide";
pub const CSS_SUMMARY_ROW: &str = "sf-summaryrow";

// ============================================================================
// KINDS
// ============================================================================

/// Section a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowKind {
    Header,
    Filter,
    Content,
    Summary,
}

/// Kind of a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CellKind {
    Header,
    Filter,
    Data,
    Summary,
}

impl From<RowKind> for CellKind {
    fn from(kind: RowKind) -> Self {
        match kind {
            RowKind::Header => CellKind::Header,
            RowKind::Filter => CellKind::Filter,
            RowKind::Content => CellKind::Data,
            RowKind::Summary => CellKind::Summary,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellRole {
    ColumnHeader,
    GridCell,
}

impl CellRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellRole::ColumnHeader => "columnheader",
            CellRole::GridCell => "gridcell",
        }
    }
}

// ============================================================================
// DESCRIPTORS
// ============================================================================

/// Accessibility attributes of a cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AriaAttributes {
    pub role: CellRole,
    /// 1-based column position.
    pub col_index: usize,
    /// Present only when the cell spans more than one column.
    pub col_span: Option<usize>,
    /// Announced label for templated cells.
    pub label: Option<String>,
    pub tab_index: i32,
}

/// One rendered cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellDescriptor {
    pub column_uid: String,
    pub field: Option<String>,
    pub kind: CellKind,
    pub visible: bool,
    pub is_template: bool,
    pub is_data_cell: bool,
    pub row_span: usize,
    pub col_span: usize,
    pub aria: AriaAttributes,
    pub classes: SmallVec<[&'static str; 6]>,
    /// Last cell of a header or summary row.
    pub is_last: bool,
    /// Tooltip, set for filter cells.
    pub title: Option<String>,
    pub custom_attributes: BTreeMap<String, String>,
    /// Resolved display value.
    pub value: String,
}

impl CellDescriptor {
    /// Space-separated class attribute.
    pub fn class_name(&self) -> String {
        self.classes.join(" ")
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| *c == class)
    }
}

/// One rendered row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowDescriptor {
    pub uid: String,
    pub kind: RowKind,
    /// Source record for content rows, summary record for summary rows.
    pub record: Option<Record>,
    /// Ordinal within its section.
    pub index: usize,
    /// 1-based position across all sections.
    pub aria_row_index: usize,
    pub cells: Vec<CellDescriptor>,
    pub is_empty_row: bool,
}

impl RowDescriptor {
    pub fn is_data_row(&self) -> bool {
        self.kind == RowKind::Content && !self.is_empty_row
    }

    pub fn cell_for_field(&self, field: &str) -> Option<&CellDescriptor> {
        self.cells.iter().find(|c| c.field.as_deref() == Some(field))
    }
}
