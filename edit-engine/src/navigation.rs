//! FILENAME: edit-engine/src/navigation.rs
//! PURPOSE: Keyboard navigation inside the inline edit form.
//! CONTEXT: Tab moving past the last editable field (or Shift+Tab before the
//! first) saves the session instead of leaving the form. Key columns are only
//! tabbable while adding.

use crate::session::{EditMode, EditOutcome};
use engine::{ColumnModel, CompiledColumn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabDirection {
    Forward,
    Backward,
}

impl TabDirection {
    pub fn from_shift(shift: bool) -> Self {
        if shift {
            TabDirection::Backward
        } else {
            TabDirection::Forward
        }
    }
}

/// What the host should do with the key press.
#[derive(Debug, Clone, PartialEq)]
pub enum TabOutcome {
    /// Let focus move normally.
    Continue,
    /// The form boundary was reached and a save was attempted.
    Saved(EditOutcome),
}

impl TabOutcome {
    pub fn prevent_default(&self) -> bool {
        matches!(self, TabOutcome::Saved(_))
    }
}

fn field_of(column: &CompiledColumn) -> Option<&str> {
    column.field.as_deref().filter(|f| !f.is_empty())
}

fn editable_in_edit(column: &CompiledColumn) -> bool {
    column.allow_edit && column.visible && !column.is_primary_key && field_of(column).is_some()
}

/// Fields that take part in tab navigation for `mode`, in column order.
pub fn editable_fields(columns: &ColumnModel, mode: EditMode) -> Vec<String> {
    columns
        .leaves
        .iter()
        .filter(|c| match mode {
            EditMode::Add => c.allow_edit && field_of(c).is_some(),
            EditMode::Edit => editable_in_edit(c),
        })
        .filter_map(|c| field_of(c).map(str::to_string))
        .collect()
}

/// Field to focus when a session opens. Adding prefers a visible key column;
/// editing starts at the first non-key field, or the last when `from_end`.
pub fn first_focus_field(columns: &ColumnModel, mode: EditMode, from_end: bool) -> Option<String> {
    let leaves = &columns.leaves;
    let found = match mode {
        EditMode::Add => leaves
            .iter()
            .find(|c| c.allow_edit && c.visible && c.is_primary_key && field_of(c).is_some())
            .or_else(|| leaves.iter().find(|c| editable_in_edit(c))),
        EditMode::Edit if from_end => leaves.iter().rev().find(|c| editable_in_edit(c)),
        EditMode::Edit => leaves.iter().find(|c| editable_in_edit(c)),
    };
    found.and_then(|c| field_of(c)).map(str::to_string)
}

/// True when tabbing from `field` in `direction` would leave the form.
pub fn is_boundary(fields: &[String], field: &str, direction: TabDirection) -> bool {
    let Some(position) = fields.iter().position(|f| f == field) else {
        return false;
    };
    match direction {
        TabDirection::Forward => position + 1 == fields.len(),
        TabDirection::Backward => position == 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{compile, ColumnDeclaration};

    fn model() -> ColumnModel {
        compile(
            &[
                ColumnDeclaration::new("id", "ID").primary_key(),
                ColumnDeclaration::new("name", "Name"),
                ColumnDeclaration::new("secret", "Secret").with_visible(false),
                ColumnDeclaration::new("total", "Total").with_allow_edit(false),
                ColumnDeclaration::new("city", "City"),
            ],
            None,
        )
    }

    #[test]
    fn test_editable_fields_per_mode() {
        let m = model();
        assert_eq!(editable_fields(&m, EditMode::Add), vec!["id", "name", "secret", "city"]);
        assert_eq!(editable_fields(&m, EditMode::Edit), vec!["name", "city"]);
    }

    #[test]
    fn test_first_focus_field() {
        let m = model();
        assert_eq!(first_focus_field(&m, EditMode::Add, false).as_deref(), Some("id"));
        assert_eq!(first_focus_field(&m, EditMode::Edit, false).as_deref(), Some("name"));
        assert_eq!(first_focus_field(&m, EditMode::Edit, true).as_deref(), Some("city"));
    }

    #[test]
    fn test_boundaries() {
        let fields = vec!["name".to_string(), "city".to_string()];
        assert!(is_boundary(&fields, "city", TabDirection::Forward));
        assert!(!is_boundary(&fields, "name", TabDirection::Forward));
        assert!(is_boundary(&fields, "name", TabDirection::Backward));
        assert!(!is_boundary(&fields, "city", TabDirection::Backward));
        assert!(!is_boundary(&fields, "id", TabDirection::Forward));
    }
}
