//! FILENAME: edit-engine/src/settings.rs
//! PURPOSE: Edit settings as read from the grid settings document.

use serde::{Deserialize, Serialize};

/// Where records added without an explicit index are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NewRowPosition {
    Top,
    Bottom,
}

impl Default for NewRowPosition {
    fn default() -> Self {
        NewRowPosition::Top
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditSettings {
    pub allow_add: bool,
    pub allow_edit: bool,
    pub allow_delete: bool,
    /// Ask before saving, and before discarding unsaved changes.
    pub confirm_on_edit: bool,
    pub confirm_on_delete: bool,
    /// Keep an always-visible add row armed.
    pub show_add_new_row: bool,
    pub new_row_position: NewRowPosition,
    pub edit_on_double_click: bool,
}

impl Default for EditSettings {
    fn default() -> Self {
        EditSettings {
            allow_add: false,
            allow_edit: false,
            allow_delete: false,
            confirm_on_edit: true,
            confirm_on_delete: false,
            show_add_new_row: false,
            new_row_position: NewRowPosition::Top,
            edit_on_double_click: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings: EditSettings =
            serde_json::from_str(r#"{"allowEdit": true, "newRowPosition": "Bottom"}"#).unwrap();
        assert!(settings.allow_edit);
        assert!(!settings.allow_add);
        assert!(settings.confirm_on_edit);
        assert_eq!(settings.new_row_position, NewRowPosition::Bottom);
    }
}
