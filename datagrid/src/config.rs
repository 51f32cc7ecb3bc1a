//! FILENAME: datagrid/src/config.rs
//! PURPOSE: Grid settings document.
//! CONTEXT: One camelCase JSON object configures columns, paging, sorting,
//! filtering, searching, selection, editing and aggregates. Every key is
//! optional. Values that cannot work are rejected here rather than later.

use crate::error::ConfigError;
use aggregate_engine::AggregateRow;
use data_pipeline::{
    FilterSettings, PageSettings, PipelineSettings, SearchSettings, SelectionSettings, SortSettings,
};
use edit_engine::EditSettings;
use engine::{log_info, log_warn, ColumnDeclaration};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GridSettings {
    /// Empty means columns are generated from the first loaded record.
    pub columns: Vec<ColumnDeclaration>,
    pub page_settings: PageSettings,
    pub sort_settings: SortSettings,
    pub filter_settings: FilterSettings,
    pub search_settings: SearchSettings,
    pub selection_settings: SelectionSettings,
    pub edit_settings: EditSettings,
    pub aggregates: Vec<AggregateRow>,
}

impl GridSettings {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: GridSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read and validate a settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let settings = Self::from_json(&text)?;
        log_info!("GRID", "settings loaded from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_settings.page_size == 0 {
            return Err(ConfigError::InvalidPageSize);
        }
        if self.page_settings.current_page == 0 {
            return Err(ConfigError::InvalidCurrentPage);
        }
        let keys = self
            .columns
            .iter()
            .flat_map(leaves)
            .filter(|c| c.is_primary_key)
            .count();
        let edits = self.edit_settings.allow_add || self.edit_settings.allow_edit || self.edit_settings.allow_delete;
        if keys == 0 && edits && !self.columns.is_empty() {
            // editing stays disabled at run time; not fatal
            log_warn!("GRID", "editing is enabled but no column is a primary key");
        }
        for row in &self.aggregates {
            if let Some(column) = row.columns.iter().find(|c| c.field.is_empty()) {
                return Err(ConfigError::AggregateWithoutField(column.display_column().to_string()));
            }
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            page: self.page_settings.clone(),
            sort: self.sort_settings.clone(),
            filter: self.filter_settings.clone(),
            search: self.search_settings.clone(),
            selection: self.selection_settings.clone(),
        }
    }
}

fn leaves(decl: &ColumnDeclaration) -> Vec<&ColumnDeclaration> {
    if decl.columns.is_empty() {
        vec![decl]
    } else {
        decl.columns.iter().flat_map(leaves).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_pipeline::{FilterOperator, SelectionMode};
    use edit_engine::NewRowPosition;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = GridSettings::from_json("{}").unwrap();
        assert!(!settings.page_settings.enabled);
        assert_eq!(settings.page_settings.page_size, 12);
        assert!(settings.sort_settings.enabled);
        assert_eq!(settings.search_settings.operator, FilterOperator::Contains);
        assert_eq!(settings.selection_settings.mode, SelectionMode::Single);
        assert!(settings.edit_settings.confirm_on_edit);
    }

    #[test]
    fn test_full_document() {
        let settings = GridSettings::from_json(
            r#"{
                "columns": [
                    {"field": "id", "headerText": "ID", "isPrimaryKey": true},
                    {"headerText": "Person", "columns": [{"field": "name"}, {"field": "age", "type": "Number"}]}
                ],
                "pageSettings": {"enabled": true, "pageSize": 5},
                "sortSettings": {"columns": [{"field": "name", "direction": "Descending"}]},
                "filterSettings": {"columns": [{"field": "age", "operator": "greaterthan", "value": 30}]},
                "searchSettings": {"key": "ann", "fields": ["name"]},
                "editSettings": {"allowEdit": true, "newRowPosition": "Bottom"},
                "aggregates": [{"columns": [{"field": "age", "type": ["Sum", "Average"]}]}]
            }"#,
        )
        .unwrap();
        assert_eq!(settings.columns.len(), 2);
        assert_eq!(settings.page_settings.page_size, 5);
        assert_eq!(settings.page_settings.current_page, 1);
        assert_eq!(settings.sort_settings.columns[0].field, "name");
        assert_eq!(settings.filter_settings.columns[0].operator, FilterOperator::GreaterThan);
        assert_eq!(settings.edit_settings.new_row_position, NewRowPosition::Bottom);
        assert_eq!(settings.aggregates[0].columns[0].types.len(), 2);

        let pipeline = settings.pipeline_settings();
        assert!(pipeline.page.enabled);
        assert_eq!(pipeline.search.key, "ann");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            GridSettings::from_json(r#"{"pageSettings": {"pageSize": 0}}"#),
            Err(ConfigError::InvalidPageSize)
        ));
        assert!(matches!(
            GridSettings::from_json(r#"{"pageSettings": {"currentPage": 0}}"#),
            Err(ConfigError::InvalidCurrentPage)
        ));
        assert!(matches!(
            GridSettings::from_json(r#"{"pageSettings": 7}"#),
            Err(ConfigError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"pageSettings": {{"enabled": true, "pageSize": 3}}}}"#).unwrap();
        let settings = GridSettings::load(file.path()).unwrap();
        assert_eq!(settings.page_settings.page_size, 3);

        let missing = GridSettings::load(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
