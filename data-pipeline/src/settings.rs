//! FILENAME: data-pipeline/src/settings.rs
//! PURPOSE: Paging, sorting, filtering and search settings.
//! CONTEXT: Deserialized as part of the grid settings document; every key is
//! optional.

use crate::query::{FilterOperator, FilterPredicate, SortDescriptor};
use crate::selection::SelectionMode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageSettings {
    pub enabled: bool,
    pub page_size: usize,
    /// 1-based
    pub current_page: usize,
}

impl Default for PageSettings {
    fn default() -> Self {
        PageSettings {
            enabled: false,
            page_size: 12,
            current_page: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SortSettings {
    pub enabled: bool,
    /// Initial sort order.
    pub columns: Vec<SortDescriptor>,
}

impl Default for SortSettings {
    fn default() -> Self {
        SortSettings {
            enabled: true,
            columns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSettings {
    pub enabled: bool,
    /// Initial predicates.
    pub columns: Vec<FilterPredicate>,
    pub case_sensitive: bool,
    pub ignore_accent: bool,
    /// Render the filter bar row.
    pub show_filter_bar: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        FilterSettings {
            enabled: true,
            columns: Vec::new(),
            case_sensitive: false,
            ignore_accent: false,
            show_filter_bar: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchSettings {
    pub enabled: bool,
    /// Current search term.
    pub key: String,
    /// Fields searched; empty means every searchable leaf.
    pub fields: Vec<String>,
    pub operator: FilterOperator,
    pub case_sensitive: bool,
    pub ignore_accent: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        SearchSettings {
            enabled: true,
            key: String::new(),
            fields: Vec::new(),
            operator: FilterOperator::Contains,
            case_sensitive: false,
            ignore_accent: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectionSettings {
    pub mode: SelectionMode,
}

/// Settings consumed by the pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineSettings {
    pub page: PageSettings,
    pub sort: SortSettings,
    pub filter: FilterSettings,
    pub search: SearchSettings,
    pub selection: SelectionSettings,
}
