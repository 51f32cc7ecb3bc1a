//! FILENAME: engine/src/localization.rs
//! PURPOSE: Localized UI constants.

use std::collections::HashMap;

/// Resolves a localization key to display text.
pub trait Localizer: Send + Sync {
    fn constant(&self, key: &str) -> String;
}

/// Built-in English strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLocalizer;

const ENGLISH: &[(&str, &str)] = &[
    ("booleanTrueLabel", "true"),
    ("booleanFalseLabel", "false"),
    ("filterBarTooltip", "'s filter bar cell"),
    ("emptyRecord", "No records to display"),
    ("confirmTitle", "Confirm"),
    ("confirmText", "OK"),
    ("cancelText", "Cancel"),
    ("saveConfirm", "Are you sure you want to save the changes?"),
    ("cancelEditConfirm", "Are you sure you want to discard the changes?"),
    ("deleteConfirm", "Are you sure you want to delete the record?"),
    ("unsavedChangesConfirm", "Unsaved changes will be lost. Are you sure you want to continue?"),
    ("deleteText", "Delete"),
];

impl Localizer for DefaultLocalizer {
    fn constant(&self, key: &str) -> String {
        ENGLISH
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
            .unwrap_or_else(|| key.to_string())
    }
}

/// Overrides on top of the English defaults, e.g. loaded from a JSON map.
#[derive(Debug, Clone, Default)]
pub struct MapLocalizer {
    strings: HashMap<String, String>,
}

impl MapLocalizer {
    pub fn new(strings: HashMap<String, String>) -> Self {
        MapLocalizer { strings }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(MapLocalizer::new(serde_json::from_str(json)?))
    }
}

impl Localizer for MapLocalizer {
    fn constant(&self, key: &str) -> String {
        match self.strings.get(key) {
            Some(value) => value.clone(),
            None => DefaultLocalizer.constant(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_strings() {
        assert_eq!(DefaultLocalizer.constant("booleanTrueLabel"), "true");
        assert_eq!(DefaultLocalizer.constant("unknownKey"), "unknownKey");
    }

    #[test]
    fn test_overrides_fall_back_to_english() {
        let l = MapLocalizer::from_json(r#"{"booleanTrueLabel": "Ja"}"#).unwrap();
        assert_eq!(l.constant("booleanTrueLabel"), "Ja");
        assert_eq!(l.constant("booleanFalseLabel"), "false");
    }
}
