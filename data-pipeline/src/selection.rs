//! FILENAME: data-pipeline/src/selection.rs
//! PURPOSE: Row selection over the committed page.
//! CONTEXT: Indexes are page-relative. Every commit clears the selection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionMode {
    Single,
    Multiple,
}

impl Default for SelectionMode {
    fn default() -> Self {
        SelectionMode::Single
    }
}

#[derive(Debug, Clone, Default)]
pub struct RowSelection {
    mode: SelectionMode,
    selected: BTreeSet<usize>,
}

impl RowSelection {
    pub fn new(mode: SelectionMode) -> Self {
        RowSelection {
            mode,
            selected: BTreeSet::new(),
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    /// Select one row. With `toggle`, a selected row is deselected instead;
    /// in single mode any other selection is dropped.
    pub fn select_row(&mut self, index: usize, toggle: bool) {
        let was_selected = self.selected.contains(&index);
        if self.mode == SelectionMode::Single {
            self.selected.clear();
        }
        if toggle && was_selected {
            self.selected.remove(&index);
        } else {
            self.selected.insert(index);
        }
    }

    /// Replace the selection. Single mode keeps the last index only.
    pub fn select_rows(&mut self, indexes: &[usize]) {
        self.selected.clear();
        match self.mode {
            SelectionMode::Single => {
                if let Some(last) = indexes.last() {
                    self.selected.insert(*last);
                }
            }
            SelectionMode::Multiple => self.selected.extend(indexes.iter().copied()),
        }
    }

    /// Select an inclusive range, in either order.
    pub fn select_range(&mut self, start: usize, end: usize) {
        let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
        let range: Vec<usize> = (lo..=hi).collect();
        self.select_rows(&range);
    }

    pub fn deselect(&mut self, indexes: &[usize]) {
        for index in indexes {
            self.selected.remove(index);
        }
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Drop indexes at or beyond `len`.
    pub fn retain_below(&mut self, len: usize) {
        self.selected.retain(|i| *i < len);
    }

    pub fn indexes(&self) -> Vec<usize> {
        self.selected.iter().copied().collect()
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}
