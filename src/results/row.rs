use std::collections::HashMap;
use std::sync::Arc;

use crate::types::RowValues;

/// A row produced by a read command's cursor.
///
/// Column names and the name-to-index cache are shared by every row of one
/// cursor, so a row only owns its values.
#[derive(Debug, Clone)]
pub struct CustomDbRow {
    /// The column names for this row (shared across all rows of a cursor)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row
    pub rows: Vec<RowValues>,
    column_index_cache: Arc<HashMap<String, usize>>,
}

impl CustomDbRow {
    /// Create a row, building a fresh column lookup cache.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, rows: Vec<RowValues>) -> Self {
        let cache = Arc::new(build_column_index(&column_names));
        Self {
            column_names,
            rows,
            column_index_cache: cache,
        }
    }

    /// Create a row that reuses the lookup cache of its siblings.
    #[must_use]
    pub(crate) fn with_cache(
        column_names: Arc<Vec<String>>,
        column_index_cache: Arc<HashMap<String, usize>>,
        rows: Vec<RowValues>,
    ) -> Self {
        Self {
            column_names,
            rows,
            column_index_cache,
        }
    }

    /// Get the index of a column by name
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index_cache.get(column_name) {
            return Some(idx);
        }
        self.column_names.iter().position(|col| col == column_name)
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.get_column_index(column_name)
            .and_then(|idx| self.rows.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.rows.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Shared state for building the rows of one cursor.
#[derive(Debug, Clone)]
pub(crate) struct RowShape {
    column_names: Arc<Vec<String>>,
    column_index_cache: Arc<HashMap<String, usize>>,
}

impl RowShape {
    pub(crate) fn new(column_names: Vec<String>) -> Self {
        let cache = Arc::new(build_column_index(&column_names));
        Self {
            column_names: Arc::new(column_names),
            column_index_cache: cache,
        }
    }

    pub(crate) fn width(&self) -> usize {
        self.column_names.len()
    }

    pub(crate) fn row(&self, values: Vec<RowValues>) -> CustomDbRow {
        CustomDbRow::with_cache(
            Arc::clone(&self.column_names),
            Arc::clone(&self.column_index_cache),
            values,
        )
    }
}

fn build_column_index(column_names: &[String]) -> HashMap<String, usize> {
    // First occurrence wins for duplicate column names.
    let mut cache = HashMap::with_capacity(column_names.len());
    for (i, name) in column_names.iter().enumerate() {
        cache.entry(name.clone()).or_insert(i);
    }
    cache
}
