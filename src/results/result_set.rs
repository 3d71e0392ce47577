use std::collections::HashMap;
use std::sync::Arc;

use super::row::{Row, build_index};
use crate::types::RowValues;

/// A result set from a query
///
/// Rows keep the order in which the driver returned them until a shaping
/// method reorders them.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<Row>,
    /// Column names shared by all rows (to avoid duplicating in each row)
    column_names: Option<Arc<Vec<String>>>,
    column_index_cache: Option<Arc<HashMap<String, usize>>>,
}

impl ResultSet {
    /// Create a new result set with a known capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            column_names: None,
            column_index_cache: None,
        }
    }

    /// Build a result set from column names and row values in one go.
    #[must_use]
    pub fn from_rows(column_names: Vec<String>, rows: Vec<Vec<RowValues>>) -> ResultSet {
        let mut result_set = ResultSet::with_capacity(rows.len());
        result_set.set_column_names(Arc::new(column_names));
        for row in rows {
            result_set.add_row_values(row);
        }
        result_set
    }

    /// Set the column names for this result set (to be shared by all rows)
    pub fn set_column_names(&mut self, column_names: Arc<Vec<String>>) {
        self.column_index_cache = Some(Arc::new(build_index(&column_names)));
        self.column_names = Some(column_names);
    }

    /// Get the column names for this result set
    #[must_use]
    pub fn get_column_names(&self) -> Option<&Arc<Vec<String>>> {
        self.column_names.as_ref()
    }

    /// Add a row to the result set.
    ///
    /// Rows added before any column names were set are dropped.
    pub fn add_row_values(&mut self, row_values: Vec<RowValues>) {
        if let (Some(column_names), Some(cache)) = (&self.column_names, &self.column_index_cache)
        {
            self.results.push(Row::with_cache(
                column_names.clone(),
                row_values,
                cache.clone(),
            ));
        }
    }

    /// Add a prebuilt row to the result set
    pub fn add_row(&mut self, row: Row) {
        if self.column_names.is_none() {
            self.column_index_cache = Some(row.column_index_cache.clone());
            self.column_names = Some(row.column_names.clone());
        }

        self.results.push(row);
    }

    /// Same column layout, no rows.
    pub(crate) fn empty_like(&self) -> ResultSet {
        ResultSet {
            results: Vec::new(),
            column_names: self.column_names.clone(),
            column_index_cache: self.column_index_cache.clone(),
        }
    }
}
