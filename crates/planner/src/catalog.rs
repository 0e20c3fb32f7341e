use std::collections::HashMap;

use qx_common::{QxError, Result};

use crate::relplan::RowType;

/// Resolves table names to schemas for one project scope.
///
/// One reader instance is bound per query execution image so concurrent
/// queries never share mutable resolution state.
pub trait CatalogReader: Send + Sync {
    fn table_schema(&self, table: &str) -> Result<RowType>;
}

/// Simple map-backed catalog for tests and embedded use.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    tables: HashMap<String, RowType>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_table(&mut self, name: impl Into<String>, schema: RowType) {
        self.tables.insert(name.into(), schema);
    }
}

impl CatalogReader for InMemoryCatalog {
    fn table_schema(&self, table: &str) -> Result<RowType> {
        self.tables
            .get(table)
            .cloned()
            .ok_or_else(|| QxError::Parse(format!("table '{table}' not found")))
    }
}
