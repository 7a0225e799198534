use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;

use crate::combinatorics::Combo;
use crate::frequency::FrequencyTable;

/// Loaded frequency table and historical combination set, kept until a stage
/// that rewrites the underlying data calls [`DataCache::invalidate`].
#[derive(Debug, Default)]
pub struct DataCache {
    table: Option<Arc<FrequencyTable>>,
    historical: Option<Arc<HashSet<Combo>>>,
}

impl DataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached table, or the result of `load` (cached only when it yields a table).
    pub fn table<F>(&mut self, load: F) -> Result<Option<Arc<FrequencyTable>>>
    where
        F: FnOnce() -> Result<Option<FrequencyTable>>,
    {
        if let Some(table) = &self.table {
            return Ok(Some(Arc::clone(table)));
        }
        let loaded = load()?.map(Arc::new);
        self.table = loaded.clone();
        Ok(loaded)
    }

    pub fn historical<F>(&mut self, load: F) -> Result<Arc<HashSet<Combo>>>
    where
        F: FnOnce() -> Result<HashSet<Combo>>,
    {
        if let Some(set) = &self.historical {
            return Ok(Arc::clone(set));
        }
        let set = Arc::new(load()?);
        self.historical = Some(Arc::clone(&set));
        Ok(set)
    }

    pub fn set_table(&mut self, table: FrequencyTable) -> Arc<FrequencyTable> {
        let table = Arc::new(table);
        self.table = Some(Arc::clone(&table));
        table
    }

    pub fn invalidate(&mut self) {
        log::debug!("Caché de datos invalidada");
        self.table = None;
        self.historical = None;
    }
}
