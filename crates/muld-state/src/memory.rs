//! In-memory state store.

use std::collections::HashMap;
use std::sync::RwLock;

use muld_refs::validate_component_name;

use crate::error::{Result, StateError};
use crate::record::SyncRecord;
use crate::traits::StateStore;

/// [`StateStore`] backed by a `HashMap` behind a `RwLock`.
///
/// A save swaps the whole record under the write lock. Data is lost when the
/// store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    records: RwLock<HashMap<String, SyncRecord>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for InMemoryStateStore {
    fn load(&self, repository: &str) -> Result<Option<SyncRecord>> {
        let records = self
            .records
            .read()
            .map_err(|e| StateError::Poisoned(e.to_string()))?;
        Ok(records.get(repository).cloned())
    }

    fn save(&self, record: &SyncRecord) -> Result<()> {
        validate_component_name(&record.repository)?;
        let mut records = self
            .records
            .write()
            .map_err(|e| StateError::Poisoned(e.to_string()))?;
        records.insert(record.repository.clone(), record.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let records = self
            .records
            .read()
            .map_err(|e| StateError::Poisoned(e.to_string()))?;
        let mut names: Vec<String> = records.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
