use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use muld_refs::RefState;
use serde::{Deserialize, Serialize};

/// Last confirmed state of one repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub repository: String,
    /// Refs confirmed in the local mirror by the last successful fetch.
    #[serde(default)]
    pub local: RefState,
    /// Per downstream name, refs confirmed by pushes to it.
    #[serde(default)]
    pub downstream: BTreeMap<String, RefState>,
    pub updated_at: DateTime<Utc>,
    /// Message of the most recent failure, cleared by a clean run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SyncRecord {
    /// An empty record, as if the repository had never been synced.
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            local: RefState::new(),
            downstream: BTreeMap::new(),
            updated_at: Utc::now(),
            last_error: None,
        }
    }

    /// Confirmed snapshot for `name`; empty if nothing was ever pushed there.
    pub fn downstream_state(&self, name: &str) -> RefState {
        self.downstream.get(name).cloned().unwrap_or_default()
    }

    pub fn set_local(&mut self, state: RefState) {
        self.local = state;
        self.touch();
    }

    pub fn set_downstream(&mut self, name: impl Into<String>, state: RefState) {
        self.downstream.insert(name.into(), state);
        self.touch();
    }

    pub fn set_error(&mut self, message: Option<String>) {
        self.last_error = message;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
