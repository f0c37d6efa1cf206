//! Worker-side data store (§4.4.1): the handle protocol for script outputs
//! that cannot cross the worker boundary by value.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub type HandleId = Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleRecord {
    pub value: Value,
    pub format: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

/// In-process map from `HandleId` to `HandleRecord`. One store is owned per
/// worker instance; it is dropped (and every handle with it) when the
/// worker is terminated, matching the protocol's "handles do not outlive
/// their worker" assumption.
#[derive(Default)]
pub struct HandleStore {
    records: RwLock<HashMap<HandleId, HandleRecord>>,
}

impl HandleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_data(&self, value: Value, format: impl Into<String>, metadata: Value) -> HandleId {
        let id = Uuid::new_v4();
        let record = HandleRecord {
            value,
            format: format.into(),
            created_at: Utc::now(),
            metadata,
        };
        self.records.write().unwrap().insert(id, record);
        id
    }

    pub fn get_data(&self, handle_id: HandleId) -> Option<HandleRecord> {
        self.records.read().unwrap().get(&handle_id).cloned()
    }

    /// Same shape as `get_data` but callers may downscale/lossy-compress
    /// what they return; this in-memory implementation has nothing to
    /// downscale so it returns the same record.
    pub fn get_preview(&self, handle_id: HandleId) -> Option<HandleRecord> {
        self.get_data(handle_id)
    }

    pub fn release_data(&self, handle_id: HandleId) -> bool {
        self.records.write().unwrap().remove(&handle_id).is_some()
    }

    pub fn list_handles(&self) -> Vec<HandleId> {
        self.records.read().unwrap().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_get_round_trips() {
        let store = HandleStore::new();
        let id = store.store_data(serde_json::json!({"a": 1}), "json", Value::Null);
        let record = store.get_data(id).unwrap();
        assert_eq!(record.format, "json");
    }

    #[test]
    fn release_removes_from_list() {
        let store = HandleStore::new();
        let id = store.store_data(Value::Null, "raw", Value::Null);
        assert_eq!(store.list_handles().len(), 1);
        assert!(store.release_data(id));
        assert!(store.list_handles().is_empty());
    }

    #[test]
    fn unknown_handle_returns_none() {
        let store = HandleStore::new();
        assert!(store.get_data(Uuid::new_v4()).is_none());
    }
}
