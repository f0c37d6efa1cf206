//! The `Run` and `Artifact` records (§3), and the `RunStore` persistence
//! boundary.
//!
//! `RunStore` is a trait, not a concrete database client, for the same
//! reason the engine's `EventSink` is a trait object: the only
//! implementation shipped here is an in-memory `Arc<RwLock<HashMap<...>>>`
//! store, but a real deployment swaps in a `sqlx`/Postgres-backed one
//! without touching the service logic above it — persistent run storage
//! across restarts is explicitly out of scope (§1 Non-goals), so the seam
//! exists without a second implementation behind it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

pub type RunId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
    Expired,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed
                | RunStatus::Failed
                | RunStatus::Cancelled
                | RunStatus::Timeout
                | RunStatus::Expired
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactCategory {
    Schematic,
    Image,
    Data,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: String,
    pub run_id: RunId,
    pub name: String,
    pub category: ArtifactCategory,
    pub format: String,
    pub byte_size: u64,
    #[serde(default)]
    pub data_base64: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: RunId,
    pub flow_id: String,
    #[serde(default)]
    pub flow_api_id: Option<String>,
    #[serde(default)]
    pub api_key_id: Option<String>,
    pub status: RunStatus,
    pub progress: u8,
    #[serde(default)]
    pub current_node: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub inputs: Option<Value>,
    #[serde(default)]
    pub outputs: Option<Value>,
    #[serde(default)]
    pub error: Option<fluxgraph_engine::ErrorInfo>,
    #[serde(default)]
    pub node_results: Option<Value>,
    #[serde(default)]
    pub logs: Option<Vec<String>>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

impl Run {
    pub fn new(flow_id: impl Into<String>, inputs: Value, ttl: chrono::Duration, flow_api_id: Option<String>, api_key_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            flow_id: flow_id.into(),
            flow_api_id,
            api_key_id,
            status: RunStatus::Pending,
            progress: 0,
            current_node: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            expires_at: now + ttl,
            inputs: Some(inputs),
            outputs: None,
            error: None,
            node_results: None,
            logs: None,
            artifacts: Vec::new(),
        }
    }
}

/// Partial update applied by `updateRunStatus`: only non-`None` fields are
/// merged, never overwriting an existing value with absence.
#[derive(Debug, Default, Clone)]
pub struct RunUpdate {
    pub status: Option<RunStatus>,
    pub progress: Option<u8>,
    pub current_node: Option<String>,
    pub outputs: Option<Value>,
    pub error: Option<fluxgraph_engine::ErrorInfo>,
    pub node_results: Option<Value>,
}

#[derive(Debug, Default, Clone)]
pub struct ListRunsFilter {
    pub flow_id: Option<String>,
    pub flow_api_id: Option<String>,
    pub status: Option<RunStatus>,
    pub page: u32,
    pub page_size: u32,
}

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create(&self, run: Run);
    async fn update_status(&self, run_id: &str, update: RunUpdate);
    async fn add_artifacts(&self, run_id: &str, artifacts: Vec<Artifact>);
    async fn get(&self, run_id: &str) -> Option<Run>;
    async fn list(&self, filter: ListRunsFilter) -> (Vec<Run>, usize);
    /// Deletes artifacts and wipes volatile fields, per the cleanup
    /// sweeper's contract (§4.5 `cleanupExpiredRuns`). Returns true if a
    /// record existed and was mutated.
    async fn expire(&self, run_id: &str) -> bool;
    /// All run ids whose `expiresAt` has passed and whose status is
    /// terminal — the sweeper's candidate set.
    async fn expired_candidates(&self) -> Vec<RunId>;
}

#[derive(Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<RunId, Run>>,
}

impl InMemoryRunStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create(&self, run: Run) {
        self.runs.write().await.insert(run.id.clone(), run);
    }

    async fn update_status(&self, run_id: &str, update: RunUpdate) {
        let mut runs = self.runs.write().await;
        let Some(run) = runs.get_mut(run_id) else {
            return;
        };
        if let Some(status) = update.status {
            if matches!(status, RunStatus::Running) && run.started_at.is_none() {
                run.started_at = Some(Utc::now());
            }
            if status.is_terminal() && run.completed_at.is_none() {
                run.completed_at = Some(Utc::now());
            }
            run.status = status;
        }
        if let Some(progress) = update.progress {
            run.progress = progress;
        }
        if update.current_node.is_some() {
            run.current_node = update.current_node;
        }
        if update.outputs.is_some() {
            run.outputs = update.outputs;
        }
        if update.error.is_some() {
            run.error = update.error;
        }
        if update.node_results.is_some() {
            run.node_results = update.node_results;
        }
    }

    async fn add_artifacts(&self, run_id: &str, artifacts: Vec<Artifact>) {
        let mut runs = self.runs.write().await;
        if let Some(run) = runs.get_mut(run_id) {
            run.artifacts.extend(artifacts);
        }
    }

    async fn get(&self, run_id: &str) -> Option<Run> {
        self.runs.read().await.get(run_id).cloned()
    }

    async fn list(&self, filter: ListRunsFilter) -> (Vec<Run>, usize) {
        let runs = self.runs.read().await;
        let mut matching: Vec<Run> = runs
            .values()
            .filter(|r| filter.flow_id.as_deref().map_or(true, |id| r.flow_id == id))
            .filter(|r| filter.flow_api_id.as_deref().map_or(true, |id| r.flow_api_id.as_deref() == Some(id)))
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        matching.sort_by_key(|r| std::cmp::Reverse(r.created_at));
        let total = matching.len();
        let page_size = filter.page_size.max(1) as usize;
        let start = (filter.page as usize) * page_size;
        let page = matching.into_iter().skip(start).take(page_size).collect();
        (page, total)
    }

    async fn expire(&self, run_id: &str) -> bool {
        let mut runs = self.runs.write().await;
        let Some(run) = runs.get_mut(run_id) else {
            return false;
        };
        run.outputs = None;
        run.node_results = None;
        run.logs = None;
        run.artifacts.clear();
        run.status = RunStatus::Expired;
        true
    }

    async fn expired_candidates(&self) -> Vec<RunId> {
        let now = Utc::now();
        self.runs
            .read()
            .await
            .values()
            .filter(|r| r.expires_at < now && r.status.is_terminal())
            .map(|r| r.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = InMemoryRunStore::new();
        let run = Run::new("f1", serde_json::json!({}), chrono::Duration::seconds(60), None, None);
        let id = run.id.clone();
        store.create(run).await;
        assert!(store.get(&id).await.is_some());
    }

    #[tokio::test]
    async fn update_status_stamps_started_and_completed() {
        let store = InMemoryRunStore::new();
        let run = Run::new("f1", serde_json::json!({}), chrono::Duration::seconds(60), None, None);
        let id = run.id.clone();
        store.create(run).await;

        store
            .update_status(&id, RunUpdate { status: Some(RunStatus::Running), ..Default::default() })
            .await;
        let running = store.get(&id).await.unwrap();
        assert!(running.started_at.is_some());

        store
            .update_status(&id, RunUpdate { status: Some(RunStatus::Completed), ..Default::default() })
            .await;
        let completed = store.get(&id).await.unwrap();
        assert!(completed.completed_at.is_some());
    }

    #[tokio::test]
    async fn expired_candidates_only_include_terminal_past_ttl() {
        let store = InMemoryRunStore::new();
        let mut run = Run::new("f1", serde_json::json!({}), chrono::Duration::seconds(-1), None, None);
        run.status = RunStatus::Completed;
        let id = run.id.clone();
        store.create(run).await;

        let candidates = store.expired_candidates().await;
        assert_eq!(candidates, vec![id.clone()]);

        assert!(store.expire(&id).await);
        let expired = store.get(&id).await.unwrap();
        assert_eq!(expired.status, RunStatus::Expired);
        assert!(expired.outputs.is_none());
    }

    #[tokio::test]
    async fn pending_run_past_ttl_is_not_a_sweeper_candidate() {
        let store = InMemoryRunStore::new();
        let run = Run::new("f1", serde_json::json!({}), chrono::Duration::seconds(-1), None, None);
        store.create(run).await;
        assert!(store.expired_candidates().await.is_empty());
    }

    #[tokio::test]
    async fn list_paginates_and_filters_by_status() {
        let store = InMemoryRunStore::new();
        for _ in 0..3 {
            let mut run = Run::new("f1", serde_json::json!({}), chrono::Duration::seconds(60), None, None);
            run.status = RunStatus::Completed;
            store.create(run).await;
        }
        let (page, total) = store
            .list(ListRunsFilter {
                status: Some(RunStatus::Completed),
                page: 0,
                page_size: 2,
                ..Default::default()
            })
            .await;
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
    }
}
