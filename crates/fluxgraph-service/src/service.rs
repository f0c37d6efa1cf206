//! Run Service (§4.5): orchestrates flow execution on top of the
//! scheduler and the run store, handling input mapping, TTL policy,
//! artifact extraction, and webhook delivery.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Duration as ChronoDuration;
use fluxgraph_engine::{Flow, FlowScheduler, NodeKind};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Result, ServiceError};
use crate::run::{Artifact, ArtifactCategory, ListRunsFilter, Run, RunId, RunStatus, RunStore, RunUpdate};

#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub ttl_secs: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub webhook: Option<String>,
    pub flow_api_id: Option<String>,
    pub api_key_id: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// The caller-side bounds `executeFlowSync`/`Async` apply on top of the
/// Flow-API configuration's own TTL bounds (§4.5.3): `auth.maxTtl`.
#[derive(Debug, Clone, Default)]
pub struct TtlBounds {
    pub default_ttl_secs: u64,
    pub max_ttl_secs: u64,
    pub auth_max_ttl_secs: Option<u64>,
}

pub fn effective_ttl_secs(requested: Option<u64>, bounds: &TtlBounds) -> u64 {
    let mut ttl = requested.unwrap_or(bounds.default_ttl_secs);
    ttl = ttl.min(bounds.max_ttl_secs);
    if let Some(auth_max) = bounds.auth_max_ttl_secs {
        ttl = ttl.min(auth_max);
    }
    ttl
}

pub struct RunService {
    store: Arc<dyn RunStore>,
    scheduler: Arc<FlowScheduler>,
    http: reqwest::Client,
}

impl RunService {
    pub fn new(store: Arc<dyn RunStore>, scheduler: Arc<FlowScheduler>) -> Self {
        Self {
            store,
            scheduler,
            http: reqwest::Client::new(),
        }
    }

    pub async fn create_run(&self, flow_id: &str, inputs: Value, options: &ExecuteOptions, bounds: &TtlBounds) -> RunId {
        let ttl = effective_ttl_secs(options.ttl_secs, bounds);
        let run = Run::new(
            flow_id,
            inputs,
            ChronoDuration::seconds(ttl as i64),
            options.flow_api_id.clone(),
            options.api_key_id.clone(),
        );
        let run_id = run.id.clone();
        self.store.create(run).await;
        run_id
    }

    pub async fn update_run_status(&self, run_id: &str, update: RunUpdate) {
        self.store.update_status(run_id, update).await;
    }

    pub async fn add_artifacts(&self, run_id: &str, artifacts: Vec<Artifact>) {
        self.store.add_artifacts(run_id, artifacts).await;
    }

    pub async fn get_run(&self, run_id: &str) -> Option<Run> {
        self.store.get(run_id).await
    }

    pub async fn list_runs(&self, filter: ListRunsFilter) -> (Vec<Run>, usize) {
        self.store.list(filter).await
    }

    /// Only allowed from `pending` or `running`. Also requests
    /// cancellation of the scheduler execution registered under this run
    /// id, so a `running` run actually stops instead of merely being
    /// marked cancelled in the store.
    pub async fn cancel_run(&self, run_id: &str) -> bool {
        let Some(run) = self.store.get(run_id).await else {
            return false;
        };
        if !matches!(run.status, RunStatus::Pending | RunStatus::Running) {
            return false;
        }
        self.store
            .update_status(
                run_id,
                RunUpdate {
                    status: Some(RunStatus::Cancelled),
                    ..Default::default()
                },
            )
            .await;
        self.scheduler.cancel(run_id).await;
        true
    }

    /// Runs `cleanupExpiredRuns` once. Returns the number of runs expired.
    pub async fn cleanup_expired_runs(&self) -> usize {
        let candidates = self.store.expired_candidates().await;
        for run_id in &candidates {
            self.store.expire(run_id).await;
        }
        candidates.len()
    }

    /// Maps API inputs onto the flow's input nodes (§4.5.1), drives the
    /// scheduler, extracts artifacts, and finalizes the run record.
    pub async fn execute_flow_sync(
        &self,
        mut flow: Flow,
        inputs: Value,
        options: &ExecuteOptions,
        bounds: &TtlBounds,
    ) -> Result<Run> {
        let run_id = self.create_run(&flow.id, inputs.clone(), options, bounds).await;
        apply_input_mapping(&mut flow, &inputs);

        self.store
            .update_status(
                &run_id,
                RunUpdate {
                    status: Some(RunStatus::Running),
                    ..Default::default()
                },
            )
            .await;

        let result = self.scheduler.execute_flow(&flow, &run_id).await;

        let run = match result {
            Ok(state) => {
                let (outputs, artifacts) = extract_artifacts(&run_id, state.outputs.clone());
                self.store.add_artifacts(&run_id, artifacts).await;
                let status = match state.status {
                    fluxgraph_engine::FlowRunStatus::Completed => RunStatus::Completed,
                    fluxgraph_engine::FlowRunStatus::Error => RunStatus::Failed,
                    fluxgraph_engine::FlowRunStatus::Cancelled => RunStatus::Cancelled,
                    fluxgraph_engine::FlowRunStatus::Running => RunStatus::Running,
                };
                self.store
                    .update_status(
                        &run_id,
                        RunUpdate {
                            status: Some(status),
                            progress: Some(100),
                            outputs: Some(outputs),
                            error: state.error.clone(),
                            node_results: Some(serde_json::to_value(&state.node_states).unwrap_or(Value::Null)),
                            ..Default::default()
                        },
                    )
                    .await;
                self.store.get(&run_id).await.ok_or_else(|| ServiceError::Internal("run disappeared after execution".into()))?
            }
            Err(err) => {
                self.store
                    .update_status(
                        &run_id,
                        RunUpdate {
                            status: Some(RunStatus::Failed),
                            error: Some(fluxgraph_engine::ErrorInfo::from(&err)),
                            ..Default::default()
                        },
                    )
                    .await;
                return Err(ServiceError::Engine(err));
            }
        };

        if let Some(webhook) = &options.webhook {
            crate::webhook::deliver(&self.http, webhook, &run).await;
        }

        Ok(run)
    }

    /// Creates the run, spawns a background task driving
    /// `execute_flow_sync`, and returns immediately.
    pub async fn execute_flow_async(
        self: &Arc<Self>,
        flow: Flow,
        inputs: Value,
        options: ExecuteOptions,
        bounds: TtlBounds,
    ) -> RunId {
        let run_id = self.create_run(&flow.id, inputs.clone(), &options, &bounds).await;
        let service = self.clone();
        let run_id_for_task = run_id.clone();
        tokio::spawn(async move {
            // create_run already inserted the pending record; re-running
            // execute_flow_sync would double-insert, so drive the flow
            // directly against the existing run id.
            let mut flow = flow;
            apply_input_mapping(&mut flow, &inputs);
            service
                .update_run_status(
                    &run_id_for_task,
                    RunUpdate {
                        status: Some(RunStatus::Running),
                        ..Default::default()
                    },
                )
                .await;

            let result = service.scheduler.execute_flow(&flow, &run_id_for_task).await;
            let run = match result {
                Ok(state) => {
                    let (outputs, artifacts) = extract_artifacts(&run_id_for_task, state.outputs.clone());
                    service.add_artifacts(&run_id_for_task, artifacts).await;
                    let status = match state.status {
                        fluxgraph_engine::FlowRunStatus::Completed => RunStatus::Completed,
                        fluxgraph_engine::FlowRunStatus::Error => RunStatus::Failed,
                        fluxgraph_engine::FlowRunStatus::Cancelled => RunStatus::Cancelled,
                        fluxgraph_engine::FlowRunStatus::Running => RunStatus::Running,
                    };
                    service
                        .update_run_status(
                            &run_id_for_task,
                            RunUpdate {
                                status: Some(status),
                                progress: Some(100),
                                outputs: Some(outputs),
                                error: state.error.clone(),
                                ..Default::default()
                            },
                        )
                        .await;
                    service.get_run(&run_id_for_task).await
                }
                Err(err) => {
                    service
                        .update_run_status(
                            &run_id_for_task,
                            RunUpdate {
                                status: Some(RunStatus::Failed),
                                error: Some(fluxgraph_engine::ErrorInfo::from(&err)),
                                ..Default::default()
                            },
                        )
                        .await;
                    None
                }
            };

            if let (Some(run), Some(webhook)) = (run, &options.webhook) {
                crate::webhook::deliver(&service.http, webhook, &run).await;
            }
        });
        run_id
    }
}

/// §4.5.1: for every non-constant `input` node, looks up an entry keyed
/// by the node's label (or id if no label) in the API's inputs map and
/// replaces the node's value. Unrecognized keys are silently ignored.
fn apply_input_mapping(flow: &mut Flow, inputs: &Value) {
    let Value::Object(map) = inputs else {
        return;
    };
    for node in &mut flow.nodes {
        if let NodeKind::Input(data) = &mut node.kind {
            if data.is_constant {
                continue;
            }
            let key = data.label.clone().unwrap_or_else(|| node.id.clone());
            if let Some(value) = map.get(&key) {
                data.value = value.clone();
            }
        }
    }
}

/// §4.5.2: walks the final output, wrapping schematic/byte-buffer values
/// as artifacts and replacing them in-place with a descriptor.
///
/// The engine's output values are plain `serde_json::Value`s, so "exposes
/// a `to_schematic()` capability" and "is a raw byte buffer" are
/// recognized structurally: an object carrying a `__schematic` marker, or
/// an object carrying `__bytes` base64 data, respectively. Everything else
/// passes through unchanged.
fn extract_artifacts(run_id: &str, outputs: Value) -> (Value, Vec<Artifact>) {
    let Value::Object(map) = outputs else {
        return (outputs, Vec::new());
    };

    let mut artifacts = Vec::new();
    let mut result = Map::new();
    for (key, value) in map {
        if let Value::Object(obj) = &value {
            if let Some(schematic) = obj.get("__schematic") {
                let bytes = schematic.as_str().unwrap_or_default();
                let artifact = Artifact {
                    id: Uuid::new_v4().to_string(),
                    run_id: run_id.to_string(),
                    name: key.clone(),
                    category: ArtifactCategory::Schematic,
                    format: "schem".to_string(),
                    byte_size: bytes.len() as u64,
                    data_base64: Some(BASE64.encode(bytes.as_bytes())),
                    url: None,
                };
                result.insert(
                    key,
                    serde_json::json!({ "format": artifact.format, "data": artifact.data_base64, "metadata": {} }),
                );
                artifacts.push(artifact);
                continue;
            }
            if let Some(bytes) = obj.get("__bytes") {
                let encoded = bytes.as_str().unwrap_or_default().to_string();
                let artifact = Artifact {
                    id: Uuid::new_v4().to_string(),
                    run_id: run_id.to_string(),
                    name: key.clone(),
                    category: ArtifactCategory::Data,
                    format: "binary".to_string(),
                    byte_size: encoded.len() as u64,
                    data_base64: Some(encoded.clone()),
                    url: None,
                };
                result.insert(key, serde_json::json!({ "format": "binary", "data": encoded, "metadata": {} }));
                artifacts.push(artifact);
                continue;
            }
        }
        result.insert(key, value);
    }
    (Value::Object(result), artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::InMemoryRunStore;
    use fluxgraph_engine::events::NullEventSink;
    use fluxgraph_engine::worker::ThreadSandbox;

    fn bounds() -> TtlBounds {
        TtlBounds {
            default_ttl_secs: 3600,
            max_ttl_secs: 86_400,
            auth_max_ttl_secs: None,
        }
    }

    fn service() -> RunService {
        let store = InMemoryRunStore::new();
        let scheduler = Arc::new(FlowScheduler::new(Arc::new(ThreadSandbox::default()), Arc::new(NullEventSink)));
        RunService::new(store, scheduler)
    }

    #[test]
    fn effective_ttl_respects_all_three_bounds() {
        let bounds = TtlBounds {
            default_ttl_secs: 100,
            max_ttl_secs: 500,
            auth_max_ttl_secs: Some(200),
        };
        assert_eq!(effective_ttl_secs(None, &bounds), 100);
        assert_eq!(effective_ttl_secs(Some(1000), &bounds), 200);
        assert_eq!(effective_ttl_secs(Some(50), &bounds), 50);
    }

    #[tokio::test]
    async fn create_run_inserts_a_pending_record() {
        let service = service();
        let run_id = service
            .create_run("flow-1", serde_json::json!({}), &ExecuteOptions::default(), &bounds())
            .await;
        let run = service.get_run(&run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Pending);
    }

    #[tokio::test]
    async fn cancel_run_only_succeeds_from_pending_or_running() {
        let service = service();
        let run_id = service
            .create_run("flow-1", serde_json::json!({}), &ExecuteOptions::default(), &bounds())
            .await;
        assert!(service.cancel_run(&run_id).await);
        assert!(!service.cancel_run(&run_id).await);
    }

    #[test]
    fn schematic_output_is_wrapped_as_an_artifact() {
        let outputs = serde_json::json!({ "model": { "__schematic": "raw-bytes" } });
        let (replaced, artifacts) = extract_artifacts("run-1", outputs);
        assert_eq!(artifacts.len(), 1);
        assert!(matches!(artifacts[0].category, ArtifactCategory::Schematic));
        assert!(replaced["model"]["data"].is_string());
    }

    #[test]
    fn plain_values_pass_through_unchanged() {
        let outputs = serde_json::json!({ "greeting": "hello" });
        let (replaced, artifacts) = extract_artifacts("run-1", outputs.clone());
        assert!(artifacts.is_empty());
        assert_eq!(replaced, outputs);
    }

    /// Artifact bytes only ever live as base64 in `data_base64`; a
    /// downstream consumer writing that payload to disk (for a download
    /// link, say) must get the original bytes back out.
    #[test]
    fn byte_artifact_payload_round_trips_through_a_real_file() {
        use std::io::{Read, Write};

        let raw = b"not-actually-a-png";
        let outputs = serde_json::json!({ "render": { "__bytes": BASE64.encode(raw) } });
        let (_replaced, artifacts) = extract_artifacts("run-1", outputs);
        let artifact = artifacts.into_iter().next().unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        let decoded = BASE64.decode(artifact.data_base64.unwrap()).unwrap();
        file.write_all(&decoded).unwrap();
        file.flush().unwrap();

        let mut persisted = Vec::new();
        std::fs::File::open(file.path())
            .unwrap()
            .read_to_end(&mut persisted)
            .unwrap();
        assert_eq!(persisted, raw);
    }
}
