//! Flow scheduler (§4.3): topological execution, per-kind dispatch, and
//! the event emissions the run service and any live subscriber rely on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::error::{EngineError, ErrorInfo, Result};
use crate::events::{EventSink, FlowEvent};
use crate::types::{Flow, FlowId, Node, NodeId, NodeKind};
use crate::validation::{topological_order, validate_flow};
use crate::worker::{SandboxEvent, ScriptSandbox, WorkerClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunNodeStatus {
    Pending,
    Running,
    Completed,
    Error,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowRunStatus {
    Running,
    Completed,
    Error,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRunState {
    pub status: RunNodeStatus,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    pub flow_id: FlowId,
    pub execution_id: String,
    pub status: FlowRunStatus,
    pub node_states: HashMap<NodeId, NodeRunState>,
    pub outputs: Value,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
}

/// Result of `executeScript`: a single code snippet run outside any flow,
/// used for interactive "run this node" style calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default)]
    pub schema: Option<Value>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Per-node timeout configuration (§5, §7): 5s default for ad hoc
/// `executeScript` calls, 60s for in-flow executions.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerTimeouts {
    pub execute_script: Duration,
    pub flow_node: Duration,
}

impl Default for SchedulerTimeouts {
    fn default() -> Self {
        Self {
            execute_script: Duration::from_secs(5),
            flow_node: Duration::from_secs(60),
        }
    }
}

/// Executes flows and ad hoc scripts, emitting lifecycle events through
/// an `EventSink`. Cancellation is cooperative between nodes: a
/// `cancel(execution_id)` call is observed at the start of the next node,
/// not mid-node (mid-node cancellation is the worker client's job, since
/// only it can terminate the sandbox). Cancellation is scoped per
/// execution id, not shared across concurrent runs: each `execute_flow`
/// call registers its own flag and removes it when the run ends, so
/// cancelling one run can never affect another, and a stale flag can
/// never outlive the run that created it.
pub struct FlowScheduler {
    worker: Arc<WorkerClient>,
    events: Arc<dyn EventSink>,
    timeouts: SchedulerTimeouts,
    cancellations: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl FlowScheduler {
    pub fn new(sandbox: Arc<dyn ScriptSandbox>, events: Arc<dyn EventSink>) -> Self {
        Self {
            worker: Arc::new(WorkerClient::new(sandbox)),
            events,
            timeouts: SchedulerTimeouts::default(),
            cancellations: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_timeouts(mut self, timeouts: SchedulerTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Requests cancellation of the named execution. Returns `true` if it
    /// was still registered (i.e. running); a run that already finished,
    /// or one that never existed, reports `false` and has no effect on
    /// any other run.
    pub async fn cancel(&self, execution_id: &str) -> bool {
        if let Some(flag) = self.cancellations.lock().await.get(execution_id) {
            flag.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    async fn begin_execution(&self, execution_id: &str) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        self.cancellations
            .lock()
            .await
            .insert(execution_id.to_string(), flag.clone());
        flag
    }

    async fn end_execution(&self, execution_id: &str) {
        self.cancellations.lock().await.remove(execution_id);
    }

    fn emit(&self, event: FlowEvent) {
        let _ = self.events.send(event);
    }

    /// Runs a single code snippet outside of any flow context. There is no
    /// flow/execution id to attach progress to here, so progress events are
    /// drained and discarded.
    pub async fn execute_script(&self, code: &str, inputs: Value) -> ExecutionResult {
        self.worker.initialize().await.ok();
        let (progress_tx, _progress_rx) = mpsc::channel(16);
        match self
            .worker
            .execute_script(code, inputs, self.timeouts.execute_script, progress_tx)
            .await
        {
            Ok(outcome) => ExecutionResult {
                success: outcome.success,
                result: Some(outcome.result),
                error: None,
                execution_time_ms: outcome.execution_time_ms,
            },
            Err(err) => ExecutionResult {
                success: false,
                result: None,
                error: Some(ErrorInfo::from(&err)),
                execution_time_ms: 0,
            },
        }
    }

    /// Out of scope: parsing the scripting language's own grammar to
    /// derive a declared I/O schema. Always reports a `null` schema,
    /// which the protocol defines as a legal response.
    pub async fn validate_script(&self, _code: &str) -> ValidationResult {
        ValidationResult {
            valid: true,
            schema: None,
            errors: Vec::new(),
        }
    }

    /// Executes an entire flow to completion (or the first failure, or
    /// cancellation), per the algorithm in §4.3. `execution_id` identifies
    /// this run for cancellation (`cancel`) and for every emitted event;
    /// callers that expose cancellation externally (the run service) pass
    /// their own run id so the two line up.
    pub async fn execute_flow(&self, flow: &Flow, execution_id: &str) -> Result<ExecutionState> {
        let execution_id = execution_id.to_string();

        let errors = validate_flow(flow);
        if !errors.is_empty() {
            let message = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            let err = EngineError::Validation(message);
            log::error!("flow {} execution {} rejected: {}", flow.id, execution_id, message);
            self.emit(FlowEvent::FlowError {
                flow_id: flow.id.clone(),
                execution_id: execution_id.clone(),
                error: ErrorInfo::from(&err),
            });
            return Err(err);
        }

        // Checked directly (not folded into `validate_flow`) so a cyclic
        // flow surfaces the distinct `EngineError::Cycle` kind instead of
        // being reported as a validation failure.
        let order = match topological_order(flow) {
            Ok(order) => order,
            Err(remaining) => {
                let err = EngineError::Cycle(format!("unresolvable nodes: {}", remaining.join(", ")));
                log::error!("flow {} execution {} rejected: cyclic graph", flow.id, execution_id);
                self.emit(FlowEvent::FlowError {
                    flow_id: flow.id.clone(),
                    execution_id: execution_id.clone(),
                    error: ErrorInfo::from(&err),
                });
                return Err(err);
            }
        };

        let mut state = ExecutionState {
            flow_id: flow.id.clone(),
            execution_id: execution_id.clone(),
            status: FlowRunStatus::Running,
            node_states: order
                .iter()
                .map(|id| {
                    (
                        id.clone(),
                        NodeRunState {
                            status: RunNodeStatus::Pending,
                            output: None,
                            error: None,
                        },
                    )
                })
                .collect(),
            outputs: Value::Object(Map::new()),
            error: None,
        };

        let cancelled = self.begin_execution(&execution_id).await;

        self.worker.initialize().await.ok();
        self.emit(FlowEvent::WorkerReady {
            execution_id: execution_id.clone(),
        });
        log::info!("flow {} starting execution {}", flow.id, execution_id);
        self.emit(FlowEvent::FlowStart {
            flow_id: flow.id.clone(),
            execution_id: execution_id.clone(),
        });

        for node_id in &order {
            if cancelled.load(Ordering::SeqCst) {
                state.status = FlowRunStatus::Cancelled;
                log::warn!("flow {} execution {} cancelled", flow.id, execution_id);
                self.emit(FlowEvent::FlowCancelled {
                    flow_id: flow.id.clone(),
                    execution_id: execution_id.clone(),
                });
                self.end_execution(&execution_id).await;
                return Ok(state);
            }

            let node = flow
                .find_node(node_id)
                .expect("topological order only contains known node ids");

            self.emit(FlowEvent::NodeStart {
                flow_id: flow.id.clone(),
                execution_id: execution_id.clone(),
                node_id: node_id.clone(),
            });

            let inputs = self.compute_inputs(flow, node_id, &state);

            match self.dispatch(flow, node, inputs, &execution_id).await {
                Ok(DispatchOutcome::Skipped) => {
                    state.node_states.insert(
                        node_id.clone(),
                        NodeRunState {
                            status: RunNodeStatus::Skipped,
                            output: None,
                            error: None,
                        },
                    );
                }
                Ok(DispatchOutcome::Output(output)) => {
                    state.node_states.insert(
                        node_id.clone(),
                        NodeRunState {
                            status: RunNodeStatus::Completed,
                            output: Some(output.clone()),
                            error: None,
                        },
                    );
                    self.emit(FlowEvent::NodeFinish {
                        flow_id: flow.id.clone(),
                        execution_id: execution_id.clone(),
                        node_id: node_id.clone(),
                        output,
                    });
                }
                Err(err) => {
                    let info = ErrorInfo::from(&err);
                    state.node_states.insert(
                        node_id.clone(),
                        NodeRunState {
                            status: RunNodeStatus::Error,
                            output: None,
                            error: Some(info.clone()),
                        },
                    );
                    state.status = FlowRunStatus::Error;
                    state.error = Some(info.clone());
                    self.emit(FlowEvent::NodeError {
                        flow_id: flow.id.clone(),
                        execution_id: execution_id.clone(),
                        node_id: node_id.clone(),
                        error: info.clone(),
                    });
                    self.emit(FlowEvent::FlowError {
                        flow_id: flow.id.clone(),
                        execution_id: execution_id.clone(),
                        error: info,
                    });
                    self.end_execution(&execution_id).await;
                    return Ok(state);
                }
            }
        }

        state.status = FlowRunStatus::Completed;
        state.outputs = self.collect_final_output(flow, &state);
        log::info!("flow {} execution {} completed", flow.id, execution_id);
        self.emit(FlowEvent::FlowFinish {
            flow_id: flow.id.clone(),
            execution_id: execution_id.clone(),
            outputs: state.outputs.clone(),
        });
        self.end_execution(&execution_id).await;
        Ok(state)
    }

    /// Walks incoming edges for `node_id`, looking up
    /// `outputs[sourceHandle ?? "default"]` in the source's recorded
    /// output (falling back to the raw output if the handle key is
    /// absent), and stores it under `targetHandle ?? "default"`.
    fn compute_inputs(&self, flow: &Flow, node_id: &str, state: &ExecutionState) -> Value {
        let mut inputs = Map::new();
        for edge in flow.incoming_edges(node_id) {
            let Some(source_state) = state.node_states.get(&edge.source) else {
                continue;
            };
            let Some(source_output) = &source_state.output else {
                continue;
            };
            let value = source_output
                .get(edge.source_handle())
                .cloned()
                .unwrap_or_else(|| source_output.clone());
            inputs.insert(edge.target_handle().to_string(), value);
        }
        Value::Object(inputs)
    }

    async fn dispatch(&self, flow: &Flow, node: &Node, inputs: Value, execution_id: &str) -> Result<DispatchOutcome> {
        use crate::types::{FileOutputVariant, InputVariant};

        let outcome = match &node.kind {
            NodeKind::Code(data) => {
                let (progress_tx, mut progress_rx) = mpsc::channel(16);
                let events = self.events.clone();
                let flow_id = flow.id.clone();
                let execution_id_owned = execution_id.to_string();
                let relay = tokio::spawn(async move {
                    while let Some(SandboxEvent::Progress { message, percent }) = progress_rx.recv().await {
                        let _ = events.send(FlowEvent::progress(&flow_id, &execution_id_owned, message, percent));
                    }
                });

                let outcome = self
                    .worker
                    .execute_script(&data.source, inputs, self.timeouts.flow_node, progress_tx)
                    .await?;
                let _ = relay.await;
                outcome.result
            }
            NodeKind::Input(data) => match data.variant {
                InputVariant::Schematic => {
                    let mut out = Map::new();
                    out.insert("schematic".to_string(), data.value.clone());
                    out.insert("output".to_string(), data.value.clone());
                    Value::Object(out)
                }
                _ => {
                    let mut out = Map::new();
                    out.insert("output".to_string(), data.value.clone());
                    out.insert("default".to_string(), data.value.clone());
                    Value::Object(out)
                }
            },
            NodeKind::Output(data) => {
                let label = data.label.clone().unwrap_or_else(|| "output".to_string());
                let value = single_input_value(&inputs);
                let mut out = Map::new();
                out.insert(label, value);
                Value::Object(out)
            }
            NodeKind::Viewer { .. } => {
                let mut out = Map::new();
                out.insert("default".to_string(), single_input_value(&inputs));
                Value::Object(out)
            }
            NodeKind::FileOutput(data) => {
                let label = data
                    .label
                    .clone()
                    .or_else(|| data.filename.clone())
                    .unwrap_or_else(|| "output".to_string());
                let _ = FileOutputVariant::Standard;
                let mut out = Map::new();
                out.insert(label, single_input_value(&inputs));
                Value::Object(out)
            }
            NodeKind::Subflow(data) => {
                // A subflow's own scheduler run is independent of this
                // node's position in the parent topological order;
                // outputs are collected the same way a top-level flow's
                // are.
                let inner = self.execute_flow(&data.flow, &Uuid::new_v4().to_string()).await?;
                inner.outputs
            }
            NodeKind::Comment => return Ok(DispatchOutcome::Skipped),
            NodeKind::Passthrough { value } => value.clone().unwrap_or(Value::Object(Map::new())),
        };
        Ok(DispatchOutcome::Output(outcome))
    }

    /// Collects the final output (§4.3 step 4): for every `output`,
    /// `file_output`, or `schematic_output` node, the value it produced,
    /// keyed by the node's label (default `"output"`); null/undefined
    /// values are skipped. Viewer and code outputs never appear here.
    fn collect_final_output(&self, flow: &Flow, state: &ExecutionState) -> Value {
        use crate::types::FileOutputVariant;

        let mut outputs = Map::new();
        for node in &flow.nodes {
            let contributes = matches!(node.kind, NodeKind::Output(_))
                || matches!(
                    &node.kind,
                    NodeKind::FileOutput(data) if matches!(data.variant, FileOutputVariant::Standard | FileOutputVariant::Schematic)
                );
            if !contributes {
                continue;
            }
            let Some(node_state) = state.node_states.get(&node.id) else {
                continue;
            };
            let Some(output) = &node_state.output else {
                continue;
            };
            if let Value::Object(map) = output {
                for (key, value) in map {
                    if !value.is_null() {
                        outputs.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        Value::Object(outputs)
    }
}

enum DispatchOutcome {
    Output(Value),
    Skipped,
}

/// Extracts "the single incoming value" for `output`/`viewer`/
/// `file_output` nodes: prefers the `default` handle, falls back to the
/// first key present.
fn single_input_value(inputs: &Value) -> Value {
    if let Value::Object(map) = inputs {
        if let Some(default) = map.get(crate::types::DEFAULT_HANDLE) {
            return default.clone();
        }
        if let Some((_, first)) = map.iter().next() {
            return first.clone();
        }
    }
    Value::Null
}
