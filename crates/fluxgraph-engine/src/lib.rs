//! `fluxgraph-engine` — the data-flow execution core of FluxGraph.
//!
//! A directed-acyclic-graph flow is validated, topologically ordered with
//! Kahn's algorithm, and executed eagerly node-by-node (`scheduler`). Node
//! outputs are tracked in a dirty-propagation cache (`cache`) that mirrors
//! spreadsheet-style incremental recomputation. Script (`code`) nodes are
//! delegated to an isolated sandbox behind the `ScriptSandbox` trait
//! (`worker`), so a misbehaving script cannot take the scheduler down with
//! it. `typecheck` and `openapi` are pure functions layered on top of the
//! data model for edit-time feedback and HTTP surface generation,
//! respectively.

pub mod cache;
pub mod error;
pub mod events;
pub mod openapi;
pub mod scheduler;
pub mod typecheck;
pub mod types;
pub mod validation;
pub mod worker;

pub use cache::{CacheRecord, ExecutionCache, NodeStatus};
pub use error::{EngineError, ErrorInfo, Result};
pub use events::{EventError, EventSink, FlowEvent, NullEventSink, VecEventSink};
pub use openapi::{generate as generate_openapi, derive_slug, FlowApiConfig};
pub use scheduler::{ExecutionResult, ExecutionState, FlowRunStatus, FlowScheduler, RunNodeStatus, SchedulerTimeouts, ValidationResult};
pub use typecheck::{check as check_type_compatibility, Compatibility};
pub use types::{Edge, EdgeId, Flow, FlowId, Node, NodeId, NodeKind, PortDef, RawNode};
pub use validation::{topological_order, validate_flow, ValidationError};
pub use worker::{ScriptSandbox, ThreadSandbox, WorkerClient};
