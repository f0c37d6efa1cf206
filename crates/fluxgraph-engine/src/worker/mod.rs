//! The Worker Protocol (§4.4): the scheduler-to-sandbox state machine,
//! handle storage, and the pluggable sandbox transports.

pub mod client;
pub mod handles;
pub mod sandbox;

pub use client::{ClientState, WorkerClient};
pub use handles::{HandleId, HandleRecord, HandleStore};
pub use sandbox::{SandboxEvent, ScriptEvaluator, ScriptOutcome, ScriptSandbox, ThreadSandbox};

#[cfg(feature = "process-sandbox")]
pub use sandbox::ProcessSandbox;
