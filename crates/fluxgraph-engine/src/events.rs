//! Scheduler lifecycle events.
//!
//! Multiple consumers subscribe to scheduler events — run-service logs,
//! tests, a live UI — so delivery goes through a trait object rather than a
//! single owned channel; a dropped delivery is safe because events are
//! best-effort (logs, live updates), never the system of record.

use serde::{Deserialize, Serialize};

/// Abstracts over the transport used to deliver `FlowEvent`s, so the
/// scheduler does not need to know whether its observer is an in-memory
/// test harness, the run service's log buffer, or a live subscriber.
pub trait EventSink: Send + Sync {
    /// Returns an error if the event could not be sent (e.g. channel closed).
    fn send(&self, event: FlowEvent) -> Result<(), EventError>;
}

#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "channel closed".to_string(),
        }
    }
}

/// Lifecycle events emitted by the `FlowScheduler`, in the names the
/// specification fixes: `flow:start`, `flow:finish`, `flow:error`,
/// `flow:cancelled`, `node:start`, `node:finish`, `node:error`, `progress`,
/// `worker:ready`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEvent {
    #[serde(rename = "flow:start")]
    FlowStart { flow_id: String, execution_id: String },

    #[serde(rename = "flow:finish")]
    FlowFinish {
        flow_id: String,
        execution_id: String,
        outputs: serde_json::Value,
    },

    #[serde(rename = "flow:error")]
    FlowError {
        flow_id: String,
        execution_id: String,
        error: crate::error::ErrorInfo,
    },

    #[serde(rename = "flow:cancelled")]
    FlowCancelled { flow_id: String, execution_id: String },

    #[serde(rename = "node:start")]
    NodeStart {
        flow_id: String,
        execution_id: String,
        node_id: String,
    },

    #[serde(rename = "node:finish")]
    NodeFinish {
        flow_id: String,
        execution_id: String,
        node_id: String,
        output: serde_json::Value,
    },

    #[serde(rename = "node:error")]
    NodeError {
        flow_id: String,
        execution_id: String,
        node_id: String,
        error: crate::error::ErrorInfo,
    },

    #[serde(rename = "progress")]
    Progress {
        flow_id: String,
        execution_id: String,
        message: String,
        percent: Option<u8>,
    },

    #[serde(rename = "worker:ready")]
    WorkerReady { execution_id: String },
}

impl FlowEvent {
    pub fn progress(
        flow_id: impl Into<String>,
        execution_id: impl Into<String>,
        message: impl Into<String>,
        percent: Option<u8>,
    ) -> Self {
        Self::Progress {
            flow_id: flow_id.into(),
            execution_id: execution_id.into(),
            message: message.into(),
            percent,
        }
    }
}

/// Discards all events. Used where no observer is wired up.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: FlowEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// Collects events in order. The test harness for the event-ordering
/// invariants in the testable-properties section (topological
/// `node:start`/`node:finish` ordering, cycle rejection emitting zero
/// `node:start`, etc.).
#[derive(Default)]
pub struct VecEventSink {
    events: std::sync::Mutex<Vec<FlowEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<FlowEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: FlowEvent) -> Result<(), EventError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_event_sink_collects_in_order() {
        let sink = VecEventSink::new();
        sink.send(FlowEvent::FlowStart {
            flow_id: "f1".into(),
            execution_id: "e1".into(),
        })
        .unwrap();
        sink.send(FlowEvent::progress("f1", "e1", "halfway", Some(50)))
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], FlowEvent::FlowStart { .. }));
    }

    #[test]
    fn null_event_sink_never_fails() {
        let sink = NullEventSink;
        sink.send(FlowEvent::WorkerReady {
            execution_id: "e1".into(),
        })
        .unwrap();
    }

    #[test]
    fn flow_event_serializes_with_fixed_type_tags() {
        let json = serde_json::to_string(&FlowEvent::FlowStart {
            flow_id: "f1".into(),
            execution_id: "e1".into(),
        })
        .unwrap();
        assert!(json.contains("\"type\":\"flow:start\""));
    }
}
