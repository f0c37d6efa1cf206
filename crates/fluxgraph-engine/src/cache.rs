//! Execution cache (§4.2): per-node status, dirty-propagation invalidation.
//!
//! This is the contract between editor and scheduler — a spreadsheet-style
//! incremental recomputation cache. Invalidation is breadth-first over
//! outgoing edges so a change to one node marks every transitively
//! downstream node `stale` without recomputing anything; the scheduler
//! decides separately which stale nodes actually need to re-run.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorInfo;
use crate::types::{Edge, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Idle,
    Pending,
    Running,
    Completed,
    Stale,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    pub status: NodeStatus,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
    #[serde(default)]
    pub execution_time_ms: Option<u64>,
    #[serde(default)]
    pub last_executed_at: Option<DateTime<Utc>>,
}

impl Default for CacheRecord {
    fn default() -> Self {
        Self {
            status: NodeStatus::Idle,
            output: None,
            error: None,
            execution_time_ms: None,
            last_executed_at: None,
        }
    }
}

/// `Map<NodeId, CacheRecord>` plus the edge list needed to compute
/// downstream reachability, and a generation counter that orders
/// overlapping invalidations so a caller can tell whether a record it
/// holds predates a more recent invalidation.
pub struct ExecutionCache {
    records: HashMap<NodeId, CacheRecord>,
    edges: Vec<Edge>,
    generation: u64,
}

impl ExecutionCache {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            edges: Vec::new(),
            generation: 0,
        }
    }

    /// Replaces the edge list used for downstream reachability. Called
    /// whenever the flow's structure changes.
    pub fn set_edges(&mut self, edges: Vec<Edge>) {
        self.edges = edges;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, node_id: &str) -> Option<&CacheRecord> {
        self.records.get(node_id)
    }

    pub fn status(&self, node_id: &str) -> NodeStatus {
        self.records
            .get(node_id)
            .map(|r| r.status)
            .unwrap_or(NodeStatus::Idle)
    }

    /// Sets `status=completed`, stores the output, stamps
    /// `lastExecutedAt`.
    pub fn set_output(&mut self, node_id: &str, output: Value) {
        let record = self.records.entry(node_id.to_string()).or_default();
        record.status = NodeStatus::Completed;
        record.output = Some(output);
        record.error = None;
        record.last_executed_at = Some(Utc::now());
    }

    /// Explicit transition. Arguments left as `None` preserve the record's
    /// prior value for that field.
    pub fn set_status(
        &mut self,
        node_id: &str,
        status: NodeStatus,
        output: Option<Value>,
        error: Option<ErrorInfo>,
        execution_time_ms: Option<u64>,
    ) {
        let record = self.records.entry(node_id.to_string()).or_default();
        record.status = status;
        if output.is_some() {
            record.output = output;
        }
        if error.is_some() {
            record.error = error;
        }
        if execution_time_ms.is_some() {
            record.execution_time_ms = execution_time_ms;
        }
        if matches!(status, NodeStatus::Completed) {
            record.last_executed_at = Some(Utc::now());
        }
    }

    fn downstream_of(&self, node_id: &str) -> HashSet<NodeId> {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(node_id);

        while let Some(current) = queue.pop_front() {
            for edge in &self.edges {
                if edge.source == current && visited.insert(edge.target.clone()) {
                    queue.push_back(&edge.target);
                }
            }
        }
        visited
    }

    /// Sets `node_id` and all transitively downstream nodes to `stale`.
    pub fn invalidate(&mut self, node_id: &str) {
        self.generation += 1;
        let downstream = self.downstream_of(node_id);
        self.mark_stale(node_id);
        for id in downstream {
            self.mark_stale(&id);
        }
    }

    /// Same as `invalidate` but leaves `node_id` itself untouched — used
    /// once a node has just produced a fresh value and only its consumers
    /// need to be marked stale.
    pub fn invalidate_downstream(&mut self, node_id: &str) {
        self.generation += 1;
        for id in self.downstream_of(node_id) {
            self.mark_stale(&id);
        }
    }

    fn mark_stale(&mut self, node_id: &str) {
        let record = self.records.entry(node_id.to_string()).or_default();
        record.status = NodeStatus::Stale;
    }

    /// Resets every known node to `idle`.
    pub fn clear_all(&mut self) {
        self.generation += 1;
        for record in self.records.values_mut() {
            *record = CacheRecord::default();
        }
    }

    /// True iff the edge's source node has `status=completed`.
    pub fn is_edge_ready(&self, edge: &Edge) -> bool {
        self.status(&edge.source) == NodeStatus::Completed
    }
}

impl Default for ExecutionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(id: &str, source: &str, target: &str) -> Edge {
        Edge {
            id: id.into(),
            source: source.into(),
            source_handle: None,
            target: target.into(),
            target_handle: None,
        }
    }

    #[test]
    fn set_output_marks_completed_and_stamps_time() {
        let mut cache = ExecutionCache::new();
        cache.set_output("a", serde_json::json!(1));
        assert_eq!(cache.status("a"), NodeStatus::Completed);
        assert!(cache.get("a").unwrap().last_executed_at.is_some());
    }

    #[test]
    fn invalidate_marks_self_and_all_transitive_downstream_stale() {
        let mut cache = ExecutionCache::new();
        cache.set_edges(vec![edge("e1", "a", "b"), edge("e2", "b", "c")]);
        cache.set_output("a", serde_json::json!(1));
        cache.set_output("b", serde_json::json!(2));
        cache.set_output("c", serde_json::json!(3));

        cache.invalidate("a");

        assert_eq!(cache.status("a"), NodeStatus::Stale);
        assert_eq!(cache.status("b"), NodeStatus::Stale);
        assert_eq!(cache.status("c"), NodeStatus::Stale);
    }

    #[test]
    fn invalidate_downstream_leaves_the_node_itself_untouched() {
        let mut cache = ExecutionCache::new();
        cache.set_edges(vec![edge("e1", "a", "b")]);
        cache.set_output("a", serde_json::json!(1));
        cache.set_output("b", serde_json::json!(2));

        cache.invalidate_downstream("a");

        assert_eq!(cache.status("a"), NodeStatus::Completed);
        assert_eq!(cache.status("b"), NodeStatus::Stale);
    }

    #[test]
    fn clear_all_resets_every_node_to_idle() {
        let mut cache = ExecutionCache::new();
        cache.set_output("a", serde_json::json!(1));
        cache.clear_all();
        assert_eq!(cache.status("a"), NodeStatus::Idle);
    }

    #[test]
    fn is_edge_ready_checks_source_completion() {
        let mut cache = ExecutionCache::new();
        let e = edge("e1", "a", "b");
        assert!(!cache.is_edge_ready(&e));
        cache.set_output("a", serde_json::json!(1));
        assert!(cache.is_edge_ready(&e));
    }

    #[test]
    fn diamond_invalidation_does_not_visit_shared_downstream_twice() {
        let mut cache = ExecutionCache::new();
        cache.set_edges(vec![
            edge("e1", "a", "b"),
            edge("e2", "a", "c"),
            edge("e3", "b", "d"),
            edge("e4", "c", "d"),
        ]);
        for id in ["a", "b", "c", "d"] {
            cache.set_output(id, serde_json::json!(null));
        }
        cache.invalidate("a");
        assert_eq!(cache.status("d"), NodeStatus::Stale);
    }
}
