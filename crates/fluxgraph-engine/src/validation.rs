//! Flow validation: structural integrity and cycle detection (§4.3 step 1).

use std::collections::{HashMap, HashSet, VecDeque};

use crate::types::{Flow, Node, NodeKind};

#[derive(Debug, Clone)]
pub enum ValidationError {
    /// An edge references a node that does not exist in the flow.
    UnknownNode { edge_id: String, node_id: String },
    /// An edge connects a declared output port to a declared input port
    /// whose types are incompatible (not merely coercible).
    IncompatiblePortTypes {
        edge_id: String,
        source_type: String,
        target_type: String,
    },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownNode { edge_id, node_id } => {
                write!(f, "edge '{}' references unknown node '{}'", edge_id, node_id)
            }
            Self::IncompatiblePortTypes {
                edge_id,
                source_type,
                target_type,
            } => write!(
                f,
                "edge '{}' connects incompatible types: {} -> {}",
                edge_id, source_type, target_type
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validates a flow's structural integrity: every edge must reference
/// existing nodes, and declared port types must be compatible. Returns
/// every error found, not just the first, so the caller can surface them
/// all at once.
///
/// Cyclicity is deliberately not checked here: the scheduler surfaces a
/// cycle as its own `EngineError::Cycle` kind (§7), distinct from
/// `validation`, via `topological_order` directly.
pub fn validate_flow(flow: &Flow) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    validate_edge_references(flow, &mut errors);
    validate_port_types(flow, &mut errors);
    errors
}

fn validate_edge_references(flow: &Flow, errors: &mut Vec<ValidationError>) {
    let node_ids: HashSet<&str> = flow.nodes.iter().map(|n| n.id.as_str()).collect();
    for edge in &flow.edges {
        if !node_ids.contains(edge.source.as_str()) {
            errors.push(ValidationError::UnknownNode {
                edge_id: edge.id.clone(),
                node_id: edge.source.clone(),
            });
        }
        if !node_ids.contains(edge.target.as_str()) {
            errors.push(ValidationError::UnknownNode {
                edge_id: edge.id.clone(),
                node_id: edge.target.clone(),
            });
        }
    }
}

/// Computes a topological order of the flow's nodes via Kahn's algorithm.
/// `Err` carries the ids that could not be ordered (the cycle's
/// participants and anything downstream of it) when the edge set is not a
/// DAG. This doubles as the scheduler's cycle check: a flow is cyclic
/// exactly when this returns `Err`.
pub fn topological_order(flow: &Flow) -> Result<Vec<String>, Vec<String>> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    for node in &flow.nodes {
        in_degree.insert(&node.id, 0);
    }
    for edge in &flow.edges {
        if let Some(deg) = in_degree.get_mut(edge.target.as_str()) {
            *deg += 1;
        }
    }

    let mut queue: VecDeque<String> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id.to_string())
        .collect();
    queue.make_contiguous().sort();

    let mut order = Vec::with_capacity(flow.nodes.len());
    while let Some(node_id) = queue.pop_front() {
        order.push(node_id.clone());
        let mut newly_ready = Vec::new();
        for edge in &flow.edges {
            if edge.source == node_id {
                if let Some(deg) = in_degree.get_mut(edge.target.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        newly_ready.push(edge.target.clone());
                    }
                }
            }
        }
        newly_ready.sort();
        for id in newly_ready {
            queue.push_back(id);
        }
    }

    if order.len() == flow.nodes.len() {
        Ok(order)
    } else {
        let ordered: HashSet<&str> = order.iter().map(|s| s.as_str()).collect();
        let remaining = flow
            .nodes
            .iter()
            .map(|n| n.id.clone())
            .filter(|id| !ordered.contains(id.as_str()))
            .collect();
        Err(remaining)
    }
}

/// Checks declared port types across edges between `code` nodes. Per
/// §4.1's contract this is edit-time/pre-flight feedback only — an
/// `incompatible` verdict is a validation error, but `coercible` is
/// accepted (execution trusts edges and performs no type enforcement of
/// its own).
fn validate_port_types(flow: &Flow, errors: &mut Vec<ValidationError>) {
    for edge in &flow.edges {
        let (Some(source), Some(target)) = (flow.find_node(&edge.source), flow.find_node(&edge.target))
        else {
            continue;
        };
        let Some(source_type) = output_port_type(source, edge.source_handle()) else {
            continue;
        };
        let Some(target_type) = input_port_type(target, edge.target_handle()) else {
            continue;
        };
        if crate::typecheck::check(&source_type, &target_type) == crate::typecheck::Compatibility::Incompatible
        {
            errors.push(ValidationError::IncompatiblePortTypes {
                edge_id: edge.id.clone(),
                source_type,
                target_type,
            });
        }
    }
}

fn output_port_type(node: &Node, handle: &str) -> Option<String> {
    match &node.kind {
        NodeKind::Code(data) => data
            .declared_outputs
            .iter()
            .find(|p| p.name == handle)
            .map(|p| p.type_tag.clone()),
        NodeKind::Input(data) => Some(data.data_type.clone()),
        _ => None,
    }
}

fn input_port_type(node: &Node, handle: &str) -> Option<String> {
    match &node.kind {
        NodeKind::Code(data) => data
            .declared_inputs
            .iter()
            .find(|p| p.name == handle)
            .map(|p| p.type_tag.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CodeData, Edge, InputData, InputVariant, Node, NodeKind, PortDef};
    use serde_json::json;

    fn code_node(id: &str, inputs: Vec<PortDef>, outputs: Vec<PortDef>) -> Node {
        Node {
            id: id.into(),
            kind: NodeKind::Code(CodeData {
                source: "return inputs;".into(),
                declared_inputs: inputs,
                declared_outputs: outputs,
            }),
            position: json!(null),
        }
    }

    fn input_node(id: &str, data_type: &str) -> Node {
        Node {
            id: id.into(),
            kind: NodeKind::Input(InputData {
                value: json!(null),
                data_type: data_type.into(),
                widget_type: None,
                is_constant: false,
                label: None,
                variant: InputVariant::Standard,
                min: None,
                max: None,
                step: None,
                options: vec![],
                description: None,
            }),
            position: json!(null),
        }
    }

    fn edge(id: &str, source: &str, target: &str) -> Edge {
        Edge {
            id: id.into(),
            source: source.into(),
            source_handle: None,
            target: target.into(),
            target_handle: None,
        }
    }

    fn flow(nodes: Vec<Node>, edges: Vec<Edge>) -> Flow {
        Flow {
            id: "f1".into(),
            name: "test".into(),
            version: "1".into(),
            nodes,
            edges,
            created_at: None,
            metadata: None,
        }
    }

    #[test]
    fn acyclic_flow_passes_validation() {
        let f = flow(
            vec![input_node("a", "number"), code_node("b", vec![], vec![])],
            vec![edge("e1", "a", "b")],
        );
        assert!(validate_flow(&f).is_empty());
    }

    #[test]
    fn direct_cycle_fails_topological_order_but_is_not_a_validation_error() {
        let f = flow(
            vec![code_node("a", vec![], vec![]), code_node("b", vec![], vec![])],
            vec![edge("e1", "a", "b"), edge("e2", "b", "a")],
        );
        assert!(validate_flow(&f).is_empty());
        assert!(topological_order(&f).is_err());
    }

    #[test]
    fn dangling_edge_reports_unknown_node() {
        let f = flow(vec![code_node("a", vec![], vec![])], vec![edge("e1", "a", "missing")]);
        let errors = validate_flow(&f);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnknownNode { .. })));
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let f = flow(
            vec![
                code_node("c", vec![], vec![]),
                code_node("a", vec![], vec![]),
                code_node("b", vec![], vec![]),
            ],
            vec![edge("e1", "a", "b"), edge("e2", "b", "c")],
        );
        let order = topological_order(&f).unwrap();
        let pos = |id: &str| order.iter().position(|n| n == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
    }

    #[test]
    fn incompatible_declared_port_types_are_flagged() {
        let f = flow(
            vec![
                code_node("a", vec![], vec![PortDef { name: "out".into(), type_tag: "schematic".into(), default: None }]),
                code_node(
                    "b",
                    vec![PortDef { name: "in".into(), type_tag: "string".into(), default: None }],
                    vec![],
                ),
            ],
            vec![Edge {
                id: "e1".into(),
                source: "a".into(),
                source_handle: Some("out".into()),
                target: "b".into(),
                target_handle: Some("in".into()),
            }],
        );
        let errors = validate_flow(&f);
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::IncompatiblePortTypes { .. })));
    }
}
