//! The flow data model: `Flow`, `Node`, `NodeKind`, `Edge`.
//!
//! Nodes and edges are stored in flat `Vec`s indexed by position, not as a
//! graph of owned/borrowed references — the cache, the scheduler, and the
//! edge-reachability queries all want array-of-struct access keyed by id
//! lookup, and a flat arena sidesteps the lifetime-cycle problems an
//! owned-graph representation would hit the moment a node needs to look at
//! its neighbors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type FlowId = String;
pub type NodeId = String;
pub type EdgeId = String;

/// A directed acyclic graph of typed operators. Invariant: every edge
/// references a node present in `nodes`, and the edge set is acyclic — both
/// are enforced by `crate::validation::validate_flow` before scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub id: FlowId,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

fn default_version() -> String {
    "1".to_string()
}

impl Flow {
    pub fn find_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn incoming_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.target == node_id).collect()
    }

    pub fn outgoing_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.source == node_id).collect()
    }
}

/// An edge connects one node's output handle to another node's input
/// handle. `"default"` is the implicit handle name when either side is null.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    #[serde(default)]
    pub source_handle: Option<String>,
    pub target: NodeId,
    #[serde(default)]
    pub target_handle: Option<String>,
}

pub const DEFAULT_HANDLE: &str = "default";

impl Edge {
    pub fn source_handle(&self) -> &str {
        self.source_handle.as_deref().unwrap_or(DEFAULT_HANDLE)
    }

    pub fn target_handle(&self) -> &str {
        self.target_handle.as_deref().unwrap_or(DEFAULT_HANDLE)
    }
}

/// A declared input or output port on a `subflow` node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default)]
    pub default: Option<Value>,
}

/// Recognized shades of the `input` kind. The specification's Open Question
/// treats legacy input-node kinds (`number_input`, `text_input`,
/// `boolean_input`, `static_input`) as aliases of `input` carrying a fixed
/// `dataType`; this implementation extends that same alias treatment to
/// `schematic_input` (distinct dispatch output shape, §4.3.1),
/// `select_input` (contributes enum options to the OpenAPI schema), and
/// `file_input` (contributes a byte-format schema) — all are variants of
/// `input`, not new top-level node kinds, matching the closed kind set in
/// §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputVariant {
    Standard,
    Schematic,
    Select,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputData {
    #[serde(default)]
    pub value: Value,
    #[serde(default = "default_data_type")]
    pub data_type: String,
    #[serde(default)]
    pub widget_type: Option<String>,
    #[serde(default)]
    pub is_constant: bool,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_input_variant")]
    pub variant: InputVariant,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub step: Option<f64>,
    #[serde(default)]
    pub options: Vec<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_data_type() -> String {
    "string".to_string()
}

fn default_input_variant() -> InputVariant {
    InputVariant::Standard
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputData {
    #[serde(default)]
    pub label: Option<String>,
}

/// Alias classification for the `file_output` kind, mirroring
/// `InputVariant` — `schematic_output` is a recognized alias, not a new
/// node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutputVariant {
    Standard,
    Schematic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOutputData {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default = "default_file_output_variant")]
    pub variant: FileOutputVariant,
}

fn default_file_output_variant() -> FileOutputVariant {
    FileOutputVariant::Standard
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubflowData {
    pub flow: Box<Flow>,
    #[serde(default)]
    pub inputs: Vec<PortDef>,
    #[serde(default)]
    pub outputs: Vec<PortDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeData {
    pub source: String,
    #[serde(default)]
    pub declared_inputs: Vec<PortDef>,
    #[serde(default)]
    pub declared_outputs: Vec<PortDef>,
}

/// The node's behavior tag, replacing a duck-typed `switch(node.type)` with
/// a match the compiler checks for exhaustiveness. `Passthrough` absorbs
/// any kind string the engine does not recognize, so a forward-compatible
/// flow file never turns an unknown node kind into a scheduler panic — it
/// degrades to an identity-ish no-op node instead (§4.3.1 "Unknown kinds").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum NodeKind {
    #[serde(rename = "code")]
    Code(CodeData),
    #[serde(rename = "input")]
    Input(InputData),
    #[serde(rename = "output")]
    Output(OutputData),
    #[serde(rename = "viewer")]
    Viewer { passthrough: bool },
    #[serde(rename = "file_output")]
    FileOutput(FileOutputData),
    #[serde(rename = "subflow")]
    Subflow(SubflowData),
    #[serde(rename = "comment")]
    Comment,
    #[serde(rename = "passthrough")]
    Passthrough { value: Option<Value> },
}

impl NodeKind {
    /// Human-readable tag, used in logs and validation error messages.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Code(_) => "code",
            NodeKind::Input(_) => "input",
            NodeKind::Output(_) => "output",
            NodeKind::Viewer { .. } => "viewer",
            NodeKind::FileOutput(_) => "file_output",
            NodeKind::Subflow(_) => "subflow",
            NodeKind::Comment => "comment",
            NodeKind::Passthrough { .. } => "passthrough",
        }
    }
}

/// A raw, loosely-typed node as it appears in a flow file (§6.2): the
/// `kind` string may be a legacy alias, and `data` is a free-form object
/// whose shape depends on that string. `Node::from_raw` resolves aliases
/// into the closed `NodeKind` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNode {
    pub id: NodeId,
    pub kind: String,
    #[serde(default)]
    pub position: Value,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default)]
    pub position: Value,
}

impl Node {
    /// Resolve a raw flow-file node into the closed `NodeKind` set,
    /// recognizing legacy aliases per the Open Question resolution
    /// (`InputVariant`/`FileOutputVariant` above). Never fails: a kind
    /// string this engine has never seen becomes `Passthrough`.
    pub fn from_raw(raw: RawNode) -> Self {
        let kind = match raw.kind.as_str() {
            "code" => NodeKind::Code(
                serde_json::from_value(raw.data.clone()).unwrap_or(CodeData {
                    source: String::new(),
                    declared_inputs: Vec::new(),
                    declared_outputs: Vec::new(),
                }),
            ),
            "input" | "static_input" => {
                let mut data: InputData = parse_input_data(&raw.data);
                data.variant = InputVariant::Standard;
                NodeKind::Input(data)
            }
            "number_input" => {
                let mut data = parse_input_data(&raw.data);
                data.data_type = "number".to_string();
                data.variant = InputVariant::Standard;
                NodeKind::Input(data)
            }
            "text_input" => {
                let mut data = parse_input_data(&raw.data);
                data.data_type = "string".to_string();
                data.variant = InputVariant::Standard;
                NodeKind::Input(data)
            }
            "boolean_input" => {
                let mut data = parse_input_data(&raw.data);
                data.data_type = "boolean".to_string();
                data.variant = InputVariant::Standard;
                NodeKind::Input(data)
            }
            "schematic_input" => {
                let mut data = parse_input_data(&raw.data);
                data.variant = InputVariant::Schematic;
                NodeKind::Input(data)
            }
            "select_input" => {
                let mut data = parse_input_data(&raw.data);
                data.variant = InputVariant::Select;
                NodeKind::Input(data)
            }
            "file_input" => {
                let mut data = parse_input_data(&raw.data);
                data.variant = InputVariant::File;
                NodeKind::Input(data)
            }
            "output" => NodeKind::Output(
                serde_json::from_value(raw.data.clone()).unwrap_or(OutputData { label: None }),
            ),
            "viewer" => {
                let passthrough = raw
                    .data
                    .get("passthrough")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                NodeKind::Viewer { passthrough }
            }
            "file_output" => {
                let mut data: FileOutputData = serde_json::from_value(raw.data.clone())
                    .unwrap_or(FileOutputData {
                        label: None,
                        filename: None,
                        variant: FileOutputVariant::Standard,
                    });
                data.variant = FileOutputVariant::Standard;
                NodeKind::FileOutput(data)
            }
            "schematic_output" => {
                let mut data: FileOutputData = serde_json::from_value(raw.data.clone())
                    .unwrap_or(FileOutputData {
                        label: None,
                        filename: None,
                        variant: FileOutputVariant::Schematic,
                    });
                data.variant = FileOutputVariant::Schematic;
                NodeKind::FileOutput(data)
            }
            "subflow" => match serde_json::from_value(raw.data.clone()) {
                Ok(data) => NodeKind::Subflow(data),
                Err(_) => NodeKind::Passthrough {
                    value: raw.data.get("value").cloned(),
                },
            },
            "comment" => NodeKind::Comment,
            _ => NodeKind::Passthrough {
                value: raw.data.get("value").cloned(),
            },
        };
        Node {
            id: raw.id,
            kind,
            position: raw.position,
        }
    }
}

fn parse_input_data(data: &Value) -> InputData {
    serde_json::from_value(data.clone()).unwrap_or(InputData {
        value: Value::Null,
        data_type: default_data_type(),
        widget_type: None,
        is_constant: false,
        label: None,
        variant: InputVariant::Standard,
        min: None,
        max: None,
        step: None,
        options: Vec::new(),
        description: None,
    })
}
