//! OpenAPI document generator (§4.6): a pure function from a `Flow` plus
//! its Flow-API configuration to a JSON OpenAPI 3.0 document.
//!
//! No OpenAPI crate appears anywhere in the retrieval pack this crate was
//! grounded on, so the document is hand-assembled as `serde_json::Value` —
//! the same approach the teacher takes for other externally-consumed JSON
//! shapes it does not have a typed schema crate for.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::types::{Flow, FileOutputVariant, InputVariant, Node, NodeKind};

/// The subset of a Flow-API configuration the generator needs. Persistence
/// and the rest of the configuration's fields belong to the run service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowApiConfig {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub api_version: String,
    pub default_ttl_secs: u64,
    pub max_ttl_secs: u64,
    pub timeout_ms: u64,
}

/// `slug = lowercase(name) with non-alphanumerics collapsed to "-",
/// trimmed of leading/trailing "-", truncated to 64 chars`.
pub fn derive_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_dash = false;
    for ch in name.to_ascii_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    let trimmed = slug.trim_matches('-');
    trimmed.chars().take(64).collect()
}

struct InputField {
    name: String,
    type_tag: String,
    required: bool,
    default: Option<Value>,
    description: Option<String>,
    min: Option<f64>,
    max: Option<f64>,
    step: Option<f64>,
    options: Vec<Value>,
}

struct OutputField {
    name: String,
    type_tag: String,
    description: Option<String>,
}

fn extract_inputs(flow: &Flow) -> Vec<InputField> {
    flow.nodes
        .iter()
        .filter_map(|node| {
            let NodeKind::Input(data) = &node.kind else {
                return None;
            };
            if data.is_constant {
                return None;
            }
            let (min, max, step, options) = match data.variant {
                InputVariant::Select => (None, None, None, data.options.clone()),
                _ => (data.min, data.max, data.step, Vec::new()),
            };
            Some(InputField {
                name: data.label.clone().unwrap_or_else(|| node.id.clone()),
                type_tag: if matches!(data.variant, InputVariant::File) {
                    "file".to_string()
                } else {
                    data.data_type.clone()
                },
                required: data.default_required(),
                default: if data.value.is_null() { None } else { Some(data.value.clone()) },
                description: data.description.clone(),
                min,
                max,
                step,
                options,
            })
        })
        .collect()
}

fn extract_outputs(flow: &Flow) -> Vec<OutputField> {
    let mut outputs: Vec<OutputField> = flow
        .nodes
        .iter()
        .filter_map(|node| match &node.kind {
            NodeKind::Output(data) => Some(OutputField {
                name: data.label.clone().unwrap_or_else(|| "output".to_string()),
                type_tag: "object".to_string(),
                description: None,
            }),
            NodeKind::FileOutput(data) => {
                let name = data
                    .label
                    .clone()
                    .or_else(|| data.filename.clone())
                    .unwrap_or_else(|| "output".to_string());
                let type_tag = match data.variant {
                    FileOutputVariant::Schematic => "schematic".to_string(),
                    FileOutputVariant::Standard => "file".to_string(),
                };
                Some(OutputField {
                    name,
                    type_tag,
                    description: None,
                })
            }
            NodeKind::Viewer { passthrough } if *passthrough => Some(OutputField {
                name: "viewer".to_string(),
                type_tag: "object".to_string(),
                description: None,
            }),
            _ => None,
        })
        .collect();

    if outputs.is_empty() {
        outputs.push(OutputField {
            name: "result".to_string(),
            type_tag: "object".to_string(),
            description: None,
        });
    }
    outputs
}

/// Maps a raw type tag to a JSON Schema fragment (step 3).
fn type_to_schema(field: &InputField) -> Value {
    let mut schema = match field.type_tag.as_str() {
        "number" => {
            let mut s = json!({ "type": "number" });
            if let Some(min) = field.min {
                s["minimum"] = json!(min);
            }
            if let Some(max) = field.max {
                s["maximum"] = json!(max);
            }
            s
        }
        "integer" => json!({ "type": "integer" }),
        "boolean" => json!({ "type": "boolean" }),
        "string" => {
            let mut s = json!({ "type": "string" });
            if !field.options.is_empty() {
                s["enum"] = Value::Array(field.options.clone());
            }
            s
        }
        "schematic" | "file" => json!({ "type": "string", "format": "byte" }),
        "array" => json!({ "type": "array", "items": { "type": "string" } }),
        "object" => json!({ "type": "object" }),
        _ => json!({}),
    };
    if let Some(default) = &field.default {
        schema["default"] = default.clone();
    }
    if let Some(description) = &field.description {
        schema["description"] = json!(description);
    }
    schema
}

fn output_schema(field: &OutputField) -> Value {
    let mut schema = match field.type_tag.as_str() {
        "number" => json!({ "type": "number" }),
        "integer" => json!({ "type": "integer" }),
        "boolean" => json!({ "type": "boolean" }),
        "string" => json!({ "type": "string" }),
        "schematic" | "file" => json!({ "type": "string", "format": "byte" }),
        "array" => json!({ "type": "array", "items": { "type": "string" } }),
        "object" => json!({ "type": "object" }),
        _ => json!({}),
    };
    if let Some(description) = &field.description {
        schema["description"] = json!(description);
    }
    schema
}

fn inputs_schema_object(inputs: &[InputField]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for field in inputs {
        properties.insert(field.name.clone(), type_to_schema(field));
        if field.required {
            required.push(json!(field.name));
        }
    }
    json!({ "type": "object", "properties": properties, "required": required })
}

fn outputs_schema_object(outputs: &[OutputField]) -> Value {
    let mut properties = Map::new();
    for field in outputs {
        properties.insert(field.name.clone(), output_schema(field));
    }
    json!({ "type": "object", "properties": properties })
}

/// Generates the full OpenAPI 3.0 document for one flow-API configuration.
pub fn generate(flow: &Flow, config: &FlowApiConfig, base_url: Option<&str>) -> Value {
    let inputs = extract_inputs(flow);
    let outputs = extract_outputs(flow);
    let base = format!("/api/v1/flows/{}", config.slug);

    let error_schema = json!({
        "type": "object",
        "properties": {
            "message": { "type": "string" },
            "type": { "type": "string" },
            "stack": { "type": "string" },
            "lineNumber": { "type": "integer" },
            "columnNumber": { "type": "integer" }
        },
        "required": ["message", "type"]
    });

    let error_responses = json!({
        "400": { "description": "malformed input or validation failure", "content": { "application/json": { "schema": { "$ref": "#/components/schemas/Error" } } } },
        "401": { "description": "missing or invalid credentials", "content": { "application/json": { "schema": { "$ref": "#/components/schemas/Error" } } } },
        "404": { "description": "not found", "content": { "application/json": { "schema": { "$ref": "#/components/schemas/Error" } } } },
        "429": { "description": "rate limit exceeded", "content": { "application/json": { "schema": { "$ref": "#/components/schemas/Error" } } } },
        "500": { "description": "internal scheduler/worker error", "content": { "application/json": { "schema": { "$ref": "#/components/schemas/Error" } } } }
    });

    let run_request_schema = json!({
        "type": "object",
        "properties": {
            "inputs": inputs_schema_object(&inputs),
            "options": {
                "type": "object",
                "properties": {
                    "timeout": { "type": "integer", "default": config.timeout_ms },
                    "ttl": { "type": "integer", "default": config.default_ttl_secs, "maximum": config.max_ttl_secs },
                    "async": { "type": "boolean", "default": false },
                    "webhook": { "type": "string", "format": "uri" }
                }
            }
        }
    });

    let run_path = json!({
        "post": {
            "summary": format!("Run {}", config.title),
            "operationId": format!("run{}", pascal_case(&config.slug)),
            "security": security_requirements(),
            "requestBody": {
                "required": true,
                "content": { "application/json": { "schema": run_request_schema } }
            },
            "responses": {
                "200": {
                    "description": "execution result or run descriptor",
                    "content": { "application/json": { "schema": outputs_schema_object(&outputs) } }
                },
                "400": error_responses["400"].clone(),
                "401": error_responses["401"].clone(),
                "404": error_responses["404"].clone(),
                "429": error_responses["429"].clone(),
                "500": error_responses["500"].clone()
            }
        }
    });

    let run_status_path = json!({
        "get": {
            "summary": "Get run status",
            "operationId": format!("getRun{}", pascal_case(&config.slug)),
            "security": security_requirements(),
            "parameters": [
                { "name": "runId", "in": "path", "required": true, "schema": { "type": "string" } }
            ],
            "responses": {
                "200": { "description": "the run record", "content": { "application/json": { "schema": { "$ref": "#/components/schemas/Run" } } } },
                "404": error_responses["404"].clone()
            }
        }
    });

    let schema_path = json!({
        "get": {
            "summary": "Get computed input/output schemas",
            "operationId": format!("getSchema{}", pascal_case(&config.slug)),
            "security": security_requirements(),
            "responses": {
                "200": {
                    "description": "input and output schemas",
                    "content": {
                        "application/json": {
                            "schema": {
                                "type": "object",
                                "properties": {
                                    "inputs": inputs_schema_object(&inputs),
                                    "outputs": outputs_schema_object(&outputs)
                                }
                            }
                        }
                    }
                }
            }
        }
    });

    let mut paths = Map::new();
    paths.insert(format!("{base}/run"), run_path);
    paths.insert(format!("{base}/runs/{{runId}}"), run_status_path);
    paths.insert(format!("{base}/schema"), schema_path);

    let mut servers = Vec::new();
    if let Some(url) = base_url {
        servers.push(json!({ "url": url }));
    }

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": config.title,
            "description": config.description,
            "version": config.api_version
        },
        "servers": servers,
        "paths": paths,
        "components": {
            "schemas": {
                "Error": error_schema,
                "Run": run_schema()
            },
            "securitySchemes": {
                "apiKey": { "type": "apiKey", "in": "header", "name": "X-API-Key" },
                "bearerAuth": { "type": "http", "scheme": "bearer", "bearerFormat": "JWT" }
            }
        }
    })
}

fn run_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": { "type": "string" },
            "flowId": { "type": "string" },
            "status": { "type": "string" },
            "outputs": { "type": "object" },
            "error": { "$ref": "#/components/schemas/Error" },
            "createdAt": { "type": "string", "format": "date-time" }
        },
        "required": ["id", "flowId", "status"]
    })
}

fn security_requirements() -> Value {
    json!([{ "apiKey": [] }, { "bearerAuth": [] }])
}

fn pascal_case(slug: &str) -> String {
    slug.split('-')
        .filter(|s| !s.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

impl crate::types::InputData {
    /// An input is required unless it carries a non-null default value.
    fn default_required(&self) -> bool {
        self.value.is_null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CodeData, InputData, OutputData};
    use serde_json::json as j;

    fn config() -> FlowApiConfig {
        FlowApiConfig {
            slug: "my-flow".into(),
            title: "My Flow".into(),
            description: Some("desc".into()),
            api_version: "1.0.0".into(),
            default_ttl_secs: 3600,
            max_ttl_secs: 86400,
            timeout_ms: 30_000,
        }
    }

    fn flow_with(nodes: Vec<Node>) -> Flow {
        Flow {
            id: "f1".into(),
            name: "My Flow".into(),
            version: "1".into(),
            nodes,
            edges: vec![],
            created_at: None,
            metadata: None,
        }
    }

    #[test]
    fn slug_derivation_collapses_and_trims() {
        assert_eq!(derive_slug("  My Cool Flow!! "), "my-cool-flow");
        assert_eq!(derive_slug("---leading"), "leading");
    }

    #[test]
    fn slug_derivation_truncates_to_64_chars() {
        let long = "a".repeat(100);
        assert_eq!(derive_slug(&long).len(), 64);
    }

    #[test]
    fn generator_emits_three_paths() {
        let flow = flow_with(vec![
            Node {
                id: "in".into(),
                kind: NodeKind::Input(InputData {
                    value: Value::Null,
                    data_type: "number".into(),
                    widget_type: None,
                    is_constant: false,
                    label: Some("radius".into()),
                    variant: InputVariant::Standard,
                    min: Some(0.0),
                    max: Some(10.0),
                    step: Some(1.0),
                    options: vec![],
                    description: None,
                }),
                position: j!(null),
            },
            Node {
                id: "out".into(),
                kind: NodeKind::Output(OutputData { label: Some("area".into()) }),
                position: j!(null),
            },
        ]);
        let doc = generate(&flow, &config(), Some("https://example.test"));
        let paths = doc["paths"].as_object().unwrap();
        assert!(paths.contains_key("/api/v1/flows/my-flow/run"));
        assert!(paths.contains_key("/api/v1/flows/my-flow/runs/{runId}"));
        assert!(paths.contains_key("/api/v1/flows/my-flow/schema"));
    }

    #[test]
    fn missing_output_nodes_synthesize_a_result_field() {
        let flow = flow_with(vec![Node {
            id: "c".into(),
            kind: NodeKind::Code(CodeData {
                source: "return {};".into(),
                declared_inputs: vec![],
                declared_outputs: vec![],
            }),
            position: j!(null),
        }]);
        let doc = generate(&flow, &config(), None);
        let schema_path = &doc["paths"]["/api/v1/flows/my-flow/schema"]["get"]["responses"]["200"]["content"]["application/json"]["schema"];
        let outputs = &schema_path["properties"]["outputs"]["properties"];
        assert!(outputs.as_object().unwrap().contains_key("result"));
    }

    #[test]
    fn constant_inputs_are_excluded() {
        let mut data = InputData {
            value: j!("x"),
            data_type: "string".into(),
            widget_type: None,
            is_constant: true,
            label: Some("fixed".into()),
            variant: InputVariant::Standard,
            min: None,
            max: None,
            step: None,
            options: vec![],
            description: None,
        };
        data.is_constant = true;
        let flow = flow_with(vec![Node {
            id: "in".into(),
            kind: NodeKind::Input(data),
            position: j!(null),
        }]);
        let inputs = extract_inputs(&flow);
        assert!(inputs.is_empty());
    }
}
