//! Typed tool schemas and policy-driven pruning.
//!
//! A [`ToolSchema`] keeps the `operation` enumeration and any per-operation
//! branches as explicit fields, so trimming a tool down to the operations the
//! policy allows is a filter over vectors rather than a walk over raw JSON.
//! [`ToolSchema::input_schema_json`] renders the JSON Schema object that is
//! advertised to MCP clients.

use std::collections::HashSet;

use serde_json::{Map, Value, json};

use super::config::ToolAccessConfig;
use super::engine::{KnownTool, decision};

/// The `operation` discriminant property of a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationProperty {
    /// Property description shown to the model.
    pub description: Option<String>,
    /// Allowed values, in advertised order.
    pub values: Vec<String>,
}

impl OperationProperty {
    fn to_json(&self) -> Value {
        let mut prop = Map::new();
        prop.insert("type".into(), json!("string"));
        if let Some(ref desc) = self.description {
            prop.insert("description".into(), json!(desc));
        }
        prop.insert("enum".into(), json!(self.values));
        Value::Object(prop)
    }
}

/// One alternative of a union-of-objects schema, keyed by operation.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaBranch {
    /// The `operation` constant this branch applies to; `None` keeps it
    /// regardless of policy.
    pub operation: Option<String>,
    /// Other properties constrained by the branch.
    pub properties: Map<String, Value>,
    /// Required property names within the branch.
    pub required: Vec<String>,
}

impl SchemaBranch {
    fn to_json(&self) -> Value {
        let mut properties = self.properties.clone();
        if let Some(ref op) = self.operation {
            properties.insert("operation".into(), json!({ "const": op }));
        }
        let mut branch = Map::new();
        branch.insert("properties".into(), Value::Object(properties));
        if !self.required.is_empty() {
            branch.insert("required".into(), json!(self.required));
        }
        Value::Object(branch)
    }
}

/// An object schema with an optional operation discriminant.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectSchema {
    /// The `operation` property, if the tool multiplexes operations.
    pub operation: Option<OperationProperty>,
    /// All other properties.
    pub properties: Map<String, Value>,
    /// Required property names.
    pub required: Vec<String>,
    /// Value of `additionalProperties`.
    pub additional_properties: bool,
    /// `oneOf` alternatives; empty means the keyword is omitted.
    pub branches: Vec<SchemaBranch>,
}

impl ObjectSchema {
    /// Render as a JSON Schema object.
    pub fn to_json(&self) -> Map<String, Value> {
        let mut properties = Map::new();
        if let Some(ref op) = self.operation {
            properties.insert("operation".into(), op.to_json());
        }
        for (key, value) in &self.properties {
            properties.insert(key.clone(), value.clone());
        }

        let mut schema = Map::new();
        schema.insert("type".into(), json!("object"));
        schema.insert(
            "additionalProperties".into(),
            json!(self.additional_properties),
        );
        schema.insert("properties".into(), Value::Object(properties));
        if !self.required.is_empty() {
            schema.insert("required".into(), json!(self.required));
        }
        if !self.branches.is_empty() {
            let branches: Vec<Value> = self.branches.iter().map(SchemaBranch::to_json).collect();
            schema.insert("oneOf".into(), Value::Array(branches));
        }
        schema
    }

    /// Advertised operation values, if any.
    pub fn operation_values(&self) -> Option<&[String]> {
        self.operation.as_ref().map(|op| op.values.as_slice())
    }

    fn retain_operations(&mut self, allowed: &HashSet<&str>) {
        if let Some(ref mut op) = self.operation {
            op.values.retain(|v| allowed.contains(v.as_str()));
        }
        self.branches.retain(|branch| match branch.operation {
            Some(ref op) => allowed.contains(op.as_str()),
            None => true,
        });
    }
}

/// A tool as advertised to clients.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSchema {
    /// Tool name.
    pub name: String,
    /// Short human-readable title.
    pub title: Option<String>,
    /// Description shown to the model.
    pub description: String,
    /// Argument schema.
    pub input: ObjectSchema,
    /// Result schema, if declared.
    pub output: Option<ObjectSchema>,
}

impl ToolSchema {
    /// JSON Schema for the arguments.
    pub fn input_schema_json(&self) -> Map<String, Value> {
        self.input.to_json()
    }

    /// JSON Schema for the structured result.
    pub fn output_schema_json(&self) -> Option<Map<String, Value>> {
        self.output.as_ref().map(ObjectSchema::to_json)
    }
}

/// Trim `tools` down to what `config` allows.
///
/// For each known tool with an operation enumeration, only operations whose
/// [`decision`] is allowed are kept; the same set is applied to `oneOf`
/// branches and to the output schema's operation enumeration. A tool left
/// with no operations is dropped. Tools without an enumeration are kept or
/// dropped by the tool-level decision. Unknown tools pass through unchanged.
pub fn configure_tools(tools: &[ToolSchema], config: &ToolAccessConfig) -> Vec<ToolSchema> {
    let mut configured = Vec::with_capacity(tools.len());

    for raw in tools {
        let mut tool = raw.clone();
        let Some(known) = KnownTool::from_name(&tool.name) else {
            configured.push(tool);
            continue;
        };

        let Some(operations) = tool.input.operation_values() else {
            if decision(config, known, None).allowed {
                configured.push(tool);
            } else {
                tracing::debug!(tool = %known, "tool hidden by policy");
            }
            continue;
        };

        let allowed_ops: Vec<String> = operations
            .iter()
            .filter(|op| decision(config, known, Some(op.as_str())).allowed)
            .cloned()
            .collect();
        if allowed_ops.is_empty() {
            tracing::debug!(tool = %known, "all operations disabled by policy; tool hidden");
            continue;
        }

        let allowed: HashSet<&str> = allowed_ops.iter().map(String::as_str).collect();
        tool.input.retain_operations(&allowed);
        if let Some(ref mut output) = tool.output {
            output.retain_operations(&allowed);
        }
        configured.push(tool);
    }

    configured
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::policy::engine::ToolAccessRule;

    fn ops(values: &[&str]) -> OperationProperty {
        OperationProperty {
            description: None,
            values: values.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    fn branch(op: &str) -> SchemaBranch {
        SchemaBranch {
            operation: Some(op.to_owned()),
            properties: Map::new(),
            required: vec![],
        }
    }

    fn multiplexed_tool(name: &str, values: &[&str]) -> ToolSchema {
        ToolSchema {
            name: name.to_owned(),
            title: None,
            description: "test".to_owned(),
            input: ObjectSchema {
                operation: Some(ops(values)),
                required: vec!["operation".into()],
                branches: values.iter().map(|op| branch(op)).collect(),
                ..ObjectSchema::default()
            },
            output: Some(ObjectSchema {
                operation: Some(ops(values)),
                additional_properties: true,
                ..ObjectSchema::default()
            }),
        }
    }

    fn plain_tool(name: &str) -> ToolSchema {
        ToolSchema {
            name: name.to_owned(),
            title: None,
            description: "plain".to_owned(),
            input: ObjectSchema::default(),
            output: None,
        }
    }

    fn with_rule(tool: KnownTool, enabled: bool, read: bool, write: bool) -> ToolAccessConfig {
        let mut config = ToolAccessConfig::defaults();
        config.tools.insert(
            tool,
            ToolAccessRule {
                enabled,
                read,
                write,
            },
        );
        config
    }

    fn as_set(values: &[String]) -> HashSet<&str> {
        values.iter().map(String::as_str).collect()
    }

    const CALENDAR_OPS: [&str; 6] = ["search", "open", "list", "listCalendars", "create", "delete"];

    #[test]
    fn defaults_keep_every_operation() {
        let tools = vec![multiplexed_tool("calendar", &CALENDAR_OPS)];
        let configured = configure_tools(&tools, &ToolAccessConfig::defaults());
        assert_eq!(configured, tools);
    }

    #[test]
    fn read_only_prunes_input_branches_and_output_identically() {
        let tools = vec![multiplexed_tool("calendar", &CALENDAR_OPS)];
        let config = with_rule(KnownTool::Calendar, true, true, false);
        let configured = configure_tools(&tools, &config);
        let tool = &configured[0];

        let input = as_set(tool.input.operation_values().unwrap());
        let output = as_set(tool.output.as_ref().unwrap().operation_values().unwrap());
        let branches: HashSet<&str> = tool
            .input
            .branches
            .iter()
            .filter_map(|b| b.operation.as_deref())
            .collect();

        let expected: HashSet<&str> = ["search", "open", "list", "listCalendars"].into();
        assert_eq!(input, expected);
        assert_eq!(output, input);
        assert_eq!(branches, input);
    }

    #[test]
    fn write_only_keeps_create_and_delete() {
        let tools = vec![multiplexed_tool("calendar", &CALENDAR_OPS)];
        let config = with_rule(KnownTool::Calendar, true, false, true);
        let configured = configure_tools(&tools, &config);
        let input = as_set(configured[0].input.operation_values().unwrap());
        assert_eq!(input, ["create", "delete"].into());
    }

    #[test]
    fn tool_with_no_allowed_operations_is_dropped() {
        let tools = vec![
            multiplexed_tool("calendar", &CALENDAR_OPS),
            multiplexed_tool("notes", &["search", "list", "create"]),
        ];
        let config = with_rule(KnownTool::Calendar, true, false, false);
        let configured = configure_tools(&tools, &config);
        let names: Vec<&str> = configured.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["notes"]);
    }

    #[test]
    fn disabled_plain_tool_is_hidden() {
        let tools = vec![plain_tool("contacts"), plain_tool("notes")];
        let config = with_rule(KnownTool::Notes, false, true, true);
        let configured = configure_tools(&tools, &config);
        let names: Vec<&str> = configured.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["contacts"]);
    }

    #[test]
    fn unknown_tools_pass_through() {
        let mut config = ToolAccessConfig::defaults();
        for &tool in KnownTool::all() {
            config.tools.insert(
                tool,
                ToolAccessRule {
                    enabled: false,
                    read: false,
                    write: false,
                },
            );
        }
        let tools = vec![plain_tool("weather")];
        assert_eq!(configure_tools(&tools, &config), tools);
    }

    #[test]
    fn unconditional_branches_survive_pruning() {
        let mut tool = multiplexed_tool("calendar", &CALENDAR_OPS);
        tool.input.branches.push(SchemaBranch {
            operation: None,
            properties: Map::new(),
            required: vec!["operation".into()],
        });
        let config = with_rule(KnownTool::Calendar, true, true, false);
        let configured = configure_tools(&[tool], &config);
        assert!(configured[0].input.branches.iter().any(|b| b.operation.is_none()));
    }

    #[test]
    fn pruning_does_not_touch_the_source() {
        let tools = vec![multiplexed_tool("calendar", &CALENDAR_OPS)];
        let config = with_rule(KnownTool::Calendar, true, true, false);
        let _ = configure_tools(&tools, &config);
        assert_eq!(tools[0].input.operation_values().unwrap().len(), 6);
    }

    #[test]
    fn rendered_schema_carries_enum_and_one_of() {
        let tool = multiplexed_tool("calendar", &["list", "create"]);
        let json = Value::Object(tool.input_schema_json());
        assert_eq!(json["type"], "object");
        assert_eq!(json["properties"]["operation"]["enum"], json!(["list", "create"]));
        assert_eq!(json["oneOf"][1]["properties"]["operation"]["const"], "create");
        assert_eq!(json["required"], json!(["operation"]));
    }

    #[test]
    fn rendered_schema_omits_empty_keywords() {
        let json = plain_tool("contacts").input_schema_json();
        assert!(!json.contains_key("oneOf"));
        assert!(!json.contains_key("required"));
        assert_eq!(json["additionalProperties"], json!(false));
    }
}
