//! Declared parameter schemas for tools.
//!
//! Each tool declares its parameters explicitly at registration time; the
//! registry derives the wire-level JSON Schema once from that declaration.

use indexmap::IndexMap;
use serde_json::{json, Value};

/// The JSON-Schema primitive a parameter maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Number,
    String,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// The JSON Schema `type` keyword for this primitive.
    pub fn json_type(&self) -> &'static str {
        match self {
            ParamType::Number => "number",
            ParamType::String => "string",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }
}

/// A single declared parameter: type tag, required flag, description.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub ty: ParamType,
    pub required: bool,
    pub description: String,
}

/// An ordered set of declared parameters for one tool.
///
/// Declaration order is preserved; it defines the argument order for tools
/// using the positional calling convention.
#[derive(Debug, Clone, Default)]
pub struct ToolSchema {
    params: IndexMap<String, ParamSpec>,
}

impl ToolSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a mandatory parameter.
    pub fn required(
        mut self,
        name: impl Into<String>,
        ty: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.params.insert(
            name.into(),
            ParamSpec {
                ty,
                required: true,
                description: description.into(),
            },
        );
        self
    }

    /// Declare an optional (or defaulted) parameter.
    pub fn optional(
        mut self,
        name: impl Into<String>,
        ty: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.params.insert(
            name.into(),
            ParamSpec {
                ty,
                required: false,
                description: description.into(),
            },
        );
        self
    }

    /// Parameter names in declaration order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(|s| s.as_str())
    }

    /// Look up a declared parameter.
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.get(name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Names of mandatory parameters in declaration order.
    pub fn required_names(&self) -> Vec<&str> {
        self.params
            .iter()
            .filter(|(_, p)| p.required)
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// Derive the wire-level JSON Schema object for this declaration.
    pub fn to_json(&self) -> Value {
        let mut properties = serde_json::Map::new();
        for (name, spec) in &self.params {
            properties.insert(
                name.clone(),
                json!({
                    "type": spec.ty.json_type(),
                    "description": spec.description,
                }),
            );
        }
        let required: Vec<&str> = self.required_names();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_to_json() {
        let schema = ToolSchema::new()
            .required("a", ParamType::Number, "First addend")
            .required("b", ParamType::Number, "Second addend")
            .optional("label", ParamType::String, "Optional label");

        let json = schema.to_json();
        assert_eq!(json["type"], "object");
        assert_eq!(json["properties"]["a"]["type"], "number");
        assert_eq!(json["properties"]["label"]["type"], "string");
        assert_eq!(json["required"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn test_declaration_order_preserved() {
        let schema = ToolSchema::new()
            .required("z", ParamType::String, "first declared")
            .required("a", ParamType::String, "second declared");

        let names: Vec<&str> = schema.param_names().collect();
        assert_eq!(names, vec!["z", "a"]);
    }

    #[test]
    fn test_empty_schema() {
        let schema = ToolSchema::new();
        assert!(schema.is_empty());
        let json = schema.to_json();
        assert_eq!(json["required"], serde_json::json!([]));
    }

    #[test]
    fn test_param_type_json_names() {
        assert_eq!(ParamType::Number.json_type(), "number");
        assert_eq!(ParamType::Boolean.json_type(), "boolean");
        assert_eq!(ParamType::Array.json_type(), "array");
        assert_eq!(ParamType::Object.json_type(), "object");
    }
}
