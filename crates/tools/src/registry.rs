//! Tool registry and the invocation safety net.

use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::tool::{error_envelope, normalize_result, ToolBody, ToolDefinition, ToolSpec};

/// Holds declared tools in registration order.
///
/// `invoke` is the tool-local safety net: argument marshalling problems,
/// body errors, and body panics all come back as error envelopes, so one
/// failing tool can never destabilize the caller's dispatch loop. Only an
/// unknown tool name is reported upward.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Returns an error if the name is already registered.
    pub fn register(&mut self, spec: ToolSpec) -> Result<(), RegistryError> {
        if self.tools.contains_key(&spec.name) {
            return Err(RegistryError::DuplicateName(spec.name));
        }
        self.tools.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    /// All tool definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke a tool with the given arguments object and return an
    /// envelope-shaped JSON value.
    pub fn invoke(&self, name: &str, arguments: &Value) -> Result<Value, RegistryError> {
        let spec = self
            .tools
            .get(name)
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))?;
        Ok(invoke_spec(spec, arguments))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("tool with name '{0}' is already registered")]
    DuplicateName(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

/// Run one tool body against the arguments, catching errors and panics.
fn invoke_spec(spec: &ToolSpec, arguments: &Value) -> Value {
    let args = match arguments {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            return error_envelope(format!(
                "arguments must be an object, got {}",
                json_type_name(other)
            ))
        }
    };

    if let Err(missing) = check_required(spec, &args) {
        return error_envelope(format!("missing required parameter '{missing}'"));
    }

    let outcome = catch_unwind(AssertUnwindSafe(|| match &spec.body {
        ToolBody::Named(body) => body(&args),
        ToolBody::Positional(body) => {
            let ordered: Vec<Value> = spec
                .schema
                .param_names()
                .map(|name| args.get(name).cloned().unwrap_or(Value::Null))
                .collect();
            body(&ordered)
        }
    }));

    match outcome {
        Ok(Ok(value)) => normalize_result(value),
        Ok(Err(e)) => {
            tracing::debug!(tool = %spec.name, error = %e, "tool body returned an error");
            error_envelope(e)
        }
        Err(panic) => {
            let message = panic_message(&panic);
            tracing::warn!(tool = %spec.name, message = %message, "tool body panicked");
            error_envelope(message)
        }
    }
}

fn check_required<'a>(spec: &'a ToolSpec, args: &Map<String, Value>) -> Result<(), &'a str> {
    for name in spec.schema.required_names() {
        if !args.contains_key(name) {
            return Err(name);
        }
    }
    Ok(())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ParamType, ToolSchema};
    use serde_json::json;

    fn echo_tool() -> ToolSpec {
        ToolSpec::named(
            "echo",
            "Echoes back the input message.",
            ToolSchema::new().required("message", ParamType::String, "The message to echo"),
            |args| Ok(args.get("message").cloned().unwrap_or(Value::Null)),
        )
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool()).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool()).unwrap();
        assert!(matches!(
            registry.register(echo_tool()),
            Err(RegistryError::DuplicateName(_))
        ));
    }

    #[test]
    fn test_definitions_in_registration_order() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolSpec::named("zeta", "z", ToolSchema::new(), |_| {
                Ok(Value::Null)
            }))
            .unwrap();
        registry.register(echo_tool()).unwrap();

        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["zeta", "echo"]);
    }

    #[test]
    fn test_invoke_named_convention() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool()).unwrap();

        let out = registry
            .invoke("echo", &json!({"message": "hello"}))
            .unwrap();
        assert_eq!(out["content"][0]["text"], json!("hello"));
    }

    #[test]
    fn test_invoke_positional_convention() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolSpec::positional(
                "concat",
                "Joins two strings.",
                ToolSchema::new()
                    .required("left", ParamType::String, "Left part")
                    .required("right", ParamType::String, "Right part"),
                |args| {
                    let left = args[0].as_str().unwrap_or_default();
                    let right = args[1].as_str().unwrap_or_default();
                    Ok(Value::String(format!("{left}{right}")))
                },
            ))
            .unwrap();

        let out = registry
            .invoke("concat", &json!({"right": "world", "left": "hello "}))
            .unwrap();
        assert_eq!(out["content"][0]["text"], json!("hello world"));
    }

    #[test]
    fn test_invoke_positional_fills_absent_optionals_with_null() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolSpec::positional(
                "shout",
                "Uppercases text.",
                ToolSchema::new()
                    .required("text", ParamType::String, "Text")
                    .optional("suffix", ParamType::String, "Optional suffix"),
                |args| {
                    let text = args[0].as_str().unwrap_or_default().to_uppercase();
                    let suffix = args[1].as_str().unwrap_or("");
                    Ok(Value::String(format!("{text}{suffix}")))
                },
            ))
            .unwrap();

        let out = registry.invoke("shout", &json!({"text": "hey"})).unwrap();
        assert_eq!(out["content"][0]["text"], json!("HEY"));
    }

    #[test]
    fn test_unknown_tool_reported_upward() {
        let registry = ToolRegistry::new();
        assert!(matches!(
            registry.invoke("nope", &json!({})),
            Err(RegistryError::UnknownTool(_))
        ));
    }

    #[test]
    fn test_missing_required_parameter_is_error_envelope() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool()).unwrap();

        let out = registry.invoke("echo", &json!({})).unwrap();
        assert_eq!(out["isError"], json!(true));
        let text = out["content"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("Error: missing required parameter"));
    }

    #[test]
    fn test_body_error_becomes_error_envelope() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolSpec::named(
                "fail",
                "Always fails.",
                ToolSchema::new(),
                |_| anyhow::bail!("intentional failure"),
            ))
            .unwrap();

        let out = registry.invoke("fail", &json!({})).unwrap();
        assert_eq!(out["isError"], json!(true));
        assert_eq!(out["content"][0]["text"], json!("Error: intentional failure"));
    }

    #[test]
    fn test_body_panic_becomes_error_envelope() {
        let mut registry = ToolRegistry::new();
        registry
            .register(ToolSpec::named(
                "explode",
                "Always panics.",
                ToolSchema::new(),
                |_| panic!("kaboom"),
            ))
            .unwrap();

        let out = registry.invoke("explode", &json!({})).unwrap();
        assert_eq!(out["isError"], json!(true));
        assert_eq!(out["content"][0]["text"], json!("Error: kaboom"));
    }

    #[test]
    fn test_non_object_arguments_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool()).unwrap();

        let out = registry.invoke("echo", &json!([1, 2])).unwrap();
        assert_eq!(out["isError"], json!(true));
    }

    #[test]
    fn test_registry_usable_after_failure() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool()).unwrap();
        registry
            .register(ToolSpec::named("boom", "Panics.", ToolSchema::new(), |_| {
                panic!("down")
            }))
            .unwrap();

        let _ = registry.invoke("boom", &json!({})).unwrap();
        let out = registry.invoke("echo", &json!({"message": "still here"})).unwrap();
        assert_eq!(out["content"][0]["text"], json!("still here"));
    }
}
