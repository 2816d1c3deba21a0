//! Tool declaration, calling conventions, and result normalization.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

use crate::schema::ToolSchema;

/// Describes a tool's interface on the wire: name, description, and the
/// JSON Schema derived once from its declared parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl fmt::Display for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.description)
    }
}

/// The two supported calling conventions for a tool body.
///
/// `Named` bodies receive the whole arguments object; `Positional` bodies
/// receive the argument values in schema declaration order, with `null`
/// standing in for absent optional parameters.
pub enum ToolBody {
    Named(Box<dyn Fn(&Map<String, Value>) -> anyhow::Result<Value> + Send + Sync>),
    Positional(Box<dyn Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync>),
}

impl fmt::Debug for ToolBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolBody::Named(_) => write!(f, "ToolBody::Named"),
            ToolBody::Positional(_) => write!(f, "ToolBody::Positional"),
        }
    }
}

/// One declared tool: the `(name, description, schema, body)` tuple supplied
/// at registration time.
#[derive(Debug)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub schema: ToolSchema,
    pub body: ToolBody,
}

impl ToolSpec {
    /// Declare a tool whose body takes the arguments object as named fields.
    pub fn named(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ToolSchema,
        body: impl Fn(&Map<String, Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            body: ToolBody::Named(Box::new(body)),
        }
    }

    /// Declare a tool whose body takes a positional argument list, ordered
    /// by schema declaration.
    pub fn positional(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ToolSchema,
        body: impl Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            body: ToolBody::Positional(Box::new(body)),
        }
    }

    /// The wire-level definition (name, description, derived input schema).
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.schema.to_json(),
        }
    }
}

// ── Tool result envelope ────────────────────────────────────────────

/// Content block within a tool result envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Text { text: String },
}

/// The standardized `{content: [...], isError?}` shape returned by a tool
/// invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolEnvelope {
    pub content: Vec<ContentItem>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolEnvelope {
    /// A successful envelope carrying one text item.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::Text { text: text.into() }],
            is_error: false,
        }
    }
}

/// Normalize a raw tool return value into an envelope-shaped JSON value.
///
/// Already-shaped objects (carrying `content` or `isError`) pass through
/// unchanged; bare strings become one text item; bare arrays are treated as
/// an already-built content array; anything else is stringified.
pub fn normalize_result(value: Value) -> Value {
    match value {
        Value::Object(ref map) if map.contains_key("content") || map.contains_key("isError") => {
            value
        }
        Value::String(text) => json!({
            "content": [{"type": "text", "text": text}],
        }),
        Value::Array(items) => json!({ "content": items }),
        other => json!({
            "content": [{"type": "text", "text": other.to_string()}],
        }),
    }
}

/// Build the error envelope for a failed invocation.
pub fn error_envelope(message: impl fmt::Display) -> Value {
    json!({
        "isError": true,
        "content": [{"type": "text", "text": format!("Error: {message}")}],
    })
}
