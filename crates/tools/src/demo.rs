//! Demo tool catalog used by the demo server binary and the end-to-end tests.

use serde_json::Value;

use crate::registry::{RegistryError, ToolRegistry};
use crate::schema::{ParamType, ToolSchema};
use crate::tool::ToolSpec;

/// Addition tool using the named-arguments convention.
pub fn calculate_sum() -> ToolSpec {
    ToolSpec::named(
        "calculate_sum",
        "Adds two numbers and describes the result.",
        ToolSchema::new()
            .required("a", ParamType::Number, "First addend")
            .required("b", ParamType::Number, "Second addend"),
        |args| {
            let a = number_arg(args.get("a"), "a")?;
            let b = number_arg(args.get("b"), "b")?;
            Ok(Value::String(format!(
                "The sum of {} and {} is {}",
                format_number(a),
                format_number(b),
                format_number(a + b)
            )))
        },
    )
}

/// String-reversal tool using the positional convention.
pub fn reverse_text() -> ToolSpec {
    ToolSpec::positional(
        "reverse_text",
        "Reverses the given text.",
        ToolSchema::new().required("text", ParamType::String, "The text to reverse"),
        |args| {
            let text = args[0]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("parameter 'text' must be a string"))?;
            Ok(Value::String(text.chars().rev().collect()))
        },
    )
}

/// Build a registry holding the full demo catalog.
pub fn demo_registry() -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    registry.register(calculate_sum())?;
    registry.register(reverse_text())?;
    Ok(registry)
}

fn number_arg(value: Option<&Value>, name: &str) -> anyhow::Result<f64> {
    value
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow::anyhow!("parameter '{name}' must be a number"))
}

/// Render whole numbers without a trailing ".0".
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_calculate_sum() {
        let registry = demo_registry().unwrap();
        let out = registry
            .invoke("calculate_sum", &json!({"a": 5, "b": 3}))
            .unwrap();
        assert_eq!(
            out,
            json!({"content": [{"type": "text", "text": "The sum of 5 and 3 is 8"}]})
        );
    }

    #[test]
    fn test_calculate_sum_fractional() {
        let registry = demo_registry().unwrap();
        let out = registry
            .invoke("calculate_sum", &json!({"a": 1.5, "b": 2}))
            .unwrap();
        assert_eq!(out["content"][0]["text"], json!("The sum of 1.5 and 2 is 3.5"));
    }

    #[test]
    fn test_calculate_sum_bad_argument() {
        let registry = demo_registry().unwrap();
        let out = registry
            .invoke("calculate_sum", &json!({"a": "five", "b": 3}))
            .unwrap();
        assert_eq!(out["isError"], json!(true));
    }

    #[test]
    fn test_reverse_text() {
        let registry = demo_registry().unwrap();
        let out = registry
            .invoke("reverse_text", &json!({"text": "abc"}))
            .unwrap();
        assert_eq!(out["content"][0]["text"], json!("cba"));
    }
}
