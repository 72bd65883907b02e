//! Validate tool call arguments against JSON Schema before execution.

use serde_json::Value;

/// Validate tool arguments against a JSON Schema.
///
/// Supports the subset tools actually use: `type`, `required`, `properties`,
/// `enum`, array `items` and nested objects. Returns `Err(message)` describing
/// the first violation found, with a path such as `filters.tags[1]`.
pub fn validate_arguments(args: &Value, schema: &Value) -> Result<(), String> {
    validate_at(args, schema, "")
}

fn validate_at(value: &Value, schema: &Value, path: &str) -> Result<(), String> {
    if let Some(expected) = schema.get("type") {
        let matches = match expected {
            Value::String(ty) => value_matches_type(value, ty),
            Value::Array(types) => types
                .iter()
                .filter_map(Value::as_str)
                .any(|ty| value_matches_type(value, ty)),
            _ => true,
        };
        if !matches {
            return Err(format!(
                "{} expected type {}, got {}",
                describe(path),
                expected,
                json_type_name(value)
            ));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(format!(
                "{} must be one of {}",
                describe(path),
                Value::Array(allowed.clone())
            ));
        }
    }

    if let Some(obj) = value.as_object() {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for field in required.iter().filter_map(Value::as_str) {
                if !obj.contains_key(field) {
                    return Err(format!("missing required field '{}'", join(path, field)));
                }
            }
        }
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (key, nested) in obj {
                if let Some(prop_schema) = properties.get(key) {
                    validate_at(nested, prop_schema, &join(path, key))?;
                }
            }
        }
    }

    if let (Some(items), Some(item_schema)) = (value.as_array(), schema.get("items")) {
        for (index, item) in items.iter().enumerate() {
            validate_at(item, item_schema, &format!("{path}[{index}]"))?;
        }
    }

    Ok(())
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn describe(path: &str) -> String {
    if path.is_empty() {
        "arguments".to_string()
    } else {
        format!("field '{path}'")
    }
}

fn value_matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
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
