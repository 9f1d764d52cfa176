//! Top-level validation of tool arguments against their JSON Schema.

/// Validate arguments against a tool's parameter schema.
///
/// Checks the schema's top-level type, required-field presence, and
/// declared property types. Returns the first violation found. Extra
/// fields not named by the schema are accepted.
pub fn validate_arguments(
    args: &serde_json::Value,
    schema: &serde_json::Value,
) -> Result<(), String> {
    if schema.get("type").and_then(|v| v.as_str()) == Some("object") && !args.is_object() {
        return Err(format!("expected object arguments, got {}", type_name(args)));
    }

    let Some(obj) = args.as_object() else {
        return Ok(());
    };

    if let Some(required) = schema.get("required").and_then(|v| v.as_array()) {
        for field in required.iter().filter_map(|f| f.as_str()) {
            if !obj.contains_key(field) {
                return Err(format!("missing required field '{field}'"));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|v| v.as_object()) {
        for (key, value) in obj {
            let Some(expected) = properties
                .get(key)
                .and_then(|p| p.get("type"))
                .and_then(|t| t.as_str())
            else {
                continue;
            };
            if !matches_type(value, expected) {
                return Err(format!(
                    "field '{key}' expected type '{expected}', got {}",
                    type_name(value)
                ));
            }
        }
    }

    Ok(())
}

fn matches_type(value: &serde_json::Value, expected: &str) -> bool {
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

fn type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "lines": { "type": "integer" },
            },
            "required": ["path"],
        })
    }

    #[test]
    fn accepts_valid_arguments() {
        assert!(validate_arguments(&json!({"path": "a.txt", "lines": 5}), &schema()).is_ok());
    }

    #[test]
    fn rejects_missing_required_field() {
        let err = validate_arguments(&json!({"lines": 5}), &schema()).unwrap_err();
        assert!(err.contains("missing required field 'path'"));
    }

    #[test]
    fn rejects_wrong_property_type() {
        let err = validate_arguments(&json!({"path": "a.txt", "lines": "five"}), &schema())
            .unwrap_err();
        assert!(err.contains("field 'lines'"));
        assert!(err.contains("expected type 'integer'"));
    }

    #[test]
    fn rejects_non_object_when_schema_wants_object() {
        let err = validate_arguments(&json!("just a string"), &schema()).unwrap_err();
        assert!(err.contains("expected object"));
    }

    #[test]
    fn tolerates_extra_fields_and_empty_schema() {
        assert!(validate_arguments(&json!({"path": "a", "extra": 1}), &schema()).is_ok());
        assert!(validate_arguments(&json!({"anything": true}), &json!({})).is_ok());
    }
}
