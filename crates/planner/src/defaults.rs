//! Schema-default filling: missing optional arguments are filled from the
//! tool's declared input schema; a missing required argument is a hard
//! planning error rather than a silently empty call.

use serde_json::Value;

/// Fill in schema defaults for any object properties absent from
/// `arguments`. Returns the names of required properties still missing
/// after defaulting (an empty vec means the call is dispatch-ready).
pub fn apply_schema_defaults(arguments: &mut Value, schema: &Value) -> Vec<String> {
    let Some(props) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };
    let required: Vec<String> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    if !arguments.is_object() {
        *arguments = Value::Object(Default::default());
    }
    let obj = arguments.as_object_mut().expect("just coerced to object");

    for (name, prop_schema) in props {
        if obj.contains_key(name) {
            continue;
        }
        if let Some(default) = prop_schema.get("default") {
            obj.insert(name.clone(), default.clone());
        }
    }

    required
        .into_iter()
        .filter(|name| !obj.contains_key(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fills_optional_default() {
        let schema = json!({
            "properties": { "timeout": { "type": "number", "default": 30 } },
            "required": []
        });
        let mut args = json!({});
        let missing = apply_schema_defaults(&mut args, &schema);
        assert!(missing.is_empty());
        assert_eq!(args["timeout"], 30);
    }

    #[test]
    fn reports_missing_required() {
        let schema = json!({
            "properties": { "file_path": { "type": "string" } },
            "required": ["file_path"]
        });
        let mut args = json!({});
        let missing = apply_schema_defaults(&mut args, &schema);
        assert_eq!(missing, vec!["file_path".to_string()]);
    }

    #[test]
    fn leaves_explicit_values_untouched() {
        let schema = json!({
            "properties": { "timeout": { "default": 30 } },
            "required": []
        });
        let mut args = json!({"timeout": 5});
        apply_schema_defaults(&mut args, &schema);
        assert_eq!(args["timeout"], 5);
    }
}
