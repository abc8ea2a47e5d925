//! Built-in argument alias map: lets a planner refer to a common
//! parameter name (e.g. `image_path`) without knowing the exact schema
//! key a given built-in tool expects (e.g. `file_path`).

use serde_json::{Map, Value};

const ALIASES: &[(&str, &str)] = &[
    ("image_path", "file_path"),
    ("filename", "file_path"),
    ("filepath", "file_path"),
    ("cmd", "command"),
    ("dir", "working_directory"),
    ("directory", "working_directory"),
    ("contents", "content"),
    ("dest", "destination"),
    ("dest_path", "destination"),
    ("src", "source"),
    ("src_path", "source"),
];

/// Rewrite known alias keys to their canonical name. Only applies to the
/// top-level object; an alias is only renamed when the canonical key is
/// not already present, so an explicit canonical value always wins over
/// an alias.
pub fn normalize_arguments(args: &Value) -> Value {
    let Some(obj) = args.as_object() else {
        return args.clone();
    };

    let mut out = Map::with_capacity(obj.len());
    for (key, value) in obj {
        let canonical = ALIASES
            .iter()
            .find(|(alias, _)| alias == key)
            .map(|(_, canonical)| *canonical);

        match canonical {
            Some(canonical) if !obj.contains_key(canonical) => {
                out.insert(canonical.to_string(), value.clone());
            }
            Some(_) => {
                // canonical key already present elsewhere in the call; drop the alias
            }
            None => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renames_known_alias() {
        let out = normalize_arguments(&json!({"image_path": "a.png"}));
        assert_eq!(out, json!({"file_path": "a.png"}));
    }

    #[test]
    fn canonical_key_wins_over_alias() {
        let out = normalize_arguments(&json!({"image_path": "a.png", "file_path": "b.png"}));
        assert_eq!(out, json!({"file_path": "b.png"}));
    }

    #[test]
    fn unknown_keys_pass_through() {
        let out = normalize_arguments(&json!({"command": "ls -la"}));
        assert_eq!(out, json!({"command": "ls -la"}));
    }

    #[test]
    fn non_object_passes_through_unchanged() {
        let out = normalize_arguments(&json!("not an object"));
        assert_eq!(out, json!("not an object"));
    }
}
