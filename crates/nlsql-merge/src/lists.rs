use std::collections::HashMap;

use serde_json::Value;

use crate::error::{ConfigError, Result};
use crate::strategy::ListStrategy;

fn value_key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn object_id(item: &Value, id_key: &str) -> Option<String> {
    item.as_object()
        .and_then(|obj| obj.get(id_key))
        .map(value_key_string)
}

/// Merge two lists under the given strategy. `id_key` is only consulted
/// (and required) for [`ListStrategy::ById`].
pub fn merge_lists(
    base: &[Value],
    patch: &[Value],
    strategy: ListStrategy,
    id_key: Option<&str>,
) -> Result<Vec<Value>> {
    match strategy {
        ListStrategy::Append => {
            let mut out = base.to_vec();
            out.extend(patch.iter().cloned());
            Ok(out)
        }
        ListStrategy::Unique => {
            let mut out = base.to_vec();
            for item in patch {
                if !out.contains(item) {
                    out.push(item.clone());
                }
            }
            Ok(out)
        }
        ListStrategy::Override => Ok(patch.to_vec()),
        ListStrategy::ById => merge_by_id(base, patch, id_key.ok_or(ConfigError::MissingIdKey)?),
    }
}

fn merge_by_id(base: &[Value], patch: &[Value], id_key: &str) -> Result<Vec<Value>> {
    let mut patch_by_id: HashMap<String, &Value> = HashMap::new();
    let mut unmatched_patch: Vec<&Value> = Vec::new();

    for item in patch {
        match object_id(item, id_key) {
            Some(id) => {
                patch_by_id.insert(id, item);
            }
            None => unmatched_patch.push(item),
        }
    }

    let mut seen_base_ids = std::collections::HashSet::new();
    let mut result = Vec::with_capacity(base.len() + patch.len());

    for item in base {
        match object_id(item, id_key) {
            Some(id) => {
                seen_base_ids.insert(id.clone());
                match patch_by_id.get(&id) {
                    Some(replacement) => result.push((*replacement).clone()),
                    None => result.push(item.clone()),
                }
            }
            None => result.push(item.clone()),
        }
    }

    for item in patch {
        if let Some(id) = object_id(item, id_key) {
            if !seen_base_ids.contains(&id) {
                result.push(item.clone());
                seen_base_ids.insert(id);
            }
        }
    }

    for item in unmatched_patch {
        result.push(item.clone());
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn append_concatenates_in_order() {
        let base = vec![json!(1), json!(2)];
        let patch = vec![json!(3)];
        let merged = merge_lists(&base, &patch, ListStrategy::Append, None).unwrap();
        assert_eq!(merged, vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn unique_drops_already_kept_values() {
        let base = vec![json!("a"), json!("b")];
        let patch = vec![json!("b"), json!("c")];
        let merged = merge_lists(&base, &patch, ListStrategy::Unique, None).unwrap();
        assert_eq!(merged, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[test]
    fn by_id_replaces_matching_and_appends_new() {
        let base = vec![
            json!({"id": "x", "v": 1}),
            json!({"id": "y", "v": 2}),
        ];
        let patch = vec![json!({"id": "y", "v": 20}), json!({"id": "z", "v": 3})];
        let merged = merge_lists(&base, &patch, ListStrategy::ById, Some("id")).unwrap();
        assert_eq!(
            merged,
            vec![
                json!({"id": "x", "v": 1}),
                json!({"id": "y", "v": 20}),
                json!({"id": "z", "v": 3}),
            ]
        );
    }

    #[test]
    fn by_id_without_id_key_is_config_error() {
        let base: Vec<Value> = vec![];
        let patch = vec![json!({"id": "a"})];
        let err = merge_lists(&base, &patch, ListStrategy::ById, None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingIdKey));
    }

    #[test]
    fn override_discards_base() {
        let base = vec![json!(1), json!(2)];
        let patch = vec![json!(9)];
        let merged = merge_lists(&base, &patch, ListStrategy::Override, None).unwrap();
        assert_eq!(merged, vec![json!(9)]);
    }
}
