use serde_json::{Map, Value};

use crate::error::Result;
use crate::lists::merge_lists;
use crate::strategy::{is_meta_key, ListStrategy, StrategyConfig};

/// Merge `patch` onto `base` using extended JSON-merge-patch semantics:
/// RFC 7386 mapping/null/scalar rules, generalized with list-merge
/// strategies and the wrapped-list form for overlay authors who need more
/// than append.
///
/// Resolution order for a child key's list strategy: that key's entry in
/// the patch mapping's own `strategies`/`id_keys` maps, then the patch
/// mapping's own `strategy`/`id_key`, then whatever the caller inherited
/// from further up the tree.
pub fn merge_patch(base: &Value, patch: &Value) -> Result<Value> {
    merge_value(base, patch, &StrategyConfig::default())
}

/// Same as [`merge_patch`] but with caller-supplied defaults for list
/// strategy/id key, for callers that know the top-level intent (e.g. a
/// profile overlay that always wants `by_id` merges on its top-level
/// lists unless a child overrides it).
pub fn merge_patch_with_defaults(
    base: &Value,
    patch: &Value,
    defaults: StrategyConfig,
) -> Result<Value> {
    merge_value(base, patch, &defaults)
}

fn merge_value(base: &Value, patch: &Value, inherited: &StrategyConfig) -> Result<Value> {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            merge_mapping(base_map, patch_map, inherited)
        }
        (Value::Array(base_list), Value::Array(patch_list)) => {
            let merged = merge_lists(
                base_list,
                patch_list,
                inherited.strategy,
                inherited.id_key.as_deref(),
            )?;
            Ok(Value::Array(merged))
        }
        (Value::Array(base_list), Value::Object(patch_map)) if patch_map.contains_key("__list__") => {
            merge_wrapped_list(base_list, patch_map, inherited)
        }
        _ => Ok(patch.clone()),
    }
}

fn merge_wrapped_list(
    base_list: &[Value],
    patch_map: &Map<String, Value>,
    inherited: &StrategyConfig,
) -> Result<Value> {
    let patch_list = match patch_map.get("__list__") {
        Some(Value::Array(items)) => items.as_slice(),
        _ => &[],
    };
    let strategy = match patch_map.get("strategy").and_then(Value::as_str) {
        Some(name) => ListStrategy::parse(name)?,
        None => inherited.strategy,
    };
    let id_key = patch_map
        .get("id_key")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| inherited.id_key.clone());

    let merged = merge_lists(base_list, patch_list, strategy, id_key.as_deref())?;
    Ok(Value::Array(merged))
}

fn merge_mapping(
    base_map: &Map<String, Value>,
    patch_map: &Map<String, Value>,
    inherited: &StrategyConfig,
) -> Result<Value> {
    let local_strategy = match patch_map.get("strategy").and_then(Value::as_str) {
        Some(name) => ListStrategy::parse(name)?,
        None => inherited.strategy,
    };
    let local_id_key = patch_map
        .get("id_key")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| inherited.id_key.clone());

    let strategies = patch_map.get("strategies").and_then(Value::as_object);
    let id_keys = patch_map.get("id_keys").and_then(Value::as_object);

    // Fold this level's own `strategies`/`id_keys` declarations into the
    // named-override map inherited from ancestors, so a key name declared
    // anywhere on the path down to here is honored no matter how many
    // mapping levels separate the declaration from the list it targets.
    let mut named = inherited.named.clone();
    if let Some(strategies) = strategies {
        for (key, value) in strategies {
            if let Some(name) = value.as_str() {
                let strategy = ListStrategy::parse(name)?;
                let id_key = id_keys
                    .and_then(|m| m.get(key))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let entry = named.entry(key.clone()).or_insert((strategy, None));
                entry.0 = strategy;
                if id_key.is_some() {
                    entry.1 = id_key;
                }
            }
        }
    }

    let mut result = base_map.clone();

    for (key, patch_value) in patch_map {
        if is_meta_key(key) {
            continue;
        }

        if patch_value.is_null() {
            result.remove(key);
            continue;
        }

        let (child_strategy, child_id_key) = match named.get(key) {
            Some((strategy, id_key)) => (*strategy, id_key.clone().or_else(|| local_id_key.clone())),
            None => (local_strategy, local_id_key.clone()),
        };

        let mut child_config = StrategyConfig::new(child_strategy, child_id_key);
        child_config.named = named.clone();
        let base_child = result.get(key).cloned().unwrap_or(Value::Null);
        let merged_child = merge_value(&base_child, patch_value, &child_config)?;
        result.insert(key.clone(), merged_child);
    }

    Ok(Value::Object(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_patch_value_deletes_key() {
        let base = json!({"a": 1, "b": 2});
        let patch = json!({"b": null});
        let merged = merge_patch(&base, &patch).unwrap();
        assert_eq!(merged, json!({"a": 1}));
    }

    #[test]
    fn nested_objects_recurse() {
        let base = json!({"a": {"x": 1, "y": 2}});
        let patch = json!({"a": {"y": 20, "z": 3}});
        let merged = merge_patch(&base, &patch).unwrap();
        assert_eq!(merged, json!({"a": {"x": 1, "y": 20, "z": 3}}));
    }

    #[test]
    fn scalar_patch_replaces_value() {
        let base = json!({"a": 1});
        let patch = json!({"a": "text"});
        let merged = merge_patch(&base, &patch).unwrap();
        assert_eq!(merged, json!({"a": "text"}));
    }

    #[test]
    fn default_list_strategy_is_append() {
        let base = json!({"tags": ["a"]});
        let patch = json!({"tags": ["b"]});
        let merged = merge_patch(&base, &patch).unwrap();
        assert_eq!(merged, json!({"tags": ["a", "b"]}));
    }

    #[test]
    fn local_strategy_applies_to_all_unannotated_lists() {
        let base = json!({"tags": ["a", "b"]});
        let patch = json!({"strategy": "unique", "tags": ["b", "c"]});
        let merged = merge_patch(&base, &patch).unwrap();
        assert_eq!(merged, json!({"tags": ["a", "b", "c"]}));
    }

    #[test]
    fn per_child_strategies_map_overrides_local_default() {
        let base = json!({"examples": [{"id": "1", "v": 1}], "tags": ["a"]});
        let patch = json!({
            "strategy": "append",
            "strategies": {"examples": "by_id"},
            "id_keys": {"examples": "id"},
            "examples": [{"id": "1", "v": 99}],
            "tags": ["a"]
        });
        let merged = merge_patch(&base, &patch).unwrap();
        assert_eq!(
            merged,
            json!({"examples": [{"id": "1", "v": 99}], "tags": ["a", "a"]})
        );
    }

    #[test]
    fn wrapped_list_form_carries_its_own_strategy() {
        let base = json!({"columns": [{"name": "id"}, {"name": "amount"}]});
        let patch = json!({
            "columns": {
                "__list__": [{"name": "amount", "type": "decimal"}],
                "strategy": "by_id",
                "id_key": "name"
            }
        });
        let merged = merge_patch(&base, &patch).unwrap();
        assert_eq!(
            merged,
            json!({"columns": [{"name": "id"}, {"name": "amount", "type": "decimal"}]})
        );
    }

    #[test]
    fn meta_keys_never_appear_in_output() {
        let base = json!({"tags": ["a"]});
        let patch = json!({"strategy": "unique", "id_key": "id", "tags": ["a"]});
        let merged = merge_patch(&base, &patch).unwrap();
        assert_eq!(merged, json!({"tags": ["a"]}));
    }

    #[test]
    fn unknown_strategy_is_config_error() {
        let base = json!({"tags": []});
        let patch = json!({"strategy": "bogus", "tags": ["a"]});
        assert!(merge_patch(&base, &patch).is_err());
    }

    #[test]
    fn keys_only_in_base_are_preserved() {
        let base = json!({"a": 1, "b": 2});
        let patch = json!({"a": 10});
        let merged = merge_patch(&base, &patch).unwrap();
        assert_eq!(merged, json!({"a": 10, "b": 2}));
    }

    /// §8 scenario 1: a top-level `strategies`/`id_keys` declaration must
    /// reach a nested list several mapping levels below it, not just a
    /// direct sibling of the same mapping — an overlay author shouldn't
    /// have to repeat the directive at every intermediate level.
    #[test]
    fn top_level_strategies_directive_reaches_a_deeply_nested_list() {
        let base = json!({
            "profiles": {
                "wh": {
                    "examples": [
                        {"id": "a", "q": "1"},
                        {"id": "b", "q": "2"}
                    ]
                }
            }
        });
        let patch = json!({
            "strategies": {"examples": "by_id"},
            "id_keys": {"examples": "id"},
            "profiles": {
                "wh": {
                    "examples": [
                        {"id": "b", "q": "2.1"},
                        {"id": "c", "q": "3"}
                    ]
                }
            }
        });
        let merged = merge_patch(&base, &patch).unwrap();
        assert_eq!(
            merged,
            json!({
                "profiles": {
                    "wh": {
                        "examples": [
                            {"id": "a", "q": "1"},
                            {"id": "b", "q": "2.1"},
                            {"id": "c", "q": "3"}
                        ]
                    }
                }
            })
        );
    }
}
