use proptest::collection::{hash_map, vec};
use proptest::prelude::*;
use serde_json::Value;
use std::collections::HashMap;

use nlsql_merge::merge_patch;

/// A small JSON-like value tree, recursive but depth-bounded, used to
/// exercise the merge engine without ever emitting meta keys so the
/// RFC-7386-equivalence property stays in scope.
fn arb_json(depth: u32) -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| Value::from(n)),
        "[a-z]{0,8}".prop_map(Value::String),
    ];
    if depth == 0 {
        leaf.boxed()
    } else {
        let inner = arb_json(depth - 1);
        prop_oneof![
            leaf,
            vec(inner.clone(), 0..4).prop_map(Value::Array),
            hash_map("[a-z]{1,6}", inner, 0..4).prop_map(|m: HashMap<String, Value>| {
                Value::Object(m.into_iter().collect())
            }),
        ]
        .boxed()
    }
}

proptest! {
    /// With no meta keys present anywhere in the patch, the engine must
    /// behave exactly like RFC 7386 merge-patch: null deletes, non-null
    /// recurses into matching mappings, anything else replaces.
    #[test]
    fn matches_rfc7386_without_meta_keys(base in arb_json(2), patch in arb_json(2)) {
        let merged = merge_patch(&base, &patch).unwrap();
        let expected = rfc7386_reference(&base, &patch);
        prop_assert_eq!(merged, expected);
    }
}

/// RFC 7386 for mapping/null/scalar handling, generalized with the
/// engine's own default (`append`) list-merge extension — the property
/// under test is that, absent meta keys, nothing *other* than that
/// documented extension changes the result.
fn rfc7386_reference(base: &Value, patch: &Value) -> Value {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            let mut result = base_map.clone();
            for (k, v) in patch_map {
                if v.is_null() {
                    result.remove(k);
                } else {
                    let base_child = result.get(k).cloned().unwrap_or(Value::Null);
                    result.insert(k.clone(), rfc7386_reference(&base_child, v));
                }
            }
            Value::Object(result)
        }
        (Value::Array(base_list), Value::Array(patch_list)) => {
            let mut out = base_list.clone();
            out.extend(patch_list.iter().cloned());
            Value::Array(out)
        }
        _ => patch.clone(),
    }
}
