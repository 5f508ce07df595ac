use std::collections::BTreeMap;

use crate::error::{ConfigError, Result};

/// How two lists at the same key are combined during a merge-patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListStrategy {
    /// `base + patch`. The default when nothing overrides it.
    Append,
    /// `append`, dropping patch items already value-equal to something
    /// already kept.
    Unique,
    /// Match objects by an id field: same id replaces in place, new ids
    /// append, base order preserved for survivors.
    ById,
    /// Discard base entirely; patch becomes the whole list.
    Override,
}

impl ListStrategy {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "append" => Ok(ListStrategy::Append),
            "unique" => Ok(ListStrategy::Unique),
            "by_id" => Ok(ListStrategy::ById),
            "override" => Ok(ListStrategy::Override),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }
}

impl Default for ListStrategy {
    fn default() -> Self {
        ListStrategy::Append
    }
}

/// Resolved list-merge configuration in effect at one point of the
/// recursive descent: inherited from the caller, then overridden by a
/// patch mapping's own `strategy`/`id_key`, then by a per-child entry in
/// that mapping's `strategies`/`id_keys` maps.
///
/// `named` carries every key-name override collected from `strategies`/
/// `id_keys` anywhere on the path from the root patch down to the
/// current node, not just the immediate parent's — an overlay author
/// declaring `strategies: {examples: by_id}` once at the top of a
/// document means whenever a key named `examples` turns up, at any
/// depth, not only as a direct child of that same mapping.
#[derive(Clone, Debug, Default)]
pub struct StrategyConfig {
    pub strategy: ListStrategy,
    pub id_key: Option<String>,
    pub named: BTreeMap<String, (ListStrategy, Option<String>)>,
}

impl StrategyConfig {
    pub fn new(strategy: ListStrategy, id_key: Option<String>) -> Self {
        Self {
            strategy,
            id_key,
            named: BTreeMap::new(),
        }
    }
}

/// Keys that carry merge directives rather than document content; never
/// emitted in the merged output.
pub const META_KEYS: &[&str] = &["strategy", "id_key", "strategies", "id_keys", "__list__"];

pub fn is_meta_key(key: &str) -> bool {
    META_KEYS.contains(&key)
}
