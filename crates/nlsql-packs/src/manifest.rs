use std::collections::HashMap;

use serde::Deserialize;
use serde_json::json;

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetComponent {
    FmApp,
    #[serde(rename = "db-meta")]
    DbMeta,
    #[serde(rename = "db-ref")]
    DbRef,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SlotEntry {
    #[serde(default)]
    pub template: Option<String>,
    /// Providers whose failure for this slot should not fail rendering.
    #[serde(default)]
    pub optional_providers: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Manifest {
    pub version: String,
    #[serde(default)]
    pub pack_name: Option<String>,
    #[serde(default)]
    pub target_component: Option<TargetComponent>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub slots: HashMap<String, SlotEntry>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub provenance: Option<serde_json::Value>,
}

impl Manifest {
    pub fn slot_provider_is_optional(&self, slot: &str, provider: &str) -> bool {
        self.slots
            .get(slot)
            .map(|entry| entry.optional_providers.iter().any(|p| p == provider))
            .unwrap_or(false)
    }
}

fn schema() -> serde_json::Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["version"],
        "properties": {
            "version": { "type": "string" },
            "pack_name": { "type": "string" },
            "target_component": { "enum": ["fm_app", "db-meta", "db-ref"] },
            "dependencies": { "type": "array", "items": { "type": "string" } },
            "slots": { "type": "object" },
            "license": { "type": "string" },
            "provenance": {}
        }
    })
}

/// Parses and schema-validates a `manifest.yaml` document, returning the
/// typed manifest on success.
pub fn validate_manifest(bytes: &[u8]) -> Result<Manifest> {
    let value: serde_json::Value = serde_yml::from_slice(bytes).map_err(|source| Error::Parse {
        path: "manifest.yaml".to_string(),
        source,
    })?;

    let compiled = jsonschema::validator_for(&schema())
        .map_err(|e| Error::PackValidation(e.to_string()))?;
    if let Err(err) = compiled.validate(&value) {
        return Err(Error::PackValidation(err.to_string()));
    }

    serde_json::from_value(value).map_err(Error::Serialize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_requires_version() {
        let err = validate_manifest(b"pack_name: demo").unwrap_err();
        assert!(matches!(err, Error::PackValidation(_)));
    }

    #[test]
    fn manifest_rejects_unknown_target_component() {
        let err =
            validate_manifest(b"version: \"1\"\ntarget_component: not_a_real_component")
                .unwrap_err();
        assert!(matches!(err, Error::PackValidation(_)));
    }

    #[test]
    fn valid_manifest_parses() {
        let manifest = validate_manifest(
            b"version: \"1.0\"\npack_name: demo\ntarget_component: fm_app\nslots:\n  planner:\n    template: slots/planner.tera\n",
        )
        .unwrap();
        assert_eq!(manifest.version, "1.0");
        assert_eq!(manifest.target_component, Some(TargetComponent::FmApp));
        assert!(manifest.slots.contains_key("planner"));
    }
}
