use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tera::{Context, Tera};

use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::store::EffectiveTree;

/// A provider of template variables for a slot: an MCP server, a schema
/// introspection service, or any other out-of-process capability a prompt
/// wants to draw context from.
#[async_trait]
pub trait MCPProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn vars_for_slot(
        &self,
        slot: &str,
        req_ctx: &Value,
    ) -> std::result::Result<Value, String>;
}

/// Content-addressed provenance for one rendered slot: every input that
/// could have changed the output, hashed independently so a caller can
/// tell which one changed between two renders.
#[derive(Clone, Debug, serde::Serialize)]
pub struct Lineage {
    pub template_path_hash: String,
    pub input_files_hash: String,
    pub provider_vars_hash: String,
    pub final_variables_hash: String,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct SlotMaterial {
    pub prompt_text: String,
    pub lineage: Lineage,
}

/// Renders named slots out of an effective pack tree, fanning out to
/// registered MCP providers for slot-scoped variables and merging them
/// with caller-supplied context ahead of template evaluation.
pub struct PromptAssembler {
    pack_name: String,
    tree: EffectiveTree,
    manifest: Manifest,
    providers: Vec<Arc<dyn MCPProvider>>,
}

impl PromptAssembler {
    pub fn new(
        pack_name: impl Into<String>,
        tree: EffectiveTree,
        manifest: Manifest,
        providers: Vec<Arc<dyn MCPProvider>>,
    ) -> Self {
        Self {
            pack_name: pack_name.into(),
            tree,
            manifest,
            providers,
        }
    }

    /// Blocking entry point for callers outside an async context.
    pub fn render(
        &self,
        slot: &str,
        variables: Value,
        req_ctx: Value,
        mcp_caps: Value,
    ) -> Result<SlotMaterial> {
        futures::executor::block_on(self.render_async(slot, variables, req_ctx, mcp_caps))
    }

    pub async fn render_async(
        &self,
        slot: &str,
        variables: Value,
        req_ctx: Value,
        mcp_caps: Value,
    ) -> Result<SlotMaterial> {
        let (template_path, template_bytes) = self.find_slot_template(slot)?;
        let sibling_files = self.sibling_resource_files(slot);

        let provider_vars = self.gather_provider_vars(slot, &req_ctx).await?;

        let pack_defaults = self.slot_defaults(slot)?;
        let mut merged = pack_defaults;
        for patch in [&mcp_caps, &provider_vars, &variables] {
            merged = nlsql_merge::merge_patch(&merged, patch)
                .map_err(|source| Error::Overlay {
                    path: format!("slots/{slot}"),
                    source,
                })?;
        }

        let template_str = String::from_utf8_lossy(&template_bytes).into_owned();
        let mut tera = Tera::default();
        tera.add_raw_template(slot, &template_str)
            .map_err(|source| Error::Render {
                slot: slot.to_string(),
                source,
            })?;
        let context = Context::from_serialize(&merged).map_err(|source| Error::Render {
            slot: slot.to_string(),
            source,
        })?;
        let prompt_text = tera.render(slot, &context).map_err(|source| Error::Render {
            slot: slot.to_string(),
            source,
        })?;

        let lineage = Lineage {
            template_path_hash: hash_bytes(template_path.as_bytes()),
            input_files_hash: hash_files(&sibling_files),
            provider_vars_hash: hash_json(&provider_vars),
            final_variables_hash: hash_json(&merged),
        };

        Ok(SlotMaterial {
            prompt_text,
            lineage,
        })
    }

    fn find_slot_template(&self, slot: &str) -> Result<(String, Vec<u8>)> {
        if let Some(entry) = self.manifest.slots.get(slot) {
            if let Some(template) = &entry.template {
                if let Some(bytes) = self.tree.get(template) {
                    return Ok((template.clone(), bytes.clone()));
                }
                return Err(Error::SlotNotFound {
                    pack: self.pack_name.clone(),
                    slot: slot.to_string(),
                });
            }
        }

        let prefix = format!("slots/{slot}.");
        self.tree
            .iter()
            .find(|(path, _)| path.starts_with(&prefix))
            .map(|(path, bytes)| (path.clone(), bytes.clone()))
            .ok_or_else(|| Error::SlotNotFound {
                pack: self.pack_name.clone(),
                slot: slot.to_string(),
            })
    }

    fn sibling_resource_files(&self, slot: &str) -> Vec<(String, Vec<u8>)> {
        let prefix = format!("slots/{slot}");
        self.tree
            .iter()
            .filter(|(path, _)| path.starts_with(&prefix))
            .map(|(path, bytes)| (path.clone(), bytes.clone()))
            .collect()
    }

    fn slot_defaults(&self, slot: &str) -> Result<Value> {
        let path = format!("slots/{slot}.defaults.json");
        match self.tree.get(&path) {
            Some(bytes) => serde_json::from_slice(bytes).map_err(Error::Serialize),
            None => Ok(Value::Object(Default::default())),
        }
    }

    async fn gather_provider_vars(&self, slot: &str, req_ctx: &Value) -> Result<Value> {
        let futures_iter = self
            .providers
            .iter()
            .map(|provider| async move { (provider.clone(), provider.vars_for_slot(slot, req_ctx).await) });
        let results = join_all(futures_iter).await;

        let mut merged = Value::Object(Default::default());
        for (provider, outcome) in results {
            match outcome {
                Ok(vars) => {
                    merged = nlsql_merge::merge_patch(&merged, &vars).map_err(|source| {
                        Error::Overlay {
                            path: format!("providers/{}", provider.name()),
                            source,
                        }
                    })?;
                }
                Err(message) => {
                    if !self.manifest.slot_provider_is_optional(slot, provider.name()) {
                        return Err(Error::ProviderFailed {
                            provider: provider.name().to_string(),
                            slot: slot.to_string(),
                            message,
                        });
                    }
                }
            }
        }
        Ok(merged)
    }
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn hash_files(files: &[(String, Vec<u8>)]) -> String {
    let mut hasher = Sha256::new();
    let mut sorted = files.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    for (path, bytes) in sorted {
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(bytes);
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

fn hash_json(value: &Value) -> String {
    hash_bytes(&serde_json::to_vec(value).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Manifest, SlotEntry};
    use std::collections::HashMap;

    struct StaticProvider {
        name: String,
        vars: Value,
    }

    #[async_trait]
    impl MCPProvider for StaticProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn vars_for_slot(
            &self,
            _slot: &str,
            _req_ctx: &Value,
        ) -> std::result::Result<Value, String> {
            Ok(self.vars.clone())
        }
    }

    struct FailingProvider {
        name: String,
    }

    #[async_trait]
    impl MCPProvider for FailingProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn vars_for_slot(
            &self,
            _slot: &str,
            _req_ctx: &Value,
        ) -> std::result::Result<Value, String> {
            Err("boom".to_string())
        }
    }

    fn manifest_with_slot() -> Manifest {
        let mut slots = HashMap::new();
        slots.insert(
            "planner".to_string(),
            SlotEntry {
                template: Some("slots/planner.tera".to_string()),
                optional_providers: vec![],
            },
        );
        Manifest {
            version: "1".to_string(),
            pack_name: Some("demo".to_string()),
            target_component: None,
            dependencies: vec![],
            slots,
            license: None,
            provenance: None,
        }
    }

    #[tokio::test]
    async fn renders_template_with_merged_variables() {
        let mut tree = EffectiveTree::new();
        tree.insert(
            "slots/planner.tera".to_string(),
            b"Hello {{ name }}".to_vec(),
        );
        let assembler = PromptAssembler::new(
            "demo",
            tree,
            manifest_with_slot(),
            vec![Arc::new(StaticProvider {
                name: "schema".to_string(),
                vars: serde_json::json!({"name": "provider"}),
            })],
        );

        let material = assembler
            .render_async(
                "planner",
                serde_json::json!({"name": "explicit"}),
                Value::Null,
                Value::Null,
            )
            .await
            .unwrap();

        assert_eq!(material.prompt_text, "Hello explicit");
    }

    #[tokio::test]
    async fn missing_slot_is_slot_not_found() {
        let assembler = PromptAssembler::new("demo", EffectiveTree::new(), manifest_with_slot(), vec![]);
        let err = assembler
            .render_async("missing", Value::Null, Value::Null, Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SlotNotFound { .. }));
    }

    #[tokio::test]
    async fn required_provider_failure_surfaces_as_error() {
        let mut tree = EffectiveTree::new();
        tree.insert("slots/planner.tera".to_string(), b"x".to_vec());
        let assembler = PromptAssembler::new(
            "demo",
            tree,
            manifest_with_slot(),
            vec![Arc::new(FailingProvider {
                name: "schema".to_string(),
            })],
        );
        let err = assembler
            .render_async("planner", Value::Null, Value::Null, Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProviderFailed { .. }));
    }

    #[tokio::test]
    async fn optional_provider_failure_is_tolerated() {
        let mut slots = HashMap::new();
        slots.insert(
            "planner".to_string(),
            SlotEntry {
                template: Some("slots/planner.tera".to_string()),
                optional_providers: vec!["schema".to_string()],
            },
        );
        let manifest = Manifest {
            version: "1".to_string(),
            pack_name: None,
            target_component: None,
            dependencies: vec![],
            slots,
            license: None,
            provenance: None,
        };
        let mut tree = EffectiveTree::new();
        tree.insert("slots/planner.tera".to_string(), b"ok".to_vec());
        let assembler = PromptAssembler::new(
            "demo",
            tree,
            manifest,
            vec![Arc::new(FailingProvider {
                name: "schema".to_string(),
            })],
        );
        let material = assembler
            .render_async("planner", Value::Null, Value::Null, Value::Null)
            .await
            .unwrap();
        assert_eq!(material.prompt_text, "ok");
    }
}
