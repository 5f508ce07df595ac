//! Builds the process-wide `PromptAssembler` at startup: resolves the
//! `fm_app` component's effective tree for the configured client/env,
//! pinned to `SYSTEM_VERSION`, and loads its manifest.

use std::sync::Arc;

use nlsql_packs::{validate_manifest, PackStore, PromptAssembler};

use crate::config::PackSettings;

const COMPONENT: &str = "fm_app";
const PROFILE: &str = "default";
const MANIFEST_PATH: &str = "manifest.yaml";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PackBuildError {
    #[error(transparent)]
    Pack(#[from] nlsql_packs::Error),
    #[error("effective tree for component `{0}` has no manifest.yaml")]
    MissingManifest(String),
}

/// Assembles `fm_app`'s effective tree and wraps it in a `PromptAssembler`
/// with no MCP providers registered; the spec scopes `MCPProvider`
/// adapters as pluggable, not required for a working deployment.
pub fn build_assembler(settings: &PackSettings) -> Result<PromptAssembler, PackBuildError> {
    let store = PackStore::new(&settings.resources_dir);
    let pin = if settings.system_version == "latest" {
        None
    } else {
        Some(settings.system_version.as_str())
    };
    let tree = store.assemble_effective_tree_pinned(COMPONENT, &settings.client_id, &settings.env, PROFILE, pin)?;

    let manifest_bytes = tree
        .get(MANIFEST_PATH)
        .ok_or_else(|| PackBuildError::MissingManifest(COMPONENT.to_string()))?;
    let manifest = validate_manifest(manifest_bytes)?;

    Ok(PromptAssembler::new(COMPONENT.to_string(), tree, manifest, Vec::new()))
}

pub fn build_assembler_arc(settings: &PackSettings) -> Result<Arc<PromptAssembler>, PackBuildError> {
    build_assembler(settings).map(Arc::new)
}
