use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::version::latest_version;

pub type EffectiveTree = BTreeMap<String, Vec<u8>>;

/// Resolves versioned system packs and layers client/env/profile overlay
/// directories on top of them into one effective file tree.
#[derive(Clone, Debug)]
pub struct PackStore {
    root: PathBuf,
}

impl PackStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<root>/resources/<component>/system-pack/<highest semver dir>/`
    pub fn find_system_pack(&self, component: &str) -> Result<PathBuf> {
        self.find_system_pack_pinned(component, None)
    }

    /// Same resolution as `find_system_pack`, except when `pin` names a
    /// directory that exists under `system-pack/` (e.g. `SYSTEM_VERSION`
    /// pinning to an exact `vX.Y.Z`); an absent or `"latest"` pin falls
    /// back to highest-semver selection.
    pub fn find_system_pack_pinned(&self, component: &str, pin: Option<&str>) -> Result<PathBuf> {
        let base = self
            .root
            .join("resources")
            .join(component)
            .join("system-pack");

        if let Some(pin) = pin {
            if pin != "latest" && base.join(pin).is_dir() {
                return Ok(base.join(pin));
            }
        }

        let entries = match fs::read_dir(&base) {
            Ok(entries) => entries,
            Err(_) => return Err(Error::NoSystemPack(base)),
        };
        let names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        let chosen = latest_version(names.iter().map(String::as_str))
            .map(str::to_string)
            .ok_or_else(|| Error::NoSystemPack(base.clone()))?;
        Ok(base.join(chosen))
    }

    /// Assembles the full effective tree for a component: base system pack
    /// overlaid, in order, by the client-common, client-env, and
    /// client-env-profile overlay directories.
    pub fn assemble_effective_tree(
        &self,
        component: &str,
        client: &str,
        env: &str,
        profile: &str,
    ) -> Result<EffectiveTree> {
        self.assemble_effective_tree_pinned(component, client, env, profile, None)
    }

    /// Same as `assemble_effective_tree`, pinning the system pack to an
    /// exact version directory instead of selecting the highest semver.
    pub fn assemble_effective_tree_pinned(
        &self,
        component: &str,
        client: &str,
        env: &str,
        profile: &str,
        system_version: Option<&str>,
    ) -> Result<EffectiveTree> {
        let system_pack = self.find_system_pack_pinned(component, system_version)?;
        let mut tree = collect_files(&system_pack)?;

        let common_dir = self
            .root
            .join("client-configs")
            .join(client)
            .join("common")
            .join(component)
            .join("overlays");
        let env_dir = self
            .root
            .join("client-configs")
            .join(client)
            .join(env)
            .join(component)
            .join("overlays");
        let profile_base = if env_dir.is_dir() { env } else { "common" };
        let profile_dir = self
            .root
            .join("client-configs")
            .join(client)
            .join(profile_base)
            .join(component)
            .join("overlays")
            .join("profiles")
            .join(profile);

        for overlay_dir in [&common_dir, &env_dir, &profile_dir] {
            if overlay_dir.is_dir() {
                let overlay_files = collect_files(overlay_dir)?;
                apply_overlay(&mut tree, overlay_files)?;
            }
        }

        Ok(tree)
    }

    /// SHA-256 over sorted (rel-path, bytes) pairs.
    pub fn content_hash(tree: &EffectiveTree) -> String {
        let mut hasher = Sha256::new();
        for (path, bytes) in tree {
            hasher.update(path.as_bytes());
            hasher.update([0u8]);
            hasher.update(bytes);
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}

/// Walks `dir` recursively, returning relative POSIX paths to file bytes.
/// Any path segment starting with `.` is excluded, along with the files
/// beneath it.
pub fn collect_files(dir: &Path) -> Result<EffectiveTree> {
    let mut out = BTreeMap::new();
    collect_files_into(dir, dir, &mut out)?;
    Ok(out)
}

fn collect_files_into(root: &Path, dir: &Path, out: &mut EffectiveTree) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        if path.is_dir() {
            collect_files_into(root, &path, out)?;
        } else {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            out.insert(rel, fs::read(&path)?);
        }
    }
    Ok(())
}

pub(crate) fn is_mergeable_ext(path: &str) -> bool {
    path.ends_with(".json") || path.ends_with(".yaml") || path.ends_with(".yml")
}

fn parse_value(bytes: &[u8], path: &str) -> Result<serde_json::Value> {
    serde_yml::from_slice(bytes).map_err(|source| Error::Parse {
        path: path.to_string(),
        source,
    })
}

fn serialize_yaml(value: &serde_json::Value) -> Result<Vec<u8>> {
    let text = serde_yml::to_string(value).map_err(|source| Error::Parse {
        path: String::new(),
        source,
    })?;
    Ok(text.into_bytes())
}

fn apply_overlay(base: &mut EffectiveTree, overlay: EffectiveTree) -> Result<()> {
    for (path, bytes) in overlay {
        let merged = match base.get(&path) {
            Some(existing) if is_mergeable_ext(&path) => {
                let base_value = parse_value(existing, &path)?;
                let overlay_value = parse_value(&bytes, &path)?;
                if base_value.is_object() && overlay_value.is_object() {
                    let merged = nlsql_merge::merge_patch(&base_value, &overlay_value)
                        .map_err(|source| Error::Overlay {
                            path: path.clone(),
                            source,
                        })?;
                    serialize_yaml(&merged)?
                } else {
                    bytes
                }
            }
            _ => bytes,
        };
        base.insert(path, merged);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn collect_files_excludes_hidden_segments() {
        let dir = tempdir().unwrap();
        write(&dir.path().join("a.txt"), "a");
        write(&dir.path().join(".hidden/b.txt"), "b");
        let files = collect_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files.contains_key("a.txt"));
    }

    #[test]
    fn content_hash_is_stable_across_runs() {
        let mut tree = EffectiveTree::new();
        tree.insert("a.txt".to_string(), b"hello".to_vec());
        tree.insert("b.txt".to_string(), b"world".to_vec());
        let first = PackStore::content_hash(&tree);
        let second = PackStore::content_hash(&tree);
        assert_eq!(first, second);
    }

    #[test]
    fn overlay_merges_mapping_documents_and_replaces_others() {
        let mut base = EffectiveTree::new();
        base.insert("config.json".to_string(), br#"{"a": 1, "b": 2}"#.to_vec());
        base.insert("prompt.txt".to_string(), b"base prompt".to_vec());

        let mut overlay = EffectiveTree::new();
        overlay.insert("config.json".to_string(), br#"{"b": 20}"#.to_vec());
        overlay.insert("prompt.txt".to_string(), b"overlay prompt".to_vec());

        apply_overlay(&mut base, overlay).unwrap();

        let merged: serde_json::Value = serde_json::from_slice(&base["config.json"]).unwrap();
        assert_eq!(merged, serde_json::json!({"a": 1, "b": 20}));
        assert_eq!(base["prompt.txt"], b"overlay prompt");
    }

    #[test]
    fn find_system_pack_selects_highest_semver_directory() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("resources/fm_app/system-pack");
        for v in ["v1.0.0", "v1.2.0", "v1.10.0"] {
            fs::create_dir_all(base.join(v)).unwrap();
        }
        let store = PackStore::new(dir.path());
        let chosen = store.find_system_pack("fm_app").unwrap();
        assert_eq!(chosen.file_name().unwrap(), "v1.10.0");
    }
}
