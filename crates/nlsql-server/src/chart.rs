//! Opaque chart rendering collaborator, per the spec's scoping: "chart
//! rendering" beyond a thin `ChartService` contract is out of scope. This
//! is the one illustrative implementation (mirroring `nlsql_llm::http`'s
//! "one illustrative adapter" treatment of LLM providers): it persists
//! the chart code/spec a flow hands it to a content-addressed file under
//! a local directory and returns a URL the `/chart/{file}` route can
//! later serve back byte-for-byte. A production deployment would swap
//! this for a real renderer without touching `ChartService`'s callers.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use nlsql_flows::ChartService;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChartStoreError {
    #[error("chart file not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct LocalChartStore {
    dir: PathBuf,
}

impl LocalChartStore {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Persists `code` under a name derived from its content hash and
    /// returns the relative file name (not a full URL; callers prefix
    /// `/chart/`).
    pub async fn store(&self, code: &str) -> Result<String, ChartStoreError> {
        let mut hasher = Sha256::new();
        hasher.update(code.as_bytes());
        let file_name = format!("{}.chart", hex::encode(hasher.finalize()));
        let path = self.dir.join(&file_name);
        if !path.exists() {
            tokio::fs::write(&path, code.as_bytes()).await?;
        }
        Ok(file_name)
    }

    /// Reads back a previously stored chart by file name. Rejects any
    /// name that would escape `dir` (no path separators).
    pub async fn fetch(&self, file_name: &str) -> Result<Vec<u8>, ChartStoreError> {
        if file_name.contains('/') || file_name.contains("..") {
            return Err(ChartStoreError::NotFound(file_name.to_string()));
        }
        let path = self.dir.join(file_name);
        tokio::fs::read(&path)
            .await
            .map_err(|_| ChartStoreError::NotFound(file_name.to_string()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ChartService for LocalChartStore {
    async fn render(&self, code: &str) -> Result<String, String> {
        let file_name = self.store(code).await.map_err(|e| e.to_string())?;
        Ok(format!("/chart/{file_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_fetches_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalChartStore::new(dir.path()).unwrap();
        let file_name = store.store("plot.bar(x, y)").await.unwrap();
        let bytes = store.fetch(&file_name).await.unwrap();
        assert_eq!(bytes, b"plot.bar(x, y)");
    }

    #[tokio::test]
    async fn identical_code_reuses_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalChartStore::new(dir.path()).unwrap();
        let a = store.store("same").await.unwrap();
        let b = store.store("same").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalChartStore::new(dir.path()).unwrap();
        let err = store.fetch("../secret").await.unwrap_err();
        assert!(matches!(err, ChartStoreError::NotFound(_)));
    }
}
