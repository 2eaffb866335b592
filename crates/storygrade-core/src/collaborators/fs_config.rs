//! Filesystem-backed rubric configuration.
//!
//! Layout: `<root>/base.json` and `<root>/projects/<PROJECT>.json`

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::collaborators::{ConfigStore, ConfigStoreError, ConfigStoreResult};
use crate::domain::{RubricConfig, RubricOverride};

/// Stores each tier as a pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct FsConfigStore {
    root: PathBuf,
}

impl FsConfigStore {
    /// Create a store rooted at `root`. Creates `root/projects/` if needed.
    pub fn new(root: impl AsRef<Path>) -> ConfigStoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("projects"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn base_path(&self) -> PathBuf {
        self.root.join("base.json")
    }

    fn override_path(&self, project_key: &str) -> ConfigStoreResult<PathBuf> {
        let acceptable = !project_key.is_empty()
            && project_key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !acceptable {
            return Err(ConfigStoreError::InvalidProjectKey(project_key.to_string()));
        }
        Ok(self.root.join("projects").join(format!("{project_key}.json")))
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> ConfigStoreResult<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_json<T: Serialize>(path: PathBuf, value: &T) -> ConfigStoreResult<()> {
    let data = serde_json::to_vec_pretty(value)?;
    tokio::task::spawn_blocking(move || -> ConfigStoreResult<()> {
        let dir = path
            .parent()
            .ok_or_else(|| ConfigStoreError::Unavailable(format!("no parent for {}", path.display())))?;
        // Atomic write: temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&data)?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| ConfigStoreError::Unavailable(e.to_string()))?
}

#[async_trait]
impl ConfigStore for FsConfigStore {
    async fn load_base(&self) -> ConfigStoreResult<Option<RubricConfig>> {
        read_json(&self.base_path()).await
    }

    async fn save_base(&self, config: &RubricConfig) -> ConfigStoreResult<()> {
        write_json(self.base_path(), config).await
    }

    async fn load_override(&self, project_key: &str) -> ConfigStoreResult<Option<RubricOverride>> {
        read_json(&self.override_path(project_key)?).await
    }

    async fn save_override(
        &self,
        project_key: &str,
        overrides: &RubricOverride,
    ) -> ConfigStoreResult<()> {
        write_json(self.override_path(project_key)?, overrides).await
    }
}
