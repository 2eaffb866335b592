//! Story source backed by a JSON export of the tracker.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::collaborators::{SourceResult, StorySource};
use crate::domain::{Story, StoryKey};

/// Reads a JSON array of [`Story`] values from disk on every call, so edits
/// to the export are picked up without a restart.
#[derive(Debug, Clone)]
pub struct JsonFileStorySource {
    path: PathBuf,
}

impl JsonFileStorySource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> SourceResult<Vec<Story>> {
        let raw = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[async_trait]
impl StorySource for JsonFileStorySource {
    async fn list_stories(&self, project_key: &str) -> SourceResult<Vec<Story>> {
        let stories = self.load().await?;
        Ok(stories
            .into_iter()
            .filter(|s| s.project_key() == project_key)
            .collect())
    }

    async fn get_story(&self, key: &StoryKey) -> SourceResult<Option<Story>> {
        let stories = self.load().await?;
        Ok(stories.into_iter().find(|s| &s.key == key))
    }
}
