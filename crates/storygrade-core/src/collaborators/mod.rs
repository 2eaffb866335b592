//! External collaborator contracts.
//!
//! These traits define the seams between the core and the outside world:
//! - `RatingService`: turns a story plus enabled dimensions into sub-scores
//! - `StorySource`: enumerates the stories of a project
//! - `ConfigStore`: persists the base rubric and per-project overrides
//!
//! All traits are async and backend-agnostic. In-memory fakes live in
//! [`crate::fakes`]; concrete backends live in the submodules.

pub mod file_source;
pub mod fs_config;
pub mod http;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{resolve, RubricConfig, RubricDimension, RubricOverride, Story, StoryKey};

pub use file_source::JsonFileStorySource;
pub use fs_config::FsConfigStore;
pub use http::{parse_rating_response, HttpRatingService, RatingClientConfig};

// ---------------------------------------------------------------------------
// RatingService
// ---------------------------------------------------------------------------

/// Raw answer from the rating service, before scoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRating {
    /// One sub-score per enabled dimension id. Range is checked by scoring.
    pub dimension_scores: BTreeMap<String, i64>,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// Failures of the rating service. Each one ends the job as `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RatingError {
    #[error("rating service unavailable: {0}")]
    Unavailable(String),

    #[error("rating request timed out after {0:?}")]
    Timeout(Duration),

    #[error("rating service rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("malformed rating response: {0}")]
    MalformedResponse(String),
}

/// Scores a story against a set of dimensions.
///
/// `domain_context` is the project's free-text domain description, if it
/// has one. Implementations own their timeout and report it as
/// [`RatingError::Timeout`].
#[async_trait]
pub trait RatingService: Send + Sync {
    async fn rate(
        &self,
        story: &Story,
        dimensions: &[RubricDimension],
        domain_context: Option<&str>,
    ) -> Result<RawRating, RatingError>;
}

// ---------------------------------------------------------------------------
// StorySource
// ---------------------------------------------------------------------------

/// Failures reading stories.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("story source unavailable: {0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("story data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for story source operations.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Read-only view of the issue tracker.
#[async_trait]
pub trait StorySource: Send + Sync {
    /// Every story of a project, used as the universe for a bulk run.
    async fn list_stories(&self, project_key: &str) -> SourceResult<Vec<Story>>;

    /// One story by key. `Ok(None)` when the tracker does not know it.
    async fn get_story(&self, key: &StoryKey) -> SourceResult<Option<Story>>;
}

// ---------------------------------------------------------------------------
// ConfigStore
// ---------------------------------------------------------------------------

/// Failures reading or writing rubric configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigStoreError {
    #[error("config store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid project key for config storage: {0}")]
    InvalidProjectKey(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for config store operations.
pub type ConfigStoreResult<T> = std::result::Result<T, ConfigStoreError>;

/// Key-value persistence for the two rubric tiers.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// The tenant-wide rubric, if one was saved.
    async fn load_base(&self) -> ConfigStoreResult<Option<RubricConfig>>;

    async fn save_base(&self, config: &RubricConfig) -> ConfigStoreResult<()>;

    /// A project's override, if it has one.
    async fn load_override(&self, project_key: &str) -> ConfigStoreResult<Option<RubricOverride>>;

    async fn save_override(
        &self,
        project_key: &str,
        overrides: &RubricOverride,
    ) -> ConfigStoreResult<()>;

    /// The effective rubric for a project: stored (or default) base with the
    /// project's override layered on top.
    async fn merged(&self, project_key: &str) -> ConfigStoreResult<RubricConfig> {
        let base = self
            .load_base()
            .await?
            .unwrap_or_else(RubricConfig::default_base);
        let overrides = self.load_override(project_key).await?;
        Ok(resolve(&base, overrides.as_ref()))
    }

    /// The domain description stored with a project's override.
    async fn domain_context(&self, project_key: &str) -> ConfigStoreResult<Option<String>> {
        Ok(self
            .load_override(project_key)
            .await?
            .and_then(|o| o.domain_context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_rating_rationale_optional() {
        let raw: RawRating =
            serde_json::from_str(r#"{"dimension_scores":{"clarity":80}}"#).unwrap();
        assert_eq!(raw.dimension_scores["clarity"], 80);
        assert!(raw.rationale.is_empty());
        assert!(raw.suggestions.is_empty());
    }

    #[test]
    fn test_rating_error_display() {
        let err = RatingError::Rejected {
            status: 503,
            body: "overloaded".to_string(),
        };
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("overloaded"));

        let err = RatingError::Timeout(Duration::from_secs(30));
        assert!(err.to_string().contains("timed out"));
    }
}
