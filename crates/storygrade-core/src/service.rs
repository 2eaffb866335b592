//! `StoryRater`: the facade a UI or API layer talks to.
//!
//! Owns the [`EvaluationStore`] and the three collaborators. Every exposed
//! operation goes through here; nothing else holds rubric or evaluation
//! state.

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::analytics::{self, ProjectSummary};
use crate::collaborators::{ConfigStore, RatingService, StorySource};
use crate::domain::{
    check_dimensions, resolve, EvaluationResult, RubricConfig, RubricOverride, StoryKey,
    ValidationReport,
};
use crate::evaluation::job::{spawn_job, JobContext};
use crate::evaluation::store::Claim;
use crate::evaluation::{
    BatchHandle, EvalResult, EvaluationError, EvaluationEvent, EvaluationHandle, EvaluationStore,
    StoryStatus,
};
use crate::obs;

/// Service-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaterConfig {
    /// Events a subscriber may fall behind before it starts missing some.
    pub event_capacity: usize,
}

impl Default for RaterConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
        }
    }
}

/// Which rubric tier a save targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum RubricTier {
    Base(RubricConfig),
    Project {
        project_key: String,
        overrides: RubricOverride,
    },
}

impl RubricTier {
    fn project_key(&self) -> Option<&str> {
        match self {
            RubricTier::Base(_) => None,
            RubricTier::Project { project_key, .. } => Some(project_key),
        }
    }
}

/// What to cancel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelTarget {
    Story(StoryKey),
    Batch(Uuid),
}

impl From<StoryKey> for CancelTarget {
    fn from(key: StoryKey) -> Self {
        CancelTarget::Story(key)
    }
}

impl From<Uuid> for CancelTarget {
    fn from(batch_id: Uuid) -> Self {
        CancelTarget::Batch(batch_id)
    }
}

/// Validate `tier` and write it to `configs`, or reject it with the full
/// report.
///
/// A project override is judged by the rubric it produces once merged with
/// the stored base, plus the per-dimension rules on its own entries.
/// Nothing is written when the report has violations.
#[instrument(skip(configs, tier), fields(tier = tier.project_key().unwrap_or("base")))]
pub async fn save_tier(configs: &dyn ConfigStore, tier: RubricTier) -> EvalResult<ValidationReport> {
    let project_key = tier.project_key();

    let (report, digest) = match &tier {
        RubricTier::Base(config) => (config.validate(), config.digest()),
        RubricTier::Project { overrides, .. } => {
            let base = configs
                .load_base()
                .await?
                .unwrap_or_else(RubricConfig::default_base);
            let merged = resolve(&base, Some(overrides));
            let mut report = ValidationReport {
                violations: check_dimensions(&overrides.dimensions),
            };
            report.absorb(merged.validate());
            (report, merged.digest())
        }
    };

    if !report.is_valid() {
        obs::emit_rubric_rejected(project_key, &report);
        return Err(EvaluationError::InvalidConfig(report));
    }

    match &tier {
        RubricTier::Base(config) => configs.save_base(config).await?,
        RubricTier::Project {
            project_key,
            overrides,
        } => configs.save_override(project_key, overrides).await?,
    }
    obs::emit_rubric_saved(project_key, &digest);
    Ok(report)
}

/// Rates stories against tiered rubrics.
#[derive(Clone)]
pub struct StoryRater {
    rating: Arc<dyn RatingService>,
    stories: Arc<dyn StorySource>,
    configs: Arc<dyn ConfigStore>,
    store: Arc<EvaluationStore>,
}

impl StoryRater {
    pub fn new(
        rating: Arc<dyn RatingService>,
        stories: Arc<dyn StorySource>,
        configs: Arc<dyn ConfigStore>,
    ) -> Self {
        Self::with_config(rating, stories, configs, RaterConfig::default())
    }

    pub fn with_config(
        rating: Arc<dyn RatingService>,
        stories: Arc<dyn StorySource>,
        configs: Arc<dyn ConfigStore>,
        config: RaterConfig,
    ) -> Self {
        Self {
            rating,
            stories,
            configs,
            store: Arc::new(EvaluationStore::new(config.event_capacity)),
        }
    }

    fn job_context(&self) -> JobContext {
        JobContext {
            rating: Arc::clone(&self.rating),
            stories: Arc::clone(&self.stories),
            configs: Arc::clone(&self.configs),
            store: Arc::clone(&self.store),
        }
    }

    pub fn store(&self) -> &EvaluationStore {
        &self.store
    }

    // ---------------------------------------------------------------------
    // Configuration
    // ---------------------------------------------------------------------

    /// The effective rubric for a project.
    pub async fn get_merged_config(&self, project_key: &str) -> EvalResult<RubricConfig> {
        Ok(self.configs.merged(project_key).await?)
    }

    /// Persist one tier, or reject it with the full report.
    pub async fn save_config(&self, tier: RubricTier) -> EvalResult<ValidationReport> {
        save_tier(self.configs.as_ref(), tier).await
    }

    // ---------------------------------------------------------------------
    // Evaluation
    // ---------------------------------------------------------------------

    /// Start rating one story, or join its running evaluation.
    pub async fn evaluate_story(&self, story_key: &StoryKey) -> EvalResult<EvaluationHandle> {
        match self.store.claim(story_key) {
            Claim::Started { ticket, handle } => {
                spawn_job(self.job_context(), ticket, None);
                Ok(handle)
            }
            Claim::Joined(handle) => Ok(handle),
        }
    }

    /// Rate every story of a project. Stories already being rated are
    /// joined, not restarted.
    #[instrument(skip(self))]
    pub async fn evaluate_project(&self, project_key: &str) -> EvalResult<BatchHandle> {
        let stories = self.stories.list_stories(project_key).await?;
        let batch_id = Uuid::new_v4();

        let mut seen = HashSet::new();
        let mut handles = Vec::with_capacity(stories.len());
        for story in stories {
            if !seen.insert(story.key.clone()) {
                debug!(story_key = %story.key, "duplicate story in listing skipped");
                continue;
            }
            match self.store.claim(&story.key) {
                Claim::Started { ticket, handle } => {
                    spawn_job(self.job_context(), ticket, Some(story));
                    handles.push(handle);
                }
                Claim::Joined(handle) => handles.push(handle),
            }
        }

        let members = handles
            .iter()
            .map(|h| (h.story_key().clone(), h.sequence()))
            .collect();
        self.store.register_batch(batch_id, members);
        obs::emit_batch_submitted(batch_id, project_key, handles.len());

        Ok(BatchHandle::spawn(
            batch_id,
            project_key.to_string(),
            handles,
            Arc::clone(&self.store),
        ))
    }

    /// Latest successful rating, if any.
    pub fn get_result(&self, story_key: &StoryKey) -> Option<EvaluationResult> {
        self.store.result(story_key)
    }

    pub fn get_status(&self, story_key: &StoryKey) -> StoryStatus {
        self.store.status(story_key)
    }

    /// Cancel a story's running job or every running job of a batch.
    /// Returns how many jobs were cancelled.
    pub fn cancel_evaluation(&self, target: impl Into<CancelTarget>) -> usize {
        match target.into() {
            CancelTarget::Story(key) => usize::from(self.store.cancel_story(&key)),
            CancelTarget::Batch(batch_id) => self.store.cancel_batch(batch_id),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EvaluationEvent> {
        self.store.subscribe()
    }

    // ---------------------------------------------------------------------
    // Analytics
    // ---------------------------------------------------------------------

    pub fn project_summary(&self, project_key: &str, weak_threshold: u8) -> ProjectSummary {
        let results = self.store.results_for_project(project_key);
        analytics::summarize(project_key, &results, weak_threshold)
    }

    pub fn results_in_range(
        &self,
        project_key: &str,
        range: RangeInclusive<u8>,
    ) -> Vec<EvaluationResult> {
        let results = self.store.results_for_project(project_key);
        analytics::results_in_range(&results, range)
            .cloned()
            .collect()
    }
}
