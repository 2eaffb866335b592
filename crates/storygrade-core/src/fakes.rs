//! In-memory fakes for collaborator traits (testing only)
//!
//! Provides `MemoryConfigStore`, `MemoryStorySource`, and
//! `ScriptedRatingService` that satisfy the trait contracts without any
//! external dependencies.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Semaphore};

use crate::collaborators::{
    ConfigStore, ConfigStoreResult, RatingError, RatingService, RawRating, SourceError,
    SourceResult, StorySource,
};
use crate::domain::{RubricConfig, RubricDimension, RubricOverride, Story, StoryKey};

// ---------------------------------------------------------------------------
// MemoryConfigStore
// ---------------------------------------------------------------------------

/// In-memory config store backed by a `HashMap<project, override>`.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    base: Mutex<Option<RubricConfig>>,
    overrides: Mutex<HashMap<String, RubricOverride>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: RubricConfig) -> Self {
        Self {
            base: Mutex::new(Some(base)),
            overrides: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load_base(&self) -> ConfigStoreResult<Option<RubricConfig>> {
        Ok(self.base.lock().unwrap().clone())
    }

    async fn save_base(&self, config: &RubricConfig) -> ConfigStoreResult<()> {
        *self.base.lock().unwrap() = Some(config.clone());
        Ok(())
    }

    async fn load_override(&self, project_key: &str) -> ConfigStoreResult<Option<RubricOverride>> {
        Ok(self.overrides.lock().unwrap().get(project_key).cloned())
    }

    async fn save_override(
        &self,
        project_key: &str,
        overrides: &RubricOverride,
    ) -> ConfigStoreResult<()> {
        self.overrides
            .lock()
            .unwrap()
            .insert(project_key.to_string(), overrides.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryStorySource
// ---------------------------------------------------------------------------

/// In-memory story source. `fail_listing` makes `list_stories` error out.
#[derive(Debug, Default)]
pub struct MemoryStorySource {
    stories: Mutex<Vec<Story>>,
    fail_listing: bool,
}

impl MemoryStorySource {
    pub fn new(stories: Vec<Story>) -> Self {
        Self {
            stories: Mutex::new(stories),
            fail_listing: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            stories: Mutex::new(Vec::new()),
            fail_listing: true,
        }
    }

    pub fn push(&self, story: Story) {
        self.stories.lock().unwrap().push(story);
    }
}

#[async_trait]
impl StorySource for MemoryStorySource {
    async fn list_stories(&self, project_key: &str) -> SourceResult<Vec<Story>> {
        if self.fail_listing {
            return Err(SourceError::Unavailable("tracker offline".to_string()));
        }
        Ok(self
            .stories
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.project_key() == project_key)
            .cloned()
            .collect())
    }

    async fn get_story(&self, key: &StoryKey) -> SourceResult<Option<Story>> {
        Ok(self
            .stories
            .lock()
            .unwrap()
            .iter()
            .find(|s| &s.key == key)
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// ScriptedRatingService
// ---------------------------------------------------------------------------

/// Scripted answer for one story.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// Return exactly these sub-scores.
    Scores(BTreeMap<String, i64>),
    /// Fail with [`RatingError::Unavailable`] and this message.
    Fail(String),
}

/// Rating service that answers from a script.
///
/// Stories without a script get `uniform_score` for every requested
/// dimension. Every dimension scored below 60 gets one suggestion naming it.
/// A held service parks every call until [`release`] hands out
/// permits, which lets tests observe the `Evaluating` state.
///
/// [`release`]: ScriptedRatingService::release
#[derive(Debug)]
pub struct ScriptedRatingService {
    uniform_score: i64,
    script: Mutex<HashMap<StoryKey, ScriptedOutcome>>,
    delays: Mutex<HashMap<StoryKey, Duration>>,
    gate: Option<Semaphore>,
    calls: watch::Sender<usize>,
    calls_by_story: Mutex<HashMap<StoryKey, usize>>,
    contexts: Mutex<HashMap<StoryKey, Option<String>>>,
}

impl Default for ScriptedRatingService {
    fn default() -> Self {
        Self::new(80)
    }
}

impl ScriptedRatingService {
    pub fn new(uniform_score: i64) -> Self {
        Self {
            uniform_score,
            script: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            gate: None,
            calls: watch::channel(0).0,
            calls_by_story: Mutex::new(HashMap::new()),
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// A service whose calls block until released.
    pub fn held(uniform_score: i64) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new(uniform_score)
        }
    }

    pub fn script(&self, key: impl Into<StoryKey>, outcome: ScriptedOutcome) {
        self.script.lock().unwrap().insert(key.into(), outcome);
    }

    pub fn delay(&self, key: impl Into<StoryKey>, delay: Duration) {
        self.delays.lock().unwrap().insert(key.into(), delay);
    }

    /// Let `n` held calls proceed.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Total number of `rate` invocations so far.
    pub fn calls(&self) -> usize {
        *self.calls.borrow()
    }

    pub fn calls_for(&self, key: &StoryKey) -> usize {
        self.calls_by_story
            .lock()
            .unwrap()
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Domain context passed with the most recent call for `key`.
    pub fn domain_context_for(&self, key: &StoryKey) -> Option<String> {
        self.contexts.lock().unwrap().get(key).cloned().flatten()
    }

    /// Wait until at least `n` calls have reached the service.
    pub async fn wait_for_calls(&self, n: usize) {
        let mut rx = self.calls.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }
}

#[async_trait]
impl RatingService for ScriptedRatingService {
    async fn rate(
        &self,
        story: &Story,
        dimensions: &[RubricDimension],
        domain_context: Option<&str>,
    ) -> Result<RawRating, RatingError> {
        self.contexts
            .lock()
            .unwrap()
            .insert(story.key.clone(), domain_context.map(str::to_string));
        *self
            .calls_by_story
            .lock()
            .unwrap()
            .entry(story.key.clone())
            .or_insert(0) += 1;
        self.calls.send_modify(|count| *count += 1);

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| RatingError::Unavailable(e.to_string()))?
                .forget();
        }

        let delay = self.delays.lock().unwrap().get(&story.key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.script.lock().unwrap().get(&story.key).cloned();
        let (dimension_scores, rationale) = match scripted {
            Some(ScriptedOutcome::Fail(reason)) => return Err(RatingError::Unavailable(reason)),
            Some(ScriptedOutcome::Scores(scores)) => {
                (scores, format!("scripted rating for {}", story.key))
            }
            None => (
                dimensions
                    .iter()
                    .map(|d| (d.id.clone(), self.uniform_score))
                    .collect(),
                format!("uniform rating for {}", story.key),
            ),
        };
        let suggestions = suggestions_for(dimensions, &dimension_scores);
        Ok(RawRating {
            dimension_scores,
            rationale,
            suggestions,
        })
    }
}

fn suggestions_for(dimensions: &[RubricDimension], scores: &BTreeMap<String, i64>) -> Vec<String> {
    dimensions
        .iter()
        .filter(|d| scores.get(&d.id).is_some_and(|s| *s < 60))
        .map(|d| format!("Strengthen {}", d.name))
        .collect()
}
