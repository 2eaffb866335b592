//! Per-story evaluation job.
//!
//! A job walks `Idle → Evaluating → {Rated, Failed}`. It is created by
//! [`EvaluationStore`] when a story has nothing in flight, runs as its own
//! Tokio task, and reports back to the store exactly once. Cancellation
//! drops the pending rating call; a response that still arrives is
//! discarded by the store's sequence check. A task that panics is reported
//! as a failure by its supervisor.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, Instrument};
use uuid::Uuid;

use crate::collaborators::{ConfigStore, RatingService, StorySource};
use crate::domain::{EvaluationResult, RubricDimension, Story, StoryKey};
use crate::evaluation::error::{EvalResult, EvaluationError};
use crate::evaluation::store::EvaluationStore;
use crate::obs;
use crate::scoring::score_rating;

/// Failure reason recorded when a job's task panics.
pub const PANICKED_REASON: &str = "evaluation task panicked";

/// Where a story's evaluation currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    /// Never evaluated, or the last attempt was cancelled.
    #[default]
    Idle,
    Evaluating,
    Rated,
    Failed { reason: String },
}

impl JobState {
    pub fn is_evaluating(&self) -> bool {
        matches!(self, JobState::Evaluating)
    }

    /// `Rated` and `Failed` end an attempt; a new request starts a new job.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Rated | JobState::Failed { .. })
    }
}

/// How a single job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Rated { result: EvaluationResult },
    Failed { reason: String },
    Cancelled,
}

impl JobOutcome {
    pub fn result(&self) -> Option<&EvaluationResult> {
        match self {
            JobOutcome::Rated { result } => Some(result),
            _ => None,
        }
    }

    pub fn is_rated(&self) -> bool {
        matches!(self, JobOutcome::Rated { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, JobOutcome::Failed { .. })
    }
}

/// Caller-side view of one in-flight job.
///
/// Every request that lands on the same running job receives a clone of the
/// same handle; handles compare equal by job id.
#[derive(Debug, Clone)]
pub struct EvaluationHandle {
    job_id: Uuid,
    story_key: StoryKey,
    sequence: u64,
    outcome: watch::Receiver<Option<JobOutcome>>,
}

impl PartialEq for EvaluationHandle {
    fn eq(&self, other: &Self) -> bool {
        self.job_id == other.job_id
    }
}

impl Eq for EvaluationHandle {}

impl EvaluationHandle {
    pub(crate) fn new(
        job_id: Uuid,
        story_key: StoryKey,
        sequence: u64,
        outcome: watch::Receiver<Option<JobOutcome>>,
    ) -> Self {
        Self {
            job_id,
            story_key,
            sequence,
            outcome,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn story_key(&self) -> &StoryKey {
        &self.story_key
    }

    /// Monotonic per-store request number.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The outcome, if the job has already ended.
    pub fn outcome(&self) -> Option<JobOutcome> {
        self.outcome.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Wait for the job to end.
    pub async fn wait(&self) -> JobOutcome {
        let mut rx = self.outcome.clone();
        let outcome = rx.wait_for(|o| o.is_some()).await.map(|o| (*o).clone());
        match outcome {
            Ok(Some(outcome)) => outcome,
            _ => JobOutcome::Failed {
                reason: "evaluation job ended without an outcome".to_string(),
            },
        }
    }
}

/// Job-side counterpart of a handle, handed out once per new job.
#[derive(Debug)]
pub(crate) struct JobTicket {
    pub story_key: StoryKey,
    pub job_id: Uuid,
    pub sequence: u64,
    pub cancel: watch::Receiver<bool>,
}

/// Collaborators a job needs.
#[derive(Clone)]
pub(crate) struct JobContext {
    pub rating: Arc<dyn RatingService>,
    pub stories: Arc<dyn StorySource>,
    pub configs: Arc<dyn ConfigStore>,
    pub store: Arc<EvaluationStore>,
}

/// Run a job on its own task. `story` skips the source lookup when the
/// caller already holds the story (bulk runs).
///
/// A second task watches the job; if it panics the story is failed so
/// waiters are released and the slot can take a new job.
pub(crate) fn spawn_job(ctx: JobContext, ticket: JobTicket, story: Option<Story>) {
    let span = obs::evaluation_span(&ticket.story_key, ticket.job_id, ticket.sequence);
    let store = Arc::clone(&ctx.store);
    let story_key = ticket.story_key.clone();
    let sequence = ticket.sequence;

    let job = tokio::spawn(run_job(ctx, ticket, story).instrument(span.clone()));
    tokio::spawn(
        async move {
            match job.await {
                Err(err) if err.is_panic() => {
                    error!("evaluation task panicked");
                    if let Err(err) = store.fail(&story_key, sequence, PANICKED_REASON.to_string())
                    {
                        error!(error = %err, "could not record evaluation outcome");
                    }
                }
                _ => {}
            }
        }
        .instrument(span),
    );
}

async fn run_job(ctx: JobContext, ticket: JobTicket, story: Option<Story>) {
    let JobTicket {
        story_key,
        sequence,
        mut cancel,
        ..
    } = ticket;

    let outcome = tokio::select! {
        _ = cancelled(&mut cancel) => {
            debug!("job cancelled before the rating arrived");
            return;
        }
        outcome = attempt(&ctx, &story_key, sequence, story) => outcome,
    };

    let recorded = match outcome {
        Ok(result) => ctx.store.complete(result),
        Err(err) => ctx.store.fail(&story_key, sequence, err.to_string()),
    };
    if let Err(err) = recorded {
        error!(error = %err, "could not record evaluation outcome");
    }
}

async fn attempt(
    ctx: &JobContext,
    story_key: &StoryKey,
    sequence: u64,
    story: Option<Story>,
) -> EvalResult<EvaluationResult> {
    let story = match story {
        Some(story) => story,
        None => ctx
            .stories
            .get_story(story_key)
            .await?
            .ok_or_else(|| EvaluationError::StoryNotFound(story_key.clone()))?,
    };

    let config = ctx.configs.merged(story_key.project_key()).await?;
    let report = config.validate();
    if !report.is_valid() {
        return Err(EvaluationError::InvalidConfig(report));
    }

    let domain_context = ctx.configs.domain_context(story_key.project_key()).await?;

    let dimensions: Vec<RubricDimension> = config.enabled().cloned().collect();
    let raw = ctx
        .rating
        .rate(&story, &dimensions, domain_context.as_deref())
        .await?;
    let scored = score_rating(&config, &raw.dimension_scores)?;

    Ok(EvaluationResult {
        story_key: story_key.clone(),
        overall_score: scored.overall_score,
        dimension_scores: scored.dimension_scores,
        rationale: raw.rationale,
        suggestions: raw.suggestions,
        sprint: story.sprint,
        rated_at: Utc::now(),
        rubric_digest: config.digest(),
        sequence,
    })
}

/// Resolves once the cancel flag is raised. Never resolves if the flag's
/// sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}
