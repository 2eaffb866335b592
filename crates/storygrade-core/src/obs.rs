//! Structured observability hooks for the evaluation lifecycle.
//!
//! This module provides:
//! - A story-scoped span helper for job tasks
//! - Emission functions for lifecycle events: start, join, rated, failed,
//!   cancelled, stale completion, batch submission/finish, rubric save/reject
//!
//! Events are emitted at `info!` level unless they signal a problem.

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{StoryKey, ValidationReport};
use crate::evaluation::BatchProgress;

/// Span that ties every log line of one job to its story.
///
/// Attach with `tracing::Instrument::instrument` so it survives `.await`.
pub fn evaluation_span(story_key: &StoryKey, job_id: Uuid, sequence: u64) -> tracing::Span {
    tracing::info_span!(
        "storygrade.evaluation",
        story_key = %story_key,
        job_id = %job_id,
        sequence = sequence,
    )
}

pub fn emit_evaluation_started(story_key: &StoryKey, job_id: Uuid, sequence: u64) {
    info!(event = "evaluation.started", story_key = %story_key, job_id = %job_id, sequence = sequence);
}

/// A request hit the single-flight rule and reused the running job.
pub fn emit_evaluation_joined(story_key: &StoryKey, job_id: Uuid) {
    info!(event = "evaluation.joined", story_key = %story_key, job_id = %job_id);
}

pub fn emit_evaluation_rated(story_key: &StoryKey, job_id: Uuid, overall_score: u8) {
    info!(
        event = "evaluation.rated",
        story_key = %story_key,
        job_id = %job_id,
        overall_score = overall_score,
    );
}

pub fn emit_evaluation_failed(story_key: &StoryKey, job_id: Uuid, reason: &str) {
    warn!(event = "evaluation.failed", story_key = %story_key, job_id = %job_id, reason = %reason);
}

pub fn emit_evaluation_cancelled(story_key: &StoryKey, job_id: Uuid) {
    info!(event = "evaluation.cancelled", story_key = %story_key, job_id = %job_id);
}

/// A completion arrived for a job that was cancelled or superseded.
pub fn emit_stale_discarded(story_key: &StoryKey, sequence: u64) {
    warn!(event = "evaluation.stale_discarded", story_key = %story_key, sequence = sequence);
}

pub fn emit_batch_submitted(batch_id: Uuid, project_key: &str, submitted: usize) {
    info!(
        event = "batch.submitted",
        batch_id = %batch_id,
        project_key = %project_key,
        submitted = submitted,
    );
}

pub fn emit_batch_finished(batch_id: Uuid, project_key: &str, progress: &BatchProgress) {
    info!(
        event = "batch.finished",
        batch_id = %batch_id,
        project_key = %project_key,
        submitted = progress.submitted,
        rated = progress.rated,
        failed = progress.failed,
        cancelled = progress.cancelled,
    );
}

/// `project_key` is `None` for the base tier.
pub fn emit_rubric_saved(project_key: Option<&str>, digest: &str) {
    info!(
        event = "rubric.saved",
        tier = project_key.unwrap_or("base"),
        digest = %digest,
    );
}

pub fn emit_rubric_rejected(project_key: Option<&str>, report: &ValidationReport) {
    warn!(
        event = "rubric.rejected",
        tier = project_key.unwrap_or("base"),
        violations = report.violations.len(),
        report = %report,
    );
}
