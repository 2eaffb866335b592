//! Structured tracing events and counters for the evaluation lifecycle.

use std::sync::Arc;

use storygrade_core::fakes::{
    MemoryConfigStore, MemoryStorySource, ScriptedOutcome, ScriptedRatingService,
};
use storygrade_core::metrics::METRICS;
use storygrade_core::obs::{
    emit_batch_finished, emit_evaluation_joined, emit_rubric_rejected, emit_stale_discarded,
    evaluation_span,
};
use storygrade_core::{
    BatchProgress, RubricConfig, RubricDimension, RubricTier, Story, StoryKey, StoryRater,
};
use tracing_test::traced_test;
use uuid::Uuid;

#[traced_test]
#[test]
fn test_emit_joined_logs_story_key() {
    emit_evaluation_joined(&StoryKey::from("ECOM-101"), Uuid::new_v4());
    assert!(logs_contain("evaluation.joined"));
    assert!(logs_contain("ECOM-101"));
}

#[traced_test]
#[test]
fn test_emit_stale_discarded_logs_sequence() {
    emit_stale_discarded(&StoryKey::from("ECOM-7"), 41);
    assert!(logs_contain("evaluation.stale_discarded"));
    assert!(logs_contain("sequence=41"));
}

#[traced_test]
#[test]
fn test_emit_batch_finished_logs_counts() {
    let progress = BatchProgress {
        submitted: 3,
        rated: 2,
        failed: 1,
        cancelled: 0,
    };
    emit_batch_finished(Uuid::new_v4(), "ECOM", &progress);
    assert!(logs_contain("batch.finished"));
    assert!(logs_contain("failed=1"));
}

#[traced_test]
#[test]
fn test_emit_rubric_rejected_logs_report() {
    let report = RubricConfig::new(vec![RubricDimension::new("clarity", "Clarity", 90)]).validate();
    emit_rubric_rejected(Some("ECOM"), &report);
    assert!(logs_contain("rubric.rejected"));
    assert!(logs_contain("sum to 90"));
}

#[traced_test]
#[test]
fn test_evaluation_span_enter() {
    let span = evaluation_span(&StoryKey::from("ECOM-1"), Uuid::new_v4(), 1);
    let entered = span.enter();
    drop(entered);
}

#[traced_test]
#[tokio::test]
async fn test_rejected_save_is_logged() {
    let rater = StoryRater::new(
        Arc::new(ScriptedRatingService::default()),
        Arc::new(MemoryStorySource::default()),
        Arc::new(MemoryConfigStore::new()),
    );
    let bad = RubricConfig::new(vec![RubricDimension::new("clarity", "Clarity", 50)]);
    assert!(rater.save_config(RubricTier::Base(bad)).await.is_err());
    assert!(logs_contain("rubric.rejected"));
}

#[tokio::test]
async fn test_counters_move_with_outcomes() {
    let rating = Arc::new(ScriptedRatingService::new(70));
    rating.script("OBS-2", ScriptedOutcome::Fail("offline".to_string()));
    let rater = StoryRater::new(
        rating,
        Arc::new(MemoryStorySource::new(vec![
            Story::new("OBS-1", "One"),
            Story::new("OBS-2", "Two"),
        ])),
        Arc::new(MemoryConfigStore::new()),
    );

    // Counters are process-wide and other tests run in parallel.
    let started = METRICS.evaluations_started();
    let rated = METRICS.evaluations_rated();
    let failed = METRICS.evaluations_failed();

    rater.evaluate_project("OBS").await.unwrap().wait().await;

    assert!(METRICS.evaluations_started() >= started + 2);
    assert!(METRICS.evaluations_rated() > rated);
    assert!(METRICS.evaluations_failed() > failed);
}
