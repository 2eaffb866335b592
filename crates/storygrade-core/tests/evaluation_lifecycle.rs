//! Per-story evaluation lifecycle: single-flight, re-rating, failure,
//! cancellation and notifications, driven through `StoryRater` with the
//! in-memory fakes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use storygrade_core::fakes::{
    MemoryConfigStore, MemoryStorySource, ScriptedOutcome, ScriptedRatingService,
};
use storygrade_core::{
    ConfigStore, EvaluationEvent, JobOutcome, JobState, RatingError, RatingService, RawRating,
    RubricConfig, RubricDimension, RubricOverride, Story, StoryKey, StoryRater, PANICKED_REASON,
};

fn stories() -> Vec<Story> {
    vec![
        Story::new("ECOM-101", "Guest checkout")
            .with_description("As a shopper I want to check out without an account")
            .with_acceptance_criterion("Checkout works without login")
            .with_story_points(5)
            .with_sprint("Sprint 7"),
        Story::new("ECOM-102", "Saved carts"),
    ]
}

fn rater_with(rating: Arc<ScriptedRatingService>, configs: MemoryConfigStore) -> StoryRater {
    StoryRater::new(
        rating,
        Arc::new(MemoryStorySource::new(stories())),
        Arc::new(configs),
    )
}

fn scores(pairs: &[(&str, i64)]) -> BTreeMap<String, i64> {
    pairs.iter().map(|(id, s)| (id.to_string(), *s)).collect()
}

#[tokio::test]
async fn test_concurrent_requests_share_one_job() {
    let rating = Arc::new(ScriptedRatingService::held(80));
    let rater = rater_with(Arc::clone(&rating), MemoryConfigStore::new());
    let key = StoryKey::from("ECOM-101");

    let (first, second) = tokio::join!(rater.evaluate_story(&key), rater.evaluate_story(&key));
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_eq!(first, second);

    rating.wait_for_calls(1).await;
    assert!(rater.get_status(&key).state.is_evaluating());

    let third = rater.evaluate_story(&key).await.unwrap();
    assert_eq!(third, first);

    rating.release(1);
    let outcome = second.wait().await;
    assert!(outcome.is_rated());
    assert_eq!(outcome.result().unwrap().overall_score, 80);
    assert_eq!(rating.calls(), 1);
    assert_eq!(rater.get_status(&key).state, JobState::Rated);
}

#[tokio::test]
async fn test_weighted_example_scores_76() {
    let rubric = RubricConfig::new(vec![
        RubricDimension::new("clarity", "Clarity", 25),
        RubricDimension::new("completeness", "Completeness", 25),
        RubricDimension::new("acceptance-criteria", "Acceptance Criteria", 25),
        RubricDimension::new("testability", "Testability", 15),
        RubricDimension::new("independence", "Independence", 10),
    ]);
    let rating = Arc::new(ScriptedRatingService::default());
    rating.script(
        "ECOM-101",
        ScriptedOutcome::Scores(scores(&[
            ("clarity", 90),
            ("completeness", 70),
            ("acceptance-criteria", 60),
            ("testability", 80),
            ("independence", 88),
            ("legacy-dimension", 12),
        ])),
    );
    let rater = rater_with(rating, MemoryConfigStore::with_base(rubric.clone()));
    let key = StoryKey::from("ECOM-101");

    let outcome = rater.evaluate_story(&key).await.unwrap().wait().await;
    let result = outcome.result().unwrap();
    assert_eq!(result.overall_score, 76);
    assert_eq!(result.dimension_scores.len(), 5);
    assert!(!result.dimension_scores.contains_key("legacy-dimension"));
    assert_eq!(result.rubric_digest, rubric.digest());
    assert_eq!(result.rationale, "scripted rating for ECOM-101");
}

#[tokio::test]
async fn test_get_result_is_idempotent() {
    let rater = rater_with(
        Arc::new(ScriptedRatingService::new(72)),
        MemoryConfigStore::new(),
    );
    let key = StoryKey::from("ECOM-101");
    assert!(rater.get_result(&key).is_none());

    rater.evaluate_story(&key).await.unwrap().wait().await;
    let first = rater.get_result(&key).unwrap();
    let second = rater.get_result(&key).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.overall_score, 72);
}

#[tokio::test]
async fn test_rerate_supersedes_previous_result() {
    let rating = Arc::new(ScriptedRatingService::new(60));
    let rater = rater_with(Arc::clone(&rating), MemoryConfigStore::new());
    let key = StoryKey::from("ECOM-101");

    rater.evaluate_story(&key).await.unwrap().wait().await;
    let before = rater.get_result(&key).unwrap();
    assert_eq!(before.overall_score, 60);

    rating.script(
        "ECOM-101",
        ScriptedOutcome::Scores(scores(&[
            ("clarity", 100),
            ("completeness", 100),
            ("acceptance-criteria", 100),
            ("testability", 100),
            ("independence", 100),
        ])),
    );
    rater.evaluate_story(&key).await.unwrap().wait().await;
    let after = rater.get_result(&key).unwrap();
    assert_eq!(after.overall_score, 100);
    assert!(after.sequence > before.sequence);
    assert_eq!(rating.calls_for(&key), 2);
}

#[tokio::test]
async fn test_failure_keeps_last_known_rating() {
    let rating = Arc::new(ScriptedRatingService::new(85));
    let rater = rater_with(Arc::clone(&rating), MemoryConfigStore::new());
    let key = StoryKey::from("ECOM-101");

    rater.evaluate_story(&key).await.unwrap().wait().await;
    rating.script("ECOM-101", ScriptedOutcome::Fail("model overloaded".to_string()));

    let outcome = rater.evaluate_story(&key).await.unwrap().wait().await;
    assert!(outcome.is_failed());

    let status = rater.get_status(&key);
    assert!(matches!(
        &status.state,
        JobState::Failed { reason } if reason.contains("model overloaded")
    ));
    assert_eq!(status.latest.unwrap().overall_score, 85);
    assert!(status.in_flight.is_none());
    assert_eq!(rater.get_result(&key).unwrap().overall_score, 85);
}

#[tokio::test]
async fn test_failed_story_can_be_retried() {
    let rating = Arc::new(ScriptedRatingService::new(70));
    rating.script("ECOM-102", ScriptedOutcome::Fail("timeout".to_string()));
    let rater = rater_with(Arc::clone(&rating), MemoryConfigStore::new());
    let key = StoryKey::from("ECOM-102");

    assert!(rater.evaluate_story(&key).await.unwrap().wait().await.is_failed());

    rating.script(
        "ECOM-102",
        ScriptedOutcome::Scores(scores(&[
            ("clarity", 70),
            ("completeness", 70),
            ("acceptance-criteria", 70),
            ("testability", 70),
            ("independence", 70),
        ])),
    );
    assert!(rater.evaluate_story(&key).await.unwrap().wait().await.is_rated());
    assert_eq!(rater.get_status(&key).state, JobState::Rated);
    assert!(rater.get_status(&key).last_failure.is_none());
}

#[tokio::test]
async fn test_incomplete_scores_fail_the_job() {
    let rating = Arc::new(ScriptedRatingService::default());
    rating.script(
        "ECOM-101",
        ScriptedOutcome::Scores(scores(&[("clarity", 90)])),
    );
    let rater = rater_with(rating, MemoryConfigStore::new());

    let outcome = rater
        .evaluate_story(&StoryKey::from("ECOM-101"))
        .await
        .unwrap()
        .wait()
        .await;
    match outcome {
        JobOutcome::Failed { reason } => assert!(reason.contains("missing sub-scores")),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_out_of_range_score_fails_the_job() {
    let rating = Arc::new(ScriptedRatingService::new(101));
    let rater = rater_with(rating, MemoryConfigStore::new());

    let outcome = rater
        .evaluate_story(&StoryKey::from("ECOM-101"))
        .await
        .unwrap()
        .wait()
        .await;
    assert!(outcome.is_failed());
    assert!(rater.get_result(&StoryKey::from("ECOM-101")).is_none());
}

#[tokio::test]
async fn test_unknown_story_fails() {
    let rating = Arc::new(ScriptedRatingService::default());
    let rater = rater_with(Arc::clone(&rating), MemoryConfigStore::new());
    let key = StoryKey::from("ECOM-999");

    let outcome = rater.evaluate_story(&key).await.unwrap().wait().await;
    match outcome {
        JobOutcome::Failed { reason } => assert!(reason.contains("story not found")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(rating.calls(), 0);
}

#[tokio::test]
async fn test_invalid_merged_rubric_fails_before_rating() {
    let invalid = RubricConfig::default_base()
        .set_enabled("independence", false)
        .unwrap();
    let rating = Arc::new(ScriptedRatingService::default());
    let rater = rater_with(Arc::clone(&rating), MemoryConfigStore::with_base(invalid));

    let outcome = rater
        .evaluate_story(&StoryKey::from("ECOM-101"))
        .await
        .unwrap()
        .wait()
        .await;
    match outcome {
        JobOutcome::Failed { reason } => assert!(reason.contains("sum to 85")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(rating.calls(), 0);
}

#[tokio::test]
async fn test_cancel_returns_story_to_idle_and_discards_response() {
    let rating = Arc::new(ScriptedRatingService::held(90));
    let rater = rater_with(Arc::clone(&rating), MemoryConfigStore::new());
    let key = StoryKey::from("ECOM-101");

    let handle = rater.evaluate_story(&key).await.unwrap();
    rating.wait_for_calls(1).await;

    assert_eq!(rater.cancel_evaluation(key.clone()), 1);
    assert_eq!(handle.wait().await, JobOutcome::Cancelled);
    assert_eq!(rater.get_status(&key).state, JobState::Idle);

    rating.release(1);
    tokio::task::yield_now().await;
    assert!(rater.get_result(&key).is_none());
    assert_eq!(rater.get_status(&key).state, JobState::Idle);

    assert_eq!(rater.cancel_evaluation(key.clone()), 0);
}

#[tokio::test]
async fn test_new_request_after_cancel_starts_fresh_job() {
    let rating = Arc::new(ScriptedRatingService::held(90));
    let rater = rater_with(Arc::clone(&rating), MemoryConfigStore::new());
    let key = StoryKey::from("ECOM-101");

    let cancelled = rater.evaluate_story(&key).await.unwrap();
    rating.wait_for_calls(1).await;
    rater.cancel_evaluation(key.clone());

    let fresh = rater.evaluate_story(&key).await.unwrap();
    assert_ne!(fresh, cancelled);
    assert!(fresh.sequence() > cancelled.sequence());

    rating.wait_for_calls(2).await;
    // The cancelled call may still be parked on the gate.
    rating.release(2);
    assert!(fresh.wait().await.is_rated());
    assert_eq!(rater.get_result(&key).unwrap().sequence, fresh.sequence());
}

#[tokio::test]
async fn test_events_follow_the_lifecycle() {
    let rating = Arc::new(ScriptedRatingService::new(64));
    rating.script("ECOM-102", ScriptedOutcome::Fail("bad gateway".to_string()));
    let rater = rater_with(rating, MemoryConfigStore::new());
    let mut events = rater.subscribe();

    let ok = rater.evaluate_story(&StoryKey::from("ECOM-101")).await.unwrap();
    ok.wait().await;
    let bad = rater.evaluate_story(&StoryKey::from("ECOM-102")).await.unwrap();
    bad.wait().await;

    let mut received = Vec::new();
    for _ in 0..4 {
        received.push(events.recv().await.unwrap());
    }

    assert!(matches!(&received[0], EvaluationEvent::Started { job_id, .. } if *job_id == ok.job_id()));
    assert!(matches!(
        &received[1],
        EvaluationEvent::Rated { overall_score: 64, .. }
    ));
    assert_eq!(received[2].story_key().as_str(), "ECOM-102");
    assert!(matches!(&received[3], EvaluationEvent::Failed { reason, .. } if reason.contains("bad gateway")));
}

/// Panics on its first call, then answers with a flat 75.
#[derive(Default)]
struct PanicsOnceRatingService {
    calls: AtomicUsize,
}

#[async_trait]
impl RatingService for PanicsOnceRatingService {
    async fn rate(
        &self,
        _story: &Story,
        dimensions: &[RubricDimension],
        _domain_context: Option<&str>,
    ) -> Result<RawRating, RatingError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("rating backend blew up");
        }
        Ok(RawRating {
            dimension_scores: dimensions.iter().map(|d| (d.id.clone(), 75)).collect(),
            rationale: String::new(),
            suggestions: Vec::new(),
        })
    }
}

#[tokio::test]
async fn test_panicking_rating_service_fails_the_job() {
    let rating = Arc::new(PanicsOnceRatingService::default());
    let rater = StoryRater::new(
        Arc::clone(&rating) as Arc<dyn RatingService>,
        Arc::new(MemoryStorySource::new(stories())),
        Arc::new(MemoryConfigStore::new()),
    );
    let key = StoryKey::from("ECOM-101");

    let handle = rater.evaluate_story(&key).await.unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("waiters must be released after a panic");
    assert_eq!(
        outcome,
        JobOutcome::Failed {
            reason: PANICKED_REASON.to_string()
        }
    );

    let status = rater.get_status(&key);
    assert!(matches!(&status.state, JobState::Failed { reason } if reason == PANICKED_REASON));
    assert!(status.in_flight.is_none());

    let retry = rater.evaluate_story(&key).await.unwrap();
    assert_ne!(retry, handle);
    assert!(retry.wait().await.is_rated());
    assert_eq!(rater.get_result(&key).unwrap().overall_score, 75);
    assert_eq!(rating.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_project_domain_context_reaches_rating_service() {
    let configs = MemoryConfigStore::new();
    configs
        .save_override(
            "ECOM",
            &RubricOverride::new().with_domain_context("Online grocery marketplace"),
        )
        .await
        .unwrap();
    let rating = Arc::new(ScriptedRatingService::default());
    let rater = rater_with(Arc::clone(&rating), configs);

    let key = StoryKey::from("ECOM-101");
    assert!(rater.evaluate_story(&key).await.unwrap().wait().await.is_rated());
    assert_eq!(
        rating.domain_context_for(&key).as_deref(),
        Some("Online grocery marketplace")
    );
}

#[tokio::test]
async fn test_project_without_domain_context_passes_none() {
    let rating = Arc::new(ScriptedRatingService::default());
    let rater = rater_with(Arc::clone(&rating), MemoryConfigStore::new());

    let key = StoryKey::from("ECOM-102");
    assert!(rater.evaluate_story(&key).await.unwrap().wait().await.is_rated());
    assert_eq!(rating.calls_for(&key), 1);
    assert_eq!(rating.domain_context_for(&key), None);
}

#[tokio::test]
async fn test_result_carries_suggestions_and_sprint() {
    let rating = Arc::new(ScriptedRatingService::default());
    rating.script(
        "ECOM-101",
        ScriptedOutcome::Scores(scores(&[
            ("clarity", 90),
            ("completeness", 40),
            ("acceptance-criteria", 80),
            ("testability", 55),
            ("independence", 90),
        ])),
    );
    let rater = rater_with(rating, MemoryConfigStore::new());
    let key = StoryKey::from("ECOM-101");

    let outcome = rater.evaluate_story(&key).await.unwrap().wait().await;
    let result = outcome.result().unwrap();
    assert_eq!(
        result.suggestions,
        vec!["Strengthen Completeness", "Strengthen Testability"]
    );
    assert_eq!(result.sprint.as_deref(), Some("Sprint 7"));

    rater
        .evaluate_story(&StoryKey::from("ECOM-102"))
        .await
        .unwrap()
        .wait()
        .await;
    let unsprinted = rater.get_result(&StoryKey::from("ECOM-102")).unwrap();
    assert!(unsprinted.suggestions.is_empty());
    assert_eq!(unsprinted.sprint, None);
}
