//! storygrade core library
//!
//! Rubric configuration, weighted story quality scoring and the evaluation
//! lifecycle. The [`StoryRater`] facade is the entry point; collaborators are
//! injected through the traits in [`collaborators`].

pub mod analytics;
pub mod collaborators;
pub mod domain;
pub mod evaluation;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod scoring;
pub mod service;
pub mod telemetry;

pub use analytics::{
    results_in_range, summarize, BandCounts, ProjectSummary, ScoreBucket, SprintTrend, WeakStory,
    WEAK_DIMENSION_THRESHOLD,
};

pub use collaborators::{
    ConfigStore, ConfigStoreError, ConfigStoreResult, FsConfigStore, HttpRatingService,
    JsonFileStorySource, RatingClientConfig, RatingError, RatingService, RawRating, SourceError,
    SourceResult, StorySource,
};

pub use domain::{
    check_dimensions, dimension_slug, resolve, validate, EvaluationResult, QualityBand,
    RubricConfig, RubricDimension, RubricError, RubricOverride, RubricResult, Story, StoryKey,
    ValidationReport, Violation,
};

pub use evaluation::{
    BatchHandle, BatchProgress, BatchReport, EvalResult, EvaluationError, EvaluationEvent,
    EvaluationHandle, EvaluationStore, JobOutcome, JobState, StoryOutcome, StoryStatus,
    PANICKED_REASON,
};

pub use scoring::{compute_overall_score, score_rating, ScoredRating, ScoringError, ScoringResult};

pub use service::{save_tier, CancelTarget, RaterConfig, RubricTier, StoryRater};

pub use telemetry::init_tracing;

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
