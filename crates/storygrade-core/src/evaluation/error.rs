//! Error types for the evaluation layer.

use crate::collaborators::{ConfigStoreError, RatingError, SourceError};
use crate::domain::{RubricError, StoryKey, ValidationReport};
use crate::scoring::ScoringError;

/// Errors produced by the evaluation layer and the service facade.
///
/// Everything except [`EvaluationError::Invariant`] is a recoverable user or
/// collaborator problem. `Invariant` means the store itself is inconsistent
/// and the operation was halted.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("rubric is invalid: {0}")]
    InvalidConfig(ValidationReport),

    #[error("story not found: {0}")]
    StoryNotFound(StoryKey),

    #[error("story source error: {0}")]
    Source(#[from] SourceError),

    #[error("config store error: {0}")]
    ConfigStore(#[from] ConfigStoreError),

    #[error("rating failed: {0}")]
    Rating(#[from] RatingError),

    #[error("scoring failed: {0}")]
    Scoring(#[from] ScoringError),

    #[error("rubric edit failed: {0}")]
    Rubric(#[from] RubricError),

    #[error("evaluation store invariant violated: {0}")]
    Invariant(String),
}

impl EvaluationError {
    /// The validation report carried by a rejected rubric, if any.
    pub fn validation_report(&self) -> Option<&ValidationReport> {
        match self {
            EvaluationError::InvalidConfig(report) => Some(report),
            EvaluationError::Scoring(ScoringError::InvalidConfig(report)) => Some(report),
            _ => None,
        }
    }
}

/// Result type for evaluation operations.
pub type EvalResult<T> = std::result::Result<T, EvaluationError>;
