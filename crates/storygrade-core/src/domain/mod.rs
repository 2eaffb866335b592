//! Domain models for storygrade.
//!
//! Canonical definitions for the core entities:
//! - `RubricDimension`: one weighted quality axis
//! - `RubricConfig` / `RubricOverride`: the base and project tiers of a rubric
//! - `ValidationReport`: every rule a rubric breaks, reported at once
//! - `Story`: the external work item being rated
//! - `EvaluationResult`: the immutable outcome of one successful rating

pub mod dimension;
pub mod error;
pub mod result;
pub mod rubric;
pub mod story;
pub mod validation;

pub use dimension::{dimension_slug, RubricDimension};
pub use error::{RubricError, RubricResult};
pub use result::{EvaluationResult, QualityBand};
pub use rubric::{resolve, RubricConfig, RubricOverride};
pub use story::{Story, StoryKey};
pub use validation::{check_dimensions, validate, ValidationReport, Violation, MAX_WEIGHT, REQUIRED_WEIGHT_SUM};
