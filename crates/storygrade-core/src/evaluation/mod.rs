//! Evaluation lifecycle.
//!
//! # Module layout
//!
//! - [`error`]: `EvaluationError`, `EvalResult`
//! - [`events`]: `EvaluationEvent` notifications
//! - [`job`]: `JobState`, `JobOutcome`, `EvaluationHandle` and the job task
//! - [`store`]: `EvaluationStore`, the per-story single-flight registry
//! - [`batch`]: `BatchHandle`, `BatchProgress`, `BatchReport`

pub mod batch;
pub mod error;
pub mod events;
pub mod job;
pub mod store;

pub use batch::{BatchHandle, BatchProgress, BatchReport, StoryOutcome};
pub use error::{EvalResult, EvaluationError};
pub use events::EvaluationEvent;
pub use job::{EvaluationHandle, JobOutcome, JobState, PANICKED_REASON};
pub use store::{EvaluationStore, StoryStatus};
