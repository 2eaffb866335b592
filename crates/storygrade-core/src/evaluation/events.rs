//! Lifecycle notifications published by the evaluation store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::StoryKey;

/// One state change of an evaluation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvaluationEvent {
    Started {
        story_key: StoryKey,
        job_id: Uuid,
    },
    Rated {
        story_key: StoryKey,
        job_id: Uuid,
        overall_score: u8,
    },
    Failed {
        story_key: StoryKey,
        job_id: Uuid,
        reason: String,
    },
    Cancelled {
        story_key: StoryKey,
        job_id: Uuid,
    },
}

impl EvaluationEvent {
    pub fn story_key(&self) -> &StoryKey {
        match self {
            EvaluationEvent::Started { story_key, .. }
            | EvaluationEvent::Rated { story_key, .. }
            | EvaluationEvent::Failed { story_key, .. }
            | EvaluationEvent::Cancelled { story_key, .. } => story_key,
        }
    }

    pub fn job_id(&self) -> Uuid {
        match self {
            EvaluationEvent::Started { job_id, .. }
            | EvaluationEvent::Rated { job_id, .. }
            | EvaluationEvent::Failed { job_id, .. }
            | EvaluationEvent::Cancelled { job_id, .. } => *job_id,
        }
    }
}
