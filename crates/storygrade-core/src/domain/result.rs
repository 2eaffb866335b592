//! Outcome of one successful evaluation.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::story::StoryKey;

/// Immutable rating of a story. A newer result supersedes it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub story_key: StoryKey,
    /// Weighted aggregate, 0..=100.
    pub overall_score: u8,
    /// Sub-score per enabled dimension id, 0..=100.
    pub dimension_scores: BTreeMap<String, u8>,
    pub rationale: String,
    /// Improvement suggestions from the rating service, in its order.
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Sprint the story belonged to when it was rated.
    #[serde(default)]
    pub sprint: Option<String>,
    pub rated_at: DateTime<Utc>,
    /// Digest of the merged rubric the scores were computed against.
    pub rubric_digest: String,
    /// Sequence number of the job that produced this result.
    pub sequence: u64,
}

impl EvaluationResult {
    pub fn band(&self) -> QualityBand {
        QualityBand::from_score(self.overall_score)
    }
}

/// Coarse quality bucket shown next to a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBand {
    Poor,
    Fair,
    Good,
}

impl QualityBand {
    pub const GOOD_THRESHOLD: u8 = 80;
    pub const FAIR_THRESHOLD: u8 = 60;

    pub fn from_score(score: u8) -> Self {
        if score >= Self::GOOD_THRESHOLD {
            QualityBand::Good
        } else if score >= Self::FAIR_THRESHOLD {
            QualityBand::Fair
        } else {
            QualityBand::Poor
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QualityBand::Good => "Good story quality",
            QualityBand::Fair => "Fair story quality",
            QualityBand::Poor => "Poor story quality",
        }
    }
}

impl fmt::Display for QualityBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QualityBand::Good => "good",
            QualityBand::Fair => "fair",
            QualityBand::Poor => "poor",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_boundaries() {
        assert_eq!(QualityBand::from_score(100), QualityBand::Good);
        assert_eq!(QualityBand::from_score(80), QualityBand::Good);
        assert_eq!(QualityBand::from_score(79), QualityBand::Fair);
        assert_eq!(QualityBand::from_score(60), QualityBand::Fair);
        assert_eq!(QualityBand::from_score(59), QualityBand::Poor);
        assert_eq!(QualityBand::from_score(0), QualityBand::Poor);
    }

    #[test]
    fn test_band_label() {
        assert_eq!(QualityBand::Good.label(), "Good story quality");
        assert_eq!(QualityBand::Poor.to_string(), "poor");
    }
}
