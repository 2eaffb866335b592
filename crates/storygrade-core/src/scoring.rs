//! Weighted aggregate scoring.
//!
//! The aggregate is the weighted mean of enabled dimension sub-scores,
//! rounded half-up to an integer. Scoring refuses to run on a rubric that
//! fails validation, so an invalid rubric can never yield a plausible score.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{RubricConfig, ValidationReport, Violation};

/// Highest sub-score the rating service may return.
pub const MAX_SCORE: i64 = 100;

/// Errors produced while scoring.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringError {
    #[error("missing sub-scores for enabled dimensions: {}", missing.join(", "))]
    IncompleteScores { missing: Vec<String> },

    #[error("sub-score {score} for dimension {id} is outside 0..=100")]
    ScoreOutOfRange { id: String, score: i64 },

    #[error("rubric is not valid for scoring: {0}")]
    InvalidConfig(ValidationReport),
}

/// Result type for scoring operations.
pub type ScoringResult<T> = std::result::Result<T, ScoringError>;

/// Aggregate plus the sub-scores that went into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredRating {
    pub overall_score: u8,
    /// Only enabled dimensions; extra input scores are dropped.
    pub dimension_scores: BTreeMap<String, u8>,
}

/// Compute the weighted aggregate for `scores` under `config`.
///
/// Extra scores for disabled or unknown dimensions are ignored.
pub fn compute_overall_score(
    config: &RubricConfig,
    scores: &BTreeMap<String, i64>,
) -> ScoringResult<u8> {
    score_rating(config, scores).map(|rating| rating.overall_score)
}

/// Validate the rubric, check sub-scores, and compute the aggregate.
pub fn score_rating(
    config: &RubricConfig,
    scores: &BTreeMap<String, i64>,
) -> ScoringResult<ScoredRating> {
    let report = config.validate();
    if !report.is_valid() {
        return Err(ScoringError::InvalidConfig(report));
    }

    let total_weight = config.enabled_weight_sum();
    if total_weight == 0 {
        return Err(ScoringError::InvalidConfig(ValidationReport {
            violations: vec![Violation::EnabledWeightSum { sum: 0 }],
        }));
    }

    let missing: Vec<String> = config
        .enabled()
        .filter(|d| !scores.contains_key(&d.id))
        .map(|d| d.id.clone())
        .collect();
    if !missing.is_empty() {
        return Err(ScoringError::IncompleteScores { missing });
    }

    let mut dimension_scores = BTreeMap::new();
    let mut weighted_sum: u64 = 0;
    for dimension in config.enabled() {
        let raw = scores.get(&dimension.id).copied().unwrap_or_default();
        let score = checked_score(&dimension.id, raw)?;
        weighted_sum += u64::from(dimension.weight) * u64::from(score);
        dimension_scores.insert(dimension.id.clone(), score);
    }

    Ok(ScoredRating {
        overall_score: round_half_up(weighted_sum, total_weight),
        dimension_scores,
    })
}

fn checked_score(id: &str, raw: i64) -> ScoringResult<u8> {
    if !(0..=MAX_SCORE).contains(&raw) {
        return Err(ScoringError::ScoreOutOfRange {
            id: id.to_string(),
            score: raw,
        });
    }
    Ok(raw as u8)
}

/// `numerator / denominator` rounded half-up. Both are non-negative and the
/// quotient is a mean of values in 0..=100.
pub(crate) fn round_half_up(numerator: u64, denominator: u64) -> u8 {
    ((2 * numerator + denominator) / (2 * denominator)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RubricDimension;

    fn rubric() -> RubricConfig {
        RubricConfig::new(vec![
            RubricDimension::new("clarity", "Clarity", 25),
            RubricDimension::new("completeness", "Completeness", 25),
            RubricDimension::new("acceptance-criteria", "Acceptance Criteria", 25),
            RubricDimension::new("testability", "Testability", 15),
            RubricDimension::new("independence", "Independence", 10),
        ])
    }

    fn scores(pairs: &[(&str, i64)]) -> BTreeMap<String, i64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn full_scores() -> BTreeMap<String, i64> {
        scores(&[
            ("clarity", 90),
            ("completeness", 70),
            ("acceptance-criteria", 60),
            ("testability", 80),
            ("independence", 88),
        ])
    }

    #[test]
    fn test_weighted_average_rounds_half_up() {
        // (2250 + 1750 + 1500 + 1200 + 880) / 100 = 75.8
        assert_eq!(compute_overall_score(&rubric(), &full_scores()).unwrap(), 76);
    }

    #[test]
    fn test_exact_half_rounds_up() {
        let config = RubricConfig::new(vec![
            RubricDimension::new("a", "A", 50),
            RubricDimension::new("b", "B", 50),
        ]);
        let s = scores(&[("a", 70), ("b", 71)]);
        assert_eq!(compute_overall_score(&config, &s).unwrap(), 71);
    }

    #[test]
    fn test_extra_scores_are_ignored() {
        let mut s = full_scores();
        s.insert("velocity".to_string(), 5);
        s.insert("unknown".to_string(), 500);
        let rating = score_rating(&rubric(), &s).unwrap();
        assert_eq!(rating.overall_score, 76);
        assert!(!rating.dimension_scores.contains_key("velocity"));
        assert_eq!(rating.dimension_scores.len(), 5);
    }

    #[test]
    fn test_dimension_order_does_not_matter() {
        let mut reversed = rubric();
        reversed.dimensions.reverse();
        assert_eq!(
            compute_overall_score(&rubric(), &full_scores()).unwrap(),
            compute_overall_score(&reversed, &full_scores()).unwrap()
        );
    }

    #[test]
    fn test_missing_enabled_score_fails() {
        let mut s = full_scores();
        s.remove("testability");
        s.remove("clarity");
        let err = compute_overall_score(&rubric(), &s).unwrap_err();
        assert_eq!(
            err,
            ScoringError::IncompleteScores {
                missing: vec!["clarity".to_string(), "testability".to_string()]
            }
        );
    }

    #[test]
    fn test_disabled_dimension_needs_no_score() {
        let config = rubric()
            .set_enabled("independence", false)
            .unwrap()
            .set_weight("clarity", 35)
            .unwrap();
        let mut s = full_scores();
        s.remove("independence");
        // (3150 + 1750 + 1500 + 1200) / 100 = 76
        assert_eq!(compute_overall_score(&config, &s).unwrap(), 76);
    }

    #[test]
    fn test_out_of_range_score_is_rejected() {
        let mut s = full_scores();
        s.insert("clarity".to_string(), 101);
        assert_eq!(
            compute_overall_score(&rubric(), &s).unwrap_err(),
            ScoringError::ScoreOutOfRange {
                id: "clarity".to_string(),
                score: 101
            }
        );

        s.insert("clarity".to_string(), -1);
        assert!(matches!(
            compute_overall_score(&rubric(), &s),
            Err(ScoringError::ScoreOutOfRange { score: -1, .. })
        ));
    }

    #[test]
    fn test_invalid_rubric_refuses_to_score() {
        let config = rubric().set_enabled("independence", false).unwrap();
        let err = compute_overall_score(&config, &full_scores()).unwrap_err();
        match err {
            ScoringError::InvalidConfig(report) => {
                assert_eq!(
                    report.violations,
                    vec![Violation::EnabledWeightSum { sum: 90 }]
                );
            }
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_all_disabled_is_invalid_config() {
        let config = RubricConfig::new(vec![
            RubricDimension::new("a", "A", 100).with_enabled(false)
        ]);
        assert!(matches!(
            compute_overall_score(&config, &BTreeMap::new()),
            Err(ScoringError::InvalidConfig(_))
        ));
    }
}
