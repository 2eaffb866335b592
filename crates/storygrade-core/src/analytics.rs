//! Project-level summaries over the latest ratings.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::domain::{EvaluationResult, QualityBand, StoryKey};
use crate::scoring::round_half_up;

/// Sub-scores below this count as a weakness of that dimension.
pub const WEAK_DIMENSION_THRESHOLD: u8 = 60;

/// Upper bounds of the score distribution buckets.
const BUCKET_UPPER_BOUNDS: [u8; 5] = [20, 40, 60, 80, 100];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandCounts {
    pub good: usize,
    pub fair: usize,
    pub poor: usize,
}

/// Scores in `min..=max`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBucket {
    pub min: u8,
    pub max: u8,
    pub count: usize,
}

impl ScoreBucket {
    pub fn label(&self) -> String {
        format!("{}-{}", self.min, self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeakStory {
    pub story_key: StoryKey,
    pub overall_score: u8,
}

/// Rated stories and their mean score within one sprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SprintTrend {
    pub sprint: String,
    pub rated: usize,
    pub average_score: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub project_key: String,
    pub rated: usize,
    /// Mean overall score, `None` when nothing is rated.
    pub average_score: Option<u8>,
    pub bands: BandCounts,
    pub distribution: Vec<ScoreBucket>,
    /// Stories scoring below the requested threshold, weakest first.
    pub weak_stories: Vec<WeakStory>,
    /// Per dimension id, how many stories scored below
    /// [`WEAK_DIMENSION_THRESHOLD`] on it.
    pub weak_dimensions: BTreeMap<String, usize>,
    /// Per-sprint averages in sprint order. Unsprinted results are left out.
    pub sprints: Vec<SprintTrend>,
}

/// Summarise the given results of one project.
pub fn summarize(
    project_key: &str,
    results: &[EvaluationResult],
    weak_threshold: u8,
) -> ProjectSummary {
    let mut bands = BandCounts::default();
    let mut distribution: Vec<ScoreBucket> = BUCKET_UPPER_BOUNDS
        .iter()
        .scan(0u8, |min, &max| {
            let bucket = ScoreBucket {
                min: *min,
                max,
                count: 0,
            };
            *min = max + 1;
            Some(bucket)
        })
        .collect();
    let mut weak_dimensions: BTreeMap<String, usize> = BTreeMap::new();
    let mut total: u64 = 0;

    for result in results {
        let score = result.overall_score;
        total += u64::from(score);

        match result.band() {
            QualityBand::Good => bands.good += 1,
            QualityBand::Fair => bands.fair += 1,
            QualityBand::Poor => bands.poor += 1,
        }

        if let Some(bucket) = distribution.iter_mut().find(|b| score <= b.max) {
            bucket.count += 1;
        }

        for (id, sub_score) in &result.dimension_scores {
            if *sub_score < WEAK_DIMENSION_THRESHOLD {
                *weak_dimensions.entry(id.clone()).or_insert(0) += 1;
            }
        }
    }

    let mut weak_stories: Vec<WeakStory> = results
        .iter()
        .filter(|r| r.overall_score < weak_threshold)
        .map(|r| WeakStory {
            story_key: r.story_key.clone(),
            overall_score: r.overall_score,
        })
        .collect();
    weak_stories.sort_by(|a, b| {
        a.overall_score
            .cmp(&b.overall_score)
            .then_with(|| a.story_key.cmp(&b.story_key))
    });

    let average_score = if results.is_empty() {
        None
    } else {
        Some(round_half_up(total, results.len() as u64))
    };

    ProjectSummary {
        project_key: project_key.to_string(),
        rated: results.len(),
        average_score,
        bands,
        distribution,
        weak_stories,
        weak_dimensions,
        sprints: sprint_trend(results),
    }
}

fn sprint_trend(results: &[EvaluationResult]) -> Vec<SprintTrend> {
    let mut totals: BTreeMap<&str, (usize, u64)> = BTreeMap::new();
    for result in results {
        if let Some(sprint) = result.sprint.as_deref() {
            let entry = totals.entry(sprint).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += u64::from(result.overall_score);
        }
    }

    let mut trend: Vec<SprintTrend> = totals
        .into_iter()
        .map(|(sprint, (rated, total))| SprintTrend {
            sprint: sprint.to_string(),
            rated,
            average_score: round_half_up(total, rated as u64),
        })
        .collect();
    trend.sort_by(|a, b| compare_sprints(&a.sprint, &b.sprint));
    trend
}

/// Name order, with a trailing number compared numerically.
fn compare_sprints(a: &str, b: &str) -> Ordering {
    let (a_stem, a_num) = split_trailing_number(a);
    let (b_stem, b_num) = split_trailing_number(b);
    a_stem
        .cmp(b_stem)
        .then_with(|| a_num.cmp(&b_num))
        .then_with(|| a.cmp(b))
}

fn split_trailing_number(name: &str) -> (&str, Option<u64>) {
    let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
    (stem, name[stem.len()..].parse().ok())
}

/// Results whose overall score lies in `range`, in input order.
pub fn results_in_range<'a>(
    results: &'a [EvaluationResult],
    range: RangeInclusive<u8>,
) -> impl Iterator<Item = &'a EvaluationResult> {
    results
        .iter()
        .filter(move |r| range.contains(&r.overall_score))
}
