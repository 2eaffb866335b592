//! Rubric validation.
//!
//! [`validate`] collects every violation in one pass so a UI can highlight
//! all offending dimensions at once. Invalid input is a reportable value,
//! never an error.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::dimension::RubricDimension;
use crate::domain::rubric::RubricConfig;

/// Upper bound for a single dimension weight.
pub const MAX_WEIGHT: u32 = 100;

/// Required sum of enabled weights.
pub const REQUIRED_WEIGHT_SUM: u64 = 100;

/// A single rule broken by a rubric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Violation {
    /// More than one dimension uses this id.
    DuplicateId { id: String },
    /// Weight is outside 0..=100.
    WeightOutOfRange { id: String, weight: u32 },
    /// The dimension has an empty id.
    EmptyId { name: String },
    /// The dimension has an empty display name.
    EmptyName { id: String },
    /// Enabled weights do not add up to 100.
    EnabledWeightSum { sum: u64 },
}

impl Violation {
    /// Id of the dimension this violation points at, if any.
    pub fn dimension_id(&self) -> Option<&str> {
        match self {
            Violation::DuplicateId { id }
            | Violation::WeightOutOfRange { id, .. }
            | Violation::EmptyName { id } => Some(id),
            Violation::EmptyId { .. } | Violation::EnabledWeightSum { .. } => None,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::DuplicateId { id } => write!(f, "duplicate dimension id '{id}'"),
            Violation::WeightOutOfRange { id, weight } => {
                write!(f, "dimension '{id}' weight {weight} is outside 0..={MAX_WEIGHT}")
            }
            Violation::EmptyId { name } => write!(f, "dimension '{name}' has an empty id"),
            Violation::EmptyName { id } => write!(f, "dimension '{id}' has an empty name"),
            Violation::EnabledWeightSum { sum } => write!(
                f,
                "enabled weights sum to {sum}, expected {REQUIRED_WEIGHT_SUM}"
            ),
        }
    }
}

/// Every violation found in a rubric. Empty means valid.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Ids of dimensions that need attention.
    pub fn offending_ids(&self) -> BTreeSet<&str> {
        self.violations
            .iter()
            .filter_map(Violation::dimension_id)
            .collect()
    }

    /// Append violations from `other` that are not already present.
    pub fn absorb(&mut self, other: ValidationReport) {
        for violation in other.violations {
            if !self.violations.contains(&violation) {
                self.violations.push(violation);
            }
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            return f.write_str("valid");
        }
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

/// Check a rubric: unique ids, non-empty labels, weights in range, and
/// enabled weights summing to exactly 100.
pub fn validate(config: &RubricConfig) -> ValidationReport {
    let mut violations = check_dimensions(&config.dimensions);

    let sum = config.enabled_weight_sum();
    if sum != REQUIRED_WEIGHT_SUM {
        violations.push(Violation::EnabledWeightSum { sum });
    }

    ValidationReport { violations }
}

/// Per-dimension checks, without the weight-sum rule.
///
/// Used on its own for a project override, whose dimensions need not sum to
/// 100 until merged with the base.
pub fn check_dimensions(dimensions: &[RubricDimension]) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();

    for dimension in dimensions {
        if dimension.id.trim().is_empty() {
            violations.push(Violation::EmptyId {
                name: dimension.name.clone(),
            });
        } else if !seen.insert(dimension.id.as_str()) && reported.insert(dimension.id.as_str()) {
            violations.push(Violation::DuplicateId {
                id: dimension.id.clone(),
            });
        }

        if dimension.name.trim().is_empty() {
            violations.push(Violation::EmptyName {
                id: dimension.id.clone(),
            });
        }

        if dimension.weight > MAX_WEIGHT {
            violations.push(Violation::WeightOutOfRange {
                id: dimension.id.clone(),
                weight: dimension.weight,
            });
        }
    }

    violations
}
