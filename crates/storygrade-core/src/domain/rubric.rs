//! Rubric tiers and the merge between them.
//!
//! A tenant owns one base [`RubricConfig`]. A project may carry a
//! [`RubricOverride`] which [`resolve`] layers on top of the base:
//! - an override dimension replaces the base dimension with the same id
//! - base dimensions listed in `removed` are dropped
//! - override dimensions unknown to the base are appended

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::dimension::RubricDimension;
use crate::domain::error::{RubricError, RubricResult};
use crate::domain::validation::{validate, ValidationReport, REQUIRED_WEIGHT_SUM};

// ---------------------------------------------------------------------------
// RubricConfig
// ---------------------------------------------------------------------------

/// Ordered set of dimensions. Order is display order only.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RubricConfig {
    #[serde(default)]
    pub dimensions: Vec<RubricDimension>,
}

impl RubricConfig {
    pub fn new(dimensions: Vec<RubricDimension>) -> Self {
        Self { dimensions }
    }

    /// The tenant-wide rubric used when no base has been saved yet.
    pub fn default_base() -> Self {
        Self::new(vec![
            RubricDimension::new("clarity", "Clarity", 25),
            RubricDimension::new("completeness", "Completeness", 20),
            RubricDimension::new("acceptance-criteria", "Acceptance Criteria", 25),
            RubricDimension::new("testability", "Testability", 15),
            RubricDimension::new("independence", "Independence", 15),
        ])
    }

    pub fn dimensions(&self) -> &[RubricDimension] {
        &self.dimensions
    }

    pub fn get(&self, id: &str) -> Option<&RubricDimension> {
        self.dimensions.iter().find(|d| d.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Dimensions that take part in scoring.
    pub fn enabled(&self) -> impl Iterator<Item = &RubricDimension> {
        self.dimensions.iter().filter(|d| d.enabled)
    }

    pub fn enabled_weight_sum(&self) -> u64 {
        self.enabled().map(|d| u64::from(d.weight)).sum()
    }

    /// Check this configuration. See [`validate`].
    pub fn validate(&self) -> ValidationReport {
        validate(self)
    }

    /// Append a dimension whose id is the slug of `name`.
    ///
    /// Fails with [`RubricError::DuplicateId`] when the slug is already taken;
    /// the caller must pick another name.
    pub fn add_dimension(mut self, name: &str, weight: u32) -> RubricResult<Self> {
        let dimension = RubricDimension::from_name(name, weight)?;
        if self.contains(&dimension.id) {
            return Err(RubricError::DuplicateId { id: dimension.id });
        }
        self.dimensions.push(dimension);
        Ok(self)
    }

    /// Drop a dimension. Remaining weights are left untouched, so the result
    /// may need revalidation.
    pub fn remove_dimension(mut self, id: &str) -> Self {
        self.dimensions.retain(|d| d.id != id);
        self
    }

    pub fn set_weight(mut self, id: &str, weight: u32) -> RubricResult<Self> {
        self.dimension_mut(id)?.weight = weight;
        Ok(self)
    }

    pub fn set_enabled(mut self, id: &str, enabled: bool) -> RubricResult<Self> {
        self.dimension_mut(id)?.enabled = enabled;
        Ok(self)
    }

    /// Proportionally rescale enabled weights so they sum to exactly 100.
    ///
    /// Uses largest-remainder rounding; ties go to the earlier dimension.
    /// Disabled dimensions keep their stored weight. A rubric with no enabled
    /// weight is returned unchanged.
    pub fn rescaled(&self) -> Self {
        let total = self.enabled_weight_sum();
        if total == 0 || total == REQUIRED_WEIGHT_SUM {
            return self.clone();
        }

        let mut shares: Vec<(usize, u64, u64)> = self
            .dimensions
            .iter()
            .enumerate()
            .filter(|(_, d)| d.enabled)
            .map(|(idx, d)| {
                let scaled = u64::from(d.weight) * REQUIRED_WEIGHT_SUM;
                (idx, scaled / total, scaled % total)
            })
            .collect();

        let assigned: u64 = shares.iter().map(|(_, floor, _)| *floor).sum();
        let mut leftover = REQUIRED_WEIGHT_SUM - assigned;

        shares.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
        let mut out = self.clone();
        for (idx, floor, _) in shares {
            let bump = if leftover > 0 {
                leftover -= 1;
                1
            } else {
                0
            };
            // floor + bump never exceeds REQUIRED_WEIGHT_SUM
            out.dimensions[idx].weight = (floor + bump) as u32;
        }
        out
    }

    /// SHA-256 hex digest of the canonical JSON form.
    ///
    /// Two rubrics with the same dimensions in the same order share a digest.
    pub fn digest(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&canonical))
    }

    fn dimension_mut(&mut self, id: &str) -> RubricResult<&mut RubricDimension> {
        self.dimensions
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| RubricError::UnknownDimension { id: id.to_string() })
    }
}

// ---------------------------------------------------------------------------
// RubricOverride
// ---------------------------------------------------------------------------

/// Project-specific layer on top of the base rubric.
///
/// Removals are recorded explicitly: a base dimension that is simply absent
/// from `dimensions` is still inherited.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RubricOverride {
    /// Replacements for base dimensions plus project-only dimensions.
    #[serde(default)]
    pub dimensions: Vec<RubricDimension>,
    /// Ids of base dimensions this project does not inherit.
    #[serde(default)]
    pub removed: Vec<String>,
    /// Free-text description of the project's domain, handed to the rating
    /// service. Not part of the merged rubric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_context: Option<String>,
}

impl RubricOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&RubricDimension> {
        self.dimensions.iter().find(|d| d.id == id)
    }

    pub fn is_removed(&self, id: &str) -> bool {
        self.removed.iter().any(|r| r == id)
    }

    pub fn with_domain_context(mut self, context: impl Into<String>) -> Self {
        self.domain_context = Some(context.into());
        self
    }

    /// Replace or append a dimension in this tier.
    pub fn upsert(mut self, dimension: RubricDimension) -> Self {
        self.removed.retain(|r| *r != dimension.id);
        match self.dimensions.iter_mut().find(|d| d.id == dimension.id) {
            Some(existing) => *existing = dimension,
            None => self.dimensions.push(dimension),
        }
        self
    }

    /// Add a project-only dimension. Collisions are checked against this tier.
    pub fn add_dimension(self, name: &str, weight: u32) -> RubricResult<Self> {
        let dimension = RubricDimension::from_name(name, weight)?;
        if self.get(&dimension.id).is_some() {
            return Err(RubricError::DuplicateId { id: dimension.id });
        }
        Ok(self.upsert(dimension))
    }

    /// Stop inheriting (or drop the project copy of) a dimension.
    pub fn remove_dimension(mut self, id: &str) -> Self {
        self.dimensions.retain(|d| d.id != id);
        if !self.is_removed(id) {
            self.removed.push(id.to_string());
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Layer a project override on top of the base rubric.
///
/// Base order is kept for inherited and replaced dimensions; project-only
/// dimensions follow in override order. A dimension supplied by the override
/// is always kept, even if its id is also listed as removed.
pub fn resolve(base: &RubricConfig, overrides: Option<&RubricOverride>) -> RubricConfig {
    let Some(overrides) = overrides else {
        return base.clone();
    };

    let mut dimensions = Vec::with_capacity(base.dimensions.len() + overrides.dimensions.len());
    for dimension in &base.dimensions {
        match overrides.get(&dimension.id) {
            Some(replacement) => dimensions.push(replacement.clone()),
            None if overrides.is_removed(&dimension.id) => {}
            None => dimensions.push(dimension.clone()),
        }
    }
    dimensions.extend(
        overrides
            .dimensions
            .iter()
            .filter(|d| !base.contains(&d.id))
            .cloned(),
    );

    RubricConfig::new(dimensions)
}
