//! A single weighted rubric dimension.

use serde::{Deserialize, Serialize};

use crate::domain::error::{RubricError, RubricResult};

/// One named quality axis of a rubric (e.g. Clarity).
///
/// Disabled dimensions stay in the configuration so they can be re-enabled
/// later, but they never contribute to a score.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RubricDimension {
    /// Stable slug, unique within one rubric tier.
    pub id: String,
    /// Display label.
    pub name: String,
    /// Integer percentage in 0..=100.
    pub weight: u32,
    /// Whether the dimension takes part in scoring.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl RubricDimension {
    /// Create an enabled dimension with an explicit id.
    pub fn new(id: impl Into<String>, name: impl Into<String>, weight: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            weight,
            enabled: true,
        }
    }

    /// Create an enabled dimension whose id is derived from `name`.
    pub fn from_name(name: &str, weight: u32) -> RubricResult<Self> {
        let id = dimension_slug(name)?;
        Ok(Self::new(id, name.trim(), weight))
    }

    /// Return a copy with `enabled` set.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Derive a dimension id from a display name.
///
/// `"Acceptance Criteria"` becomes `"acceptance-criteria"`. Names with no
/// letters or digits have no usable slug.
pub fn dimension_slug(name: &str) -> RubricResult<String> {
    let id = slug::slugify(name);
    if id.is_empty() {
        return Err(RubricError::EmptyName);
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_from_display_name() {
        assert_eq!(dimension_slug("Clarity").unwrap(), "clarity");
        assert_eq!(
            dimension_slug("  Acceptance   Criteria ").unwrap(),
            "acceptance-criteria"
        );
    }

    #[test]
    fn test_slug_rejects_punctuation_only() {
        assert_eq!(dimension_slug("!!!"), Err(RubricError::EmptyName));
        assert_eq!(dimension_slug(""), Err(RubricError::EmptyName));
    }

    #[test]
    fn test_enabled_defaults_to_true_when_missing() {
        let dim: RubricDimension =
            serde_json::from_str(r#"{"id":"clarity","name":"Clarity","weight":25}"#).unwrap();
        assert!(dim.enabled);
        assert_eq!(dim.weight, 25);
    }

    #[test]
    fn test_from_name_trims_label() {
        let dim = RubricDimension::from_name(" Security ", 10).unwrap();
        assert_eq!(dim.id, "security");
        assert_eq!(dim.name, "Security");
        assert!(dim.enabled);
    }
}
