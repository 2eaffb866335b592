//! Errors raised while editing a rubric.

/// Errors produced by rubric edit operations.
///
/// Weight-sum and range problems are not errors here; they are reported by
/// [`crate::domain::validate`] so a caller can surface all of them together.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RubricError {
    #[error("dimension id {id} already exists in this rubric tier")]
    DuplicateId { id: String },

    #[error("unknown dimension: {id}")]
    UnknownDimension { id: String },

    #[error("dimension name must contain at least one letter or digit")]
    EmptyName,
}

/// Result type for rubric edit operations.
pub type RubricResult<T> = std::result::Result<T, RubricError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rubric_error_display() {
        let err = RubricError::DuplicateId {
            id: "clarity".to_string(),
        };
        assert!(err.to_string().contains("clarity"));
        assert!(err.to_string().contains("already exists"));

        let err = RubricError::UnknownDimension {
            id: "velocity".to_string(),
        };
        assert!(err.to_string().contains("unknown dimension"));
    }
}
