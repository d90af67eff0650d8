//! Error types for boundary enforcement.

use super::enforcer::BoundaryViolation;

/// Errors produced by the boundary layer.
#[derive(Debug, thiserror::Error)]
pub enum BoundaryError {
    /// A blocking violation. Warning-level denials never surface as errors.
    #[error("boundary violation: {0}")]
    Blocked(Box<BoundaryViolation>),

    #[error("duplicate role definition: {role}")]
    DuplicateRole { role: String },
}

impl BoundaryError {
    /// The violation behind a `Blocked` error.
    pub fn violation(&self) -> Option<&BoundaryViolation> {
        match self {
            BoundaryError::Blocked(v) => Some(v),
            _ => None,
        }
    }
}

/// Result type for boundary operations.
pub type BoundaryResult<T> = std::result::Result<T, BoundaryError>;
