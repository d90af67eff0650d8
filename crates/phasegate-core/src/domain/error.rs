//! Domain-level error taxonomy for phasegate.

/// Errors produced when parsing domain vocabulary from strings.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("unknown workflow phase: {0}")]
    UnknownPhase(String),

    #[error("unknown role action: {0}")]
    UnknownAction(String),

    #[error("invalid task {id}: {reason}")]
    InvalidTask { id: String, reason: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = std::result::Result<T, DomainError>;
