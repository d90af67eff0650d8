//! Error types for context assembly and inheritance.

/// Errors produced by the context layer.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ContextError {
    /// Core and reference tiers are never trimmed, so a budget smaller than
    /// both together cannot be met.
    #[error("core ({core_size}) + reference ({reference_size}) exceed max context size {max_size}")]
    CoreExceedsBudget {
        core_size: usize,
        reference_size: usize,
        max_size: usize,
    },

    #[error("inheritance chain is empty")]
    EmptyChain,

    #[error("invalid context budget: {0}")]
    InvalidBudget(String),
}

/// Result type for context operations.
pub type ContextResult<T> = std::result::Result<T, ContextError>;
