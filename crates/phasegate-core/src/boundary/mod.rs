//! Capability/restriction-based access control for role actions.
//!
//! Evaluation order is fixed: restrictions (deny-list, always wins), then
//! capabilities, then phase assignment. See [`BoundaryEnforcer`].

pub mod definition;
pub mod enforcer;
pub mod error;
pub mod pattern;

pub use definition::{Capability, EnforcementLevel, PhaseScope, Restriction, RoleDefinition};
pub use enforcer::{
    ActionRequest, BoundaryCheck, BoundaryEnforcer, BoundaryViolation, ViolationLedgerSnapshot,
    ViolationReason, ViolationSeverity, ViolationStats,
};
pub use error::{BoundaryError, BoundaryResult};
pub use pattern::ResourcePattern;
