// src/promise/mod.rs

//! Promise engine: declared structural constraints and their enforcement.
//!
//! Tasks declare constraints on how they may grow the graph. The
//! [`PromiseEngine`] checks every proposed mutation against the origin's
//! effective constraint set and its [`PromiseRecord`] tally, and verifies
//! obligations (`ExactlyOneOf`, `AllOf`) when the task finishes.

pub mod constraint;
pub mod engine;
pub mod tally;
pub mod violation;

pub use constraint::{
    validate_declared, Constraint, ConstraintOrigin, ConstraintSet, DeclaredConstraint,
    EffectiveConstraint, RegistrationConstraints, SuccessorTemplate,
};
pub use engine::PromiseEngine;
pub use tally::PromiseRecord;
pub use violation::Violation;
