// src/sched/mod.rs

//! Scheduling over the live graph.
//!
//! - [`scheduler`] contains the state machine that admits ready tasks,
//!   routes spawn requests through the promise engine and decides when the
//!   workflow ends.
//! - [`state_manager`] computes readiness (including held tasks) and
//!   propagates failures.
//! - [`step`] defines the result type for scheduler steps.
//! - [`invocation`] is what the runner receives for a dispatched task.

pub mod invocation;
pub mod scheduler;
pub mod state_manager;
pub mod step;

pub use invocation::TaskInvocation;
pub use scheduler::Scheduler;
pub use state_manager::{Readiness, ReadOnlyStateManager};
pub use step::SchedulerStep;
