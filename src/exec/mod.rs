// src/exec/mod.rs

//! Task execution layer.
//!
//! Task code is external: it is supplied as a [`TaskRunner`] and invoked
//! for every dispatched task. Results flow back to the orchestration
//! runtime as `RuntimeEvent`s.
//!
//! - [`runner`] defines the runner contract, [`TaskResult`] and the
//!   type-keyed [`RunnerRegistry`].
//! - [`context`] is the handle a running task uses to propose mutations.
//! - [`executor_loop`] owns the main executor loop which manages running tasks.
//! - [`task_runner`] drives a single runner future with cancellation.
//! - [`backend`] provides the `ExecutorBackend` trait and a concrete
//!   `RealExecutorBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod backend;
pub mod context;
pub mod executor_loop;
pub mod runner;
pub mod task_runner;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use context::TaskContext;
pub use executor_loop::{spawn_executor, ExecutorCommand};
pub use runner::{RunnerRegistry, TaskFuture, TaskResult, TaskRunner};
