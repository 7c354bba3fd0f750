//! Execution of a full pass over a source.
//!
//! This module provides:
//! - The execution environment driving source -> transform -> sink
//! - Re-runnable tasks and the failure envelope delivered to listeners
//! - Retry policies and stock listeners

mod env;
mod failure;
mod retry;
mod task;

#[cfg(test)]
mod integration_tests;

pub use env::{ExecutionEnvironment, RunSummary};
pub use failure::{CollectingListener, FailureListener, TaskFailure};
pub use retry::{RetryPolicy, RetryingListener};
pub use task::Task;
