//! Scheduler error types.

use thiserror::Error;

/// Errors surfaced to callers of the coordinator.
///
/// Deployment transport failures never appear here; they are retried and
/// recorded on the task.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("no eligible edge node for function {0}")]
    NoCapacity(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
