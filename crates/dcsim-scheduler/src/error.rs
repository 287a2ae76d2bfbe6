//! Scheduler error types.

use thiserror::Error;

/// Errors raised while setting up a scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown scheduling strategy: {0}")]
    UnknownStrategy(String),

    #[error("invalid scheduler settings: {0}")]
    InvalidSettings(String),

    #[error("core error: {0}")]
    Core(#[from] dcsim_core::SimError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
