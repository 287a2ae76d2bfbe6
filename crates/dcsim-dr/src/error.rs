//! Demand-response error types.

use thiserror::Error;

/// Errors raised by the demand-response engine.
///
/// An unanswerable request is not one of them: that is reported through
/// [`SchedulingResult`](crate::SchedulingResult) with `bound_fitted` unset.
#[derive(Debug, Error)]
pub enum DrError {
    #[error("solver backend failed: {0}")]
    Solver(String),

    #[error("invalid demand-response settings: {0}")]
    InvalidSettings(String),

    #[error("core error: {0}")]
    Core(#[from] dcsim_core::SimError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] dcsim_scheduler::SchedulerError),
}

pub type DrResult<T> = Result<T, DrError>;
