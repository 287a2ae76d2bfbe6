//! Error types for the simulator core.

use thiserror::Error;

/// Result type alias for core operations.
pub type SimResult<T> = Result<T, SimError>;

/// Errors raised while building a simulation. Nothing in here is raised
/// once the clock runs: infeasibility is expressed in return types.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid workload: {0}")]
    InvalidWorkload(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Flags a broken internal invariant.
///
/// Logs through `tracing::error!` and trips a `debug_assert!`, so the
/// violation panics under test and in debug builds but only logs in
/// release builds.
#[macro_export]
macro_rules! invariant {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            let message = format!($($arg)+);
            $crate::__tracing::error!(%message, "invariant violated");
            debug_assert!(false, "invariant violated: {}", message);
        }
    };
}
