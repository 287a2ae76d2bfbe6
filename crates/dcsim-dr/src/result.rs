//! Outcomes of a power adjustment.

use serde::{Deserialize, Serialize};

/// What one adjustment achieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulingResult {
    /// The power bound held on every tick of the window.
    pub bound_fitted: bool,
    /// Node-steps moved out of (or into) the window.
    pub shifted_node_steps: u64,
    /// Share of the eligible node-step volume that was moved.
    pub shifted_fraction: f64,
}

impl SchedulingResult {
    /// The schedule already met the bound; nothing was touched.
    pub fn untouched() -> Self {
        Self {
            bound_fitted: true,
            ..Self::default()
        }
    }

    pub fn refused() -> Self {
        Self::default()
    }
}

/// Result of [`adjust_power_consumption`](crate::DemandFlexibilityStrategy::adjust_power_consumption).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdjustOutcome {
    Completed(SchedulingResult),
    /// The shift matched the previous configuration's, so every downstream
    /// number would be the same as well.
    Unchanged,
}

impl AdjustOutcome {
    pub fn result(&self) -> Option<SchedulingResult> {
        match self {
            AdjustOutcome::Completed(result) => Some(*result),
            AdjustOutcome::Unchanged => None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.result().is_some_and(|r| r.bound_fitted)
    }
}
