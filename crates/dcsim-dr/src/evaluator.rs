//! Speculative evaluation of a power bound.
//!
//! The cluster is snapshotted and the snapshot fast-forwarded through the
//! window one tick at a time. The live cluster is never touched.

use tracing::debug;

use dcsim_core::{Cluster, Direction, PowerType};

/// A ceiling (for a decrease) or floor (for an increase) on facility draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerBound {
    /// Watts.
    pub watts: f64,
    pub direction: Direction,
}

impl PowerBound {
    /// Bound `delta_kw` below or above `base_watts`.
    pub fn around(base_watts: f64, delta_kw: f64, direction: Direction) -> Self {
        let delta = delta_kw * 1000.0;
        let watts = match direction {
            Direction::Decrease => base_watts - delta,
            Direction::Increase => base_watts + delta,
        };
        Self { watts, direction }
    }

    pub fn is_violated_by(&self, watts: f64) -> bool {
        match self.direction {
            Direction::Decrease => watts > self.watts,
            Direction::Increase => watts < self.watts,
        }
    }
}

/// Whether the bound holds on each of the next `length` ticks. Stops at
/// the first violation.
pub fn bound_holds(cluster: &Cluster, bound: &PowerBound, length: i64) -> bool {
    let start = cluster.clock();
    let mut copy = cluster.snapshot(start + length);
    for _ in 0..length {
        copy.update_job_allocation(true, true);
        let power = copy.power(PowerType::TotalFacility);
        if bound.is_violated_by(power) {
            debug!(tick = copy.clock() - 1, power, bound = bound.watts, "power bound violated");
            return false;
        }
    }
    true
}
