//! Demand flexibility: reshape the schedule until a power bound holds.
//!
//! One adjustment runs, in order:
//!
//! 1. size the eligible node-step volume and scale it by the shifting
//!    fraction
//! 2. shift that volume (postpone for a decrease, prepone for an increase)
//! 3. re-clock every job in the window to the scaling frequency
//! 4. compact the window (decrease only)
//! 5. check the bound on a fast-forwarded snapshot

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use dcsim_core::{Cluster, Direction, SimConfig};

use crate::compaction::ScheduleCompactor;
use crate::dvfs::{DvfsStrategy, ScaleAllJobs};
use crate::error::{DrError, DrResult};
use crate::evaluator::{PowerBound, bound_holds};
use crate::result::{AdjustOutcome, SchedulingResult};
use crate::shifting::{LongestSlackFirst, ShiftBudget, ShiftingStrategy};
use crate::solver::IlpSolver;

/// Which levers an extremal schedule may pull.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlexibilityMode {
    #[default]
    Combined,
    ShiftingOnly,
    DvfsOnly,
}

/// Which end of the demand range an extremal schedule aims for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemandExtreme {
    Minimum,
    Maximum,
}

#[derive(Debug, Clone)]
pub struct DemandFlexibilityStrategy {
    shifting: Arc<dyn ShiftingStrategy>,
    dvfs: Arc<dyn DvfsStrategy>,
    compactor: ScheduleCompactor,
    shifting_fraction: f64,
    scaling_frequency: f64,
    previously_shifted: Option<u64>,
    min_frequency: f64,
    max_frequency: f64,
}

impl DemandFlexibilityStrategy {
    pub fn new(
        shifting: Arc<dyn ShiftingStrategy>,
        dvfs: Arc<dyn DvfsStrategy>,
        compactor: ScheduleCompactor,
        min_frequency: f64,
        max_frequency: f64,
    ) -> DrResult<Self> {
        if !(min_frequency > 0.0 && min_frequency <= max_frequency) {
            return Err(DrError::InvalidSettings(format!(
                "frequency range {min_frequency}..{max_frequency} is empty"
            )));
        }
        Ok(Self {
            shifting,
            dvfs,
            compactor,
            shifting_fraction: 1.0,
            scaling_frequency: max_frequency,
            previously_shifted: None,
            min_frequency,
            max_frequency,
        })
    }

    /// Longest-slack-first shifting, scale-all DVFS and compaction through
    /// `solver`, with the frequency range and solver limits of `config`.
    pub fn from_config(config: &SimConfig, solver: Arc<dyn IlpSolver>) -> DrResult<Self> {
        let dr = &config.demand_response;
        let compactor = ScheduleCompactor::new(
            solver,
            Duration::from_secs(dr.solver_timeout_secs),
            dr.compaction_slot_steps,
        );
        Self::new(
            Arc::new(LongestSlackFirst),
            Arc::new(ScaleAllJobs),
            compactor,
            dr.min_frequency,
            dr.max_frequency,
        )
    }

    /// Set the shifting fraction and scaling frequency of the next
    /// adjustment.
    pub fn configure(&mut self, shifting_fraction: f64, scaling_frequency: f64) {
        self.shifting_fraction = shifting_fraction.clamp(0.0, 1.0);
        self.scaling_frequency = scaling_frequency.clamp(self.min_frequency, self.max_frequency);
    }

    /// Shift achieved by the previously tried configuration, if any.
    pub fn set_previously_shifted(&mut self, shifted: Option<u64>) {
        self.previously_shifted = shifted;
    }

    pub fn shifting_fraction(&self) -> f64 {
        self.shifting_fraction
    }

    pub fn scaling_frequency(&self) -> f64 {
        self.scaling_frequency
    }

    pub fn shifting(&self) -> &dyn ShiftingStrategy {
        self.shifting.as_ref()
    }

    pub fn dvfs(&self) -> &dyn DvfsStrategy {
        self.dvfs.as_ref()
    }

    /// Reshape `[now, now + length)` so that `bound` holds, as far as the
    /// configured fraction and frequency allow.
    pub fn adjust_power_consumption(
        &self,
        cluster: &mut Cluster,
        bound: &PowerBound,
        length: i64,
    ) -> DrResult<AdjustOutcome> {
        let (volume, shifted) = match bound.direction {
            Direction::Decrease => {
                let volume = self.shifting.postponable_volume(cluster, length);
                let budget = ShiftBudget::Limited((volume as f64 * self.shifting_fraction) as u64);
                (volume, self.shifting.postpone(cluster, budget, length))
            }
            Direction::Increase => {
                let volume = self.shifting.preponable_volume(cluster, length);
                let budget = ShiftBudget::Limited((volume as f64 * self.shifting_fraction) as u64);
                (volume, self.shifting.prepone(cluster, budget, length))
            }
        };

        if self.previously_shifted == Some(shifted) {
            debug!(shifted, "same shift as the previous configuration");
            return Ok(AdjustOutcome::Unchanged);
        }

        self.dvfs.scale(cluster, self.scaling_frequency, length);

        if bound.direction == Direction::Decrease {
            let candidates = self.dvfs.scalable_jobs(cluster, length);
            self.compactor.compact(cluster, &candidates, length)?;
        }

        let fitted = bound_holds(cluster, bound, length);
        let shifted_fraction = if volume > 0 {
            shifted as f64 / volume as f64
        } else {
            0.0
        };
        info!(
            direction = %bound.direction,
            fraction = self.shifting_fraction,
            frequency = self.scaling_frequency,
            shifted,
            fitted,
            "power consumption adjusted"
        );
        Ok(AdjustOutcome::Completed(SchedulingResult {
            bound_fitted: fitted,
            shifted_node_steps: shifted,
            shifted_fraction,
        }))
    }

    /// Push the window to one end of the demand range, without a bound.
    pub fn schedule_for_extreme(
        &self,
        cluster: &mut Cluster,
        extreme: DemandExtreme,
        mode: FlexibilityMode,
        length: i64,
    ) {
        let shift = mode != FlexibilityMode::DvfsOnly;
        let scale = mode != FlexibilityMode::ShiftingOnly;
        match extreme {
            DemandExtreme::Minimum => {
                if shift {
                    self.shifting.schedule_for_minimum_demand(cluster, length);
                }
                if scale {
                    self.dvfs.scale(cluster, self.min_frequency, length);
                }
            }
            DemandExtreme::Maximum => {
                if shift {
                    self.shifting.schedule_for_maximum_demand(cluster, length);
                }
                if scale {
                    self.dvfs.scale(cluster, self.max_frequency, length);
                }
            }
        }
        debug!(?extreme, ?mode, length, "extremal schedule applied");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::MicroLp;
    use dcsim_core::{ClusterSettings, JobId, JobSpec, Models, QueueKind, WorkloadSpec};

    fn strategy() -> DemandFlexibilityStrategy {
        DemandFlexibilityStrategy::from_config(&SimConfig::default(), Arc::new(MicroLp)).unwrap()
    }

    fn busy_cluster() -> Cluster {
        let settings = ClusterSettings {
            capacity: 4,
            ..ClusterSettings::default()
        };
        let spec = |id: &str, deadline| JobSpec {
            id: id.to_string(),
            nodes: 2,
            duration: 20,
            frequency: 2.7,
            job_class: 0,
            submission: 0,
            start: 0,
            deadline: Some(deadline),
        };
        let workload = WorkloadSpec {
            jobs: vec![spec("urgent", 25), spec("relaxed", 1000)],
        };
        let mut cluster = Cluster::from_workload(settings, Models::default(), &workload, Vec::new());
        cluster.update_job_allocation(false, false);
        cluster.commit_placement(JobId(0), 0, QueueKind::Submitted);
        cluster.commit_placement(JobId(1), 0, QueueKind::Submitted);
        cluster
    }

    #[test]
    fn configure_clamps_to_the_frequency_range() {
        let mut strategy = strategy();
        strategy.configure(1.5, 9.0);
        assert_eq!(strategy.shifting_fraction(), 1.0);
        assert_eq!(strategy.scaling_frequency(), 2.7);
    }

    #[test]
    fn impossible_decrease_is_not_fitted() {
        let mut cluster = busy_cluster();
        let mut strategy = strategy();
        strategy.configure(1.0, 1.2);
        let bound = PowerBound {
            watts: -1.0,
            direction: Direction::Decrease,
        };
        let outcome = strategy.adjust_power_consumption(&mut cluster, &bound, 10).unwrap();
        let result = outcome.result().unwrap();
        assert!(!result.bound_fitted);
        assert!(result.shifted_node_steps > 0);
    }

    #[test]
    fn repeated_shift_short_circuits() {
        let mut cluster = busy_cluster();
        let mut strategy = strategy();
        strategy.configure(0.0, 2.7);
        strategy.set_previously_shifted(Some(0));
        let bound = PowerBound {
            watts: 0.0,
            direction: Direction::Decrease,
        };
        let outcome = strategy.adjust_power_consumption(&mut cluster, &bound, 10).unwrap();
        assert_eq!(outcome, AdjustOutcome::Unchanged);
    }

    #[test]
    fn full_postpone_empties_the_window() {
        let mut cluster = busy_cluster();
        let mut strategy = strategy();
        strategy.configure(1.0, 2.7);
        let bound = PowerBound {
            watts: 0.0,
            direction: Direction::Decrease,
        };
        let outcome = strategy.adjust_power_consumption(&mut cluster, &bound, 10).unwrap();
        assert!(outcome.is_fitted());
        assert_eq!(outcome.result().unwrap().shifted_fraction, 1.0);
    }
}
