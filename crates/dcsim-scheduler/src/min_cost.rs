//! Minimum-cost placement.
//!
//! Every (start, frequency) pair over the look-ahead horizon is priced as
//! the SLA fee of the implied finish plus the energy bill under the
//! time-varying price. Options are tried cheapest first; the first one both
//! the horizon plan and the interval plan accept is committed.

use tracing::{debug, info};

use dcsim_core::config::frequency_grid;
use dcsim_core::{BatchJob, Cluster, JobStatus, NodeOccupationPlan, QueueKind, SimConfig, Tick};

use crate::error::{SchedulerError, SchedulerResult};
use crate::strategy::{IntervalOutcome, SchedulingStrategy, gather_candidates};

#[derive(Debug, Clone)]
pub struct MinimumCostStrategy {
    look_ahead_secs: i64,
    start_step_secs: i64,
    frequencies: Vec<f64>,
}

/// One priced placement option.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricedOption {
    pub start: Tick,
    pub frequency: f64,
    pub cost: f64,
}

impl MinimumCostStrategy {
    pub fn new(look_ahead_secs: i64, start_step_secs: i64, frequencies: Vec<f64>) -> SchedulerResult<Self> {
        if start_step_secs <= 0 || look_ahead_secs < 0 {
            return Err(SchedulerError::InvalidSettings(
                "minimum-cost placement needs a positive start step and a non-negative look-ahead".to_string(),
            ));
        }
        if frequencies.is_empty() {
            return Err(SchedulerError::InvalidSettings(
                "minimum-cost placement needs at least one frequency".to_string(),
            ));
        }
        Ok(Self {
            look_ahead_secs,
            start_step_secs,
            frequencies,
        })
    }

    pub fn from_config(config: &SimConfig) -> SchedulerResult<Self> {
        let dr = &config.demand_response;
        Self::new(
            config.scheduling.look_ahead_secs,
            config.scheduling.start_step_secs,
            frequency_grid(dr.min_frequency, dr.max_frequency, dr.frequency_step),
        )
    }

    /// All options for `job`, cheapest first. Ties keep grid order: earlier
    /// start, then lower frequency.
    pub fn price_options(&self, cluster: &Cluster, job: &BatchJob) -> Vec<PricedOption> {
        let now = cluster.clock();
        let spp = cluster.settings.seconds_per_step.max(1) as i64;
        let horizon = self.look_ahead_secs / spp;
        let step = (self.start_step_secs / spp).max(1);

        let mut options = Vec::new();
        let mut start = now;
        while start <= now + horizon {
            for &frequency in &self.frequencies {
                let candidate = with_option(cluster, job, start, frequency);
                let cost = option_cost(cluster, &candidate, start);
                options.push(PricedOption { start, frequency, cost });
            }
            start += step;
        }
        options.sort_by(|a, b| a.cost.total_cmp(&b.cost));
        options
    }
}

impl SchedulingStrategy for MinimumCostStrategy {
    fn name(&self) -> &'static str {
        "minimum_cost"
    }

    fn assigns_frequencies(&self) -> bool {
        true
    }

    fn schedule_interval(
        &self,
        cluster: &mut Cluster,
        candidates: QueueKind,
        length: i64,
        plan: &mut NodeOccupationPlan,
    ) -> IntervalOutcome {
        let now = cluster.clock();
        let end = now + length;
        let spp = cluster.settings.seconds_per_step.max(1) as i64;
        let mut horizon_plan = NodeOccupationPlan::from_events(cluster, now, self.look_ahead_secs / spp + 1);
        let mut outcome = IntervalOutcome::default();
        let mut blocked = false;

        for (id, queue) in gather_candidates(cluster, candidates) {
            if blocked {
                cluster.set_planned_start(id, end);
                outcome.deferred.push(id);
                continue;
            }

            let job = cluster.job(id);
            // The interval plan holds nodes through the finish tick, the
            // event plan frees them at it; both must accept the option.
            let chosen = self.price_options(cluster, job).into_iter().find(|option| {
                let candidate = with_option(cluster, job, option.start, option.frequency);
                horizon_plan.is_feasible(&candidate)
                    && (option.start >= plan.end() || plan.is_feasible(&candidate))
            });

            match chosen {
                Some(option) => {
                    cluster.set_job_frequency(id, option.frequency);
                    cluster.job_mut(id).planned_frequency = option.frequency;
                    cluster.set_planned_start(id, option.start);
                    horizon_plan.apply(cluster.job(id));
                    plan.apply(cluster.job(id));
                    cluster.commit_placement(id, option.start, queue);
                    outcome.placed.push(id);
                    debug!(
                        job = %id,
                        start = option.start,
                        frequency = option.frequency,
                        cost = option.cost,
                        "cheapest feasible option committed"
                    );
                }
                None => {
                    cluster.set_planned_start(id, end);
                    outcome.deferred.push(id);
                    blocked = true;
                    info!(job = %id, "no feasible option within the look-ahead, pass stopped");
                }
            }
        }
        outcome
    }
}

/// Copy of `job` as it would be when (re)started at `start` at `frequency`.
fn with_option(cluster: &Cluster, job: &BatchJob, start: Tick, frequency: f64) -> BatchJob {
    let mut candidate = job.clone();
    candidate.set_frequency(frequency, &cluster.models);
    match candidate.status() {
        JobStatus::Paused | JobStatus::Rescheduled => candidate.restart_time = start,
        _ => candidate.start_time = start,
    }
    candidate
}

/// SLA fee of the implied finish plus facility energy, priced hour by hour.
fn option_cost(cluster: &Cluster, job: &BatchJob, start: Tick) -> f64 {
    let settings = &cluster.settings;
    let models = &cluster.models;
    let sla = job.currently_caused_sla_cost(settings.usage_price, settings.seconds_per_step, models);

    let spp = settings.seconds_per_step.max(1) as i64;
    let steps_per_hour = (3600 / spp).max(1);
    let it_kw = job.job_power() / 1000.0 / settings.it_power_fraction;
    let finish = job.calculated_finish();

    let mut energy = 0.0;
    let mut t = start;
    while t < finish {
        let segment = steps_per_hour.min(finish - t);
        let hours = (segment * spp) as f64 / 3600.0;
        energy += it_kw * models.pue.pue_at(t) * hours * models.price.price_at(t);
        t += segment;
    }
    sla + energy
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use dcsim_core::{ClusterSettings, JobId, JobSpec, Models, TracePrice, WorkloadSpec};

    fn priced_cluster() -> Cluster {
        let mut models = Models::default();
        // expensive first hour, cheap afterwards
        models.price = Arc::new(TracePrice::new([(0, 1.0), (3600, 0.01)], 0.16));
        let settings = ClusterSettings {
            capacity: 4,
            ..ClusterSettings::default()
        };
        let workload = WorkloadSpec {
            jobs: vec![JobSpec {
                id: "batch".to_string(),
                nodes: 2,
                duration: 600,
                frequency: 2.7,
                job_class: 0,
                submission: 0,
                start: 0,
                deadline: Some(100_000),
            }],
        };
        let mut cluster = Cluster::from_workload(settings, models, &workload, Vec::new());
        cluster.update_job_allocation(false, false);
        cluster
    }

    #[test]
    fn waits_for_cheap_energy_when_slack_allows() {
        let mut cluster = priced_cluster();
        let strategy = MinimumCostStrategy::new(7200, 600, vec![1.2, 2.7]).unwrap();
        let mut plan = NodeOccupationPlan::empty(0, 900, 4);

        let outcome = strategy.schedule_interval(&mut cluster, QueueKind::Submitted, 900, &mut plan);

        assert_eq!(outcome.placed, vec![JobId(0)]);
        let job = cluster.job(JobId(0));
        assert!(job.start_time >= 3600, "started at {}", job.start_time);
        assert_eq!(job.status(), JobStatus::Scheduled);
        assert_eq!(job.planned_frequency, job.frequency());
    }

    #[test]
    fn options_are_sorted_by_cost() {
        let cluster = priced_cluster();
        let strategy = MinimumCostStrategy::new(3600, 1800, vec![1.2, 2.7]).unwrap();
        let options = strategy.price_options(&cluster, cluster.job(JobId(0)));
        assert_eq!(options.len(), 6);
        assert!(options.windows(2).all(|w| w[0].cost <= w[1].cost));
    }

    #[test]
    fn rejects_empty_frequency_grid() {
        assert!(MinimumCostStrategy::new(3600, 300, Vec::new()).is_err());
    }
}
