//! Additional cost of answering a DR request.
//!
//! Compares a DR-adjusted datacenter with an undisturbed copy of the live
//! one. Future-knowledge accounting simulates both until they look alike
//! again and compares the booked costs; current-estimate accounting only
//! prices what the in-flight jobs are exposed to right now.

use tracing::{debug, warn};

use dcsim_core::{
    BatchJob, Cluster, CostMode, DemandResponseConfig, DrRequest, JobStatus, QueueKind, Tick,
};

use crate::datacenter::Datacenter;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostSettings {
    pub mode: CostMode,
    /// Ticks both futures must agree before they count as reconverged.
    pub maximum_runtime: i64,
    /// Reconvergence ticks after which future knowledge gives up.
    pub step_cap: i64,
}

impl Default for CostSettings {
    fn default() -> Self {
        Self::from(&DemandResponseConfig::default())
    }
}

impl From<&DemandResponseConfig> for CostSettings {
    fn from(config: &DemandResponseConfig) -> Self {
        Self {
            mode: config.cost_mode,
            maximum_runtime: config.maximum_runtime,
            step_cap: config.reconvergence_step_cap,
        }
    }
}

/// Extra cost of `adjusted` over leaving `live` alone, net of the
/// request's compensation.
pub fn additional_cost(
    live: &Datacenter,
    adjusted: &Datacenter,
    request: &DrRequest,
    settings: &CostSettings,
) -> f64 {
    match settings.mode {
        CostMode::FutureKnowledge => match future_knowledge(live, adjusted, request, settings) {
            Some(cost) => cost,
            None => {
                warn!(cap = settings.step_cap, "futures did not reconverge, using current estimate");
                current_estimate(live, adjusted, request)
            }
        },
        CostMode::CurrentEstimate => current_estimate(live, adjusted, request),
    }
}

/// Simulate both futures through the window and on until they agreed for
/// `maximum_runtime` consecutive ticks. `None` when that takes more than
/// `step_cap` ticks.
pub fn future_knowledge(
    live: &Datacenter,
    adjusted: &Datacenter,
    request: &DrRequest,
    settings: &CostSettings,
) -> Option<f64> {
    let start = live.clock();
    let mut comparison = live.snapshot(request.window);
    let mut adjusted = adjusted.clone();
    for _ in 0..request.window {
        adjusted.step();
        comparison.step();
    }

    let mut agreeing = 0;
    let mut steps = 0;
    while agreeing <= settings.maximum_runtime {
        if steps >= settings.step_cap {
            return None;
        }
        if adjusted.cluster.converged_with(&comparison.cluster) {
            agreeing += 1;
        } else {
            agreeing = 0;
        }
        adjusted.step();
        comparison.step();
        steps += 1;
    }

    let dr = adjusted.cluster.ledger.costs_between(start, adjusted.clock());
    let baseline = comparison.cluster.ledger.costs_between(start, comparison.clock());
    debug!(dr, baseline, steps, "futures reconverged");
    Some(dr - baseline - request.compensation)
}

/// Price the current SLA exposure and remaining energy of every
/// unfinished job in both datacenters.
pub fn current_estimate(live: &Datacenter, adjusted: &Datacenter, request: &DrRequest) -> f64 {
    let now = live.clock();
    let baseline = live.snapshot(request.window);
    let dr = exposure(&adjusted.cluster, now, request.window);
    let undisturbed = exposure(&baseline.cluster, now, request.window);
    dr - undisturbed - request.compensation
}

fn exposure(cluster: &Cluster, now: Tick, window: i64) -> f64 {
    let settings = &cluster.settings;
    let price = cluster.models.price.price_at(now);
    [
        QueueKind::Affected,
        QueueKind::Submitted,
        QueueKind::Running,
        QueueKind::Scheduled,
        QueueKind::Paused,
    ]
    .into_iter()
    .flat_map(|kind| cluster.queue_jobs(kind))
    .map(|job| {
        job.currently_caused_sla_cost(settings.usage_price, settings.seconds_per_step, &cluster.models)
            + energy_under_dr(cluster, job, price, now, window)
    })
    .sum()
}

/// Energy bill of the job's remaining work: inside the window at its
/// current frequency, afterwards back at its planned one.
fn energy_under_dr(cluster: &Cluster, job: &BatchJob, price: f64, now: Tick, window: i64) -> f64 {
    let settings = &cluster.settings;
    let models = &cluster.models;
    let hours_per_step = settings.seconds_per_step as f64 / 3600.0;
    let facility = models.pue.pue_at(now) / settings.it_power_fraction;
    let kw = |watts: f64| watts / 1000.0 * facility;

    if job.is_at_planned_frequency() {
        return job.remaining_steps() as f64 * hours_per_step * kw(job.job_power()) * price;
    }

    let during = match job.status() {
        JobStatus::Running | JobStatus::Scheduled | JobStatus::Rescheduled => {
            job.window_steps(now, now + window).min(job.remaining_steps())
        }
        _ => 0,
    };
    let after = models
        .runtime
        .adjusted_steps(job.frequency(), job.planned_frequency, job.remaining_steps() - during);
    let after_watts = models.power.power(job.planned_frequency, job.job_class) * job.nodes as f64;

    (during as f64 * kw(job.job_power()) + after as f64 * kw(after_watts)) * hours_per_step * price
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::solver::MicroLp;
    use dcsim_core::{Direction, JobSpec, SimConfig, WorkloadSpec};

    fn idle_datacenter() -> Datacenter {
        let mut config = SimConfig::default();
        config.cluster.capacity = 4;
        let workload = WorkloadSpec {
            jobs: vec![JobSpec {
                id: "later".to_string(),
                nodes: 2,
                duration: 5,
                frequency: 2.7,
                job_class: 0,
                submission: 50,
                start: 50,
                deadline: None,
            }],
        };
        Datacenter::from_config(&config, &workload, Vec::new(), Arc::new(MicroLp)).unwrap()
    }

    fn request(compensation: f64) -> DrRequest {
        DrRequest {
            timestamp: 0,
            power_delta: 1.0,
            direction: Direction::Decrease,
            window: 10,
            compensation,
        }
    }

    #[test]
    fn identical_futures_cost_only_the_compensation() {
        let dc = idle_datacenter();
        let settings = CostSettings {
            mode: CostMode::FutureKnowledge,
            maximum_runtime: 5,
            step_cap: 100,
        };
        let copy = dc.snapshot(10);
        let cost = additional_cost(&dc, &copy, &request(3.0), &settings);
        assert_eq!(cost, -3.0);
    }

    #[test]
    fn current_estimate_of_identical_states_is_zero() {
        let dc = idle_datacenter();
        let copy = dc.snapshot(10);
        assert_eq!(current_estimate(&dc, &copy, &request(0.0)), 0.0);
    }

    #[test]
    fn zero_cap_falls_back() {
        let dc = idle_datacenter();
        let settings = CostSettings {
            mode: CostMode::FutureKnowledge,
            maximum_runtime: 5,
            step_cap: 0,
        };
        assert!(future_knowledge(&dc, &dc.snapshot(10), &request(0.0), &settings).is_none());
        let cost = additional_cost(&dc, &dc.snapshot(10), &request(1.0), &settings);
        assert_eq!(cost, -1.0);
    }
}
