//! Scheduler — business-as-usual interval placement.
//!
//! Runs once per scheduling interval. Each run builds a node-occupation
//! plan of the running and scheduled jobs and hands the waiting queues to
//! the configured strategy.

use std::sync::Arc;

use tracing::{debug, info};

use dcsim_core::{Cluster, NodeOccupationPlan, QueueKind, SimConfig};

use crate::backfill::try_place;
use crate::error::{SchedulerError, SchedulerResult};
use crate::strategy::{IntervalOutcome, SchedulingStrategy, build_strategy};

#[derive(Debug, Clone)]
pub struct Scheduler {
    strategy: Arc<dyn SchedulingStrategy>,
    interval: i64,
}

impl Scheduler {
    pub fn new(strategy: Arc<dyn SchedulingStrategy>, interval: i64) -> SchedulerResult<Self> {
        if interval <= 0 {
            return Err(SchedulerError::InvalidSettings(format!(
                "scheduling interval must be positive, got {interval}"
            )));
        }
        Ok(Self { strategy, interval })
    }

    pub fn from_config(config: &SimConfig) -> SchedulerResult<Self> {
        Self::new(build_strategy(config)?, config.cluster.scheduling_interval)
    }

    pub fn strategy(&self) -> &dyn SchedulingStrategy {
        self.strategy.as_ref()
    }

    pub fn interval(&self) -> i64 {
        self.interval
    }

    /// Run a placement pass if the clock has reached the next scheduler
    /// call, and book the call after it.
    pub fn schedule_jobs(&self, cluster: &mut Cluster) -> Option<IntervalOutcome> {
        if cluster.clock() < cluster.next_scheduler_call {
            return None;
        }
        let outcome = self.schedule_interval(cluster, self.interval, true);
        cluster.next_scheduler_call = cluster.clock() + self.interval;
        Some(outcome)
    }

    /// One placement pass over `[now, now + length)`.
    ///
    /// With `reset_frequencies`, running and scheduled jobs first return to
    /// their planned frequency. Affected jobs take precedence: the regular
    /// queue is only served once they are all placed. In traced-start mode
    /// the strategy serves the affected queue and regular jobs are placed
    /// at their traced start.
    pub fn schedule_interval(&self, cluster: &mut Cluster, length: i64, reset_frequencies: bool) -> IntervalOutcome {
        if reset_frequencies && !self.strategy.assigns_frequencies() {
            cluster.reset_frequencies(&[QueueKind::Running, QueueKind::Scheduled]);
        }

        let now = cluster.clock();
        let mut plan = NodeOccupationPlan::build(
            cluster
                .queue_jobs(QueueKind::Scheduled)
                .chain(cluster.queue_jobs(QueueKind::Running)),
            now,
            length,
            cluster.capacity(),
        );

        let traced = cluster.settings.traced_start_mode;
        let affected_waiting = !cluster.queues.get(QueueKind::Affected).is_empty();

        let mut outcome = IntervalOutcome::default();
        if affected_waiting || traced {
            outcome.merge(self.strategy.schedule_interval(cluster, QueueKind::Affected, length, &mut plan));
        }
        if traced {
            outcome.merge(place_at_traced_start(cluster, length, outcome.backfill_deadline, &mut plan));
        } else if cluster.queues.get(QueueKind::Affected).is_empty() {
            outcome.merge(self.strategy.schedule_interval(cluster, QueueKind::Submitted, length, &mut plan));
        }

        info!(
            strategy = self.strategy.name(),
            now,
            placed = outcome.placed.len(),
            deferred = outcome.deferred.len(),
            peak = plan.peak(),
            "interval scheduled"
        );
        outcome
    }
}

/// Place regular submitted jobs whose traced start falls in the interval,
/// no earlier than that start. Jobs that do not fit are handed to the
/// affected queue for the next pass.
fn place_at_traced_start(
    cluster: &mut Cluster,
    length: i64,
    deadline: Option<dcsim_core::Tick>,
    plan: &mut NodeOccupationPlan,
) -> IntervalOutcome {
    let now = cluster.clock();
    let end = now + length;
    let mut outcome = IntervalOutcome {
        backfill_deadline: deadline,
        ..IntervalOutcome::default()
    };

    let due: Vec<_> = cluster
        .queue_jobs(QueueKind::Submitted)
        .filter(|job| job.start_time < end)
        .map(|job| (job.id, job.start_time.max(now)))
        .collect();

    for (id, from) in due {
        if try_place(cluster, id, QueueKind::Submitted, from..end, deadline, plan) {
            outcome.placed.push(id);
        } else {
            cluster.set_planned_start(id, end);
            cluster.move_job(id, QueueKind::Submitted, QueueKind::Affected);
            outcome.deferred.push(id);
            debug!(job = %id, "traced start missed");
        }
    }
    outcome
}
