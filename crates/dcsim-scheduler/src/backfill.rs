//! Placement with backfilling, shared by the deadline-slack and FIFO
//! strategies.
//!
//! Candidates are tried in the order given, each at `now, now + 1, …`
//! until the plan accepts it. The first job that fits nowhere fixes a
//! backfilling deadline: the earliest tick its node count frees up. Every
//! later job of the pass must then finish before that deadline.

use std::ops::Range;

use tracing::debug;

use dcsim_core::{BatchJob, Cluster, JobId, NodeOccupationPlan, QueueKind, Tick, earliest_node_availability};

use crate::strategy::IntervalOutcome;

/// Slack of a job if it started right now, scaled by its size relative to
/// the cluster.
pub fn earliest_fit_theta(job: &BatchJob, now: Tick, capacity: u32) -> f64 {
    let finish = now + job.remaining_steps();
    (job.deadline - finish) as f64 * capacity as f64 / job.nodes.max(1) as f64
}

/// Place `ordered` jobs into `[now, now + length)`.
pub fn backfill(
    cluster: &mut Cluster,
    ordered: &[(JobId, QueueKind)],
    length: i64,
    plan: &mut NodeOccupationPlan,
) -> IntervalOutcome {
    let now = cluster.clock();
    let end = now + length;
    let mut outcome = IntervalOutcome::default();

    for &(id, queue) in ordered {
        if try_place(cluster, id, queue, now..end, outcome.backfill_deadline, plan) {
            outcome.placed.push(id);
            continue;
        }

        cluster.set_planned_start(id, end);
        outcome.deferred.push(id);
        if outcome.backfill_deadline.is_none() {
            let nodes = cluster.job(id).nodes;
            let holders = cluster
                .queue_jobs(QueueKind::Running)
                .chain(cluster.queue_jobs(QueueKind::Scheduled));
            outcome.backfill_deadline = earliest_node_availability(holders, nodes, now, cluster.capacity());
            debug!(job = %id, deadline = ?outcome.backfill_deadline, "backfilling deadline set");
        }
    }
    outcome
}

/// Try each tick of `window` as the job's (re)start. The first tick the
/// plan accepts is committed; with a deadline, a start whose finish would
/// reach it ends the search.
pub fn try_place(
    cluster: &mut Cluster,
    id: JobId,
    queue: QueueKind,
    window: Range<Tick>,
    deadline: Option<Tick>,
    plan: &mut NodeOccupationPlan,
) -> bool {
    for t in window {
        cluster.set_planned_start(id, t);
        let job = cluster.job(id);
        if deadline.is_some_and(|d| job.calculated_finish() >= d) {
            break;
        }
        if plan.is_feasible(job) {
            plan.apply(job);
            cluster.commit_placement(id, t, queue);
            return true;
        }
    }
    false
}
