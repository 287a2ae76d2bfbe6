//! Workload shifting.
//!
//! Moves node-steps out of a DR window (postpone) or into it (prepone).
//! Volumes are node-steps: one node held for one tick.

use std::fmt::Debug;

use tracing::debug;

use dcsim_core::{
    BatchJob, Cluster, Event, EventKind, EventTarget, JobId, JobStatus, NodeOccupationPlan, QueueKind, Tick,
};

/// How many node-steps a shift may move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftBudget {
    Limited(u64),
    Unlimited,
}

impl ShiftBudget {
    /// Whether a running total of `total` stays within the budget.
    pub fn admits(self, total: u64) -> bool {
        match self {
            ShiftBudget::Limited(limit) => total <= limit,
            ShiftBudget::Unlimited => true,
        }
    }

    pub fn is_reached(self, total: u64) -> bool {
        match self {
            ShiftBudget::Limited(limit) => total >= limit,
            ShiftBudget::Unlimited => false,
        }
    }
}

/// Strategy that decides which jobs move in time.
pub trait ShiftingStrategy: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Node-steps within `[now, now + length)` that postponing could remove.
    fn postponable_volume(&self, cluster: &Cluster, length: i64) -> u64;

    /// Node-steps that preponing could pull into `[now, now + length)`.
    fn preponable_volume(&self, cluster: &Cluster, length: i64) -> u64;

    /// Push work behind the window end. Returns the node-steps moved; never
    /// more than a limited budget.
    fn postpone(&self, cluster: &mut Cluster, budget: ShiftBudget, length: i64) -> u64;

    /// Pull waiting work to the earliest feasible tick of the window.
    /// Returns the node-steps gained inside the window; never more than a
    /// limited budget.
    fn prepone(&self, cluster: &mut Cluster, budget: ShiftBudget, length: i64) -> u64;

    /// Empty the window as far as shifting can.
    fn schedule_for_minimum_demand(&self, cluster: &mut Cluster, length: i64) {
        self.postpone(cluster, ShiftBudget::Unlimited, length);
    }

    /// Fill the window as far as shifting can.
    fn schedule_for_maximum_demand(&self, cluster: &mut Cluster, length: i64) {
        self.prepone(cluster, ShiftBudget::Unlimited, length);
    }
}

/// Postpones the jobs with the most slack first and prepones the jobs
/// with the least slack first.
#[derive(Debug, Clone, Copy, Default)]
pub struct LongestSlackFirst;

impl LongestSlackFirst {
    fn postponable(&self, cluster: &Cluster, length: i64) -> Vec<JobId> {
        let end = cluster.clock() + length;
        let pausable = cluster.settings.jobs_pausable;
        cluster
            .queue_jobs(QueueKind::Scheduled)
            .chain(cluster.queue_jobs(QueueKind::Running))
            .filter(|job| match job.status() {
                JobStatus::Scheduled => job.start_time < end,
                JobStatus::Rescheduled => job.restart_time < end,
                JobStatus::Running => pausable && !job.requested_to_pause,
                _ => false,
            })
            .map(|job| job.id)
            .collect()
    }

    fn preponable(&self, cluster: &Cluster) -> Vec<JobId> {
        [
            QueueKind::Submitted,
            QueueKind::Scheduled,
            QueueKind::Paused,
            QueueKind::Affected,
        ]
        .into_iter()
        .flat_map(|kind| cluster.queue_jobs(kind))
        .filter(|job| {
            matches!(
                job.status(),
                JobStatus::Submitted | JobStatus::Scheduled | JobStatus::Rescheduled | JobStatus::Paused
            )
        })
        .map(|job| job.id)
        .collect()
    }

    /// Stable sort by slack, least slack first.
    fn by_theta(cluster: &Cluster, mut ids: Vec<JobId>) -> Vec<JobId> {
        let capacity = cluster.capacity();
        ids.sort_by(|a, b| {
            cluster
                .job(*a)
                .theta(capacity)
                .total_cmp(&cluster.job(*b).theta(capacity))
        });
        ids
    }

    fn postpone_job(cluster: &mut Cluster, id: JobId, end: Tick) {
        let now = cluster.clock();
        let target = EventTarget::Job(id);
        match cluster.job(id).status() {
            JobStatus::Scheduled => {
                let to = if cluster.settings.traced_start_mode {
                    QueueKind::Affected
                } else {
                    QueueKind::Submitted
                };
                let job = cluster.job_mut(id);
                job.start_time = end;
                job.set_status(JobStatus::Submitted);
                cluster.move_job(id, QueueKind::Scheduled, to);
                cluster.events.unschedule(EventKind::JobStart, target);
                cluster.events.unschedule(EventKind::JobFinish, target);
            }
            JobStatus::Running => {
                let job = cluster.job_mut(id);
                job.restart_time = end;
                job.requested_to_pause = true;
                cluster.events.schedule(Event::job(EventKind::JobPause, now, id));
            }
            JobStatus::Rescheduled => {
                let job = cluster.job_mut(id);
                job.restart_time = end;
                job.set_status(JobStatus::Paused);
                cluster.move_job(id, QueueKind::Scheduled, QueueKind::Paused);
                cluster.events.unschedule(EventKind::JobRestart, target);
                cluster.events.unschedule(EventKind::JobFinish, target);
            }
            other => {
                debug!(job = %id, status = %other, "not postponable");
                return;
            }
        }
        debug!(job = %id, to = end, "job postponed");
    }
}

/// Node-steps `job` holds within `[now, end)`.
fn node_steps(job: &BatchJob, now: Tick, end: Tick) -> u64 {
    job.window_steps(now, end) as u64 * job.nodes as u64
}

impl ShiftingStrategy for LongestSlackFirst {
    fn name(&self) -> &'static str {
        "longest_slack_first"
    }

    fn postponable_volume(&self, cluster: &Cluster, length: i64) -> u64 {
        let now = cluster.clock();
        self.postponable(cluster, length)
            .into_iter()
            .map(|id| node_steps(cluster.job(id), now, now + length))
            .sum()
    }

    fn preponable_volume(&self, cluster: &Cluster, length: i64) -> u64 {
        self.preponable(cluster)
            .into_iter()
            .map(|id| {
                let job = cluster.job(id);
                job.remaining_steps().clamp(0, length) as u64 * job.nodes as u64
            })
            .sum()
    }

    fn postpone(&self, cluster: &mut Cluster, budget: ShiftBudget, length: i64) -> u64 {
        if budget == ShiftBudget::Limited(0) {
            return 0;
        }
        let now = cluster.clock();
        let end = now + length;
        let ordered = Self::by_theta(cluster, self.postponable(cluster, length));

        let mut shifted = 0;
        for id in ordered.into_iter().rev() {
            let steps = node_steps(cluster.job(id), now, end);
            if !budget.admits(shifted + steps) {
                continue;
            }
            Self::postpone_job(cluster, id, end);
            shifted += steps;
            if budget.is_reached(shifted) {
                break;
            }
        }
        debug!(shifted, ?budget, "postpone pass done");
        shifted
    }

    fn prepone(&self, cluster: &mut Cluster, budget: ShiftBudget, length: i64) -> u64 {
        let now = cluster.clock();
        let end = now + length;
        let ordered = Self::by_theta(cluster, self.preponable(cluster));
        let mut plan = NodeOccupationPlan::build(
            cluster
                .queue_jobs(QueueKind::Scheduled)
                .chain(cluster.queue_jobs(QueueKind::Running)),
            now,
            length,
            cluster.capacity(),
        );

        let mut shifted = 0;
        for id in ordered {
            let Some(queue) = cluster.queues.locate(id) else {
                continue;
            };
            let booked = queue == QueueKind::Scheduled;
            let original = cluster.job(id).planned_start();
            let before = node_steps(cluster.job(id), now, end);
            if booked {
                plan.release(cluster.job(id));
            }

            let mut placed = None;
            for t in now..end {
                cluster.set_planned_start(id, t);
                if plan.is_feasible(cluster.job(id)) {
                    placed = Some(t);
                    break;
                }
            }

            let gain = placed.map(|_| node_steps(cluster.job(id), now, end).saturating_sub(before));
            match (placed, gain) {
                (Some(t), Some(gain)) if budget.admits(shifted + gain) => {
                    plan.apply(cluster.job(id));
                    cluster.commit_placement(id, t, queue);
                    shifted += gain;
                    debug!(job = %id, start = t, gain, "job preponed");
                }
                _ => {
                    cluster.set_planned_start(id, original);
                    if booked {
                        plan.apply(cluster.job(id));
                    }
                }
            }
            if budget.is_reached(shifted) {
                break;
            }
        }
        debug!(shifted, ?budget, "prepone pass done");
        shifted
    }
}
