//! Cluster state — job arena, queues, node pool, clock and cost ledger.
//!
//! `Clone` is the snapshot operation: jobs reference nodes and nodes
//! reference jobs by id only, so a structural clone of the two tables is
//! an independent cluster. Models are `Arc`-shared and immutable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Tick;
use crate::config::SimConfig;
use crate::event::{Event, EventKind, EventQueue, EventTarget};
use crate::invariant;
use crate::job::{BatchJob, JobId, JobStatus};
use crate::models::Models;
use crate::node::NodePool;
use crate::request::DrRequest;
use crate::workload::WorkloadSpec;

/// Static parameters of a cluster, fixed for the whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSettings {
    pub capacity: u32,
    pub seconds_per_step: u32,
    pub scheduling_interval: i64,
    pub it_power_fraction: f64,
    pub traced_start_mode: bool,
    pub jobs_pausable: bool,
    pub usage_price: f64,
}

impl From<&SimConfig> for ClusterSettings {
    fn from(config: &SimConfig) -> Self {
        Self {
            capacity: config.cluster.capacity,
            seconds_per_step: config.cluster.seconds_per_step,
            scheduling_interval: config.cluster.scheduling_interval,
            it_power_fraction: config.cluster.it_power_fraction,
            traced_start_mode: config.cluster.traced_start_mode,
            jobs_pausable: config.cluster.jobs_pausable,
            usage_price: config.sla.usage_price,
        }
    }
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self::from(&SimConfig::default())
    }
}

/// Which power figure a measurement refers to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerType {
    #[default]
    TotalFacility,
    It,
    Hvac,
    Job,
}

// ── Queues ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    Submitted,
    /// Submitted jobs that missed their traced start or bounced at start.
    Affected,
    Scheduled,
    Running,
    Paused,
    Finished,
}

/// Ordered job queues. Every submitted job is in exactly one of them.
#[derive(Debug, Clone, Default)]
pub struct JobQueues {
    submitted: Vec<JobId>,
    affected: Vec<JobId>,
    scheduled: Vec<JobId>,
    running: Vec<JobId>,
    paused: Vec<JobId>,
    finished: Vec<JobId>,
}

impl JobQueues {
    pub fn get(&self, kind: QueueKind) -> &[JobId] {
        match kind {
            QueueKind::Submitted => &self.submitted,
            QueueKind::Affected => &self.affected,
            QueueKind::Scheduled => &self.scheduled,
            QueueKind::Running => &self.running,
            QueueKind::Paused => &self.paused,
            QueueKind::Finished => &self.finished,
        }
    }

    pub fn get_mut(&mut self, kind: QueueKind) -> &mut Vec<JobId> {
        match kind {
            QueueKind::Submitted => &mut self.submitted,
            QueueKind::Affected => &mut self.affected,
            QueueKind::Scheduled => &mut self.scheduled,
            QueueKind::Running => &mut self.running,
            QueueKind::Paused => &mut self.paused,
            QueueKind::Finished => &mut self.finished,
        }
    }

    pub fn push(&mut self, kind: QueueKind, id: JobId) {
        self.get_mut(kind).push(id);
    }

    /// Remove `id` from `kind`, keeping the order of the rest.
    pub fn remove(&mut self, kind: QueueKind, id: JobId) -> bool {
        let queue = self.get_mut(kind);
        match queue.iter().position(|j| *j == id) {
            Some(pos) => {
                queue.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Move `id` between queues. Logs an invariant violation when the job
    /// is not where the caller expects it.
    pub fn move_job(&mut self, id: JobId, from: QueueKind, to: QueueKind) {
        let found = self.remove(from, id);
        invariant!(found, "{id} expected in {from:?} queue, found in {:?}", self.locate(id));
        self.push(to, id);
    }

    pub fn locate(&self, id: JobId) -> Option<QueueKind> {
        [
            QueueKind::Submitted,
            QueueKind::Affected,
            QueueKind::Scheduled,
            QueueKind::Running,
            QueueKind::Paused,
            QueueKind::Finished,
        ]
        .into_iter()
        .find(|kind| self.get(*kind).contains(&id))
    }

    pub fn len(&self, kind: QueueKind) -> usize {
        self.get(kind).len()
    }

    /// Jobs that have been submitted but not started yet.
    pub fn waiting_count(&self) -> usize {
        self.submitted.len() + self.affected.len() + self.scheduled.len() + self.paused.len()
    }
}

// ── Cost ledger ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TickCost {
    pub energy: f64,
    pub sla: f64,
}

impl TickCost {
    pub fn total(&self) -> f64 {
        self.energy + self.sla
    }
}

/// Energy and SLA cost of completed ticks.
///
/// Recent ticks are kept one by one; older ones can be settled into a
/// single running total so long runs hold a bounded number of entries.
#[derive(Debug, Clone, Default)]
pub struct CostLedger {
    entries: BTreeMap<Tick, TickCost>,
    settled: f64,
    settled_until: Tick,
}

impl CostLedger {
    pub fn record(&mut self, tick: Tick, cost: TickCost) {
        if tick < self.settled_until {
            warn!(tick, settled_until = self.settled_until, "cost booked on a settled tick");
            self.settled += cost.total();
            return;
        }
        self.entries.insert(tick, cost);
    }

    pub fn get(&self, tick: Tick) -> Option<TickCost> {
        self.entries.get(&tick).copied()
    }

    /// Summed cost of retained ticks in `[from, to)`. Settled ticks are
    /// only part of [`CostLedger::total`].
    pub fn costs_between(&self, from: Tick, to: Tick) -> f64 {
        if to <= from {
            return 0.0;
        }
        self.entries.range(from..to).map(|(_, c)| c.total()).sum()
    }

    /// Fold every tick before `tick` into the settled total.
    pub fn settle_before(&mut self, tick: Tick) {
        if tick <= self.settled_until {
            return;
        }
        let kept = self.entries.split_off(&tick);
        self.settled += self.entries.values().map(TickCost::total).sum::<f64>();
        self.entries = kept;
        self.settled_until = tick;
    }

    /// First tick still kept individually.
    pub fn settled_until(&self) -> Tick {
        self.settled_until
    }

    /// Cost of every tick ever booked.
    pub fn total(&self) -> f64 {
        self.settled + self.entries.values().map(TickCost::total).sum::<f64>()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Cluster ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Cluster {
    pub settings: ClusterSettings,
    pub models: Models,
    pub nodes: NodePool,
    pub queues: JobQueues,
    pub events: EventQueue,
    pub requests: Vec<DrRequest>,
    pub ledger: CostLedger,
    /// Tick at which business-as-usual scheduling runs next.
    pub next_scheduler_call: Tick,
    jobs: Vec<BatchJob>,
    clock: Tick,
    /// SLA fees of jobs finished during the current tick.
    pub(crate) tick_sla: f64,
}

impl Cluster {
    pub fn new(settings: ClusterSettings, models: Models) -> Self {
        Self {
            nodes: NodePool::new(settings.capacity),
            settings,
            models,
            queues: JobQueues::default(),
            events: EventQueue::new(),
            requests: Vec::new(),
            ledger: CostLedger::default(),
            next_scheduler_call: 0,
            jobs: Vec::new(),
            clock: 0,
            tick_sla: 0.0,
        }
    }

    /// Build a cluster with the workload's submissions and the DR requests
    /// already scheduled as events.
    pub fn from_workload(
        settings: ClusterSettings,
        models: Models,
        workload: &WorkloadSpec,
        requests: Vec<DrRequest>,
    ) -> Self {
        let mut cluster = Self::new(settings, models);
        for spec in &workload.jobs {
            cluster.add_job(spec);
        }
        for request in requests {
            cluster.add_request(request);
        }
        debug!(
            jobs = cluster.jobs.len(),
            requests = cluster.requests.len(),
            capacity = cluster.settings.capacity,
            "cluster built"
        );
        cluster
    }

    /// Add a job and schedule its submission.
    pub fn add_job(&mut self, spec: &crate::workload::JobSpec) -> JobId {
        let id = JobId(self.jobs.len() as u32);
        let job = BatchJob::from_spec(id, spec, &self.models);
        self.events
            .schedule(Event::job(EventKind::JobSubmission, job.submission_time, id));
        self.jobs.push(job);
        id
    }

    pub fn add_request(&mut self, request: DrRequest) -> usize {
        let index = self.requests.len();
        self.events.schedule(Event {
            kind: EventKind::DrRequest,
            tick: request.timestamp,
            target: EventTarget::Request(index),
        });
        self.requests.push(request);
        index
    }

    /// Independent copy whose scheduler will next run at `next_scheduler_call`.
    pub fn snapshot(&self, next_scheduler_call: Tick) -> Cluster {
        let mut copy = self.clone();
        copy.next_scheduler_call = next_scheduler_call;
        copy
    }

    // ── Accessors ──────────────────────────────────────────────────

    pub fn clock(&self) -> Tick {
        self.clock
    }

    pub(crate) fn advance_clock(&mut self) {
        self.clock += 1;
    }

    pub fn capacity(&self) -> u32 {
        self.settings.capacity
    }

    pub fn job(&self, id: JobId) -> &BatchJob {
        &self.jobs[id.index()]
    }

    pub fn job_mut(&mut self, id: JobId) -> &mut BatchJob {
        &mut self.jobs[id.index()]
    }

    pub fn jobs(&self) -> &[BatchJob] {
        &self.jobs
    }

    /// Jobs of a queue, in queue order.
    pub fn queue_jobs(&self, kind: QueueKind) -> impl Iterator<Item = &BatchJob> + '_ {
        self.queues.get(kind).iter().map(|id| &self.jobs[id.index()])
    }

    pub fn occupied_nodes(&self) -> u32 {
        self.nodes.occupied_count()
    }

    /// Move a job between queues.
    pub fn move_job(&mut self, id: JobId, from: QueueKind, to: QueueKind) {
        self.queues.move_job(id, from, to);
    }

    // ── Power ──────────────────────────────────────────────────────

    /// Watts drawn by job nodes.
    pub fn job_power(&self) -> f64 {
        self.nodes.total_power()
    }

    pub fn it_power(&self) -> f64 {
        self.job_power() / self.settings.it_power_fraction
    }

    pub fn hvac_power(&self) -> f64 {
        let it = self.it_power();
        self.models.pue.pue_at(self.clock) * it - it
    }

    pub fn total_power(&self) -> f64 {
        self.it_power() + self.hvac_power()
    }

    /// Watts of the requested kind.
    pub fn power(&self, kind: PowerType) -> f64 {
        match kind {
            PowerType::TotalFacility => self.total_power(),
            PowerType::It => self.it_power(),
            PowerType::Hvac => self.hvac_power(),
            PowerType::Job => self.job_power(),
        }
    }

    /// Energy cost of the current tick at the current draw.
    pub fn tick_energy_cost(&self) -> f64 {
        let kwh = self.total_power() / 1000.0 * self.settings.seconds_per_step as f64 / 3600.0;
        kwh * self.models.price.price_at(self.clock)
    }

    // ── Frequency ──────────────────────────────────────────────────

    /// Re-clock a job. A running job gets its node powers refreshed; any
    /// pending finish event follows the new runtime.
    pub fn set_job_frequency(&mut self, id: JobId, frequency: f64) {
        let now = self.clock;
        let models = self.models.clone();
        let job = &mut self.jobs[id.index()];
        job.set_frequency(frequency, &models);
        let finish = job.calculated_finish();
        let target = EventTarget::Job(id);
        if job.status() == JobStatus::Running {
            for node in &job.bound_nodes {
                self.events.schedule(Event::node_update(now, *node));
            }
            self.events.reschedule(EventKind::JobFinish, target, finish);
        } else if self.events.time_of(EventKind::JobFinish, target).is_some() {
            self.events.reschedule(EventKind::JobFinish, target, finish);
        }
    }

    /// Put the jobs of the given queues back on their planned frequency.
    pub fn reset_frequencies(&mut self, queues: &[QueueKind]) {
        let ids: Vec<JobId> = queues
            .iter()
            .flat_map(|kind| self.queues.get(*kind).iter().copied())
            .collect();
        for id in ids {
            let job = &self.jobs[id.index()];
            if !job.is_at_planned_frequency() {
                let planned = job.planned_frequency;
                self.set_job_frequency(id, planned);
            }
        }
    }

    /// Put every running job back on its planned frequency.
    pub fn reset_running_frequencies(&mut self) {
        self.reset_frequencies(&[QueueKind::Running]);
    }

    // ── Placement ──────────────────────────────────────────────────

    /// Move the job's planned (re)start to `tick` without committing it.
    pub fn set_planned_start(&mut self, id: JobId, tick: Tick) {
        let job = &mut self.jobs[id.index()];
        match job.status() {
            JobStatus::Paused | JobStatus::Rescheduled => job.restart_time = tick,
            _ => job.start_time = tick,
        }
    }

    /// Commit a waiting job to (re)start at `tick`: paused jobs become
    /// `Rescheduled` with a restart event, others `Scheduled` with a start
    /// event. The finish event follows the planned runtime.
    pub fn commit_placement(&mut self, id: JobId, tick: Tick, from: QueueKind) {
        self.set_planned_start(id, tick);
        let job = &mut self.jobs[id.index()];
        let kind = match job.status() {
            JobStatus::Paused | JobStatus::Rescheduled => {
                job.set_status(JobStatus::Rescheduled);
                EventKind::JobRestart
            }
            _ => {
                job.set_status(JobStatus::Scheduled);
                EventKind::JobStart
            }
        };
        let finish = job.calculated_finish();
        let target = EventTarget::Job(id);
        self.events.reschedule(kind, target, tick);
        self.events.reschedule(EventKind::JobFinish, target, finish);
        if from != QueueKind::Scheduled {
            self.move_job(id, from, QueueKind::Scheduled);
        }
        debug!(job = %id, ?kind, tick, finish, "placement committed");
    }

    /// Whether two clusters look alike from the outside: same counts of
    /// running, occupied and finished, same draw.
    pub fn converged_with(&self, other: &Cluster) -> bool {
        self.queues.len(QueueKind::Running) == other.queues.len(QueueKind::Running)
            && self.occupied_nodes() == other.occupied_nodes()
            && self.queues.len(QueueKind::Finished) == other.queues.len(QueueKind::Finished)
            && (self.total_power() - other.total_power()).abs() < 1e-6
    }

    /// Re-derive the occupied count from the queues and compare it with the
    /// node pool.
    pub fn check_capacity(&self) {
        let bound: u32 = self
            .queue_jobs(QueueKind::Running)
            .map(|j| j.bound_nodes.len() as u32)
            .sum();
        invariant!(
            bound == self.occupied_nodes() && bound <= self.capacity(),
            "occupied {} nodes, running jobs hold {bound}, capacity {}",
            self.occupied_nodes(),
            self.capacity()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::JobSpec;

    fn spec(id: &str, nodes: u32, duration: i64) -> JobSpec {
        JobSpec {
            id: id.to_string(),
            nodes,
            duration,
            frequency: 2.7,
            job_class: 0,
            submission: 0,
            start: 0,
            deadline: None,
        }
    }

    fn small_cluster() -> Cluster {
        let settings = ClusterSettings {
            capacity: 4,
            ..ClusterSettings::default()
        };
        let workload = WorkloadSpec {
            jobs: vec![spec("a", 2, 10), spec("b", 2, 10)],
        };
        Cluster::from_workload(settings, Models::default(), &workload, Vec::new())
    }

    #[test]
    fn workload_schedules_submissions() {
        let cluster = small_cluster();
        assert_eq!(cluster.events.events_at(EventKind::JobSubmission, 0).len(), 2);
        assert_eq!(cluster.jobs().len(), 2);
    }

    #[test]
    fn queue_move_preserves_order() {
        let mut queues = JobQueues::default();
        for i in 0..3 {
            queues.push(QueueKind::Submitted, JobId(i));
        }
        queues.move_job(JobId(1), QueueKind::Submitted, QueueKind::Scheduled);
        assert_eq!(queues.get(QueueKind::Submitted), &[JobId(0), JobId(2)]);
        assert_eq!(queues.locate(JobId(1)), Some(QueueKind::Scheduled));
    }

    #[test]
    fn ledger_sums_half_open_range() {
        let mut ledger = CostLedger::default();
        for t in 0..5 {
            ledger.record(t, TickCost { energy: 1.0, sla: 0.5 });
        }
        assert_eq!(ledger.costs_between(1, 3), 3.0);
        assert_eq!(ledger.costs_between(3, 3), 0.0);
    }

    #[test]
    fn settling_bounds_entries_and_keeps_the_total() {
        let mut ledger = CostLedger::default();
        for t in 0..100 {
            ledger.record(t, TickCost { energy: 1.0, sla: 0.0 });
            ledger.settle_before(t + 1 - 10);
        }
        assert_eq!(ledger.len(), 10);
        assert_eq!(ledger.settled_until(), 90);
        assert_eq!(ledger.total(), 100.0);
        assert_eq!(ledger.costs_between(90, 100), 10.0);
        assert_eq!(ledger.get(89), None);

        // settling backwards is a no-op
        ledger.settle_before(50);
        assert_eq!(ledger.len(), 10);
    }

    #[test]
    fn snapshot_is_independent() {
        let cluster = small_cluster();
        let mut copy = cluster.snapshot(50);
        copy.job_mut(JobId(0)).start_time = 99;
        copy.events.remove_key(0);
        assert_eq!(cluster.job(JobId(0)).start_time, 0);
        assert_eq!(cluster.events.len(), 2);
        assert_eq!(copy.next_scheduler_call, 50);
    }

    #[test]
    fn idle_cluster_draws_nothing() {
        let cluster = small_cluster();
        assert_eq!(cluster.total_power(), 0.0);
        assert_eq!(cluster.tick_energy_cost(), 0.0);
    }
}
