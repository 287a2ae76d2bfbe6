//! Node-occupation plans — "nodes busy" per tick of an interval.
//!
//! Placement is two-phase: `is_feasible` then `apply`. The two calls are
//! not atomic; callers rely on the single-threaded tick discipline.

use crate::Tick;
use crate::cluster::Cluster;
use crate::event::{EventKind, EventTarget};
use crate::invariant;
use crate::job::BatchJob;

#[derive(Debug, Clone, PartialEq)]
pub struct NodeOccupationPlan {
    start: Tick,
    capacity: u32,
    occupation: Vec<u32>,
}

impl NodeOccupationPlan {
    pub fn empty(start: Tick, length: i64, capacity: u32) -> Self {
        Self {
            start,
            capacity,
            occupation: vec![0; length.max(0) as usize],
        }
    }

    /// Plan over `[start, start + length)` holding the given jobs.
    pub fn build<'a>(
        jobs: impl IntoIterator<Item = &'a BatchJob>,
        start: Tick,
        length: i64,
        capacity: u32,
    ) -> Self {
        let mut plan = Self::empty(start, length, capacity);
        for job in jobs {
            plan.add(job);
        }
        plan
    }

    /// Plan derived from the current occupied count and the pending
    /// start/restart (+) and finish/pause (−) events.
    pub fn from_events(cluster: &Cluster, start: Tick, length: i64) -> Self {
        let mut plan = Self::empty(start, length, cluster.capacity());
        let nodes_of = |target: EventTarget| match target {
            EventTarget::Job(id) => cluster.job(id).nodes as i64,
            _ => 0,
        };
        // A finish after a pending pause releases nothing unless the job
        // restarted in between: the pause already did.
        let paused_before = |target: EventTarget, t: Tick| {
            let Some(pause) = cluster.events.time_of(EventKind::JobPause, target) else {
                return false;
            };
            let restarted = cluster
                .events
                .time_of(EventKind::JobRestart, target)
                .is_some_and(|restart| restart >= pause && restart <= t);
            pause <= t && !restarted
        };
        let mut current = cluster.occupied_nodes() as i64;
        for offset in 0..plan.occupation.len() {
            let t = start + offset as Tick;
            for kind in [EventKind::JobStart, EventKind::JobRestart] {
                current += cluster.events.events_at(kind, t).into_iter().map(nodes_of).sum::<i64>();
            }
            current -= cluster
                .events
                .events_at(EventKind::JobPause, t)
                .into_iter()
                .map(nodes_of)
                .sum::<i64>();
            current -= cluster
                .events
                .events_at(EventKind::JobFinish, t)
                .into_iter()
                .filter(|target| !paused_before(*target, t))
                .map(nodes_of)
                .sum::<i64>();
            plan.occupation[offset] = current.max(0) as u32;
        }
        plan
    }

    pub fn start(&self) -> Tick {
        self.start
    }

    pub fn end(&self) -> Tick {
        self.start + self.occupation.len() as Tick
    }

    pub fn len(&self) -> usize {
        self.occupation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occupation.is_empty()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Busy nodes at `tick`; 0 outside the plan.
    pub fn at(&self, tick: Tick) -> u32 {
        self.offset(tick).map_or(0, |i| self.occupation[i])
    }

    pub fn values(&self) -> &[u32] {
        &self.occupation
    }

    pub fn peak(&self) -> u32 {
        self.occupation.iter().copied().max().unwrap_or(0)
    }

    /// Whether `job`, at its planned (re)start, fits everywhere it overlaps
    /// the plan.
    pub fn is_feasible(&self, job: &BatchJob) -> bool {
        if job.planned_start() >= self.end() {
            return false;
        }
        self.covered(job)
            .all(|i| self.occupation[i] + job.nodes <= self.capacity)
    }

    /// Book `job` into the plan.
    pub fn apply(&mut self, job: &BatchJob) {
        self.add(job);
        invariant!(
            self.peak() <= self.capacity,
            "plan over capacity after {}: peak {} > {}",
            job.id,
            self.peak(),
            self.capacity
        );
    }

    /// Take a previously applied `job` back out of the plan. The job must
    /// still be at the placement it was applied with.
    pub fn release(&mut self, job: &BatchJob) {
        for i in self.covered(job).collect::<Vec<_>>() {
            invariant!(
                self.occupation[i] >= job.nodes,
                "releasing {} below zero at offset {i}",
                job.id
            );
            self.occupation[i] = self.occupation[i].saturating_sub(job.nodes);
        }
    }

    fn add(&mut self, job: &BatchJob) {
        for i in self.covered(job).collect::<Vec<_>>() {
            self.occupation[i] += job.nodes;
        }
    }

    /// Offsets the job holds nodes at, from its occupancy start through its
    /// calculated finish.
    fn covered(&self, job: &BatchJob) -> std::ops::Range<usize> {
        let from = job.occupancy_from(self.start).max(self.start);
        let last = job.calculated_finish().min(self.end() - 1);
        if last < from {
            return 0..0;
        }
        (from - self.start) as usize..(last - self.start + 1) as usize
    }

    fn offset(&self, tick: Tick) -> Option<usize> {
        if tick < self.start {
            return None;
        }
        let i = (tick - self.start) as usize;
        (i < self.occupation.len()).then_some(i)
    }
}

/// First tick from `now` at which `nodes` nodes are free, given the jobs
/// that will hold nodes. Falls back to the latest finish among them;
/// `None` when no job holds nodes.
pub fn earliest_node_availability<'a>(
    jobs: impl IntoIterator<Item = &'a BatchJob>,
    nodes: u32,
    now: Tick,
    capacity: u32,
) -> Option<Tick> {
    let jobs: Vec<&BatchJob> = jobs.into_iter().collect();
    let max_finish = jobs.iter().map(|j| j.calculated_finish()).max()?;
    if max_finish <= now {
        return Some(now);
    }
    let mut occupation = vec![0u32; (max_finish - now) as usize];
    for job in &jobs {
        let from = job.occupancy_from(now).max(now);
        for t in from..job.calculated_finish() {
            occupation[(t - now) as usize] += job.nodes;
        }
    }
    let free_at = occupation
        .iter()
        .position(|busy| capacity.saturating_sub(*busy) >= nodes)
        .map(|i| now + i as Tick);
    Some(free_at.unwrap_or(max_finish))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobId, JobStatus};
    use crate::models::Models;
    use crate::workload::JobSpec;

    fn make_job(id: u32, nodes: u32, duration: i64, start: Tick) -> BatchJob {
        let spec = JobSpec {
            id: format!("j{id}"),
            nodes,
            duration,
            frequency: 2.7,
            job_class: 0,
            submission: 0,
            start,
            deadline: None,
        };
        let mut job = BatchJob::from_spec(JobId(id), &spec, &Models::default());
        job.set_status(JobStatus::Submitted);
        job
    }

    #[test]
    fn build_clips_to_interval() {
        let mut job = make_job(0, 2, 10, 5);
        job.set_status(JobStatus::Scheduled);
        let plan = NodeOccupationPlan::build([&job], 0, 8, 4);
        assert_eq!(plan.values(), &[0, 0, 0, 0, 0, 2, 2, 2]);
    }

    #[test]
    fn feasibility_respects_capacity() {
        let mut placed = make_job(0, 3, 10, 0);
        placed.set_status(JobStatus::Scheduled);
        let plan = NodeOccupationPlan::build([&placed], 0, 20, 4);

        assert!(plan.is_feasible(&make_job(1, 1, 5, 0)));
        assert!(!plan.is_feasible(&make_job(2, 2, 5, 0)));
        assert!(plan.is_feasible(&make_job(3, 2, 5, 11)));
    }

    #[test]
    fn start_at_interval_end_is_infeasible() {
        let plan = NodeOccupationPlan::empty(0, 10, 4);
        assert!(!plan.is_feasible(&make_job(0, 1, 5, 10)));
        assert!(plan.is_feasible(&make_job(1, 1, 5, 9)));
    }

    #[test]
    fn apply_is_additive() {
        let mut plan = NodeOccupationPlan::empty(0, 4, 4);
        let job = make_job(0, 2, 2, 1);
        plan.apply(&job);
        plan.apply(&job);
        assert_eq!(plan.values(), &[0, 4, 4, 4]);
    }

    #[test]
    fn earliest_availability_finds_gap() {
        let mut a = make_job(0, 3, 5, 0);
        a.set_status(JobStatus::Scheduled);
        let mut b = make_job(1, 1, 10, 0);
        b.set_status(JobStatus::Scheduled);

        assert_eq!(earliest_node_availability([&a, &b], 2, 0, 4), Some(5));
        assert_eq!(earliest_node_availability([&a, &b], 4, 0, 4), Some(10));
        assert_eq!(earliest_node_availability(Vec::<&BatchJob>::new(), 4, 0, 4), None);
    }
}
