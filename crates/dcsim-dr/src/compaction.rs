//! Schedule compaction inside a DR window.
//!
//! The window is cut into slots. Every movable job gets one binary column
//! per slot meaning "the job runs in this slot", and a continuous column
//! `z` bounds the per-slot facility draw from above. Minimising `z`
//! flattens the power profile without changing how much work each job
//! does inside the window.
//!
//! Rows:
//!
//! - per job, its slots sum to its run length in the window
//! - per slot, `Σ power × x − z <= −fixed power`
//! - per slot, `Σ nodes × x <= capacity − fixed nodes`
//! - per job and slot pair further apart than the run length,
//!   `x + x' <= 1`
//!
//! A job's share of the window is always one block of slots: a job can
//! hold at most one pending pause, so a split run could not be committed.
//! Jobs that cannot move (running jobs, and jobs running past the window
//! end, when jobs cannot be paused) only contribute fixed load.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use dcsim_core::{Cluster, Event, EventKind, JobId, JobStatus, QueueKind, Tick};

use crate::error::DrResult;
use crate::ilp::{Assignment, IlpModel, Sense, SolveOutcome, VarKind};
use crate::solver::IlpSolver;

/// A job the model may move.
#[derive(Debug, Clone, PartialEq)]
pub struct MovableJob {
    pub id: JobId,
    /// Slots the job must occupy inside the window.
    pub run_slots: usize,
    pub power_kw: f64,
    pub nodes: u32,
}

/// Compaction problem for one window, before it becomes an ILP.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionProblem {
    pub start: Tick,
    pub end: Tick,
    pub slot_steps: i64,
    pub capacity: u32,
    pub jobs: Vec<MovableJob>,
    pub fixed_power_kw: Vec<f64>,
    pub fixed_nodes: Vec<u32>,
}

impl CompactionProblem {
    /// Split `candidates` into movable and fixed load over
    /// `[now, now + length)`. `None` when fewer than two jobs could move.
    pub fn build(cluster: &Cluster, candidates: &[JobId], length: i64, slot_steps: i64) -> Option<Self> {
        let slot_steps = slot_steps.max(1);
        let start = cluster.clock();
        let end = start + length;
        let slots = (length.max(0) as usize).div_ceil(slot_steps as usize);
        let pausable = cluster.settings.jobs_pausable;
        let fraction = cluster.settings.it_power_fraction;
        let pue = cluster.models.pue.pue_at(start);

        let mut problem = Self {
            start,
            end,
            slot_steps,
            capacity: cluster.capacity(),
            jobs: Vec::new(),
            fixed_power_kw: vec![0.0; slots],
            fixed_nodes: vec![0; slots],
        };

        for &id in candidates {
            let job = cluster.job(id);
            let power_kw = job.job_power() / 1000.0 / fraction * pue;
            let steps = job.window_steps(start, end);
            if steps <= 0 {
                continue;
            }
            let fixed = !pausable && (job.status() == JobStatus::Running || job.calculated_finish() >= end);
            if fixed {
                let from = job.occupancy_from(start).max(start);
                let first = ((from - start) / slot_steps) as usize;
                let last = ((from + steps - 1 - start) / slot_steps) as usize;
                for s in first..=last.min(slots.saturating_sub(1)) {
                    problem.fixed_power_kw[s] += power_kw;
                    problem.fixed_nodes[s] += job.nodes;
                }
                continue;
            }
            let run_slots = (steps as usize).div_ceil(slot_steps as usize).min(slots);
            problem.jobs.push(MovableJob {
                id,
                run_slots,
                power_kw,
                nodes: job.nodes,
            });
        }

        (problem.jobs.len() >= 2).then_some(problem)
    }

    pub fn slots(&self) -> usize {
        self.fixed_nodes.len()
    }

    /// Column of "job `j` runs in slot `s`". Column 0 is the peak.
    pub fn column(&self, job: usize, slot: usize) -> usize {
        1 + job * self.slots() + slot
    }

    pub fn to_model(&self) -> IlpModel {
        let slots = self.slots();
        let mut model = IlpModel::default();
        let z = model.add_variable("z", VarKind::Continuous);
        for j in 0..self.jobs.len() {
            for s in 0..slots {
                model.add_variable(format!("x_{j}_{s}"), VarKind::Binary);
            }
        }

        for (j, job) in self.jobs.iter().enumerate() {
            let terms = (0..slots).map(|s| (self.column(j, s), 1.0)).collect();
            model.add_constraint(format!("run_{j}"), terms, Sense::Eq, job.run_slots as f64);
        }

        for s in 0..slots {
            let mut power: Vec<(usize, f64)> = self
                .jobs
                .iter()
                .enumerate()
                .map(|(j, job)| (self.column(j, s), job.power_kw))
                .collect();
            power.push((z, -1.0));
            model.add_constraint(format!("power_{s}"), power, Sense::Le, -self.fixed_power_kw[s]);

            let nodes = self
                .jobs
                .iter()
                .enumerate()
                .map(|(j, job)| (self.column(j, s), job.nodes as f64))
                .collect();
            let free = self.capacity as f64 - self.fixed_nodes[s] as f64;
            model.add_constraint(format!("nodes_{s}"), nodes, Sense::Le, free);
        }

        for (j, job) in self.jobs.iter().enumerate() {
            for s in 0..slots {
                for later in (s + job.run_slots.max(1))..slots {
                    model.add_constraint(
                        format!("contig_{j}_{s}_{later}"),
                        vec![(self.column(j, s), 1.0), (self.column(j, later), 1.0)],
                        Sense::Le,
                        1.0,
                    );
                }
            }
        }

        model.objective = vec![(z, 1.0)];
        model
    }

    /// First slot of job `j`'s block, if the assignment gives it exactly
    /// `run_slots` consecutive slots.
    pub fn block_start(&self, assignment: &Assignment, job: usize) -> Option<usize> {
        let set: Vec<usize> = (0..self.slots())
            .filter(|s| assignment.is_set(self.column(job, *s)))
            .collect();
        let first = *set.first()?;
        let contiguous = set.iter().enumerate().all(|(i, s)| *s == first + i);
        (contiguous && set.len() == self.jobs[job].run_slots).then_some(first)
    }

    /// Block starts of every job, or `None` if any job's slots are split
    /// or miscounted.
    pub fn block_starts(&self, assignment: &Assignment) -> Option<Vec<usize>> {
        (0..self.jobs.len()).map(|j| self.block_start(assignment, j)).collect()
    }
}

/// What a compaction pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Fewer than two jobs could move.
    Skipped,
    Applied { moved: usize },
    Infeasible,
    Timeout,
    /// The solver's assignment gave some job a split or wrongly sized run.
    Rejected,
}

/// Runs compaction through an injected solver.
#[derive(Debug, Clone)]
pub struct ScheduleCompactor {
    solver: Arc<dyn IlpSolver>,
    timeout: Duration,
    slot_steps: i64,
}

impl ScheduleCompactor {
    pub fn new(solver: Arc<dyn IlpSolver>, timeout: Duration, slot_steps: i64) -> Self {
        Self {
            solver,
            timeout,
            slot_steps: slot_steps.max(1),
        }
    }

    pub fn solver(&self) -> &dyn IlpSolver {
        self.solver.as_ref()
    }

    /// Compact `candidates` over `[now, now + length)`. On anything but a
    /// solution the schedule is left as it was.
    pub fn compact(
        &self,
        cluster: &mut Cluster,
        candidates: &[JobId],
        length: i64,
    ) -> DrResult<CompactionOutcome> {
        let Some(problem) = CompactionProblem::build(cluster, candidates, length, self.slot_steps) else {
            return Ok(CompactionOutcome::Skipped);
        };
        let model = problem.to_model();
        debug!(
            solver = self.solver.name(),
            jobs = problem.jobs.len(),
            slots = problem.slots(),
            rows = model.constraints.len(),
            "compaction model built"
        );

        let assignment = match self.solver.solve(&model, self.timeout)? {
            SolveOutcome::Feasible(assignment) => assignment,
            SolveOutcome::Infeasible => {
                info!(jobs = problem.jobs.len(), "compaction infeasible, schedule kept");
                return Ok(CompactionOutcome::Infeasible);
            }
            SolveOutcome::Timeout => {
                info!(timeout = ?self.timeout, "compaction timed out, schedule kept");
                return Ok(CompactionOutcome::Timeout);
            }
        };

        let Some(starts) = problem.block_starts(&assignment) else {
            warn!(solver = self.solver.name(), "assignment splits a job's run, schedule kept");
            return Ok(CompactionOutcome::Rejected);
        };
        let moved = apply_assignment(cluster, &problem, &starts);
        info!(moved, peak_kw = assignment.objective, "compaction applied");
        Ok(CompactionOutcome::Applied { moved })
    }
}

/// Move every job to the start of its block. Returns how many jobs
/// changed.
fn apply_assignment(cluster: &mut Cluster, problem: &CompactionProblem, starts: &[usize]) -> usize {
    let now = problem.start;
    let mut moved = 0;
    for (movable, &slot) in problem.jobs.iter().zip(starts) {
        let id = movable.id;
        let tick = now + slot as i64 * problem.slot_steps;
        let budget = movable.run_slots as i64 * problem.slot_steps;

        match cluster.job(id).status() {
            JobStatus::Running => {
                if slot == 0 {
                    continue;
                }
                let job = cluster.job_mut(id);
                job.requested_to_pause = true;
                job.already_rescheduled = true;
                job.restart_time = tick;
                cluster.events.schedule(Event::job(EventKind::JobPause, now, id));
                cluster.events.schedule(Event::job(EventKind::JobRestart, tick, id));
            }
            JobStatus::Scheduled | JobStatus::Rescheduled => {
                if cluster.job(id).planned_start() == tick {
                    continue;
                }
                cluster.commit_placement(id, tick, QueueKind::Scheduled);
                if cluster.job(id).calculated_finish() > problem.end && problem.end - tick > budget {
                    let pause = (tick + budget).min(problem.end);
                    cluster.events.schedule(Event::job(EventKind::JobPause, pause, id));
                }
            }
            _ => continue,
        }
        moved += 1;
        debug!(job = %id, tick, "job moved by compaction");
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcsim_core::{ClusterSettings, JobSpec, Models, WorkloadSpec};

    use crate::solver::MicroLp;

    /// Hands back a fixed assignment whatever the model says.
    #[derive(Debug)]
    struct Scripted(Assignment);

    impl IlpSolver for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn solve(&self, _model: &IlpModel, _timeout: Duration) -> DrResult<SolveOutcome> {
            Ok(SolveOutcome::Feasible(self.0.clone()))
        }
    }

    fn stacked_cluster() -> Cluster {
        stacked_cluster_with(false)
    }

    fn stacked_cluster_with(pausable: bool) -> Cluster {
        let settings = ClusterSettings {
            capacity: 4,
            jobs_pausable: pausable,
            ..ClusterSettings::default()
        };
        let spec = |id: &str| JobSpec {
            id: id.to_string(),
            nodes: 2,
            duration: 2,
            frequency: 2.7,
            job_class: 0,
            submission: 0,
            start: 0,
            deadline: None,
        };
        let workload = WorkloadSpec {
            jobs: vec![spec("a"), spec("b")],
        };
        let mut cluster = Cluster::from_workload(settings, Models::default(), &workload, Vec::new());
        cluster.update_job_allocation(false, false);
        cluster.commit_placement(JobId(0), 0, QueueKind::Submitted);
        cluster.commit_placement(JobId(1), 0, QueueKind::Submitted);
        cluster
    }

    #[test]
    fn builds_one_row_per_job_and_two_per_slot() {
        let cluster = stacked_cluster();
        let problem = CompactionProblem::build(&cluster, &[JobId(0), JobId(1)], 6, 1).unwrap();
        assert_eq!(problem.slots(), 6);
        assert_eq!(problem.jobs[0].run_slots, 3);

        let model = problem.to_model();
        assert_eq!(model.variables.len(), 1 + 2 * 6);
        let contiguity = 2 * (1 + 2 + 3);
        assert_eq!(model.constraints.len(), 2 + 2 * 6 + contiguity);
    }

    #[test]
    fn single_job_is_not_worth_a_model() {
        let cluster = stacked_cluster();
        assert!(CompactionProblem::build(&cluster, &[JobId(0)], 6, 1).is_none());
    }

    #[test]
    fn stacked_jobs_are_spread_apart() {
        let mut cluster = stacked_cluster();
        let compactor = ScheduleCompactor::new(Arc::new(MicroLp), Duration::from_secs(5), 1);
        let outcome = compactor.compact(&mut cluster, &[JobId(0), JobId(1)], 6).unwrap();
        assert_eq!(outcome, CompactionOutcome::Applied { moved: 1 });

        let a = cluster.job(JobId(0));
        let b = cluster.job(JobId(1));
        let (first, second) = if a.start_time < b.start_time { (a, b) } else { (b, a) };
        assert!(first.calculated_finish() < second.start_time);
    }

    #[test]
    fn pausable_jobs_still_get_one_block() {
        let cluster = stacked_cluster_with(true);
        let problem = CompactionProblem::build(&cluster, &[JobId(0), JobId(1)], 6, 1).unwrap();
        let model = problem.to_model();
        assert!(model.constraints.iter().any(|row| row.name == "contig_0_0_3"));
    }

    #[test]
    fn split_assignment_is_rejected() {
        let mut cluster = stacked_cluster_with(true);
        let problem = CompactionProblem::build(&cluster, &[JobId(0), JobId(1)], 6, 1).unwrap();
        let mut values = vec![0.0; problem.to_model().variables.len()];
        for s in [0, 2, 4] {
            values[problem.column(0, s)] = 1.0;
        }
        for s in [1, 3, 5] {
            values[problem.column(1, s)] = 1.0;
        }
        let split = Assignment { values, objective: 0.0 };
        assert_eq!(problem.block_start(&split, 0), None);

        let compactor = ScheduleCompactor::new(Arc::new(Scripted(split)), Duration::from_secs(1), 1);
        let outcome = compactor.compact(&mut cluster, &[JobId(0), JobId(1)], 6).unwrap();

        assert_eq!(outcome, CompactionOutcome::Rejected);
        for id in [JobId(0), JobId(1)] {
            assert_eq!(cluster.job(id).planned_start(), 0);
            assert_eq!(cluster.job(id).status(), JobStatus::Scheduled);
        }
    }
}
