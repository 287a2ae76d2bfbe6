//! Deadline-slack placement: the jobs closest to missing their deadline,
//! relative to their size, go first.

use tracing::debug;

use dcsim_core::{Cluster, NodeOccupationPlan, QueueKind};

use crate::backfill::{backfill, earliest_fit_theta};
use crate::strategy::{IntervalOutcome, SchedulingStrategy, gather_candidates};

#[derive(Debug, Clone, Copy, Default)]
pub struct DeadlineSlackStrategy;

impl SchedulingStrategy for DeadlineSlackStrategy {
    fn name(&self) -> &'static str {
        "deadline_slack"
    }

    fn schedule_interval(
        &self,
        cluster: &mut Cluster,
        candidates: QueueKind,
        length: i64,
        plan: &mut NodeOccupationPlan,
    ) -> IntervalOutcome {
        let now = cluster.clock();
        let capacity = cluster.capacity();
        let mut ordered = gather_candidates(cluster, candidates);
        // stable: equal slack keeps queue order
        ordered.sort_by(|(a, _), (b, _)| {
            let ta = earliest_fit_theta(cluster.job(*a), now, capacity);
            let tb = earliest_fit_theta(cluster.job(*b), now, capacity);
            ta.total_cmp(&tb)
        });
        debug!(candidates = ordered.len(), queue = ?candidates, "deadline-slack pass");
        backfill(cluster, &ordered, length, plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcsim_core::{ClusterSettings, JobId, JobSpec, JobStatus, Models, WorkloadSpec};

    fn make_job(id: &str, nodes: u32, duration: i64, deadline: i64) -> JobSpec {
        JobSpec {
            id: id.to_string(),
            nodes,
            duration,
            frequency: 2.7,
            job_class: 0,
            submission: 0,
            start: 0,
            deadline: Some(deadline),
        }
    }

    #[test]
    fn tightest_deadline_wins_contended_nodes() {
        let settings = ClusterSettings {
            capacity: 2,
            ..ClusterSettings::default()
        };
        let workload = WorkloadSpec {
            jobs: vec![make_job("loose", 2, 10, 500), make_job("tight", 2, 10, 12)],
        };
        let mut cluster = Cluster::from_workload(settings, Models::default(), &workload, Vec::new());
        cluster.update_job_allocation(false, false);

        let mut plan = NodeOccupationPlan::empty(0, 100, 2);
        let outcome = DeadlineSlackStrategy.schedule_interval(&mut cluster, QueueKind::Submitted, 100, &mut plan);

        assert_eq!(outcome.placed.first(), Some(&JobId(1)));
        assert_eq!(cluster.job(JobId(1)).start_time, 0);
        assert_eq!(cluster.job(JobId(1)).status(), JobStatus::Scheduled);
        // the loose job backfills after the tight one
        assert_eq!(cluster.job(JobId(0)).start_time, 11);
    }
}
