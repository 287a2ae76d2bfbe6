//! First-come first-served placement with backfilling.

use dcsim_core::{Cluster, NodeOccupationPlan, QueueKind};

use crate::backfill::backfill;
use crate::strategy::{IntervalOutcome, SchedulingStrategy, gather_candidates};

#[derive(Debug, Clone, Copy, Default)]
pub struct FifoStrategy;

impl SchedulingStrategy for FifoStrategy {
    fn name(&self) -> &'static str {
        "fifo"
    }

    fn schedule_interval(
        &self,
        cluster: &mut Cluster,
        candidates: QueueKind,
        length: i64,
        plan: &mut NodeOccupationPlan,
    ) -> IntervalOutcome {
        let mut ordered = gather_candidates(cluster, candidates);
        ordered.sort_by_key(|(id, _)| cluster.job(*id).submission_time);
        backfill(cluster, &ordered, length, plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcsim_core::{ClusterSettings, JobId, JobSpec, Models, WorkloadSpec};

    #[test]
    fn earlier_submission_goes_first() {
        let job = |id: &str, submission: i64| JobSpec {
            id: id.to_string(),
            nodes: 3,
            duration: 5,
            frequency: 2.7,
            job_class: 0,
            submission,
            start: submission,
            deadline: None,
        };
        let settings = ClusterSettings {
            capacity: 4,
            ..ClusterSettings::default()
        };
        let workload = WorkloadSpec {
            jobs: vec![job("late", 2), job("early", 1)],
        };
        let mut cluster = Cluster::from_workload(settings, Models::default(), &workload, Vec::new());
        for _ in 0..3 {
            cluster.update_job_allocation(true, true);
        }

        let mut plan = NodeOccupationPlan::empty(cluster.clock(), 50, 4);
        let outcome = FifoStrategy.schedule_interval(&mut cluster, QueueKind::Submitted, 50, &mut plan);

        assert_eq!(outcome.placed, vec![JobId(1), JobId(0)]);
        assert_eq!(cluster.job(JobId(1)).start_time, 3);
        assert_eq!(cluster.job(JobId(0)).start_time, 9);
    }
}
