//! Frequency scaling during a DR window.

use std::fmt::Debug;

use tracing::debug;

use dcsim_core::{Cluster, JobId, JobStatus, QueueKind};

/// Strategy that picks which jobs are re-clocked.
pub trait DvfsStrategy: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Jobs whose draw inside `[now, now + length)` depends on their
    /// frequency.
    fn scalable_jobs(&self, cluster: &Cluster, length: i64) -> Vec<JobId>;

    /// Re-clock the scalable jobs to `frequency`. Returns how many changed.
    fn scale(&self, cluster: &mut Cluster, frequency: f64, length: i64) -> usize;
}

/// Re-clocks every job that holds, or will hold, nodes inside the window.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScaleAllJobs;

impl DvfsStrategy for ScaleAllJobs {
    fn name(&self) -> &'static str {
        "scale_all_jobs"
    }

    fn scalable_jobs(&self, cluster: &Cluster, length: i64) -> Vec<JobId> {
        let now = cluster.clock();
        let end = now + length;
        [
            QueueKind::Submitted,
            QueueKind::Scheduled,
            QueueKind::Running,
            QueueKind::Paused,
        ]
        .into_iter()
        .flat_map(|kind| cluster.queue_jobs(kind))
        .filter(|job| match job.status() {
            JobStatus::Scheduled => job.start_time < end,
            JobStatus::Running => !job.requested_to_pause,
            JobStatus::Rescheduled => (now..end).contains(&job.restart_time),
            _ => false,
        })
        .map(|job| job.id)
        .collect()
    }

    fn scale(&self, cluster: &mut Cluster, frequency: f64, length: i64) -> usize {
        let jobs = self.scalable_jobs(cluster, length);
        for id in &jobs {
            cluster.set_job_frequency(*id, frequency);
        }
        debug!(jobs = jobs.len(), frequency, "jobs re-clocked");
        jobs.len()
    }
}
