//! Per-tick event handling.
//!
//! Order within a tick is fixed: pause, restart, finish, start, finish
//! again, submission, node updates, then the one-step advance of the job
//! counters. Restarts and starts can only use nodes freed earlier in the
//! same tick.

use tracing::{debug, trace, warn};

use crate::cluster::{Cluster, QueueKind, TickCost};
use crate::event::{Event, EventKind, EventTarget};
use crate::invariant;
use crate::job::{JobId, JobStatus};

impl Cluster {
    /// Handle every event due at the current tick.
    ///
    /// With `elapse`, running, paused and scheduled jobs advance one step.
    /// With `advance_clock`, the tick's costs are booked and the clock
    /// moves on. Calling it twice in one tick is safe: handled events are
    /// removed, so the second call only sees events added in between.
    pub fn update_job_allocation(&mut self, elapse: bool, advance_clock: bool) {
        self.handle_pauses();
        self.handle_restarts();
        self.handle_finishes();
        self.handle_starts();
        self.handle_finishes();
        self.handle_submissions();
        self.handle_node_updates();

        if elapse {
            self.elapse_jobs();
        }
        if advance_clock {
            let cost = TickCost {
                energy: self.tick_energy_cost(),
                sla: self.tick_sla,
            };
            self.ledger.record(self.clock(), cost);
            self.tick_sla = 0.0;
            self.advance_clock();
        }
    }

    /// Job ids of `kind` due now, each marked handled.
    fn take_due(&mut self, kind: EventKind) -> Vec<JobId> {
        let now = self.clock();
        let targets = self.events.events_at(kind, now);
        targets
            .into_iter()
            .filter_map(|target| {
                self.events.mark_handled(kind, target);
                match target {
                    EventTarget::Job(id) => Some(id),
                    other => {
                        warn!(?kind, ?other, "non-job target on job event");
                        None
                    }
                }
            })
            .collect()
    }

    fn bind_nodes(&mut self, id: JobId) -> bool {
        let now = self.clock();
        let nodes = self.job(id).nodes;
        match self.nodes.bind(id, nodes) {
            Some(bound) => {
                for node in &bound {
                    self.events.schedule(Event::node_update(now, *node));
                }
                self.job_mut(id).bound_nodes = bound;
                true
            }
            None => false,
        }
    }

    fn release_nodes(&mut self, id: JobId) {
        let now = self.clock();
        let bound = std::mem::take(&mut self.job_mut(id).bound_nodes);
        self.nodes.release(&bound);
        for node in bound {
            self.events.schedule(Event::node_update(now, node));
        }
    }

    fn handle_pauses(&mut self) {
        for id in self.take_due(EventKind::JobPause) {
            if self.job(id).status() != JobStatus::Running {
                debug!(job = %id, status = %self.job(id).status(), "stale pause event");
                continue;
            }
            self.release_nodes(id);
            self.events.unschedule(EventKind::JobFinish, EventTarget::Job(id));

            let nsc = self.next_scheduler_call;
            let job = self.job_mut(id);
            let to = if job.already_rescheduled {
                job.set_status(JobStatus::Rescheduled);
                QueueKind::Scheduled
            } else {
                job.set_status(JobStatus::Paused);
                job.restart_time = nsc;
                QueueKind::Paused
            };
            job.already_rescheduled = false;
            job.requested_to_pause = false;
            let restart = job.restart_time;
            self.move_job(id, QueueKind::Running, to);
            debug!(job = %id, restart, "job paused");
        }
    }

    fn handle_restarts(&mut self) {
        let now = self.clock();
        for id in self.take_due(EventKind::JobRestart) {
            let job = self.job(id);
            if job.status() != JobStatus::Rescheduled || job.restart_time != now {
                debug!(job = %id, status = %job.status(), "stale restart event");
                continue;
            }
            if self.bind_nodes(id) {
                let job = self.job_mut(id);
                job.set_status(JobStatus::Running);
                let finish = job.calculated_finish();
                self.events
                    .reschedule(EventKind::JobFinish, EventTarget::Job(id), finish);
                self.move_job(id, QueueKind::Scheduled, QueueKind::Running);
                debug!(job = %id, finish, "job restarted");
            } else {
                let nsc = self.next_scheduler_call;
                let job = self.job_mut(id);
                job.restart_time = nsc;
                job.set_status(JobStatus::Paused);
                self.events.unschedule(EventKind::JobFinish, EventTarget::Job(id));
                self.move_job(id, QueueKind::Scheduled, QueueKind::Paused);
                debug!(job = %id, retry = nsc, "not enough idle nodes to restart");
            }
        }
    }

    fn handle_finishes(&mut self) {
        let now = self.clock();
        for id in self.take_due(EventKind::JobFinish) {
            let job = self.job(id);
            if job.status() != JobStatus::Running {
                debug!(job = %id, status = %job.status(), "stale finish event");
                continue;
            }
            if job.remaining_steps() > 0 {
                let finish = job.calculated_finish();
                warn!(job = %id, remaining = job.remaining_steps(), finish, "finish event before work is done");
                self.events
                    .reschedule(EventKind::JobFinish, EventTarget::Job(id), finish.max(now + 1));
                continue;
            }

            self.release_nodes(id);
            let usage_price = self.settings.usage_price;
            let seconds_per_step = self.settings.seconds_per_step;
            let models = self.models.clone();
            let job = self.job_mut(id);
            job.set_status(JobStatus::Finished);
            job.actual_finish = Some(now);
            let delay = job.delay();
            let fee = job.sla_cost(usage_price, seconds_per_step, &models);
            self.tick_sla += fee;
            self.move_job(id, QueueKind::Running, QueueKind::Finished);
            debug!(job = %id, delay, fee, "job finished");
        }
    }

    fn handle_starts(&mut self) {
        let now = self.clock();
        for id in self.take_due(EventKind::JobStart) {
            let job = self.job(id);
            if job.status() != JobStatus::Scheduled || job.start_time != now {
                debug!(job = %id, status = %job.status(), "stale start event");
                continue;
            }
            if self.bind_nodes(id) {
                let job = self.job_mut(id);
                job.set_status(JobStatus::Running);
                let finish = job.calculated_finish();
                self.events
                    .reschedule(EventKind::JobFinish, EventTarget::Job(id), finish);
                self.move_job(id, QueueKind::Scheduled, QueueKind::Running);
                debug!(job = %id, finish, "job started");
            } else {
                let nsc = self.next_scheduler_call;
                let job = self.job_mut(id);
                job.start_time = nsc;
                job.set_status(JobStatus::Submitted);
                self.events.unschedule(EventKind::JobFinish, EventTarget::Job(id));
                self.move_job(id, QueueKind::Scheduled, QueueKind::Affected);
                debug!(job = %id, retry = nsc, "not enough idle nodes to start");
            }
        }
    }

    fn handle_submissions(&mut self) {
        let traced = self.settings.traced_start_mode;
        let nsc = self.next_scheduler_call;
        for id in self.take_due(EventKind::JobSubmission) {
            let job = self.job_mut(id);
            if job.status() != JobStatus::Parsed {
                continue;
            }
            job.set_status(JobStatus::Submitted);
            let queue = if traced && job.start_time < nsc {
                QueueKind::Affected
            } else {
                QueueKind::Submitted
            };
            self.queues.push(queue, id);
            trace!(job = %id, ?queue, "job submitted");
        }
    }

    fn handle_node_updates(&mut self) {
        let now = self.clock();
        for target in self.events.events_at(EventKind::NodeUpdate, now) {
            self.events.mark_handled(EventKind::NodeUpdate, target);
            let EventTarget::Node(node_id) = target else {
                warn!(?target, "non-node target on node update");
                continue;
            };
            let per_node = self
                .nodes
                .get(node_id)
                .and_then(|n| n.job)
                .map(|job| self.job(job).power_per_node());
            self.nodes.refresh_power(node_id, per_node);
        }
    }

    fn elapse_jobs(&mut self) {
        for kind in [QueueKind::Running, QueueKind::Paused, QueueKind::Scheduled] {
            let ids = self.queues.get(kind).to_vec();
            for id in ids {
                let job = self.job_mut(id);
                invariant!(
                    kind != QueueKind::Running || job.status() == JobStatus::Running,
                    "{id} in running queue with status {}",
                    job.status()
                );
                job.elapse_step();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::cluster::{Cluster, ClusterSettings, QueueKind};
    use crate::event::{Event, EventKind};
    use crate::job::{JobId, JobStatus};
    use crate::models::Models;
    use crate::workload::{JobSpec, WorkloadSpec};

    fn make_cluster(capacity: u32, jobs: &[(u32, i64)]) -> Cluster {
        let settings = ClusterSettings {
            capacity,
            ..ClusterSettings::default()
        };
        let workload = WorkloadSpec {
            jobs: jobs
                .iter()
                .enumerate()
                .map(|(i, (nodes, duration))| JobSpec {
                    id: format!("j{i}"),
                    nodes: *nodes,
                    duration: *duration,
                    frequency: 2.7,
                    job_class: 0,
                    submission: 0,
                    start: 0,
                    deadline: None,
                })
                .collect(),
        };
        Cluster::from_workload(settings, Models::default(), &workload, Vec::new())
    }

    /// Place a submitted job at `start` by hand.
    fn place(cluster: &mut Cluster, id: JobId, start: i64) {
        let job = cluster.job_mut(id);
        job.start_time = start;
        job.set_status(JobStatus::Scheduled);
        cluster
            .events
            .schedule(Event::job(EventKind::JobStart, start, id));
        cluster.move_job(id, QueueKind::Submitted, QueueKind::Scheduled);
    }

    #[test]
    fn job_runs_to_completion() {
        let mut cluster = make_cluster(4, &[(2, 3)]);
        cluster.update_job_allocation(false, false);
        place(&mut cluster, JobId(0), 0);
        for _ in 0..3 {
            cluster.update_job_allocation(true, true);
            assert_eq!(cluster.occupied_nodes(), 2);
            assert!(cluster.job_power() > 0.0);
        }
        cluster.update_job_allocation(true, true);
        assert_eq!(cluster.job(JobId(0)).status(), JobStatus::Finished);
        assert_eq!(cluster.job(JobId(0)).actual_finish, Some(3));
        assert_eq!(cluster.occupied_nodes(), 0);
        assert_eq!(cluster.job_power(), 0.0);
        assert!(cluster.ledger.costs_between(0, 3) > 0.0);
    }

    #[test]
    fn start_without_idle_nodes_bounces_to_affected() {
        let mut cluster = make_cluster(2, &[(2, 5), (2, 5)]);
        cluster.update_job_allocation(false, false);
        cluster.next_scheduler_call = 10;
        place(&mut cluster, JobId(0), 0);
        place(&mut cluster, JobId(1), 0);
        cluster.update_job_allocation(true, true);

        assert_eq!(cluster.job(JobId(0)).status(), JobStatus::Running);
        let bounced = cluster.job(JobId(1));
        assert_eq!(bounced.status(), JobStatus::Submitted);
        assert_eq!(bounced.start_time, 10);
        assert_eq!(cluster.queues.locate(JobId(1)), Some(QueueKind::Affected));
        cluster.check_capacity();
    }

    #[test]
    fn pause_releases_nodes_and_waits_for_scheduler() {
        let mut cluster = make_cluster(4, &[(2, 10)]);
        cluster.update_job_allocation(false, false);
        place(&mut cluster, JobId(0), 0);
        cluster.update_job_allocation(true, true);
        cluster.update_job_allocation(true, true);

        cluster.next_scheduler_call = 20;
        cluster.job_mut(JobId(0)).requested_to_pause = true;
        cluster
            .events
            .schedule(Event::job(EventKind::JobPause, 2, JobId(0)));
        cluster.update_job_allocation(true, true);

        let job = cluster.job(JobId(0));
        assert_eq!(job.status(), JobStatus::Paused);
        assert_eq!(job.restart_time, 20);
        assert!(!job.requested_to_pause);
        assert_eq!(job.calculated_finish(), 28);
        assert_eq!(cluster.occupied_nodes(), 0);
        assert_eq!(cluster.queues.locate(JobId(0)), Some(QueueKind::Paused));
    }

    #[test]
    fn rescheduled_job_restarts_and_finishes_late() {
        let mut cluster = make_cluster(4, &[(1, 4)]);
        cluster.update_job_allocation(false, false);
        place(&mut cluster, JobId(0), 0);
        cluster.update_job_allocation(true, true);

        {
            let job = cluster.job_mut(JobId(0));
            job.already_rescheduled = true;
            job.restart_time = 5;
        }
        cluster
            .events
            .schedule(Event::job(EventKind::JobPause, 1, JobId(0)));
        cluster
            .events
            .schedule(Event::job(EventKind::JobRestart, 5, JobId(0)));

        while cluster.clock() < 12 {
            cluster.update_job_allocation(true, true);
        }
        let job = cluster.job(JobId(0));
        assert_eq!(job.status(), JobStatus::Finished);
        // one step before the pause, three after the restart at 5
        assert_eq!(job.actual_finish, Some(8));
    }

    #[test]
    fn second_pass_in_same_tick_only_sees_new_events() {
        let mut cluster = make_cluster(4, &[(1, 4)]);
        cluster.update_job_allocation(false, false);
        assert_eq!(cluster.queues.len(QueueKind::Submitted), 1);
        cluster.update_job_allocation(false, false);
        assert_eq!(cluster.queues.len(QueueKind::Submitted), 1);
        assert_eq!(cluster.clock(), 0);
    }
}
