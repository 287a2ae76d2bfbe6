//! Placement scenarios driven through `Scheduler`.

use std::sync::Arc;

use dcsim_core::*;
use dcsim_scheduler::*;

fn job(id: &str, nodes: u32, duration: i64, deadline: Option<Tick>) -> JobSpec {
    JobSpec {
        id: id.to_string(),
        nodes,
        duration,
        frequency: 2.7,
        job_class: 0,
        submission: 0,
        start: 0,
        deadline,
    }
}

fn cluster_with(capacity: u32, interval: i64, traced: bool, jobs: Vec<JobSpec>) -> Cluster {
    let settings = ClusterSettings {
        capacity,
        scheduling_interval: interval,
        traced_start_mode: traced,
        ..ClusterSettings::default()
    };
    let mut cluster = Cluster::from_workload(settings, Models::default(), &WorkloadSpec { jobs }, Vec::new());
    // hand the t=0 submissions to the queues
    cluster.update_job_allocation(false, false);
    cluster
}

fn slack_scheduler(interval: i64) -> Scheduler {
    Scheduler::new(Arc::new(DeadlineSlackStrategy), interval).unwrap()
}

#[test]
fn two_jobs_fill_the_cluster_at_zero() {
    let mut cluster = cluster_with(4, 900, false, vec![job("a", 2, 10, None), job("b", 2, 10, None)]);
    let scheduler = slack_scheduler(900);

    let outcome = scheduler.schedule_jobs(&mut cluster).unwrap();
    assert_eq!(outcome.placed.len(), 2);
    cluster.update_job_allocation(true, true);

    assert_eq!(cluster.occupied_nodes(), 4);
    assert_eq!(cluster.queues.len(QueueKind::Running), 2);
    for job in cluster.jobs() {
        assert_eq!(job.start_time, 0);
        assert_eq!(job.status(), JobStatus::Running);
    }
    assert_eq!(cluster.next_scheduler_call, 900);
}

#[test]
fn third_job_is_deferred_to_interval_end() {
    let jobs = vec![job("a", 2, 10, None), job("b", 2, 10, None), job("c", 2, 10, None)];
    let mut cluster = cluster_with(4, 10, false, jobs);
    let scheduler = slack_scheduler(10);

    let outcome = scheduler.schedule_jobs(&mut cluster).unwrap();
    assert_eq!(outcome.placed.len(), 2);
    assert_eq!(outcome.deferred.len(), 1);
    assert_eq!(outcome.backfill_deadline, Some(10));

    let deferred = cluster.job(outcome.deferred[0]);
    assert_eq!(deferred.status(), JobStatus::Submitted);
    assert_eq!(deferred.start_time, 10);
    assert_eq!(cluster.queues.len(QueueKind::Submitted), 1);

    cluster.update_job_allocation(true, true);
    assert_eq!(cluster.occupied_nodes(), 4);
}

#[test]
fn later_jobs_respect_the_backfilling_deadline() {
    let jobs = vec![
        job("wide", 3, 15, Some(16)),
        job("blocked", 2, 10, Some(12)),
        job("short", 1, 3, Some(100)),
        job("long", 1, 30, Some(1000)),
    ];
    let mut cluster = cluster_with(4, 15, false, jobs);
    let scheduler = slack_scheduler(15);

    let outcome = scheduler.schedule_jobs(&mut cluster).unwrap();
    let deadline = outcome.backfill_deadline.expect("blocked job sets a deadline");
    assert_eq!(deadline, 15);

    let placed_after_block: Vec<JobId> = outcome
        .placed
        .iter()
        .copied()
        .filter(|id| cluster.job(*id).name != "wide")
        .collect();
    assert_eq!(placed_after_block, vec![JobId(2)]);
    for id in placed_after_block {
        assert!(cluster.job(id).calculated_finish() < deadline);
    }
    assert!(outcome.deferred.contains(&JobId(1)));
    assert!(outcome.deferred.contains(&JobId(3)));
}

#[test]
fn traced_start_mode_places_at_trace() {
    let mut spec = job("traced", 2, 10, None);
    spec.start = 5;
    let mut cluster = cluster_with(4, 900, true, vec![spec]);
    let scheduler = slack_scheduler(900);

    let outcome = scheduler.schedule_jobs(&mut cluster).unwrap();
    assert_eq!(outcome.placed, vec![JobId(0)]);
    assert_eq!(cluster.job(JobId(0)).start_time, 5);
}

#[test]
fn scheduler_skips_until_next_call() {
    let mut cluster = cluster_with(4, 100, false, vec![job("a", 1, 5, None)]);
    let scheduler = slack_scheduler(100);
    assert!(scheduler.schedule_jobs(&mut cluster).is_some());
    cluster.update_job_allocation(true, true);
    assert!(scheduler.schedule_jobs(&mut cluster).is_none());
}

#[test]
fn every_strategy_drains_a_workload() {
    for kind in [StrategyKind::DeadlineSlack, StrategyKind::Fifo, StrategyKind::MinimumCost] {
        let mut config = SimConfig::default();
        config.cluster.capacity = 6;
        config.cluster.scheduling_interval = 20;
        config.scheduling.strategy = kind;
        config.scheduling.look_ahead_secs = 200;
        config.scheduling.start_step_secs = 10;
        let scheduler = Scheduler::from_config(&config).unwrap();

        let jobs = (0..8)
            .map(|i| JobSpec {
                submission: i * 3,
                start: i * 3,
                ..job(&format!("j{i}"), 1 + (i as u32 % 4), 5 + i, None)
            })
            .collect();
        let mut cluster = Cluster::from_workload(
            ClusterSettings::from(&config),
            Models::default(),
            &WorkloadSpec { jobs },
            Vec::new(),
        );

        for _ in 0..600 {
            cluster.update_job_allocation(false, false);
            scheduler.schedule_jobs(&mut cluster);
            cluster.update_job_allocation(true, true);
            assert!(cluster.occupied_nodes() <= 6);
        }
        assert_eq!(cluster.queues.len(QueueKind::Finished), 8, "{kind:?} left jobs behind");
    }
}

#[test]
fn minimum_cost_waits_past_a_running_job_finish() {
    let late = JobSpec {
        submission: 5,
        start: 5,
        ..job("b", 2, 10, None)
    };
    let mut cluster = cluster_with(2, 20, false, vec![job("a", 2, 10, None), late]);
    let strategy = MinimumCostStrategy::new(200, 1, vec![2.7]).unwrap();
    let scheduler = Scheduler::new(Arc::new(strategy), 20).unwrap();

    scheduler.schedule_jobs(&mut cluster).unwrap();
    cluster.update_job_allocation(true, true);
    while cluster.clock() < 5 {
        cluster.update_job_allocation(false, false);
        scheduler.schedule_jobs(&mut cluster);
        cluster.update_job_allocation(true, true);
    }
    cluster.update_job_allocation(false, false);
    assert_eq!(cluster.queues.len(QueueKind::Submitted), 1);

    let outcome = scheduler.schedule_interval(&mut cluster, 20, false);
    assert_eq!(outcome.placed, vec![JobId(1)]);
    let finish = cluster.job(JobId(0)).calculated_finish();
    assert_eq!(finish, 10);
    assert_eq!(cluster.job(JobId(1)).start_time, finish + 1);

    cluster.update_job_allocation(true, true);
    for _ in 0..40 {
        cluster.update_job_allocation(false, false);
        scheduler.schedule_jobs(&mut cluster);
        cluster.update_job_allocation(true, true);
        cluster.check_capacity();
        assert!(cluster.occupied_nodes() <= 2);
    }
    assert_eq!(cluster.queues.len(QueueKind::Finished), 2);
}
