//! Batch jobs and their lifecycle.
//!
//! A job is created once from its workload spec, mutated in place for the
//! whole run, and never destroyed: it ends up in the finished queue.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Tick;
use crate::invariant;
use crate::models::{Models, frequency_key};
use crate::node::NodeId;
use crate::workload::JobSpec;

/// Stable index of a job in the cluster arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u32);

impl JobId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Lifecycle status.
///
/// ```text
/// Parsed → Submitted → {Scheduled | Rescheduled} → Running → Finished
///                                                     ↓
///                                   Paused → Rescheduled → Running
/// ```
///
/// `Scheduled → Submitted` and `Rescheduled → Paused` happen when a
/// placement could not be honoured at start time, or when demand
/// response postpones a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Parsed,
    Submitted,
    Scheduled,
    Rescheduled,
    Running,
    Paused,
    Finished,
}

impl JobStatus {
    /// Whether `self → next` is a legal lifecycle step. Staying in the
    /// same status is always legal.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        self == next
            || matches!(
                (self, next),
                (Parsed, Submitted)
                    | (Submitted, Scheduled)
                    | (Submitted, Rescheduled)
                    | (Scheduled, Running)
                    | (Scheduled, Submitted)
                    | (Running, Finished)
                    | (Running, Paused)
                    | (Running, Rescheduled)
                    | (Paused, Rescheduled)
                    | (Rescheduled, Running)
                    | (Rescheduled, Paused)
            )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Parsed => "parsed",
            JobStatus::Submitted => "submitted",
            JobStatus::Scheduled => "scheduled",
            JobStatus::Rescheduled => "rescheduled",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// A rigid batch job: a fixed node count for a duration that depends on
/// the frequency it runs at.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub id: JobId,
    pub name: String,
    pub nodes: u32,
    pub job_class: usize,
    /// Duration in steps at `base_frequency`.
    pub base_duration: i64,
    pub base_frequency: f64,
    /// Frequency chosen at placement; interval resets return to it.
    pub planned_frequency: f64,
    pub submission_time: Tick,
    /// Start time recorded in the workload trace.
    pub traced_start: Tick,
    pub start_time: Tick,
    pub restart_time: Tick,
    pub deadline: Tick,
    pub actual_finish: Option<Tick>,
    /// Nodes the job is bound to; non-empty iff running.
    pub bound_nodes: Vec<NodeId>,
    /// Set when a pause has been requested for a running job.
    pub requested_to_pause: bool,
    /// Set when a pending pause already carries its restart time, so the
    /// job goes straight to `Rescheduled` instead of `Paused`.
    pub already_rescheduled: bool,
    frequency: f64,
    status: JobStatus,
    elapsed: i64,
    remaining: i64,
    paused: i64,
    power_per_node: f64,
}

impl BatchJob {
    pub fn from_spec(id: JobId, spec: &JobSpec, models: &Models) -> Self {
        let deadline = spec
            .deadline
            .unwrap_or_else(|| models.sla.deadline(spec.start, spec.duration));
        Self {
            id,
            name: spec.id.clone(),
            nodes: spec.nodes,
            job_class: spec.job_class,
            base_duration: spec.duration,
            base_frequency: spec.frequency,
            planned_frequency: spec.frequency,
            submission_time: spec.submission,
            traced_start: spec.start,
            start_time: spec.start,
            restart_time: 0,
            deadline,
            actual_finish: None,
            bound_nodes: Vec::new(),
            requested_to_pause: false,
            already_rescheduled: false,
            frequency: spec.frequency,
            status: JobStatus::Parsed,
            elapsed: 0,
            remaining: spec.duration,
            paused: 0,
            power_per_node: models.power.power(spec.frequency, spec.job_class),
        }
    }

    // ── Status ─────────────────────────────────────────────────────

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn set_status(&mut self, next: JobStatus) {
        invariant!(
            self.status.can_transition_to(next),
            "{} cannot go from {} to {}",
            self.id,
            self.status,
            next
        );
        self.status = next;
    }

    // ── Frequency and power ────────────────────────────────────────

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Re-clock the job. Remaining steps follow the runtime model and the
    /// per-node draw follows the power model.
    pub fn set_frequency(&mut self, frequency: f64, models: &Models) {
        if frequency_key(frequency) == frequency_key(self.frequency) {
            return;
        }
        self.remaining = models
            .runtime
            .adjusted_steps(self.frequency, frequency, self.remaining);
        self.frequency = frequency;
        self.power_per_node = models.power.power(frequency, self.job_class);
    }

    pub fn is_at_planned_frequency(&self) -> bool {
        frequency_key(self.frequency) == frequency_key(self.planned_frequency)
    }

    /// Watts drawn by one of the job's nodes.
    pub fn power_per_node(&self) -> f64 {
        self.power_per_node
    }

    /// Watts drawn by all of the job's nodes.
    pub fn job_power(&self) -> f64 {
        self.power_per_node * self.nodes as f64
    }

    // ── Progress counters ──────────────────────────────────────────

    pub fn elapsed_steps(&self) -> i64 {
        self.elapsed
    }

    pub fn remaining_steps(&self) -> i64 {
        self.remaining
    }

    pub fn paused_steps(&self) -> i64 {
        self.paused
    }

    /// Advance the counters by one tick.
    pub fn elapse_step(&mut self) {
        match self.status {
            JobStatus::Running => {
                self.elapsed += 1;
                self.remaining -= 1;
                invariant!(self.remaining >= 0, "{} has negative remaining runtime", self.id);
            }
            JobStatus::Paused | JobStatus::Rescheduled => self.paused += 1,
            _ => {}
        }
    }

    // ── Derived times ──────────────────────────────────────────────

    /// Finish time implied by the current status and counters.
    pub fn calculated_finish(&self) -> Tick {
        match self.status {
            JobStatus::Paused | JobStatus::Rescheduled => self.restart_time + self.remaining,
            _ => self.start_time + self.elapsed + self.remaining + self.paused,
        }
    }

    /// The tick the job is planned to (re)start at.
    pub fn planned_start(&self) -> Tick {
        match self.status {
            JobStatus::Paused | JobStatus::Rescheduled => self.restart_time,
            _ => self.start_time,
        }
    }

    /// First tick, as seen from `now`, at which the job holds nodes.
    pub fn occupancy_from(&self, now: Tick) -> Tick {
        match self.status {
            JobStatus::Running => now,
            JobStatus::Rescheduled | JobStatus::Paused => self.restart_time,
            _ => self.start_time,
        }
    }

    /// Node-holding ticks of the job within `[now, end)`.
    pub fn window_steps(&self, now: Tick, end: Tick) -> i64 {
        let from = self.occupancy_from(now).max(now);
        let finish = self.calculated_finish();
        let last = (end - 1).min(finish);
        (last - from + 1).max(0)
    }

    /// Whether the job holds nodes at `tick` under its current plan.
    pub fn is_running_at(&self, tick: Tick) -> bool {
        let finish = self.calculated_finish();
        match self.status {
            JobStatus::Scheduled => self.start_time <= tick && tick <= finish + 1,
            JobStatus::Running => tick <= finish,
            JobStatus::Rescheduled => self.restart_time <= tick && tick <= finish + 1,
            _ => false,
        }
    }

    /// Slack metric used to rank placement urgency: positive values mean
    /// the job can wait, scaled by how small the job is relative to the
    /// cluster.
    pub fn theta(&self, capacity: u32) -> f64 {
        (self.deadline - self.calculated_finish()) as f64 * capacity as f64 / self.nodes.max(1) as f64
    }

    // ── SLA ────────────────────────────────────────────────────────

    /// Delay past the deadline once finished.
    pub fn delay(&self) -> i64 {
        self.actual_finish.map_or(0, |finish| (finish - self.deadline).max(0))
    }

    /// SLA fee of the realised delay.
    pub fn sla_cost(&self, usage_price: f64, seconds_per_step: u32, models: &Models) -> f64 {
        self.fee_for_delay(self.delay(), usage_price, seconds_per_step, models)
    }

    /// SLA fee the job would owe if it finished at its calculated finish.
    pub fn currently_caused_sla_cost(&self, usage_price: f64, seconds_per_step: u32, models: &Models) -> f64 {
        let delay = (self.calculated_finish() - self.deadline).max(0);
        self.fee_for_delay(delay, usage_price, seconds_per_step, models)
    }

    fn fee_for_delay(&self, delay: i64, usage_price: f64, seconds_per_step: u32, models: &Models) -> f64 {
        if delay <= 0 || self.base_duration <= 0 {
            return 0.0;
        }
        let hours = self.base_duration as f64 * seconds_per_step as f64 / 3600.0;
        let job_price = usage_price * self.nodes as f64 * hours;
        models.sla.fee(delay as f64 / self.base_duration as f64, job_price)
    }
}
