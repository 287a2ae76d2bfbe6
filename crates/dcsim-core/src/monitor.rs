//! Monitoring records and sinks.
//!
//! The driver emits one [`TickRecord`] per simulated tick and one
//! [`DrDecision`] per served DR request. Persisting them is up to the sink.

use serde::{Deserialize, Serialize};

use crate::Tick;
use crate::cluster::{Cluster, QueueKind};
use crate::error::SimResult;
use crate::request::Direction;

/// Cluster state at the end of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub tick: Tick,
    pub occupied_nodes: u32,
    pub running_jobs: usize,
    pub waiting_jobs: usize,
    pub finished_jobs: usize,
    pub total_power_kw: f64,
    pub it_power_kw: f64,
    pub hvac_power_kw: f64,
    pub job_power_kw: f64,
    pub energy_cost: f64,
    pub sla_cost: f64,
}

impl TickRecord {
    /// Capture the cluster after `tick` has been handled and booked.
    pub fn capture(cluster: &Cluster, tick: Tick) -> Self {
        let cost = cluster.ledger.get(tick).unwrap_or_default();
        Self {
            tick,
            occupied_nodes: cluster.occupied_nodes(),
            running_jobs: cluster.queues.len(QueueKind::Running),
            waiting_jobs: cluster.queues.waiting_count(),
            finished_jobs: cluster.queues.len(QueueKind::Finished),
            total_power_kw: cluster.total_power() / 1000.0,
            it_power_kw: cluster.it_power() / 1000.0,
            hvac_power_kw: cluster.hvac_power() / 1000.0,
            job_power_kw: cluster.job_power() / 1000.0,
            energy_cost: cost.energy,
            sla_cost: cost.sla,
        }
    }
}

/// How a DR request was answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrDecision {
    pub tick: Tick,
    pub request: usize,
    pub direction: Direction,
    pub power_delta_kw: f64,
    pub window: i64,
    /// Chosen (shifting fraction, frequency), if any configuration fitted.
    pub configuration: Option<(f64, f64)>,
    pub fitted: bool,
    pub shifted_node_steps: u64,
    pub additional_cost: Option<f64>,
}

/// Destination for monitoring output.
pub trait MonitoringSink {
    fn record_tick(&mut self, record: &TickRecord) -> SimResult<()>;
    fn record_decision(&mut self, decision: &DrDecision) -> SimResult<()>;
}

/// Keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub ticks: Vec<TickRecord>,
    pub decisions: Vec<DrDecision>,
}

impl MonitoringSink for MemorySink {
    fn record_tick(&mut self, record: &TickRecord) -> SimResult<()> {
        self.ticks.push(record.clone());
        Ok(())
    }

    fn record_decision(&mut self, decision: &DrDecision) -> SimResult<()> {
        self.decisions.push(decision.clone());
        Ok(())
    }
}
