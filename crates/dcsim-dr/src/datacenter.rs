//! The cloneable simulation unit.

use std::sync::Arc;

use dcsim_core::{Cluster, ClusterSettings, DrRequest, Models, SimConfig, Tick, WorkloadSpec};
use dcsim_scheduler::Scheduler;

use crate::error::DrResult;
use crate::flexibility::{DemandExtreme, DemandFlexibilityStrategy, FlexibilityMode};
use crate::solver::IlpSolver;

/// A cluster together with the scheduler and flexibility strategy that
/// act on it. Cloning yields an independent copy that can be advanced
/// without touching the original.
#[derive(Debug, Clone)]
pub struct Datacenter {
    pub cluster: Cluster,
    pub scheduler: Scheduler,
    pub flexibility: DemandFlexibilityStrategy,
}

impl Datacenter {
    pub fn new(cluster: Cluster, scheduler: Scheduler, flexibility: DemandFlexibilityStrategy) -> Self {
        Self {
            cluster,
            scheduler,
            flexibility,
        }
    }

    pub fn from_config(
        config: &SimConfig,
        workload: &WorkloadSpec,
        requests: Vec<DrRequest>,
        solver: Arc<dyn IlpSolver>,
    ) -> DrResult<Self> {
        let models = Models::from_config(&config.models, &config.sla)?;
        let cluster = Cluster::from_workload(ClusterSettings::from(config), models, workload, requests);
        let scheduler = Scheduler::from_config(config)?;
        let flexibility = DemandFlexibilityStrategy::from_config(config, solver)?;
        Ok(Self::new(cluster, scheduler, flexibility))
    }

    pub fn clock(&self) -> Tick {
        self.cluster.clock()
    }

    /// One regular tick: business-as-usual scheduling when due, then event
    /// handling with elapse and clock advance.
    pub fn step(&mut self) {
        self.scheduler.schedule_jobs(&mut self.cluster);
        self.cluster.update_job_allocation(true, true);
    }

    /// Independent copy whose scheduler stays idle for the next `window`
    /// ticks.
    pub fn snapshot(&self, window: i64) -> Datacenter {
        Datacenter {
            cluster: self.cluster.snapshot(self.clock() + window),
            scheduler: self.scheduler.clone(),
            flexibility: self.flexibility.clone(),
        }
    }

    pub fn schedule_for_extreme(&mut self, extreme: DemandExtreme, mode: FlexibilityMode, length: i64) {
        self.flexibility
            .schedule_for_extreme(&mut self.cluster, extreme, mode, length);
    }
}
