//! Simulation driver: one loop over the configured number of ticks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use dcsim_core::{
    DrDecision, DrRequest, EventKind, EventTarget, MonitoringSink, QueueKind, SimConfig, Tick, TickRecord,
    WorkloadSpec,
};

use crate::datacenter::Datacenter;
use crate::error::DrResult;
use crate::handler::{DrEventHandler, SimpleDrHandler};
use crate::optimizer::{Configuration, CostOptimizer};
use crate::solver::IlpSolver;

/// Totals of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub ticks: i64,
    pub requests_served: usize,
    pub requests_fitted: usize,
    pub total_cost: f64,
    pub finished_jobs: usize,
}

pub struct Simulation<S: MonitoringSink> {
    dc: Datacenter,
    handler: Arc<dyn DrEventHandler>,
    optimizer: CostOptimizer,
    sink: S,
    length: Tick,
    /// Ticks of per-tick cost the live ledger keeps; the longest request
    /// window.
    retained: i64,
    summary: RunSummary,
}

impl<S: MonitoringSink> Simulation<S> {
    pub fn new(
        dc: Datacenter,
        handler: Arc<dyn DrEventHandler>,
        optimizer: CostOptimizer,
        sink: S,
        length: Tick,
    ) -> Self {
        let retained = dc.cluster.requests.iter().map(|r| r.window).max().unwrap_or(0).max(1);
        Self {
            dc,
            handler,
            optimizer,
            sink,
            length,
            retained,
            summary: RunSummary::default(),
        }
    }

    /// Wire up the default handler and an optimizer driving it.
    pub fn from_config(
        config: &SimConfig,
        workload: &WorkloadSpec,
        requests: Vec<DrRequest>,
        solver: Arc<dyn IlpSolver>,
        sink: S,
    ) -> DrResult<Self> {
        let dc = Datacenter::from_config(config, workload, requests, solver)?;
        let handler: Arc<dyn DrEventHandler> = Arc::new(SimpleDrHandler);
        let optimizer = CostOptimizer::from_config(config, Arc::clone(&handler))?;
        Ok(Self::new(dc, handler, optimizer, sink, config.cluster.length))
    }

    pub fn datacenter(&self) -> &Datacenter {
        &self.dc
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Run until the clock reaches the configured length.
    pub fn run(&mut self) -> DrResult<RunSummary> {
        info!(length = self.length, jobs = self.dc.cluster.jobs().len(), "simulation started");
        while self.dc.clock() < self.length {
            self.tick()?;
        }
        self.summary.ticks = self.dc.clock();
        self.summary.total_cost = self.dc.cluster.ledger.total();
        self.summary.finished_jobs = self.dc.cluster.queues.len(QueueKind::Finished);
        info!(
            ticks = self.summary.ticks,
            served = self.summary.requests_served,
            fitted = self.summary.requests_fitted,
            cost = self.summary.total_cost,
            finished = self.summary.finished_jobs,
            "simulation finished"
        );
        Ok(self.summary.clone())
    }

    /// Simulate the current tick and record it.
    pub fn tick(&mut self) -> DrResult<()> {
        let now = self.dc.clock();
        match self.due_request(now) {
            Some(index) => self.serve(index)?,
            None => {
                self.dc.scheduler.schedule_jobs(&mut self.dc.cluster);
            }
        }

        self.dc.cluster.update_job_allocation(true, true);
        self.dc.cluster.events.remove_key(now);
        self.dc.cluster.check_capacity();
        self.sink.record_tick(&TickRecord::capture(&self.dc.cluster, now))?;
        self.dc.cluster.ledger.settle_before(now + 1 - self.retained);
        Ok(())
    }

    /// First request due at `now`. Every due request is marked handled.
    fn due_request(&mut self, now: Tick) -> Option<usize> {
        let due = self.dc.cluster.events.events_at(EventKind::DrRequest, now);
        if due.len() > 1 {
            warn!(tick = now, count = due.len(), "several DR requests at one tick, serving the first");
        }
        let mut first = None;
        for target in due {
            self.dc.cluster.events.mark_handled(EventKind::DrRequest, target);
            match target {
                EventTarget::Request(index) if first.is_none() => first = Some(index),
                EventTarget::Request(_) => {}
                other => warn!(?other, "non-request target on DR event"),
            }
        }
        first
    }

    fn serve(&mut self, index: usize) -> DrResult<()> {
        let now = self.dc.clock();
        let Some(request) = self.dc.cluster.requests.get(index).cloned() else {
            warn!(index, "DR event points at no request");
            return Ok(());
        };
        info!(
            tick = now,
            direction = %request.direction,
            delta_kw = request.power_delta,
            window = request.window,
            "DR request received"
        );

        self.dc.cluster.reset_running_frequencies();
        self.dc.cluster.update_job_allocation(false, false);

        let configuration = self.optimizer.optimize(&self.dc, &request)?;
        let (fitted, shifted) = match configuration {
            Some(Configuration {
                shifting_fraction,
                scaling_frequency,
                ..
            }) => {
                self.dc.flexibility.configure(shifting_fraction, scaling_frequency);
                self.dc.flexibility.set_previously_shifted(None);
                let outcome = self.handler.respond(&mut self.dc, &request)?;
                let result = outcome.result().unwrap_or_default();
                (result.bound_fitted, result.shifted_node_steps)
            }
            None => {
                debug!(tick = now, "no configuration, regular scheduling");
                self.dc.scheduler.schedule_jobs(&mut self.dc.cluster);
                (false, 0)
            }
        };

        self.summary.requests_served += 1;
        if fitted {
            self.summary.requests_fitted += 1;
        }
        let decision = DrDecision {
            tick: now,
            request: index,
            direction: request.direction,
            power_delta_kw: request.power_delta,
            window: request.window,
            configuration: configuration.map(|c| (c.shifting_fraction, c.scaling_frequency)),
            fitted,
            shifted_node_steps: shifted,
            additional_cost: configuration.map(|c| c.additional_cost),
        };
        self.sink.record_decision(&decision)?;
        Ok(())
    }
}
