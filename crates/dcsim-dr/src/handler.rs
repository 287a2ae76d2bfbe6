//! DR request handling.
//!
//! A request is answered by first placing the interval as usual and, only
//! if the resulting schedule breaks the bound, reshaping it.

use std::fmt::Debug;

use tracing::{debug, info};

use dcsim_core::{Direction, DrRequest, PowerType};

use crate::datacenter::Datacenter;
use crate::error::DrResult;
use crate::evaluator::{PowerBound, bound_holds};
use crate::flexibility::{DemandExtreme, FlexibilityMode};
use crate::result::{AdjustOutcome, SchedulingResult};

pub trait DrEventHandler: Debug + Send + Sync {
    /// Largest delta, in watts of `power_type`, the datacenter could hold
    /// over the whole window in `direction`.
    fn max_flexibility(
        &self,
        dc: &Datacenter,
        direction: Direction,
        window: i64,
        power_type: PowerType,
        mode: FlexibilityMode,
    ) -> f64;

    /// Answer a request with the currently configured strategy, without
    /// checking it against the flexibility envelope.
    fn respond(&self, dc: &mut Datacenter, request: &DrRequest) -> DrResult<AdjustOutcome>;

    /// Answer a request, refusing it outright when the delta exceeds what
    /// the datacenter could deliver at all.
    fn issue_request(&self, dc: &mut Datacenter, request: &DrRequest) -> DrResult<AdjustOutcome> {
        let envelope = self.max_flexibility(
            dc,
            request.direction,
            request.window,
            PowerType::TotalFacility,
            FlexibilityMode::Combined,
        );
        if request.power_delta * 1000.0 > envelope {
            info!(
                delta_kw = request.power_delta,
                envelope_kw = envelope / 1000.0,
                "request exceeds the flexibility envelope"
            );
            return Ok(AdjustOutcome::Completed(SchedulingResult::refused()));
        }
        self.respond(dc, request)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleDrHandler;

impl SimpleDrHandler {
    /// Place `[now, now + window)` as usual, then reshape it if the bound
    /// `base ∓ delta` does not hold.
    pub fn schedule_next_interval(&self, dc: &mut Datacenter, request: &DrRequest) -> DrResult<AdjustOutcome> {
        let base = dc.cluster.total_power();
        let bound = PowerBound::around(base, request.power_delta, request.direction);

        dc.scheduler
            .schedule_interval(&mut dc.cluster, request.window, false);

        if request.power_delta <= 0.0 || bound_holds(&dc.cluster, &bound, request.window) {
            debug!(bound = bound.watts, "regular schedule already meets the bound");
            return Ok(AdjustOutcome::Completed(SchedulingResult::untouched()));
        }
        dc.flexibility
            .adjust_power_consumption(&mut dc.cluster, &bound, request.window)
    }
}

impl DrEventHandler for SimpleDrHandler {
    fn max_flexibility(
        &self,
        dc: &Datacenter,
        direction: Direction,
        window: i64,
        power_type: PowerType,
        mode: FlexibilityMode,
    ) -> f64 {
        if window <= 0 {
            return 0.0;
        }
        let base = dc.cluster.power(power_type);
        let extreme = match direction {
            Direction::Decrease => DemandExtreme::Minimum,
            Direction::Increase => DemandExtreme::Maximum,
        };

        let mut copy = dc.snapshot(window);
        copy.schedule_for_extreme(extreme, mode, window);
        let mut envelope = f64::MAX;
        for _ in 0..window {
            copy.step();
            let power = copy.cluster.power(power_type);
            let delta = match direction {
                Direction::Decrease => base - power,
                Direction::Increase => power - base,
            };
            envelope = envelope.min(delta);
        }
        debug!(%direction, ?mode, ?power_type, envelope, "flexibility envelope");
        envelope
    }

    fn respond(&self, dc: &mut Datacenter, request: &DrRequest) -> DrResult<AdjustOutcome> {
        let outcome = self.schedule_next_interval(dc, request)?;
        if outcome.is_fitted() {
            dc.cluster.next_scheduler_call = dc.clock() + request.window;
        }
        Ok(outcome)
    }
}
