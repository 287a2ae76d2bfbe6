//! Grid search over (shifting fraction, scaling frequency).
//!
//! Every configuration is tried on its own snapshot of the datacenter.
//! Fractions go up from zero, frequencies go down from the maximum, and
//! the cheapest configuration that fits the bound wins. Once a frequency
//! produces the same shift as the previous fraction, lower frequencies of
//! that fraction are skipped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use dcsim_core::{DrRequest, PowerType, SimConfig};

use crate::cost::{CostSettings, additional_cost};
use crate::datacenter::Datacenter;
use crate::error::{DrError, DrResult};
use crate::flexibility::FlexibilityMode;
use crate::handler::DrEventHandler;
use crate::result::AdjustOutcome;

/// The winning configuration of a search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub shifting_fraction: f64,
    pub scaling_frequency: f64,
    pub additional_cost: f64,
}

#[derive(Debug, Clone)]
pub struct CostOptimizer {
    handler: Arc<dyn DrEventHandler>,
    fraction_steps: u32,
    /// Highest first.
    frequencies: Vec<f64>,
    cost: CostSettings,
}

impl CostOptimizer {
    pub fn new(
        handler: Arc<dyn DrEventHandler>,
        fraction_steps: u32,
        mut frequencies: Vec<f64>,
        cost: CostSettings,
    ) -> DrResult<Self> {
        if fraction_steps == 0 {
            return Err(DrError::InvalidSettings("fraction_steps must be positive".to_string()));
        }
        if frequencies.is_empty() {
            return Err(DrError::InvalidSettings("no candidate frequencies".to_string()));
        }
        frequencies.sort_by(|a, b| b.total_cmp(a));
        frequencies.dedup();
        Ok(Self {
            handler,
            fraction_steps,
            frequencies,
            cost,
        })
    }

    pub fn from_config(config: &SimConfig, handler: Arc<dyn DrEventHandler>) -> DrResult<Self> {
        let dr = &config.demand_response;
        Self::new(
            handler,
            dr.fraction_steps,
            dr.frequencies(),
            CostSettings::from(dr),
        )
    }

    pub fn handler(&self) -> &dyn DrEventHandler {
        self.handler.as_ref()
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    /// Cheapest configuration answering `request` on `dc`, or `None` when
    /// the request exceeds the flexibility envelope or no configuration
    /// fits. `dc` itself is never modified.
    pub fn optimize(&self, dc: &Datacenter, request: &DrRequest) -> DrResult<Option<Configuration>> {
        let envelope = self.handler.max_flexibility(
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
                "request exceeds the flexibility envelope, no configuration searched"
            );
            return Ok(None);
        }

        let mut best: Option<Configuration> = None;
        let mut previous: Option<u64> = None;
        let mut tried = 0usize;
        for step in 0..=self.fraction_steps {
            let fraction = f64::from(step) / f64::from(self.fraction_steps);
            let mut current: Option<u64> = None;
            for &frequency in &self.frequencies {
                let mut candidate = dc.snapshot(request.window);
                candidate.flexibility.configure(fraction, frequency);
                candidate.flexibility.set_previously_shifted(previous);
                tried += 1;

                let result = match self.handler.respond(&mut candidate, request)? {
                    AdjustOutcome::Unchanged => break,
                    AdjustOutcome::Completed(result) => result,
                };
                if result.bound_fitted {
                    let cost = additional_cost(dc, &candidate, request, &self.cost);
                    debug!(fraction, frequency, cost, "configuration fits");
                    if best.is_none_or(|b| cost < b.additional_cost) {
                        best = Some(Configuration {
                            shifting_fraction: fraction,
                            scaling_frequency: frequency,
                            additional_cost: cost,
                        });
                    }
                }
                current = Some(result.shifted_node_steps);
            }
            if current.is_some() {
                previous = current;
            }
        }

        match &best {
            Some(b) => info!(
                tried,
                fraction = b.shifting_fraction,
                frequency = b.scaling_frequency,
                cost = b.additional_cost,
                "cheapest configuration found"
            ),
            None => info!(tried, "no configuration fits the request"),
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::SimpleDrHandler;

    #[test]
    fn frequencies_are_searched_from_the_top() {
        let optimizer = CostOptimizer::new(
            Arc::new(SimpleDrHandler),
            4,
            vec![1.2, 2.7, 2.0, 2.7],
            CostSettings::default(),
        )
        .unwrap();
        assert_eq!(optimizer.frequencies(), &[2.7, 2.0, 1.2]);
    }

    #[test]
    fn rejects_an_empty_grid() {
        let err = CostOptimizer::new(Arc::new(SimpleDrHandler), 0, vec![2.7], CostSettings::default());
        assert!(err.is_err());
        let err = CostOptimizer::new(Arc::new(SimpleDrHandler), 4, Vec::new(), CostSettings::default());
        assert!(err.is_err());
    }
}
