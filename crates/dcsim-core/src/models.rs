//! Injected models — runtime impact, node power, energy price, SLA, PUE.
//!
//! Every model is a pure function of a few scalars. They are built once
//! from configuration, wrapped in `Arc`, and shared read-only by the live
//! cluster and every speculative clone.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::Tick;
use crate::config::{ModelsConfig, PriceConfig, PueConfig, SlaConfig};
use crate::error::{SimError, SimResult};

/// Maps a frequency change onto the remaining runtime of a job.
pub trait RuntimeModel: fmt::Debug + Send + Sync {
    fn adjusted_steps(&self, from_frequency: f64, to_frequency: f64, remaining_steps: i64) -> i64;
}

/// Per-node power draw in watts of a job class at a frequency.
pub trait PowerModel: fmt::Debug + Send + Sync {
    fn power(&self, frequency: f64, job_class: usize) -> f64;
}

/// Energy price per kWh at a tick.
pub trait EnergyPriceModel: fmt::Debug + Send + Sync {
    fn price_at(&self, tick: Tick) -> f64;
}

/// Deadline creation and delay fees.
pub trait SlaModel: fmt::Debug + Send + Sync {
    fn deadline(&self, scheduled_start: Tick, duration: i64) -> Tick;
    fn fee(&self, delay_fraction: f64, usage_price: f64) -> f64;
}

/// Power usage effectiveness of the facility at a tick.
pub trait PueModel: fmt::Debug + Send + Sync {
    fn pue_at(&self, tick: Tick) -> f64;
}

/// The full set of models a cluster is built with.
#[derive(Debug, Clone)]
pub struct Models {
    pub runtime: Arc<dyn RuntimeModel>,
    pub power: Arc<dyn PowerModel>,
    pub price: Arc<dyn EnergyPriceModel>,
    pub sla: Arc<dyn SlaModel>,
    pub pue: Arc<dyn PueModel>,
}

impl Models {
    /// Build the reference model set described by the configuration.
    pub fn from_config(models: &ModelsConfig, sla: &SlaConfig) -> SimResult<Self> {
        if models.power_classes.is_empty() {
            return Err(SimError::InvalidConfig(
                "models.power_classes must define at least one job class".to_string(),
            ));
        }

        let runtime = BetaRuntimeModel::new(
            models.max_frequency,
            models.default_beta,
            models.betas.iter().map(|b| (b.frequency, b.beta)),
        );
        let power = CubicPowerModel::new(models.power_classes.iter().map(|c| (c.cubic, c.constant)).collect());

        let price: Arc<dyn EnergyPriceModel> = match &models.energy_price {
            PriceConfig::Constant { price } => Arc::new(ConstantPrice(*price)),
            PriceConfig::Trace { points, fallback } => {
                Arc::new(TracePrice::new(points.iter().map(|p| (p.tick, p.value)), *fallback))
            }
        };
        let pue: Arc<dyn PueModel> = match &models.pue {
            PueConfig::Constant { pue } => Arc::new(ConstantPue(*pue)),
            PueConfig::Trace { points, fallback } => {
                Arc::new(TracePue::new(points.iter().map(|p| (p.tick, p.value)), *fallback))
            }
        };

        Ok(Self {
            runtime: Arc::new(runtime),
            power: Arc::new(power),
            price,
            sla: Arc::new(StandardSlaModel { slack_factor: sla.slack_factor }),
            pue,
        })
    }
}

impl Default for Models {
    fn default() -> Self {
        Self {
            runtime: Arc::new(BetaRuntimeModel::new(2.7, 0.5, std::iter::empty())),
            power: Arc::new(CubicPowerModel::new(vec![(5.0, 100.0)])),
            price: Arc::new(ConstantPrice(0.16)),
            sla: Arc::new(StandardSlaModel { slack_factor: 1.0 }),
            pue: Arc::new(ConstantPue(1.15)),
        }
    }
}

// ── Runtime ───────────────────────────────────────────────────────

/// Beta model: `T(f) = T(fmax) · (β(f) · (fmax/f − 1) + 1)`.
///
/// β is looked up per frequency (keyed in 0.1 GHz steps) and falls back to
/// a default; β(fmax) is always 0.
#[derive(Debug, Clone)]
pub struct BetaRuntimeModel {
    max_frequency: f64,
    default_beta: f64,
    betas: BTreeMap<i64, f64>,
}

impl BetaRuntimeModel {
    pub fn new(max_frequency: f64, default_beta: f64, betas: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let mut map: BTreeMap<i64, f64> = betas.into_iter().map(|(f, b)| (frequency_key(f), b)).collect();
        map.insert(frequency_key(max_frequency), 0.0);
        Self {
            max_frequency,
            default_beta,
            betas: map,
        }
    }

    fn slowdown(&self, frequency: f64) -> f64 {
        let beta = self
            .betas
            .get(&frequency_key(frequency))
            .copied()
            .unwrap_or(self.default_beta);
        beta * (self.max_frequency / frequency - 1.0) + 1.0
    }
}

impl RuntimeModel for BetaRuntimeModel {
    fn adjusted_steps(&self, from_frequency: f64, to_frequency: f64, remaining_steps: i64) -> i64 {
        if remaining_steps <= 0 || frequency_key(from_frequency) == frequency_key(to_frequency) {
            return remaining_steps;
        }
        let at_max = remaining_steps as f64 / self.slowdown(from_frequency);
        // A job with work left keeps at least one step.
        ((at_max * self.slowdown(to_frequency)).round() as i64).max(1)
    }
}

/// Frequencies are compared in 0.1 GHz units to stay clear of float keys.
pub fn frequency_key(frequency: f64) -> i64 {
    (frequency * 10.0).round() as i64
}

// ── Power ─────────────────────────────────────────────────────────

/// Per-class regression on the cube of the frequency:
/// `P(f) = cubic · f³ + constant`.
#[derive(Debug, Clone)]
pub struct CubicPowerModel {
    classes: Vec<(f64, f64)>,
}

impl CubicPowerModel {
    pub fn new(classes: Vec<(f64, f64)>) -> Self {
        Self { classes }
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}

impl PowerModel for CubicPowerModel {
    fn power(&self, frequency: f64, job_class: usize) -> f64 {
        let Some((cubic, constant)) = self.classes.get(job_class).or_else(|| self.classes.last()) else {
            return 0.0;
        };
        if job_class >= self.classes.len() {
            warn!(job_class, classes = self.classes.len(), "unknown job class, using last power class");
        }
        cubic * frequency.powi(3) + constant
    }
}

// ── Energy price ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct ConstantPrice(pub f64);

impl EnergyPriceModel for ConstantPrice {
    fn price_at(&self, _tick: Tick) -> f64 {
        self.0
    }
}

/// Step function over a price trace. A tick before the first point takes
/// the first point's price.
#[derive(Debug, Clone)]
pub struct TracePrice {
    points: BTreeMap<Tick, f64>,
    fallback: f64,
}

impl TracePrice {
    pub fn new(points: impl IntoIterator<Item = (Tick, f64)>, fallback: f64) -> Self {
        Self {
            points: points.into_iter().collect(),
            fallback,
        }
    }
}

impl EnergyPriceModel for TracePrice {
    fn price_at(&self, tick: Tick) -> f64 {
        step_lookup(&self.points, tick).unwrap_or(self.fallback)
    }
}

// ── SLA ───────────────────────────────────────────────────────────

/// Deadline = start + duration + slack; fee grows linearly with the delay
/// expressed as a fraction of the job's duration.
#[derive(Debug, Clone, Copy)]
pub struct StandardSlaModel {
    pub slack_factor: f64,
}

impl SlaModel for StandardSlaModel {
    fn deadline(&self, scheduled_start: Tick, duration: i64) -> Tick {
        scheduled_start + duration + (self.slack_factor * duration as f64) as i64
    }

    fn fee(&self, delay_fraction: f64, usage_price: f64) -> f64 {
        usage_price * delay_fraction
    }
}

// ── PUE ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct ConstantPue(pub f64);

impl PueModel for ConstantPue {
    fn pue_at(&self, _tick: Tick) -> f64 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct TracePue {
    points: BTreeMap<Tick, f64>,
    fallback: f64,
}

impl TracePue {
    pub fn new(points: impl IntoIterator<Item = (Tick, f64)>, fallback: f64) -> Self {
        Self {
            points: points.into_iter().collect(),
            fallback,
        }
    }
}

impl PueModel for TracePue {
    fn pue_at(&self, tick: Tick) -> f64 {
        step_lookup(&self.points, tick).unwrap_or(self.fallback)
    }
}

/// Value at the greatest key ≤ `tick`, else at the smallest key.
fn step_lookup(points: &BTreeMap<Tick, f64>, tick: Tick) -> Option<f64> {
    points
        .range(..=tick)
        .next_back()
        .or_else(|| points.range(tick..).next())
        .map(|(_, v)| *v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beta_model_slows_down_at_lower_frequency() {
        let model = BetaRuntimeModel::new(2.7, 0.5, [(1.2, 0.8)]);
        let slower = model.adjusted_steps(2.7, 1.2, 100);
        // 0.8 · (2.7/1.2 − 1) + 1 = 2.0
        assert_eq!(slower, 200);
        assert_eq!(model.adjusted_steps(1.2, 2.7, slower), 100);
    }

    #[test]
    fn beta_model_same_frequency_is_identity() {
        let model = BetaRuntimeModel::new(2.7, 0.5, []);
        assert_eq!(model.adjusted_steps(2.3, 2.3, 37), 37);
    }

    #[test]
    fn beta_model_keeps_one_step_of_pending_work() {
        let model = BetaRuntimeModel::new(2.7, 1.0, []);
        assert_eq!(model.adjusted_steps(1.2, 2.7, 1), 1);
        assert_eq!(model.adjusted_steps(1.2, 2.7, 0), 0);
    }

    #[test]
    fn cubic_power_grows_with_frequency() {
        let model = CubicPowerModel::new(vec![(5.0, 100.0)]);
        assert!(model.power(2.7, 0) > model.power(1.2, 0));
        assert!((model.power(2.0, 0) - 140.0).abs() < 1e-9);
    }

    #[test]
    fn trace_price_steps_and_clamps() {
        let trace = TracePrice::new([(100, 0.2), (200, 0.3)], 0.16);
        assert_eq!(trace.price_at(50), 0.2);
        assert_eq!(trace.price_at(150), 0.2);
        assert_eq!(trace.price_at(200), 0.3);
        assert_eq!(trace.price_at(10_000), 0.3);

        let empty = TracePrice::new([], 0.16);
        assert_eq!(empty.price_at(5), 0.16);
    }

    #[test]
    fn standard_sla_deadline_and_fee() {
        let sla = StandardSlaModel { slack_factor: 0.5 };
        assert_eq!(sla.deadline(10, 100), 160);
        assert!((sla.fee(0.5, 2.0) - 1.0).abs() < 1e-9);
    }
}
