//! dcsim.toml configuration.
//!
//! Every section is optional; a missing key takes the default listed on
//! the field.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Tick;
use crate::error::{SimError, SimResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub cluster: ClusterConfig,
    pub sla: SlaConfig,
    pub scheduling: SchedulingConfig,
    pub demand_response: DemandResponseConfig,
    pub models: ModelsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Number of compute nodes.
    pub capacity: u32,
    pub seconds_per_step: u32,
    /// Ticks between business-as-usual scheduler runs.
    pub scheduling_interval: i64,
    /// Share of IT power drawn by the compute nodes.
    pub it_power_fraction: f64,
    /// Place jobs no earlier than their traced start.
    pub traced_start_mode: bool,
    /// Whether running jobs may be paused and split.
    pub jobs_pausable: bool,
    /// Simulated ticks.
    pub length: Tick,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            capacity: 9216,
            seconds_per_step: 1,
            scheduling_interval: 900,
            it_power_fraction: 1.0,
            traced_start_mode: false,
            jobs_pausable: false,
            length: 86_400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaConfig {
    /// Price of one node-hour.
    pub usage_price: f64,
    /// Deadline slack as a multiple of the job duration.
    pub slack_factor: f64,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            usage_price: 0.36,
            slack_factor: 1.0,
        }
    }
}

/// Business-as-usual placement strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    DeadlineSlack,
    Fifo,
    MinimumCost,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    pub strategy: StrategyKind,
    /// Horizon of minimum-cost placement, in seconds.
    pub look_ahead_secs: i64,
    /// Spacing of candidate start times for minimum-cost placement, in seconds.
    pub start_step_secs: i64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::DeadlineSlack,
            look_ahead_secs: 86_400,
            start_step_secs: 300,
        }
    }
}

/// How the additional cost of a DR configuration is accounted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostMode {
    /// Simulate both futures until they reconverge.
    #[default]
    FutureKnowledge,
    /// Total the exposure of in-flight jobs only.
    CurrentEstimate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemandResponseConfig {
    pub min_frequency: f64,
    pub max_frequency: f64,
    pub frequency_step: f64,
    /// The shifting fraction is searched in `1/fraction_steps` increments.
    pub fraction_steps: u32,
    pub solver_timeout_secs: u64,
    /// Ticks per compaction slot.
    pub compaction_slot_steps: i64,
    pub cost_mode: CostMode,
    /// Ticks two futures must agree before they count as reconverged.
    pub maximum_runtime: i64,
    /// Upper bound on reconvergence ticks before falling back to the
    /// current-estimate accounting.
    pub reconvergence_step_cap: i64,
}

impl Default for DemandResponseConfig {
    fn default() -> Self {
        Self {
            min_frequency: 1.2,
            max_frequency: 2.7,
            frequency_step: 0.1,
            fraction_steps: 100,
            solver_timeout_secs: 10,
            compaction_slot_steps: 1,
            cost_mode: CostMode::FutureKnowledge,
            maximum_runtime: 3_600,
            reconvergence_step_cap: 172_800,
        }
    }
}

impl DemandResponseConfig {
    /// Candidate frequencies from `min_frequency` to `max_frequency`.
    pub fn frequencies(&self) -> Vec<f64> {
        frequency_grid(self.min_frequency, self.max_frequency, self.frequency_step)
    }
}

/// Evenly spaced frequencies, inclusive of both ends.
pub fn frequency_grid(min: f64, max: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || max < min {
        return vec![min];
    }
    let count = ((max - min) / step).round() as i64;
    (0..=count)
        .map(|i| ((min + i as f64 * step) * 1000.0).round() / 1000.0)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetaPoint {
    pub frequency: f64,
    pub beta: f64,
}

/// `P(f) = cubic · f³ + constant`, watts per node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerClass {
    pub cubic: f64,
    pub constant: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracePoint {
    pub tick: Tick,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriceConfig {
    Constant {
        price: f64,
    },
    Trace {
        #[serde(default = "default_price")]
        fallback: f64,
        points: Vec<TracePoint>,
    },
}

impl Default for PriceConfig {
    fn default() -> Self {
        PriceConfig::Constant { price: default_price() }
    }
}

fn default_price() -> f64 {
    0.16
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PueConfig {
    Constant {
        pue: f64,
    },
    Trace {
        #[serde(default = "default_pue")]
        fallback: f64,
        points: Vec<TracePoint>,
    },
}

impl Default for PueConfig {
    fn default() -> Self {
        PueConfig::Constant { pue: default_pue() }
    }
}

fn default_pue() -> f64 {
    1.15
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Frequency at which the runtime model applies no slowdown.
    pub max_frequency: f64,
    /// Memory-boundness used for frequencies without an explicit beta.
    pub default_beta: f64,
    pub betas: Vec<BetaPoint>,
    /// One entry per job class.
    pub power_classes: Vec<PowerClass>,
    pub energy_price: PriceConfig,
    pub pue: PueConfig,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            max_frequency: 2.7,
            default_beta: 0.5,
            betas: Vec::new(),
            power_classes: vec![
                PowerClass {
                    cubic: 5.0,
                    constant: 100.0,
                },
                PowerClass {
                    cubic: 6.5,
                    constant: 90.0,
                },
                PowerClass {
                    cubic: 4.0,
                    constant: 110.0,
                },
            ],
            energy_price: PriceConfig::default(),
            pue: PueConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn from_file(path: &Path) -> SimResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| SimError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> SimResult<Self> {
        let config: SimConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> SimResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configurations the simulator cannot run with.
    pub fn validate(&self) -> SimResult<()> {
        let c = &self.cluster;
        let dr = &self.demand_response;
        let s = &self.scheduling;

        let checks: [(bool, &str); 13] = [
            (c.capacity > 0, "cluster.capacity must be positive"),
            (c.seconds_per_step > 0, "cluster.seconds_per_step must be positive"),
            (c.scheduling_interval > 0, "cluster.scheduling_interval must be positive"),
            (
                c.it_power_fraction > 0.0 && c.it_power_fraction <= 1.0,
                "cluster.it_power_fraction must be in (0, 1]",
            ),
            (c.length >= 0, "cluster.length must not be negative"),
            (s.look_ahead_secs >= 0, "scheduling.look_ahead_secs must not be negative"),
            (s.start_step_secs > 0, "scheduling.start_step_secs must be positive"),
            (dr.min_frequency > 0.0, "demand_response.min_frequency must be positive"),
            (
                dr.min_frequency <= dr.max_frequency,
                "demand_response.min_frequency exceeds max_frequency",
            ),
            (dr.frequency_step > 0.0, "demand_response.frequency_step must be positive"),
            (dr.fraction_steps > 0, "demand_response.fraction_steps must be positive"),
            (
                dr.compaction_slot_steps > 0,
                "demand_response.compaction_slot_steps must be positive",
            ),
            (
                !self.models.power_classes.is_empty(),
                "models.power_classes must define at least one job class",
            ),
        ];

        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, message)) => Err(SimError::InvalidConfig((*message).to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = SimConfig::from_toml_str("").unwrap();
        assert_eq!(config.cluster.capacity, 9216);
        assert_eq!(config.scheduling.strategy, StrategyKind::DeadlineSlack);
        assert_eq!(config.demand_response.cost_mode, CostMode::FutureKnowledge);
    }

    #[test]
    fn parse_sections() {
        let toml_str = r#"
[cluster]
capacity = 4
scheduling_interval = 10

[scheduling]
strategy = "minimum_cost"

[models.energy_price]
kind = "trace"
points = [{ tick = 0, value = 0.1 }, { tick = 3600, value = 0.3 }]
"#;
        let config = SimConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.cluster.capacity, 4);
        assert_eq!(config.cluster.seconds_per_step, 1);
        assert_eq!(config.scheduling.strategy, StrategyKind::MinimumCost);
        match config.models.energy_price {
            PriceConfig::Trace { fallback, points } => {
                assert_eq!(points.len(), 2);
                assert_eq!(fallback, 0.16);
            }
            other => panic!("expected trace, got {other:?}"),
        }
    }

    #[test]
    fn rejects_zero_capacity() {
        let err = SimConfig::from_toml_str("[cluster]\ncapacity = 0\n").unwrap_err();
        assert!(err.to_string().contains("capacity"));
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let text = SimConfig::default().to_toml_string().unwrap();
        let parsed = SimConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.models.power_classes.len(), 3);
    }

    #[test]
    fn frequency_grid_is_inclusive() {
        let grid = DemandResponseConfig::default().frequencies();
        assert_eq!(grid.len(), 16);
        assert_eq!(grid[0], 1.2);
        assert_eq!(grid[15], 2.7);
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dcsim.toml");
        std::fs::write(&path, "[sla]\nusage_price = 1.0\n").unwrap();
        let config = SimConfig::from_file(&path).unwrap();
        assert_eq!(config.sla.usage_price, 1.0);
    }
}
