//! The pluggable placement strategy.

use std::fmt;
use std::sync::Arc;

use dcsim_core::{Cluster, JobId, NodeOccupationPlan, QueueKind, SimConfig, StrategyKind, Tick};

use crate::deadline_slack::DeadlineSlackStrategy;
use crate::error::{SchedulerError, SchedulerResult};
use crate::fifo::FifoStrategy;
use crate::min_cost::MinimumCostStrategy;

/// What one placement pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntervalOutcome {
    pub placed: Vec<JobId>,
    pub deferred: Vec<JobId>,
    /// Latest tick later jobs of the pass had to finish before, once a job
    /// could not be placed.
    pub backfill_deadline: Option<Tick>,
}

impl IntervalOutcome {
    pub fn merge(&mut self, other: IntervalOutcome) {
        self.placed.extend(other.placed);
        self.deferred.extend(other.deferred);
        self.backfill_deadline = self.backfill_deadline.or(other.backfill_deadline);
    }
}

/// Places waiting jobs into the interval `[now, now + length)`.
///
/// The candidates are the paused jobs followed by the jobs of one waiting
/// queue (`Submitted` or `Affected`). A strategy may only commit
/// placements that `plan` accepts and must book every commit into it.
/// Jobs it cannot place keep their status, with their planned (re)start
/// moved to the interval end.
pub trait SchedulingStrategy: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn schedule_interval(
        &self,
        cluster: &mut Cluster,
        candidates: QueueKind,
        length: i64,
        plan: &mut NodeOccupationPlan,
    ) -> IntervalOutcome;

    /// Whether the strategy chooses job frequencies itself.
    fn assigns_frequencies(&self) -> bool {
        false
    }
}

/// Paused jobs first, then the waiting queue, each with the queue it sits in.
pub fn gather_candidates(cluster: &Cluster, queue: QueueKind) -> Vec<(JobId, QueueKind)> {
    let paused = cluster.queues.get(QueueKind::Paused).iter().map(|id| (*id, QueueKind::Paused));
    let waiting = cluster.queues.get(queue).iter().map(move |id| (*id, queue));
    paused.chain(waiting).collect()
}

pub fn parse_strategy(name: &str) -> SchedulerResult<StrategyKind> {
    match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "deadline_slack" | "slack" => Ok(StrategyKind::DeadlineSlack),
        "fifo" => Ok(StrategyKind::Fifo),
        "minimum_cost" | "min_cost" => Ok(StrategyKind::MinimumCost),
        other => Err(SchedulerError::UnknownStrategy(other.to_string())),
    }
}

/// Build the strategy selected in the configuration.
pub fn build_strategy(config: &SimConfig) -> SchedulerResult<Arc<dyn SchedulingStrategy>> {
    Ok(match config.scheduling.strategy {
        StrategyKind::DeadlineSlack => Arc::new(DeadlineSlackStrategy),
        StrategyKind::Fifo => Arc::new(FifoStrategy),
        StrategyKind::MinimumCost => Arc::new(MinimumCostStrategy::from_config(config)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_strategy_accepts_aliases() {
        assert_eq!(parse_strategy("FIFO").unwrap(), StrategyKind::Fifo);
        assert_eq!(parse_strategy("min-cost").unwrap(), StrategyKind::MinimumCost);
        assert_eq!(parse_strategy("deadline_slack").unwrap(), StrategyKind::DeadlineSlack);
        assert!(matches!(
            parse_strategy("random"),
            Err(SchedulerError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn build_strategy_follows_config() {
        let mut config = SimConfig::default();
        assert_eq!(build_strategy(&config).unwrap().name(), "deadline_slack");
        config.scheduling.strategy = StrategyKind::MinimumCost;
        let strategy = build_strategy(&config).unwrap();
        assert_eq!(strategy.name(), "minimum_cost");
        assert!(strategy.assigns_frequencies());
    }
}
