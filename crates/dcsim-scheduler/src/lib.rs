//! dcsim-scheduler — business-as-usual job placement.
//!
//! The scheduler runs once per scheduling interval, plans the interval's
//! node occupation and delegates placement to a pluggable strategy:
//!
//! - deadline-slack placement with backfilling
//! - FIFO placement with backfilling
//! - minimum-cost placement over (start, frequency) options
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── NodeOccupationPlan (running + scheduled jobs over the interval)
//!   └── Arc<dyn SchedulingStrategy>
//!       ├── DeadlineSlackStrategy ─┐
//!       ├── FifoStrategy ──────────┴── backfill (shared placement loop)
//!       └── MinimumCostStrategy (event-based look-ahead plan)
//! ```
//!
//! A job that fits nowhere keeps its status and is retried at the next
//! interval; deferral is never an error.

pub mod backfill;
pub mod deadline_slack;
pub mod error;
pub mod fifo;
pub mod min_cost;
pub mod scheduler;
pub mod strategy;

pub use deadline_slack::DeadlineSlackStrategy;
pub use error::{SchedulerError, SchedulerResult};
pub use fifo::FifoStrategy;
pub use min_cost::{MinimumCostStrategy, PricedOption};
pub use scheduler::Scheduler;
pub use strategy::{IntervalOutcome, SchedulingStrategy, build_strategy, gather_candidates, parse_strategy};
