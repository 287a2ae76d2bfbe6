//! dcsim-dr — demand response for the data-center simulator.
//!
//! Answers grid requests to hold facility power below (or above) a bound
//! for a window of ticks by reshaping the schedule: shifting work out of
//! or into the window, re-clocking jobs, and compacting what remains.
//! Every candidate reshaping is tried on an independent [`Datacenter`]
//! snapshot, so the live simulation only sees the configuration that won.
//!
//! # Architecture
//!
//! ```text
//! Simulation (driver loop, one tick at a time)
//!   ├── Datacenter = Cluster + Scheduler + DemandFlexibilityStrategy
//!   ├── CostOptimizer (fraction × frequency grid, cheapest fit wins)
//!   │     ├── DrEventHandler::max_flexibility (envelope gate)
//!   │     ├── DrEventHandler::respond (on a snapshot)
//!   │     └── cost::additional_cost (future knowledge | current estimate)
//!   └── MonitoringSink (TickRecord per tick, DrDecision per request)
//!
//! DemandFlexibilityStrategy
//!   ├── Arc<dyn ShiftingStrategy>   LongestSlackFirst
//!   ├── Arc<dyn DvfsStrategy>       ScaleAllJobs
//!   ├── ScheduleCompactor → Arc<dyn IlpSolver> (MicroLp)
//!   └── evaluator::bound_holds (fast-forwarded snapshot)
//! ```
//!
//! Failing to meet a bound is an outcome, not an error: see
//! [`SchedulingResult`] and [`AdjustOutcome`].

pub mod compaction;
pub mod cost;
pub mod datacenter;
pub mod driver;
pub mod dvfs;
pub mod error;
pub mod evaluator;
pub mod flexibility;
pub mod handler;
pub mod ilp;
pub mod optimizer;
pub mod result;
pub mod shifting;
pub mod solver;

pub use compaction::{CompactionOutcome, CompactionProblem, MovableJob, ScheduleCompactor};
pub use cost::{CostSettings, additional_cost};
pub use datacenter::Datacenter;
pub use driver::{RunSummary, Simulation};
pub use dvfs::{DvfsStrategy, ScaleAllJobs};
pub use error::{DrError, DrResult};
pub use evaluator::{PowerBound, bound_holds};
pub use flexibility::{DemandExtreme, DemandFlexibilityStrategy, FlexibilityMode};
pub use handler::{DrEventHandler, SimpleDrHandler};
pub use ilp::{Assignment, Constraint, IlpModel, Sense, SolveOutcome, VarKind, Variable};
pub use optimizer::{Configuration, CostOptimizer};
pub use result::{AdjustOutcome, SchedulingResult};
pub use shifting::{LongestSlackFirst, ShiftBudget, ShiftingStrategy};
pub use solver::{IlpSolver, MicroLp};
