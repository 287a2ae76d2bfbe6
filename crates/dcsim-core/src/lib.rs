//! dcsim-core — discrete-event kernel of the data-center simulator.
//!
//! Holds the mutable simulation state every strategy operates on. The
//! scheduler and demand-response crates only ever mutate a [`Cluster`]
//! through the operations exposed here.
//!
//! # Architecture
//!
//! ```text
//! Cluster (Clone = independent snapshot)
//!   ├── jobs: Vec<BatchJob>      arena, addressed by JobId
//!   ├── nodes: NodePool          arena, addressed by NodeId
//!   ├── queues: JobQueues        submitted / affected / scheduled / running / paused / finished
//!   ├── events: EventQueue       kind → tick → targets
//!   ├── models: Models           Arc-shared, immutable
//!   └── ledger: CostLedger       per-tick energy and SLA cost
//! ```
//!
//! # Components
//!
//! - **`job`** — batch jobs and their status state machine
//! - **`event`** — the event queue keyed by kind and tick
//! - **`node`** — the fixed-capacity node pool
//! - **`cluster`** — arena, queues, clock and power accounting
//! - **`lifecycle`** — per-tick event handling
//! - **`occupation`** — per-tick "nodes busy" plans for placement feasibility
//! - **`models`** — injected runtime, power, price, SLA and PUE models
//! - **`config`** / **`workload`** — TOML configuration and JSON inputs
//! - **`monitor`** — per-tick monitoring records and sinks

pub mod cluster;
pub mod config;
pub mod error;
pub mod event;
pub mod job;
pub mod lifecycle;
pub mod models;
pub mod monitor;
pub mod node;
pub mod occupation;
pub mod request;
pub mod workload;

/// Simulation time, in ticks since the start of the run.
pub type Tick = i64;

#[doc(hidden)]
pub use tracing as __tracing;

pub use cluster::{Cluster, ClusterSettings, CostLedger, JobQueues, PowerType, QueueKind};
pub use config::{
    ClusterConfig, CostMode, DemandResponseConfig, ModelsConfig, PriceConfig, PueConfig, SchedulingConfig,
    SimConfig, SlaConfig, StrategyKind,
};
pub use error::{SimError, SimResult};
pub use event::{Event, EventKind, EventQueue, EventTarget};
pub use job::{BatchJob, JobId, JobStatus};
pub use models::{
    BetaRuntimeModel, ConstantPrice, ConstantPue, CubicPowerModel, EnergyPriceModel, Models, PowerModel, PueModel,
    RuntimeModel, SlaModel, StandardSlaModel, TracePrice, TracePue,
};
pub use monitor::{DrDecision, MemorySink, MonitoringSink, TickRecord};
pub use node::{Node, NodeId, NodePool, NodeStatus};
pub use occupation::{NodeOccupationPlan, earliest_node_availability};
pub use request::{Direction, DrRequest};
pub use workload::{JobSpec, WorkloadSpec, load_requests, load_workload};
