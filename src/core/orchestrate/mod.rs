//! Staged task orchestration
//!
//! - [`plan`] - Stages, tasks and their ordering
//! - [`pool`] - Bounded worker pool with per-worker source connections
//! - [`coordinator`] - Runs the stages with retries around each task
//! - [`summary`] - Per-stage and per-run reporting

pub mod coordinator;
pub mod plan;
pub mod pool;
pub mod summary;

pub use coordinator::{Coordinator, CoordinatorSettings};
pub use plan::{PlanSettings, Stage, StagePlanner, Task};
pub use pool::{PoolSettings, TaskOutcome, TaskRunner, WorkerPool};
pub use summary::{RunSummary, StageSummary};
