//! Batch execution: island × scenario dispatch and result assembly.

mod display;
pub mod orchestrator;
pub mod results;

pub use orchestrator::{BatchOutcome, ExecutionMode, ExecutionOrchestrator, RunStatus};
pub use results::{AveragedResults, GlobalResultSet, IslandOutcome, ResultAggregator, RunSummary};
