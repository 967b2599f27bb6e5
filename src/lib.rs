pub mod basic;
pub mod batch;
pub mod error;
pub mod io;
pub mod timeseries;

pub mod prelude {
    pub use crate::basic::island::{Island, IslandPartitioner, IslandScenario};
    pub use crate::basic::network::{Branch, Bus, BusKind, DroopControl, NetworkModel};
    pub use crate::basic::pf::{
        Polarity, PowerFlowOptions, PowerFlowSolver, ScenarioSolver, SolveResult, SolveStatus, SolverKind,
    };
    pub use crate::batch::{
        AveragedResults, BatchOutcome, ExecutionMode, ExecutionOrchestrator, GlobalResultSet, RunStatus, RunSummary,
    };
    pub use crate::error::ConfigError;
    pub use crate::io::{BatchConfig, ScenarioPlan};
    pub use crate::timeseries::{
        InjectionDistribution, ReplaySource, SampledSource, SamplingMethod, Scenario, ScenarioSource,
        TimeSeriesProfile,
    };
}
