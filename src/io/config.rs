//! JSON batch configuration.
//!
//! ```json
//! {
//!   "options": { "tol": 1e-8, "max_iter": 20, "solver": "dc-newton", "polarity": "bipolar" },
//!   "mode": { "mode": "parallel", "threads": 0 },
//!   "scenarios": { "type": "sampled", "points": 1000, "method": "latin-hypercube", "seed": 7 }
//! }
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::basic::island::{Island, IslandPartitioner};
use crate::basic::network::NetworkModel;
use crate::basic::pf::{PowerFlowOptions, PowerFlowSolver, SolverKind};
use crate::batch::{BatchOutcome, ExecutionMode, ExecutionOrchestrator};
use crate::error::ConfigError;
use crate::timeseries::{
    InjectionDistribution, ReplaySource, SampledSource, SamplingMethod, ScenarioSource, TimeSeriesProfile,
};

fn default_spread() -> f64 {
    0.1
}

/// Where the scenarios of a batch come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ScenarioPlan {
    /// Steps `start..end` of a recorded profile; `end` defaults to its length.
    Replay {
        #[serde(default)]
        start: usize,
        #[serde(default)]
        end: Option<usize>,
    },
    /// `points` sampled operating points.
    ///
    /// Distributions are estimated from the profile when one is given,
    /// otherwise centred on the base case with relative half-width `spread`.
    Sampled {
        points: usize,
        #[serde(default)]
        method: SamplingMethod,
        #[serde(default)]
        seed: u64,
        #[serde(default = "default_spread")]
        spread: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub options: PowerFlowOptions,
    #[serde(default)]
    pub mode: ExecutionMode,
    pub scenarios: ScenarioPlan,
}

impl BatchConfig {
    /// Parses and checks a configuration document.
    ///
    /// An unknown `options.solver` selector is reported as
    /// [`ConfigError::UnsupportedSolver`] rather than a generic parse error.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if let Some(name) = value.pointer("/options/solver").and_then(|s| s.as_str()) {
            name.parse::<SolverKind>()?;
        }
        let config: Self = serde_json::from_value(value)?;
        config.check()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if !(self.options.tol > 0.0) {
            return Err(ConfigError::Invalid(format!("tolerance must be positive, got {}", self.options.tol)));
        }
        if self.options.max_iter == 0 {
            return Err(ConfigError::Invalid("max_iter must be at least 1".into()));
        }
        if let ScenarioPlan::Sampled { points, spread, .. } = self.scenarios {
            if points == 0 {
                return Err(ConfigError::Invalid("sampling needs at least one point".into()));
            }
            if !(0.0..=1.0).contains(&spread) {
                return Err(ConfigError::Invalid(format!("spread {spread} outside [0, 1]")));
            }
        }
        Ok(())
    }

    /// Builds the scenario source described by the plan.
    pub fn build_source(
        &self,
        network: &NetworkModel,
        islands: &[Island],
        profile: Option<&TimeSeriesProfile>,
    ) -> Result<Box<dyn ScenarioSource>, ConfigError> {
        match self.scenarios {
            ScenarioPlan::Replay { start, end } => {
                let profile =
                    profile.ok_or_else(|| ConfigError::Invalid("replay needs a time-series profile".into()))?;
                let source = ReplaySource::from_profile(network, profile)?
                    .with_window(start, end.unwrap_or(profile.steps()))?;
                Ok(Box::new(source))
            }
            ScenarioPlan::Sampled {
                points,
                method,
                seed,
                spread,
            } => {
                let distributions = match profile {
                    Some(profile) => InjectionDistribution::from_profile(profile),
                    None => InjectionDistribution::from_network(network, spread),
                };
                let source = SampledSource::new(network, islands, distributions, points, method, seed)?;
                Ok(Box::new(source))
            }
        }
    }

    /// Partitions the network, builds the source and runs the batch with the
    /// built-in power-flow solver.
    pub fn run(
        &self,
        network: &NetworkModel,
        profile: Option<&TimeSeriesProfile>,
        on_progress: &mut dyn FnMut(f64),
        on_cancel: &dyn Fn() -> bool,
    ) -> Result<(ExecutionOrchestrator, BatchOutcome), ConfigError> {
        let islands = IslandPartitioner::new(self.options.ignore_single_node_islands).partition(network)?;
        info!(islands = islands.len(), plan = ?self.scenarios, "batch configured");
        let mut source = self.build_source(network, &islands, profile)?;
        let orchestrator =
            ExecutionOrchestrator::new(network, islands, Arc::new(PowerFlowSolver), self.options.clone());
        let outcome = orchestrator.run(source.as_mut(), self.mode, on_progress, on_cancel)?;
        Ok((orchestrator, outcome))
    }
}
