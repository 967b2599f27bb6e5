//! Power-flow options, per-scenario results and the solver capability used by
//! the batch orchestrator.

use std::str::FromStr;

use derive_more::Display;
use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::dcnewton::dc_newton;
use super::island::{Island, IslandScenario};
use super::newtonpf::ac_newton;
use super::solver::DefaultSolver;
use super::system::flows::{FlowModel, branch_flows};
use crate::error::ConfigError;

/// Grounding arrangement of a DC grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Polarity {
    /// Asymmetrically grounded monopole.
    #[default]
    Monopolar,
    /// Symmetrically grounded monopole or bipole; doubles transferred power.
    Bipolar,
}

impl Polarity {
    pub fn factor(self) -> f64 {
        match self {
            Polarity::Monopolar => 1.0,
            Polarity::Bipolar => 2.0,
        }
    }
}

/// Which per-scenario solver to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SolverKind {
    /// Newton iteration on real DC voltages, with droop control.
    #[default]
    #[display("dc-newton")]
    DcNewton,
    /// Polar Newton-Raphson on complex AC voltages.
    #[display("ac-newton")]
    AcNewton,
}

impl FromStr for SolverKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dc-newton" => Ok(SolverKind::DcNewton),
            "ac-newton" => Ok(SolverKind::AcNewton),
            other => Err(ConfigError::UnsupportedSolver(other.to_string())),
        }
    }
}

impl TryFrom<String> for SolverKind {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SolverKind> for String {
    fn from(kind: SolverKind) -> Self {
        kind.to_string()
    }
}

fn default_tol() -> f64 {
    1e-8
}

fn default_max_iter() -> usize {
    20
}

/// Options passed unchanged to every scenario solve of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerFlowOptions {
    /// Convergence threshold on the largest voltage correction.
    #[serde(default = "default_tol")]
    pub tol: f64,
    /// Maximum number of linear solves per scenario.
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    pub solver: SolverKind,
    pub polarity: Polarity,
    pub ignore_single_node_islands: bool,
    /// Forwarded to optimizing solvers; ignored by the power-flow variants.
    pub allow_load_shedding: bool,
    /// Forwarded to optimizing solvers; ignored by the power-flow variants.
    pub allow_generation_shedding: bool,
}

impl Default for PowerFlowOptions {
    fn default() -> Self {
        Self {
            tol: default_tol(),
            max_iter: default_max_iter(),
            solver: SolverKind::default(),
            polarity: Polarity::default(),
            ignore_single_node_islands: false,
            allow_load_shedding: false,
            allow_generation_shedding: false,
        }
    }
}

impl PowerFlowOptions {
    /// Flow post-processing matching the selected solver.
    pub fn flow_model(&self) -> FlowModel {
        match self.solver {
            SolverKind::DcNewton => FlowModel::Dc {
                polarity: self.polarity.factor(),
            },
            SolverKind::AcNewton => FlowModel::Ac,
        }
    }
}

/// Outcome of one (island, scenario) solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum SolveStatus {
    #[display("converged")]
    Converged,
    /// Iteration cap reached.
    #[display("not converged")]
    NotConverged,
    /// The reduced Jacobian could not be factorized.
    #[display("singular system")]
    SingularSystem,
}

/// Per island per scenario solution, in island-local indices.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveResult {
    pub status: SolveStatus,
    /// Number of linear solves performed.
    pub iterations: usize,
    pub voltage: DVector<Complex64>,
    /// Bus injections; slack and droop entries are recomputed from `voltage`.
    pub s_bus: DVector<Complex64>,
    /// Power entering each branch at its from-end.
    pub s_branch: DVector<Complex64>,
    pub losses: DVector<Complex64>,
    /// `|s_branch| / rating` as a ratio.
    pub loading: DVector<f64>,
    pub overloads: DVector<f64>,
}

impl SolveResult {
    pub fn converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }

    /// Derives branch quantities from a voltage solution and packs the result.
    pub(crate) fn from_state(
        island: &Island,
        status: SolveStatus,
        iterations: usize,
        voltage: DVector<Complex64>,
        s_bus: DVector<Complex64>,
        model: FlowModel,
    ) -> Self {
        let flows = branch_flows(&island.branches, &voltage, model);
        Self {
            status,
            iterations,
            voltage,
            s_bus,
            s_branch: flows.s_from,
            losses: flows.losses,
            loading: flows.loading,
            overloads: flows.overloads,
        }
    }
}

/// The per-scenario solve capability.
///
/// Implementations must be pure with respect to their inputs: the same island,
/// scenario and options always give the same result. Power flow is the
/// built-in implementation; optimizing dispatch backends plug in here with
/// the same contract.
pub trait ScenarioSolver: Send + Sync {
    fn solve(
        &self,
        island: &Island,
        scenario: &IslandScenario,
        v_init: &DVector<Complex64>,
        options: &PowerFlowOptions,
    ) -> SolveResult;

    /// Rejects islands the solver cannot handle, before any scenario runs.
    fn check_island(&self, _island: &Island, _options: &PowerFlowOptions) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Dispatches to the DC or AC Newton solver according to [`PowerFlowOptions::solver`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerFlowSolver;

impl ScenarioSolver for PowerFlowSolver {
    fn solve(
        &self,
        island: &Island,
        scenario: &IslandScenario,
        v_init: &DVector<Complex64>,
        options: &PowerFlowOptions,
    ) -> SolveResult {
        let mut lu = DefaultSolver::default();
        match options.solver {
            SolverKind::DcNewton => dc_newton(island, scenario, v_init, options, &mut lu),
            SolverKind::AcNewton => ac_newton(island, scenario, v_init, options, &mut lu),
        }
    }

    fn check_island(&self, island: &Island, options: &PowerFlowOptions) -> Result<(), ConfigError> {
        if options.solver == SolverKind::AcNewton && !island.sets.droop.is_empty() {
            return Err(ConfigError::IncompatibleIsland {
                island: island.index,
                reason: format!(
                    "{} droop-controlled buses cannot be solved by {}",
                    island.sets.droop.len(),
                    options.solver
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solver_kind_parses_known_selectors() {
        assert_eq!("dc-newton".parse::<SolverKind>(), Ok(SolverKind::DcNewton));
        assert_eq!("ac-newton".parse::<SolverKind>(), Ok(SolverKind::AcNewton));
        assert_eq!(
            "milp".parse::<SolverKind>(),
            Err(ConfigError::UnsupportedSolver("milp".into()))
        );
    }

    #[test]
    fn options_fill_defaults_from_json() {
        let opts: PowerFlowOptions =
            serde_json::from_str(r#"{ "solver": "ac-newton", "polarity": "bipolar" }"#).unwrap();
        assert_eq!(opts.solver, SolverKind::AcNewton);
        assert_eq!(opts.polarity.factor(), 2.0);
        assert_eq!(opts.tol, 1e-8);
        assert_eq!(opts.max_iter, 20);
        assert!(!opts.allow_load_shedding);
    }

    #[test]
    fn unknown_solver_in_json_is_rejected() {
        let err = serde_json::from_str::<PowerFlowOptions>(r#"{ "solver": "simplex" }"#).unwrap_err();
        assert!(err.to_string().contains("simplex"));
    }
}
