//! Scenario generation: replayed time series and sampled operating points.
//!
//! A [`Scenario`] is a self-contained set of bus injections and droop
//! set-points over the *global* bus numbering. Sources hand them out lazily,
//! one at a time, and can be restarted from the beginning with
//! [`ScenarioSource::reset`]; the orchestrator restarts the source once per
//! island.

pub mod replay;
pub mod sampling;

use nalgebra::DVector;
use num_complex::Complex64;

use crate::basic::network::NetworkModel;

pub use replay::{ReplaySource, TimeSeriesProfile};
pub use sampling::{InjectionDistribution, SampledSource, SamplingMethod, latin_hypercube, monte_carlo};

/// One operating condition over the global bus numbering.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    /// Position of the scenario in its batch, used as the result row.
    pub index: usize,
    /// Time stamp for replayed profiles.
    pub time: Option<f64>,
    /// Bus injections (p.u., positive into the network).
    pub s_bus: DVector<Complex64>,
    /// Voltage set-points of slack and droop buses.
    pub v_set: DVector<f64>,
    /// Droop gains; zero for buses without droop control.
    pub droop_gain: DVector<f64>,
}

impl Scenario {
    /// The network's base case as scenario 0.
    pub fn base(network: &NetworkModel) -> Self {
        Self::with_injections(network, 0, None, network.s_bus())
    }

    /// Network set-points with the given injections.
    pub fn with_injections(
        network: &NetworkModel,
        index: usize,
        time: Option<f64>,
        s_bus: DVector<Complex64>,
    ) -> Self {
        Self {
            index,
            time,
            s_bus,
            v_set: network.v_set(),
            droop_gain: network.droop_gain(),
        }
    }

    pub fn n_bus(&self) -> usize {
        self.s_bus.len()
    }
}

/// A finite, restartable sequence of scenarios.
///
/// Every call to [`next`](ScenarioSource::next) after a
/// [`reset`](ScenarioSource::reset) must yield the same scenarios in the same
/// order, so results do not depend on how often the source was restarted.
pub trait ScenarioSource: Send {
    /// Number of scenarios in one pass.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next scenario of the current pass, or `None` once exhausted.
    fn next(&mut self) -> Option<Scenario>;

    /// Restarts the sequence from its first scenario.
    fn reset(&mut self);
}
