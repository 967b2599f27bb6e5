//! Per-run network snapshot: buses, branches and their base-case data.
//!
//! All quantities are per-unit. Injections follow the generator convention:
//! positive complex power flows *into* the network at the bus.

use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Voltage-droop characteristic of a bus.
///
/// Inside `v_set ± deadband` the bus holds its power set-point; outside it
/// the injection moves by `(V - V_limit) / gain`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DroopControl {
    /// Voltage droop gain (p.u. voltage per p.u. power).
    pub gain: f64,
    /// Voltage set-point (p.u.).
    pub v_set: f64,
    /// Half-width of the deadband around `v_set` (p.u.).
    pub deadband: f64,
}

impl Default for DroopControl {
    fn default() -> Self {
        Self {
            gain: 0.05,
            v_set: 1.0,
            deadband: 0.0,
        }
    }
}

/// Bus-type tag used by the solvers to pick mismatch and Jacobian formulas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BusKind {
    /// Fixed voltage; its injection is an output of the solve.
    Slack { vm: f64, va: f64 },
    /// Fixed power injection.
    Fixed,
    /// Power set-point with voltage droop feedback.
    Droop(DroopControl),
}

impl Default for BusKind {
    fn default() -> Self {
        BusKind::Fixed
    }
}

impl BusKind {
    pub fn is_slack(&self) -> bool {
        matches!(self, BusKind::Slack { .. })
    }

    pub fn is_droop(&self) -> bool {
        matches!(self, BusKind::Droop(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub name: String,
    pub kind: BusKind,
    /// Lower voltage bound (p.u.).
    pub v_min: f64,
    /// Upper voltage bound (p.u.).
    pub v_max: f64,
    /// Base-case injection (p.u.).
    #[serde(default)]
    pub s_inj: Complex64,
    /// Shunt admittance to ground (p.u.).
    #[serde(default)]
    pub y_shunt: Complex64,
    #[serde(default = "in_service_default")]
    pub in_service: bool,
}

fn in_service_default() -> bool {
    true
}

impl Bus {
    fn with_kind(name: impl Into<String>, kind: BusKind) -> Self {
        Self {
            name: name.into(),
            kind,
            v_min: 0.9,
            v_max: 1.1,
            s_inj: Complex64::new(0.0, 0.0),
            y_shunt: Complex64::new(0.0, 0.0),
            in_service: true,
        }
    }

    pub fn slack(name: impl Into<String>, vm: f64) -> Self {
        Self::with_kind(name, BusKind::Slack { vm, va: 0.0 })
    }

    pub fn fixed(name: impl Into<String>, s_inj: Complex64) -> Self {
        let mut bus = Self::with_kind(name, BusKind::Fixed);
        bus.s_inj = s_inj;
        bus
    }

    /// A droop bus; `p_set` is its active power set-point.
    pub fn droop(name: impl Into<String>, p_set: f64, control: DroopControl) -> Self {
        let mut bus = Self::with_kind(name, BusKind::Droop(control));
        bus.s_inj = Complex64::new(p_set, 0.0);
        bus
    }

    /// Voltage set-point carried by slack and droop buses; 1.0 otherwise.
    pub fn v_set(&self) -> f64 {
        match self.kind {
            BusKind::Slack { vm, .. } => vm,
            BusKind::Droop(c) => c.v_set,
            BusKind::Fixed => 1.0,
        }
    }

    pub fn droop_gain(&self) -> f64 {
        match self.kind {
            BusKind::Droop(c) => c.gain,
            _ => 0.0,
        }
    }
}

/// Two-terminal pi-model branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub from: usize,
    pub to: usize,
    /// Series admittance (p.u.).
    pub y_series: Complex64,
    /// Total shunt admittance, split evenly between both ends (p.u.).
    #[serde(default)]
    pub y_shunt: Complex64,
    /// Thermal rating (p.u.). Zero means unconstrained.
    #[serde(default)]
    pub rating: f64,
    #[serde(default = "in_service_default")]
    pub in_service: bool,
}

impl Branch {
    pub fn new(name: impl Into<String>, from: usize, to: usize, y_series: Complex64) -> Self {
        Self {
            name: name.into(),
            from,
            to,
            y_series,
            y_shunt: Complex64::new(0.0, 0.0),
            rating: 0.0,
            in_service: true,
        }
    }

    /// Branch from a series impedance `r + jx`.
    pub fn from_impedance(name: impl Into<String>, from: usize, to: usize, r: f64, x: f64) -> Self {
        Self::new(name, from, to, Complex64::new(r, x).inv())
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = rating;
        self
    }

    pub fn with_shunt(mut self, y_shunt: Complex64) -> Self {
        self.y_shunt = y_shunt;
        self
    }
}

/// Immutable network snapshot shared read-only by every solve of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkModel {
    /// Base power used when presenting results in MW/MVAr.
    pub s_base: f64,
    pub buses: Vec<Bus>,
    pub branches: Vec<Branch>,
}

impl NetworkModel {
    pub fn new(s_base: f64) -> Self {
        Self {
            s_base,
            buses: Vec::new(),
            branches: Vec::new(),
        }
    }

    pub fn add_bus(&mut self, bus: Bus) -> usize {
        self.buses.push(bus);
        self.buses.len() - 1
    }

    pub fn add_branch(&mut self, branch: Branch) -> usize {
        self.branches.push(branch);
        self.branches.len() - 1
    }

    pub fn n_bus(&self) -> usize {
        self.buses.len()
    }

    pub fn n_branch(&self) -> usize {
        self.branches.len()
    }

    /// Base-case injection vector over all buses.
    pub fn s_bus(&self) -> DVector<Complex64> {
        DVector::from_iterator(self.buses.len(), self.buses.iter().map(|b| b.s_inj))
    }

    pub fn v_set(&self) -> DVector<f64> {
        DVector::from_iterator(self.buses.len(), self.buses.iter().map(Bus::v_set))
    }

    pub fn droop_gain(&self) -> DVector<f64> {
        DVector::from_iterator(self.buses.len(), self.buses.iter().map(Bus::droop_gain))
    }

    /// A branch is energized when it is in service and both terminals are.
    pub fn is_energized(&self, branch: &Branch) -> bool {
        branch.in_service && self.buses[branch.from].in_service && self.buses[branch.to].in_service
    }

    /// Checks branch terminals and droop gains.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buses.is_empty() {
            return Err(ConfigError::EmptyNetwork);
        }
        let n_bus = self.buses.len();
        for br in &self.branches {
            for bus in [br.from, br.to] {
                if bus >= n_bus {
                    return Err(ConfigError::BusOutOfRange { bus, n_bus });
                }
            }
        }
        for (idx, bus) in self.buses.iter().enumerate() {
            if let BusKind::Droop(c) = bus.kind {
                if !(c.gain > 0.0) || c.deadband < 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "bus {idx} ({}): droop gain must be positive and deadband non-negative",
                        bus.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_dangling_branch() {
        let mut net = NetworkModel::new(100.0);
        net.add_bus(Bus::slack("a", 1.0));
        net.add_branch(Branch::from_impedance("l", 0, 3, 0.01, 0.1));
        assert_eq!(
            net.validate(),
            Err(ConfigError::BusOutOfRange { bus: 3, n_bus: 1 })
        );
    }

    #[test]
    fn validate_rejects_empty_network() {
        assert_eq!(NetworkModel::new(1.0).validate(), Err(ConfigError::EmptyNetwork));
    }

    #[test]
    fn droop_bus_carries_set_points() {
        let bus = Bus::droop(
            "conv",
            0.3,
            DroopControl {
                gain: 0.1,
                v_set: 1.02,
                deadband: 0.01,
            },
        );
        assert_eq!(bus.v_set(), 1.02);
        assert_eq!(bus.droop_gain(), 0.1);
        assert_eq!(bus.s_inj.re, 0.3);
    }

    #[test]
    fn network_roundtrips_through_json() {
        let mut net = NetworkModel::new(100.0);
        net.add_bus(Bus::slack("a", 1.0));
        net.add_bus(Bus::fixed("b", Complex64::new(-0.1, -0.02)));
        net.add_branch(Branch::from_impedance("l", 0, 1, 0.01, 0.1).with_rating(1.0));
        let text = serde_json::to_string(&net).unwrap();
        let back: NetworkModel = serde_json::from_str(&text).unwrap();
        assert_eq!(net, back);
    }
}
