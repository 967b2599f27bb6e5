//! Newton iteration for DC networks with slack, fixed-power and droop buses.
//!
//! The state is the vector of real bus voltages. With `G = Re(Ybus)` and the
//! grid polarity `pol`, the calculated injection is
//!
//! ```text
//! P_calc = pol · V ⊙ (G V)
//! ```
//!
//! and the Jacobian is taken with respect to relative voltage corrections
//! `ΔV/V`, so that `V ← V ⊙ (1 + Δx)`:
//!
//! ```text
//! J_ij = pol · G_ij · V_i · V_j      (i ≠ j)
//! J_ii = pol · G_ii · V_i² + P_calc_i
//! ```
//!
//! Droop buses add `(V - V_lim) / gain` to their calculated injection, where
//! `V_lim` is `V` clamped to the deadband window around the set-point. Only
//! its derivative `V / gain` enters `J_ii`; the `P_calc_i` on the diagonal is
//! the network injection alone.

use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use num_complex::Complex64;
use tracing::{debug, warn};

use super::island::{Island, IslandScenario};
use super::network::BusKind;
use super::pf::{PowerFlowOptions, SolveResult, SolveStatus};
use super::solver::Solve;
use super::sparse::RealImage;
use super::system::flows::{FlowModel, bus_injections};

/// Droop correction `(V - V_lim) / gain` and its contribution to the Jacobian
/// diagonal, `V / gain` outside the deadband and zero inside it.
#[inline]
pub(crate) fn droop_term(v: f64, v_set: f64, deadband: f64, gain: f64) -> (f64, f64) {
    let v_lim = v.clamp(v_set - deadband, v_set + deadband);
    let term = (v - v_lim) / gain;
    let slope = if v == v_lim { 0.0 } else { v / gain };
    (term, slope)
}

/// Calculated injections at `v`.
struct Injections {
    /// `pol · V ⊙ (G V)`.
    network: DVector<f64>,
    /// Network injection plus the droop terms.
    total: DVector<f64>,
    /// Droop contribution to the Jacobian diagonal.
    droop_slope: Vec<f64>,
}

fn injections(
    island: &Island,
    scenario: &IslandScenario,
    g: &CscMatrix<f64>,
    v: &DVector<f64>,
    pol: f64,
) -> Injections {
    let n = island.n_bus();
    let i_bus = g * v;
    let network = DVector::from_fn(n, |k, _| pol * v[k] * i_bus[k]);
    let mut total = network.clone();
    let mut droop_slope = vec![0.0; n];
    for &d in &island.sets.droop {
        let deadband = match island.kinds[d] {
            BusKind::Droop(c) => c.deadband,
            _ => 0.0,
        };
        let (term, slope) = droop_term(v[d], scenario.v_set[d], deadband, scenario.droop_gain[d]);
        total[d] += term;
        droop_slope[d] = slope;
    }
    Injections {
        network,
        total,
        droop_slope,
    }
}

/// Solves one DC island for one scenario.
///
/// `v_init` supplies the starting voltages (real parts are used); slack
/// entries stay fixed. The iteration stops after `options.max_iter` linear
/// solves or once `max |Δx| < options.tol`. The droop terms of an iteration
/// are evaluated at the voltage the iteration starts from.
pub fn dc_newton<S: Solve>(
    island: &Island,
    scenario: &IslandScenario,
    v_init: &DVector<Complex64>,
    options: &PowerFlowOptions,
    solver: &mut S,
) -> SolveResult {
    let pol = options.polarity.factor();
    let model = FlowModel::Dc { polarity: pol };
    let n = island.n_bus();
    let ns = &island.sets.non_slack;
    let g = island.y_bus.real();

    let mut v = v_init.map(|x| x.re);
    let p_target = scenario.s_bus.map(|x| x.re);

    let mut reduced = vec![usize::MAX; n];
    for (r, &bus) in ns.iter().enumerate() {
        reduced[bus] = r;
    }

    let mut status = SolveStatus::NotConverged;
    let mut iterations = 0;
    if ns.is_empty() {
        status = SolveStatus::Converged;
    }

    while status == SolveStatus::NotConverged && iterations < options.max_iter {
        let inj = injections(island, scenario, &g, &v, pol);
        let jac = reduced_jacobian(&g, &v, &inj.network, &inj.droop_slope, &reduced, ns.len(), pol);
        let mut dx: Vec<f64> = ns.iter().map(|&k| p_target[k] - inj.total[k]).collect();

        iterations += 1;
        if let Err(err) = solver.solve_csc(&jac, &mut dx) {
            warn!(island = island.index, scenario = scenario.index, %err, "singular DC Jacobian");
            status = SolveStatus::SingularSystem;
            break;
        }

        let mut max_dx = 0.0f64;
        for (&bus, d) in ns.iter().zip(&dx) {
            v[bus] *= 1.0 + d;
            max_dx = max_dx.max(d.abs());
        }
        if max_dx < options.tol {
            status = SolveStatus::Converged;
        }
    }

    if status == SolveStatus::NotConverged {
        debug!(
            island = island.index,
            scenario = scenario.index,
            iterations,
            "DC power flow did not converge"
        );
    }

    let voltage = v.map(|x| Complex64::new(x, 0.0));
    let calc = bus_injections(&island.y_bus, &voltage, model);
    let s_bus = DVector::from_fn(n, |k, _| match island.kinds[k] {
        BusKind::Fixed => Complex64::new(p_target[k], 0.0),
        BusKind::Slack { .. } | BusKind::Droop(_) => calc[k],
    });
    SolveResult::from_state(island, status, iterations, voltage, s_bus, model)
}

/// Assembles `J[ns, ns]` directly in reduced numbering. Every diagonal entry
/// is emitted so the pattern stays identical across iterations.
///
/// `p_net` must exclude the droop terms; they enter through `droop_slope`.
fn reduced_jacobian(
    g: &CscMatrix<f64>,
    v: &DVector<f64>,
    p_net: &DVector<f64>,
    droop_slope: &[f64],
    reduced: &[usize],
    dim: usize,
    pol: f64,
) -> CscMatrix<f64> {
    let mut coo = CooMatrix::new(dim, dim);
    for (j, col) in g.col_iter().enumerate() {
        let rj = reduced[j];
        if rj == usize::MAX {
            continue;
        }
        for (&i, &gij) in col.row_indices().iter().zip(col.values()) {
            let ri = reduced[i];
            if ri != usize::MAX {
                coo.push(ri, rj, pol * gij * v[i] * v[j]);
            }
        }
    }
    for (bus, &r) in reduced.iter().enumerate() {
        if r != usize::MAX {
            coo.push(r, r, p_net[bus] + droop_slope[bus]);
        }
    }
    CscMatrix::from(&coo)
}
