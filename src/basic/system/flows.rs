//! Post-processing of a voltage solution into bus and branch quantities.

use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;

use super::admittance::LocalBranch;
use crate::basic::sparse::RealImage;

/// Denominator added to thermal ratings so an unrated branch never divides by zero.
pub const RATING_EPS: f64 = 1e-20;

/// How admittances and voltages are interpreted when deriving flows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlowModel {
    /// Complex phasors and full complex admittances.
    Ac,
    /// Real voltages and conductances only, scaled by the grid polarity.
    Dc { polarity: f64 },
}

/// Branch quantities of one island, indexed like the island's branches.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchFlows {
    /// Power leaving the from-bus into the branch.
    pub s_from: DVector<Complex64>,
    /// Power leaving the to-bus into the branch.
    pub s_to: DVector<Complex64>,
    /// `s_from + s_to`.
    pub losses: DVector<Complex64>,
    /// `|s_from| / rating`.
    pub loading: DVector<f64>,
    /// Flow magnitude in excess of the rating (zero for unrated branches).
    pub overloads: DVector<f64>,
}

/// Computes bus injections `S = V ⊙ conj(Y V)` (AC) or `P = pol · V ⊙ (G V)` (DC).
pub fn bus_injections(
    y_bus: &CscMatrix<Complex64>,
    v: &DVector<Complex64>,
    model: FlowModel,
) -> DVector<Complex64> {
    match model {
        FlowModel::Ac => v.component_mul(&(y_bus * v).conjugate()),
        FlowModel::Dc { polarity } => {
            let vr = v.map(|x| x.re);
            let i = &y_bus.real() * &vr;
            DVector::from_fn(v.len(), |k, _| Complex64::new(polarity * vr[k] * i[k], 0.0))
        }
    }
}

/// Flows, losses, loading and overloads from a voltage solution.
pub fn branch_flows(
    branches: &[LocalBranch],
    v: &DVector<Complex64>,
    model: FlowModel,
) -> BranchFlows {
    let m = branches.len();
    let mut flows = BranchFlows {
        s_from: DVector::zeros(m),
        s_to: DVector::zeros(m),
        losses: DVector::zeros(m),
        loading: DVector::zeros(m),
        overloads: DVector::zeros(m),
    };
    for (k, br) in branches.iter().enumerate() {
        let (vf, vt, ys, ysh, scale) = match model {
            FlowModel::Ac => (v[br.from], v[br.to], br.y_series, br.y_shunt * 0.5, 1.0),
            FlowModel::Dc { polarity } => (
                Complex64::new(v[br.from].re, 0.0),
                Complex64::new(v[br.to].re, 0.0),
                Complex64::new(br.y_series.re, 0.0),
                Complex64::new(br.y_shunt.re * 0.5, 0.0),
                polarity,
            ),
        };
        let i_from = ys * (vf - vt) + ysh * vf;
        let i_to = ys * (vt - vf) + ysh * vt;
        let s_from = vf * i_from.conj() * scale;
        let s_to = vt * i_to.conj() * scale;
        let magnitude = s_from.norm();

        flows.s_from[k] = s_from;
        flows.s_to[k] = s_to;
        flows.losses[k] = s_from + s_to;
        flows.loading[k] = magnitude / (br.rating + RATING_EPS);
        flows.overloads[k] = if br.rating > 0.0 {
            (magnitude - br.rating).max(0.0)
        } else {
            0.0
        };
    }
    flows
}
