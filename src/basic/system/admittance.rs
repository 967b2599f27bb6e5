//! Nodal admittance matrix of an island.

use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CscMatrix, CsrMatrix};
use num_complex::Complex64;
use num_traits::One;

use crate::basic::sparse::diag;

/// A branch expressed in island-local bus numbering.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalBranch {
    pub from: usize,
    pub to: usize,
    /// Series admittance (p.u.).
    pub y_series: Complex64,
    /// Total pi-model shunt admittance (p.u.), half at each terminal.
    pub y_shunt: Complex64,
    /// Thermal rating (p.u.), zero when unconstrained.
    pub rating: f64,
}

/// Creates the bus-branch incidence matrix (`+1` at the from-bus, `-1` at the to-bus).
pub(crate) fn create_incidence_mat(nodes: usize, branches: &[LocalBranch]) -> CooMatrix<Complex64> {
    let mut incidence = CooMatrix::new(nodes, branches.len());
    for (idx, br) in branches.iter().enumerate() {
        incidence.push(br.from, idx, Complex64::one());
        incidence.push(br.to, idx, -Complex64::one());
    }
    incidence
}

/// Builds `Ybus = A · diag(y) · Aᵀ + diag(y_sh)`.
///
/// `y_sh` collects the bus shunts plus half of every branch shunt at each
/// terminal. The diagonal is always present in the pattern, even for buses
/// without any connection, so the Newton Jacobians keep a fixed structure.
pub fn create_y_bus(
    nodes: usize,
    branches: &[LocalBranch],
    bus_shunt: &[Complex64],
) -> CscMatrix<Complex64> {
    let incidence = CsrMatrix::from(&create_incidence_mat(nodes, branches));

    let mut diag_admit = CsrMatrix::identity(branches.len());
    diag_admit
        .values_mut()
        .iter_mut()
        .zip(branches)
        .for_each(|(y, br)| *y = br.y_series);

    let mut shunt = DVector::from_column_slice(bus_shunt);
    for br in branches {
        let half = br.y_shunt * 0.5;
        shunt[br.from] += half;
        shunt[br.to] += half;
    }

    let series = &incidence * &(&diag_admit * &incidence.transpose());
    &CscMatrix::from(&series) + &diag(&shunt)
}
