use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;

use crate::basic::sparse::{Conjugate, diag};

/// Computes the partial derivatives of bus power injections with respect to
/// voltage magnitudes and angles.
///
/// # Arguments
///
/// * `Ybus` - Nodal admittance matrix.
/// * `v` - Complex bus voltages.
/// * `Vnorm` - Unit phasors `v / |v|`.
///
/// # Returns
///
/// `(dS_dVm, dS_dVa)`, both on the pattern of `Ybus` plus its diagonal.
///
/// # Notes
///
/// Uses the complex matrix formulation of R. D. Zimmerman, "AC Power Flows,
/// Generalized OPF Costs and their Derivatives using Complex Matrix Notation",
/// MATPOWER Technical Note 2, February 2010.
#[allow(non_snake_case)]
pub fn dSbus_dV(
    Ybus: &CscMatrix<Complex64>,
    v: &DVector<Complex64>,
    Vnorm: &DVector<Complex64>,
) -> (CscMatrix<Complex64>, CscMatrix<Complex64>) {
    let ibus = Ybus * v;
    let diagV = diag(v);
    let diagVnorm = diag(Vnorm);
    let diagIbus = diag(&ibus);

    // dS_dVm = diagV * conj(Ybus * diagVnorm) + conj(diagIbus) * diagVnorm
    let dS_dVm = &(&diagV * &(Ybus * &diagVnorm).conjugate()) + &(&diagIbus.conjugate() * &diagVnorm);
    // dS_dVa = 1j * diagV * conj(diagIbus - Ybus * diagV)
    let dS_dVa = (&diagV * &(&diagIbus - &(Ybus * &diagV)).conjugate()) * Complex64::i();
    (dS_dVm, dS_dVa)
}
