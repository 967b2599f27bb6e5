use nalgebra_sparse::CscMatrix;

use crate::error::LinearSolveError;

#[cfg(feature = "faer")]
mod faer;
#[cfg(feature = "faer")]
pub use faer::*;

#[cfg(feature = "rsparse")]
mod rsparse;
#[cfg(feature = "rsparse")]
pub use rsparse::*;

#[cfg(feature = "faer")]
pub type DefaultSolver = FaerSolver;

#[cfg(all(not(feature = "faer"), feature = "rsparse"))]
pub type DefaultSolver = RSparseSolver;

#[allow(non_snake_case)]
/// A sparse LU backend for the reduced Newton systems.
///
/// Implementations may cache a symbolic factorization between calls, so one
/// instance must only see matrices of a single sparsity pattern. The Newton
/// loops create a fresh backend per scenario solve.
pub trait Solve {
    /// Solves `A x = b` in place (`b` holds `x` on return).
    ///
    /// # Parameters
    ///
    /// * `Ap` - Column pointers of the matrix.
    /// * `Ai` - Row indices of the matrix.
    /// * `Ax` - Non-zero values of the matrix.
    /// * `b` - Right-hand side, overwritten with the solution.
    /// * `n` - Dimension of the system.
    fn solve(
        &mut self,
        Ap: &mut [usize],
        Ai: &mut [usize],
        Ax: &mut [f64],
        b: &mut [f64],
        n: usize,
    ) -> Result<(), LinearSolveError>;

    /// Solves with a CSC matrix and rejects non-finite solutions.
    fn solve_csc(&mut self, a: &CscMatrix<f64>, b: &mut [f64]) -> Result<(), LinearSolveError> {
        let n = a.nrows();
        let (mut ap, mut ai, mut ax) = a.clone().disassemble();
        self.solve(&mut ap, &mut ai, &mut ax, b, n)?;
        if b.iter().all(|x| x.is_finite()) {
            Ok(())
        } else {
            Err(LinearSolveError::NonFinite)
        }
    }
}
