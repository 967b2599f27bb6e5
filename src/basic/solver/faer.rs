use faer::{
    MatMut,
    linalg::solvers::Solve,
    sparse::{
        SparseColMatRef, SymbolicSparseColMatRef,
        linalg::solvers::{Lu, SymbolicLu},
    },
};

use super::Solve as LinearSolve;
use crate::error::LinearSolveError;

/// LU backend on top of `faer`, reusing the symbolic factorization.
#[derive(Default)]
pub struct FaerSolver {
    symbolic: Option<SymbolicLu<usize>>,
}

#[allow(non_snake_case)]
impl LinearSolve for FaerSolver {
    fn solve(
        &mut self,
        Ap: &mut [usize],
        Ai: &mut [usize],
        Ax: &mut [f64],
        b: &mut [f64],
        n: usize,
    ) -> Result<(), LinearSolveError> {
        let s = SymbolicSparseColMatRef::new_checked(n, n, Ap, None, Ai);
        let mat = SparseColMatRef::new(s, Ax);
        if self.symbolic.is_none() {
            let symbolic = SymbolicLu::try_new(s)
                .map_err(|_| LinearSolveError::Symbolic("faer symbolic LU failed"))?;
            self.symbolic = Some(symbolic);
        }
        let Some(symbolic) = self.symbolic.as_ref() else {
            return Err(LinearSolveError::Symbolic("faer symbolic LU missing"));
        };
        let lu = Lu::try_new_with_symbolic(symbolic.clone(), mat)
            .map_err(|_| LinearSolveError::Factorization("faer numeric LU failed"))?;
        lu.solve_in_place(MatMut::from_column_major_slice_mut(b, n, 1));
        Ok(())
    }
}
