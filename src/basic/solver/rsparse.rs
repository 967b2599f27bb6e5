use rsparse::{
    self,
    data::{self, Numeric, Symb},
    lsolve, lu, sqr, usolve,
};

use super::Solve;
use crate::error::LinearSolveError;

/// LU backend on top of `rsparse` (CSparse port), caching the column ordering.
#[derive(Default)]
pub struct RSparseSolver {
    work: Vec<f64>,
    symbolic: Option<Symb>,
}

#[allow(non_snake_case)]
impl Solve for RSparseSolver {
    fn solve(
        &mut self,
        Ap: &mut [usize],
        Ai: &mut [usize],
        Ax: &mut [f64],
        b: &mut [f64],
        n: usize,
    ) -> Result<(), LinearSolveError> {
        let a = data::Sprs {
            m: n,
            n,
            i: Ai.to_vec(),
            p: Ap.iter().map(|&v| v as isize).collect(),
            x: Ax.to_vec(),
            nzmax: Ax.len(),
        };
        let symbolic = self.symbolic.get_or_insert_with(|| sqr(&a, 1, false));
        self.work.resize(n, 0.0);
        let factors = lu(&a, symbolic, 1e-6)
            .map_err(|_| LinearSolveError::Factorization("rsparse LU reported a zero pivot"))?;
        ipvec(&factors.pinv, b, &mut self.work); // x = P*b
        lsolve(&factors.l, &mut self.work); // x = L\x
        usolve(&factors.u, &mut self.work); // x = U\x
        ipvec(&symbolic.q, &self.work, b); // b = Q*x
        Ok(())
    }
}

fn ipvec<T: Numeric<T>>(p: &Option<Vec<isize>>, b: &[T], x: &mut [T]) {
    match p {
        Some(perm) => {
            for k in 0..b.len() {
                x[perm[k] as usize] = b[k];
            }
        }
        None => x.copy_from_slice(b),
    }
}
