//! CSC helpers used by the Newton solvers.

use nalgebra::{DVector, Scalar};
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;

/// Element-wise conjugate of a complex sparse matrix.
pub(crate) trait Conjugate {
    fn conjugate(&self) -> Self;
}

impl Conjugate for CscMatrix<Complex64> {
    fn conjugate(&self) -> Self {
        map_values(self, |v| v.conj())
    }
}

/// Splits a complex sparse matrix into real and imaginary parts on the same pattern.
pub(crate) trait RealImage {
    fn real(&self) -> CscMatrix<f64>;
    fn imag(&self) -> CscMatrix<f64>;
}

impl RealImage for CscMatrix<Complex64> {
    fn real(&self) -> CscMatrix<f64> {
        map_values(self, |v| v.re)
    }

    fn imag(&self) -> CscMatrix<f64> {
        map_values(self, |v| v.im)
    }
}

#[inline]
fn map_values<T, U>(mat: &CscMatrix<T>, f: impl Fn(&T) -> U) -> CscMatrix<U> {
    let values = mat.values().iter().map(f).collect();
    // same pattern, same number of values
    CscMatrix::try_from_pattern_and_values(mat.pattern().clone(), values)
        .expect("pattern and values have equal length")
}

/// Square diagonal matrix with an explicit entry for every element of `d`.
pub(crate) fn diag<T: Scalar>(d: &DVector<T>) -> CscMatrix<T> {
    let n = d.len();
    let offsets = (0..=n).collect();
    let rows = (0..n).collect();
    CscMatrix::try_from_csc_data(n, n, offsets, rows, d.as_slice().to_vec())
        .expect("diagonal pattern is always valid")
}

/// Extracts `mat[rows, cols]`, renumbering both index sets densely.
///
/// Indices not listed are dropped; the order of `rows`/`cols` defines the
/// order in the result.
pub(crate) fn select<T: Scalar>(mat: &CscMatrix<T>, rows: &[usize], cols: &[usize]) -> CscMatrix<T> {
    let mut row_map = vec![usize::MAX; mat.nrows()];
    for (new, &old) in rows.iter().enumerate() {
        row_map[old] = new;
    }
    let mut offsets = Vec::with_capacity(cols.len() + 1);
    let mut row_idx = Vec::new();
    let mut values = Vec::new();
    let mut entries: Vec<(usize, T)> = Vec::new();
    offsets.push(0);
    for &c in cols {
        let col = mat.col(c);
        entries.clear();
        entries.extend(
            col.row_indices()
                .iter()
                .zip(col.values())
                .filter(|(r, _)| row_map[**r] != usize::MAX)
                .map(|(r, v)| (row_map[*r], v.clone())),
        );
        entries.sort_unstable_by_key(|(r, _)| *r);
        for (r, v) in entries.drain(..) {
            row_idx.push(r);
            values.push(v);
        }
        offsets.push(row_idx.len());
    }
    CscMatrix::try_from_csc_data(rows.len(), cols.len(), offsets, row_idx, values)
        .expect("selected entries are sorted and unique per column")
}

/// `[A B ...]`: concatenates matrices with equal row counts column-wise.
pub(crate) fn csc_hstack<T: Scalar>(matrices: &[&CscMatrix<T>]) -> CscMatrix<T> {
    let nrows = matrices[0].nrows();
    let ncols = matrices.iter().map(|m| m.ncols()).sum();
    let nnz = matrices.iter().map(|m| m.nnz()).sum();
    let mut offsets = Vec::with_capacity(ncols + 1);
    let mut row_idx = Vec::with_capacity(nnz);
    let mut values = Vec::with_capacity(nnz);
    offsets.push(0);
    for m in matrices {
        assert_eq!(m.nrows(), nrows, "hstack needs equal row counts");
        for col in m.col_iter() {
            row_idx.extend_from_slice(col.row_indices());
            values.extend_from_slice(col.values());
            offsets.push(row_idx.len());
        }
    }
    CscMatrix::try_from_csc_data(nrows, ncols, offsets, row_idx, values)
        .expect("stacked blocks keep sorted row indices")
}

/// `[A; B; ...]`: stacks matrices with equal column counts row-wise.
pub(crate) fn csc_vstack<T: Scalar>(matrices: &[&CscMatrix<T>]) -> CscMatrix<T> {
    let ncols = matrices[0].ncols();
    let nrows = matrices.iter().map(|m| m.nrows()).sum();
    let nnz = matrices.iter().map(|m| m.nnz()).sum();
    let mut offsets = Vec::with_capacity(ncols + 1);
    let mut row_idx = Vec::with_capacity(nnz);
    let mut values = Vec::with_capacity(nnz);
    offsets.push(0);
    for c in 0..ncols {
        let mut shift = 0;
        for m in matrices {
            assert_eq!(m.ncols(), ncols, "vstack needs equal column counts");
            let col = m.col(c);
            row_idx.extend(col.row_indices().iter().map(|r| r + shift));
            values.extend_from_slice(col.values());
            shift += m.nrows();
        }
        offsets.push(row_idx.len());
    }
    CscMatrix::try_from_csc_data(nrows, ncols, offsets, row_idx, values)
        .expect("stacked blocks keep sorted row indices")
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;
    use nalgebra_sparse::CooMatrix;

    fn sample() -> CscMatrix<f64> {
        let dense = DMatrix::from_row_slice(3, 3, &[4.0, -1.0, 0.0, -1.0, 4.0, -2.0, 0.0, -2.0, 5.0]);
        CscMatrix::from(&dense)
    }

    #[test]
    fn select_reorders_and_drops() {
        let m = sample();
        let s = select(&m, &[2, 0], &[2, 1]);
        let expected = DMatrix::from_row_slice(2, 2, &[5.0, -2.0, 0.0, -1.0]);
        assert_eq!(DMatrix::from(&s), expected);
    }

    #[test]
    fn hstack_and_vstack_match_dense() {
        let m = sample();
        let h = csc_hstack(&[&m, &m]);
        let v = csc_vstack(&[&m, &m]);
        let d = DMatrix::from(&m);
        let mut dh = DMatrix::zeros(3, 6);
        dh.view_mut((0, 0), (3, 3)).copy_from(&d);
        dh.view_mut((0, 3), (3, 3)).copy_from(&d);
        let mut dv = DMatrix::zeros(6, 3);
        dv.view_mut((0, 0), (3, 3)).copy_from(&d);
        dv.view_mut((3, 0), (3, 3)).copy_from(&d);
        assert_eq!(DMatrix::from(&h), dh);
        assert_eq!(DMatrix::from(&v), dv);
    }

    #[test]
    fn conjugate_and_split() {
        let mut coo = CooMatrix::new(2, 2);
        coo.push(0, 0, Complex64::new(1.0, -2.0));
        coo.push(1, 0, Complex64::new(3.0, 0.5));
        let m = CscMatrix::from(&coo);
        let c = m.conjugate();
        assert_eq!(c.values()[0], Complex64::new(1.0, 2.0));
        assert_eq!(m.real().values(), &[1.0, 3.0]);
        assert_eq!(m.imag().values(), &[-2.0, 0.5]);
    }
}
