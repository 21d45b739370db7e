//! Dense linear algebra for kriging systems
//!
//! Systems are small (tens of unknowns) and, in global mode, one inverse is
//! reused for every query, so the inverse is computed explicitly by
//! Gauss–Jordan elimination with full pivoting.

use geokrig_core::{Error, Result};
use ndarray::{s, Array1, Array2, ArrayView2};
use std::ops::Range;

/// Pivots below this fraction of the largest matrix entry count as zero.
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Invert a square matrix.
///
/// Returns [`Error::SingularMatrix`] when a pivot falls below
/// `1e-12 ×` the largest absolute entry, or when the matrix holds
/// non-finite values.
pub fn invert(matrix: &Array2<f64>) -> Result<Array2<f64>> {
    let n = matrix.nrows();
    if n == 0 || matrix.ncols() != n {
        return Err(Error::InvalidDimensions {
            width: matrix.ncols(),
            height: n,
        });
    }

    let scale = matrix.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if !(scale > 0.0 && scale.is_finite()) || matrix.iter().any(|v| !v.is_finite()) {
        return Err(Error::SingularMatrix);
    }
    let tiny = scale * PIVOT_TOLERANCE;

    let mut a = matrix.clone();
    let mut used = vec![false; n];
    let mut pivots = Vec::with_capacity(n);

    for _ in 0..n {
        let mut big = 0.0;
        let (mut prow, mut pcol) = (0, 0);
        for j in (0..n).filter(|&j| !used[j]) {
            for k in (0..n).filter(|&k| !used[k]) {
                let v = a[[j, k]].abs();
                if v > big {
                    big = v;
                    prow = j;
                    pcol = k;
                }
            }
        }
        if big <= tiny {
            return Err(Error::SingularMatrix);
        }
        used[pcol] = true;

        if prow != pcol {
            for l in 0..n {
                a.swap([prow, l], [pcol, l]);
            }
        }
        pivots.push((prow, pcol));

        let inv = 1.0 / a[[pcol, pcol]];
        a[[pcol, pcol]] = 1.0;
        a.row_mut(pcol).mapv_inplace(|v| v * inv);

        for r in (0..n).filter(|&r| r != pcol) {
            let factor = a[[r, pcol]];
            if factor == 0.0 {
                continue;
            }
            a[[r, pcol]] = 0.0;
            for l in 0..n {
                let t = a[[pcol, l]] * factor;
                a[[r, l]] -= t;
            }
        }
    }

    // Undo the column interchanges in reverse order
    for &(prow, pcol) in pivots.iter().rev() {
        if prow != pcol {
            for k in 0..n {
                a.swap([k, prow], [k, pcol]);
            }
        }
    }

    Ok(a)
}

/// Solve `A x = b` via [`invert`].
pub fn solve(matrix: &Array2<f64>, rhs: &Array1<f64>) -> Result<Array1<f64>> {
    if rhs.len() != matrix.nrows() {
        return Err(Error::InvalidDimensions {
            width: rhs.len(),
            height: matrix.nrows(),
        });
    }
    Ok(invert(matrix)?.dot(rhs))
}

/// Write `block` at `rows × cols` and its transpose at `cols × rows`.
pub fn set_block_symmetric(
    matrix: &mut Array2<f64>,
    rows: Range<usize>,
    cols: Range<usize>,
    block: ArrayView2<'_, f64>,
) {
    matrix
        .slice_mut(s![rows.clone(), cols.clone()])
        .assign(&block);
    matrix.slice_mut(s![cols, rows]).assign(&block.t());
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn assert_identity(m: &Array2<f64>) {
        for ((i, j), v) in m.indexed_iter() {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert_abs_diff_eq!(*v, expected, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_invert_general() {
        let a = array![[4.0, 7.0, 2.0], [3.0, 6.0, 1.0], [2.0, 5.0, 3.0]];
        let inv = invert(&a).unwrap();
        assert_identity(&a.dot(&inv));
        assert_identity(&inv.dot(&a));
    }

    #[test]
    fn test_invert_zero_diagonal() {
        // Ordinary kriging shape: zero diagonal, edge row of ones
        let a = array![
            [0.0, 1.0, 2.0, 1.0],
            [1.0, 0.0, 1.5, 1.0],
            [2.0, 1.5, 0.0, 1.0],
            [1.0, 1.0, 1.0, 0.0]
        ];
        let inv = invert(&a).unwrap();
        assert_identity(&a.dot(&inv));
    }

    #[test]
    fn test_singular() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(matches!(invert(&a), Err(Error::SingularMatrix)));

        let z = Array2::<f64>::zeros((3, 3));
        assert!(matches!(invert(&z), Err(Error::SingularMatrix)));

        let nan = array![[1.0, f64::NAN], [0.0, 1.0]];
        assert!(matches!(invert(&nan), Err(Error::SingularMatrix)));
    }

    #[test]
    fn test_not_square() {
        let a = Array2::<f64>::zeros((2, 3));
        assert!(matches!(invert(&a), Err(Error::InvalidDimensions { .. })));
    }

    #[test]
    fn test_solve() {
        let a = array![[2.0, 1.0], [1.0, 3.0]];
        let b = array![3.0, 5.0];
        let x = solve(&a, &b).unwrap();
        assert_abs_diff_eq!(x[0], 0.8, epsilon = 1e-12);
        assert_abs_diff_eq!(x[1], 1.4, epsilon = 1e-12);
    }

    #[test]
    fn test_set_block_symmetric() {
        let mut m = Array2::<f64>::zeros((4, 4));
        let block = array![[1.0, 2.0], [3.0, 4.0]];
        set_block_symmetric(&mut m, 0..2, 2..4, block.view());
        assert_eq!(m[[0, 2]], 1.0);
        assert_eq!(m[[1, 3]], 4.0);
        assert_eq!(m[[2, 0]], 1.0);
        assert_eq!(m[[3, 0]], 2.0);
        assert_eq!(m[[2, 1]], 3.0);
        assert_eq!(m, m.t());
    }
}
