// matrix.rs — Exact integer matrix arithmetic for reverse-map derivation
//
// The space-time transform needs the inverse of the stacked
// projection + schedule matrix to reconstruct source iteration variables
// from destination coordinates. Coefficients are small integers, so the
// inverse is computed exactly via cofactor expansion; a non-integral
// inverse is reported as absent.
//
// Preconditions: square matrices only.
// Postconditions: `inverse(m).map(|i| multiply(m, i))` is the identity.
// Failure modes: returns `None` for singular or non-integrally invertible
//   matrices.
// Side effects: none.

/// Determinant by cofactor expansion along the first row. Transform
/// matrices are tiny (one row per loop variable), so the factorial cost is
/// irrelevant.
pub fn determinant(m: &[Vec<i64>]) -> i64 {
    let n = m.len();
    match n {
        0 => 1,
        1 => m[0][0],
        2 => m[0][0] * m[1][1] - m[0][1] * m[1][0],
        _ => {
            let mut det = 0;
            for col in 0..n {
                let sub = minor(m, 0, col);
                let sign = if col % 2 == 0 { 1 } else { -1 };
                det += sign * m[0][col] * determinant(&sub);
            }
            det
        }
    }
}

fn minor(m: &[Vec<i64>], row: usize, col: usize) -> Vec<Vec<i64>> {
    m.iter()
        .enumerate()
        .filter(|(r, _)| *r != row)
        .map(|(_, r)| {
            r.iter()
                .enumerate()
                .filter(|(c, _)| *c != col)
                .map(|(_, v)| *v)
                .collect()
        })
        .collect()
}

/// Exact inverse of a square integer matrix, or `None` when the matrix is
/// singular or its inverse has fractional entries.
pub fn inverse(m: &[Vec<i64>]) -> Option<Vec<Vec<i64>>> {
    let n = m.len();
    debug_assert!(m.iter().all(|r| r.len() == n));
    let det = determinant(m);
    if det == 0 {
        return None;
    }
    if n == 0 {
        return Some(Vec::new());
    }
    let mut inv = vec![vec![0i64; n]; n];
    for r in 0..n {
        for c in 0..n {
            // Adjugate: cofactor of (c, r) lands at (r, c).
            let sign = if (r + c) % 2 == 0 { 1 } else { -1 };
            let cof = sign * determinant(&minor(m, c, r));
            if cof % det != 0 {
                return None;
            }
            inv[r][c] = cof / det;
        }
    }
    Some(inv)
}

/// Matrix product (used by tests and descriptor validation).
pub fn multiply(a: &[Vec<i64>], b: &[Vec<i64>]) -> Vec<Vec<i64>> {
    let n = a.len();
    let m = if n == 0 { 0 } else { b[0].len() };
    let k = b.len();
    let mut out = vec![vec![0i64; m]; n];
    for i in 0..n {
        for j in 0..m {
            for l in 0..k {
                out[i][j] += a[i][l] * b[l][j];
            }
        }
    }
    out
}

/// The n-by-n identity.
pub fn identity(n: usize) -> Vec<Vec<i64>> {
    (0..n)
        .map(|r| (0..n).map(|c| i64::from(r == c)).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinant_2x2() {
        assert_eq!(determinant(&[vec![1, 2], vec![3, 4]]), -2);
    }

    #[test]
    fn inverse_of_identity() {
        let id = identity(3);
        assert_eq!(inverse(&id), Some(identity(3)));
    }

    #[test]
    fn inverse_of_unimodular() {
        // Systolic schedule for 1-D convolution: space row [1, 0], time
        // row [1, 1].
        let m = vec![vec![1, 0], vec![1, 1]];
        let inv = inverse(&m).unwrap();
        assert_eq!(multiply(&m, &inv), identity(2));
        assert_eq!(multiply(&inv, &m), identity(2));
    }

    #[test]
    fn singular_has_no_inverse() {
        assert_eq!(inverse(&[vec![1, 2], vec![2, 4]]), None);
    }

    #[test]
    fn non_integral_inverse_rejected() {
        // det = 2, inverse would have halves.
        assert_eq!(inverse(&[vec![2, 0], vec![0, 1]]), None);
    }

    #[test]
    fn inverse_3x3_permuted() {
        let m = vec![vec![0, 1, 0], vec![0, 0, 1], vec![1, 0, 0]];
        let inv = inverse(&m).unwrap();
        assert_eq!(multiply(&m, &inv), identity(3));
    }
}
