//! Packed `L D Lᵀ` storage of the quasi-Newton Hessian approximation.
//!
//! The unit lower triangular `L` and the diagonal `D` share one column-major
//! array: column `j` starts with `D[j]` and continues with `L[j+1.., j]`.

/// Position of entry `(row, col)`, `row >= col`, in packed storage.
pub(super) fn packed(n: usize, row: usize, col: usize) -> usize {
    debug_assert!(row >= col && row < n);
    col * (2 * n - col + 1) / 2 + (row - col)
}

/// Resets the factors to the identity.
pub(super) fn reset(n: usize, l: &mut [f64]) {
    l.fill(0.0);
    for i in 0..n {
        l[packed(n, i, i)] = 1.0;
    }
}

/// Returns the diagonal entry `D[i]`.
pub(super) fn diagonal(n: usize, l: &[f64], i: usize) -> f64 {
    l[packed(n, i, i)]
}

/// Writes `B s = L D Lᵀ s` into `out`.
pub(super) fn multiply(n: usize, l: &[f64], s: &[f64], out: &mut [f64]) {
    for i in 0..n {
        let below: f64 = (i + 1..n).map(|j| l[packed(n, j, i)] * s[j]).sum();
        out[i] = (s[i] + below) * diagonal(n, l, i);
    }
    for i in (0..n).rev() {
        let above: f64 = (0..i).map(|j| l[packed(n, i, j)] * out[j]).sum();
        out[i] += above;
    }
}

/// Applies the rank-one update `L D Lᵀ + sigma z zᵀ` in place.
///
/// Uses the composite update of Fletcher and Powell, which keeps `D`
/// positive whenever the updated matrix is positive definite. `z` is
/// overwritten; `w` is scratch space used only when `sigma < 0`.
pub(super) fn update(n: usize, l: &mut [f64], z: &mut [f64], sigma: f64, w: &mut [f64]) {
    if sigma == 0.0 {
        return;
    }
    let mut t = 1.0 / sigma;

    if sigma < 0.0 {
        // Solve L w = z and pick t so the downdate stays positive definite.
        w[..n].copy_from_slice(&z[..n]);
        for i in 0..n {
            let v = w[i];
            t += v * v / diagonal(n, l, i);
            for j in i + 1..n {
                w[j] -= v * l[packed(n, j, i)];
            }
        }
        if t >= 0.0 {
            t = f64::EPSILON / sigma;
        }
        for i in (0..n).rev() {
            let u = w[i];
            w[i] = t;
            t -= u * u / diagonal(n, l, i);
        }
    }

    for i in 0..n {
        let v = z[i];
        let delta = v / diagonal(n, l, i);
        let tp = if sigma < 0.0 { w[i] } else { t + delta * v };
        let alpha = tp / t;
        l[packed(n, i, i)] *= alpha;
        if i + 1 == n {
            break;
        }
        let beta = delta / tp;
        if alpha > 4.0 {
            let gamma = t / tp;
            for j in i + 1..n {
                let u = l[packed(n, j, i)];
                l[packed(n, j, i)] = gamma * u + beta * z[j];
                z[j] -= v * u;
            }
        } else {
            for j in i + 1..n {
                z[j] -= v * l[packed(n, j, i)];
                l[packed(n, j, i)] += beta * z[j];
            }
        }
        t = tp;
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    /// Dense `L D Lᵀ` from packed storage.
    fn dense(n: usize, l: &[f64]) -> Vec<Vec<f64>> {
        let entry = |i: usize, j: usize| -> f64 {
            match i.cmp(&j) {
                std::cmp::Ordering::Equal => 1.0,
                std::cmp::Ordering::Greater => l[packed(n, i, j)],
                std::cmp::Ordering::Less => 0.0,
            }
        };
        (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| (0..n).map(|k| entry(i, k) * diagonal(n, l, k) * entry(j, k)).sum())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn packed_indices_are_column_major() {
        assert_eq!(packed(3, 0, 0), 0);
        assert_eq!(packed(3, 2, 0), 2);
        assert_eq!(packed(3, 1, 1), 3);
        assert_eq!(packed(3, 2, 2), 5);
    }

    #[test]
    fn rank_one_update_and_downdate() {
        let n = 3;
        let mut l = vec![0.0; n * (n + 1) / 2];
        let mut w = vec![0.0; n];
        reset(n, &mut l);

        let z = [1.0, 2.0, -1.0];
        update(n, &mut l, &mut z.clone(), 0.5, &mut w);
        let b = dense(n, &l);
        for i in 0..n {
            for j in 0..n {
                let expected = f64::from(u8::from(i == j)) + 0.5 * z[i] * z[j];
                assert_relative_eq!(b[i][j], expected, epsilon = 1e-12);
            }
        }

        update(n, &mut l, &mut z.clone(), -0.5, &mut w);
        let b = dense(n, &l);
        for i in 0..n {
            for j in 0..n {
                assert_relative_eq!(b[i][j], f64::from(u8::from(i == j)), epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn multiply_matches_dense_product() {
        let n = 2;
        let mut l = vec![0.0; 3];
        let mut w = vec![0.0; n];
        reset(n, &mut l);
        update(n, &mut l, &mut [1.0, 1.0], 1.0, &mut w);

        // B = [[2, 1], [1, 2]]
        let mut out = [0.0; 2];
        multiply(n, &l, &[1.0, -2.0], &mut out);
        assert_relative_eq!(out[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(out[1], -3.0, epsilon = 1e-12);
    }
}
