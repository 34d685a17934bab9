use ndarray::{Array1, Array2, ArrayView1, ArrayView2, s};

use super::{
    super::SolverCode,
    householder::{Qr, solve_upper},
};

/// Solution of a non-negative least squares problem.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Nnls {
    pub x: Array1<f64>,
    pub residual: f64,
}

/// Solves `min ||E x - f||` subject to `x >= 0` by the active set method of
/// Lawson and Hanson.
///
/// `passive` holds the indices of the free variables; it must have room for
/// `min(m, n)` entries. The inner loop is capped at `3 * n` iterations.
pub(super) fn nnls(
    e: ArrayView2<'_, f64>,
    f: ArrayView1<'_, f64>,
    passive: &mut [usize],
) -> Result<Nnls, SolverCode> {
    let (m, n) = e.dim();
    let mut x = Array1::<f64>::zeros(n);
    let mut is_passive = vec![false; n];
    let mut rejected = vec![false; n];
    let mut size = 0;
    let mut iterations = 0;

    let scale = e.iter().map(|v| v * v).sum::<f64>().sqrt() * f.dot(&f).sqrt();
    let tol = 100.0 * f64::EPSILON * scale;

    loop {
        let residual = &f - &e.dot(&x);
        let w = e.t().dot(&residual);
        let candidate = (0..n)
            .filter(|&j| !is_passive[j] && !rejected[j] && w[j] > tol)
            .max_by(|&a, &b| w[a].total_cmp(&w[b]));
        let Some(t) = candidate else {
            break;
        };

        if size == m.min(passive.len()) {
            rejected[t] = true;
            continue;
        }
        passive[size] = t;
        size += 1;

        // A column dependent on the passive set, or one whose unconstrained
        // coefficient is not positive, cannot enter.
        let mut z = match solve_passive(e, f, &passive[..size]) {
            Some(z) if z[size - 1] > 0.0 => z,
            _ => {
                size -= 1;
                rejected[t] = true;
                continue;
            }
        };
        is_passive[t] = true;

        loop {
            if z.iter().all(|&v| v > 0.0) {
                for (k, &j) in passive[..size].iter().enumerate() {
                    x[j] = z[k];
                }
                break;
            }

            iterations += 1;
            if iterations > 3 * n {
                return Err(SolverCode::SubproblemIterations);
            }

            // Step from x toward z until the first passive variable hits zero.
            let (blocking, alpha) = (0..size)
                .filter(|&k| z[k] <= 0.0)
                .map(|k| {
                    let j = passive[k];
                    (k, x[j] / (x[j] - z[k]))
                })
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .unwrap_or((0, 0.0));
            for (k, &j) in passive[..size].iter().enumerate() {
                x[j] += alpha * (z[k] - x[j]);
            }
            x[passive[blocking]] = 0.0;

            let mut kept = 0;
            for k in 0..size {
                let j = passive[k];
                if x[j] > 0.0 {
                    passive[kept] = j;
                    kept += 1;
                } else {
                    x[j] = 0.0;
                    is_passive[j] = false;
                }
            }
            size = kept;

            z = match solve_passive(e, f, &passive[..size]) {
                Some(z) => z,
                None => return Err(SolverCode::SubproblemIterations),
            };
        }

        rejected.fill(false);
    }

    let residual = &f - &e.dot(&x);
    Ok(Nnls {
        x,
        residual: residual.dot(&residual).sqrt(),
    })
}

/// Least squares coefficients of `f` on the columns `passive` of `e`, or
/// `None` if those columns are numerically dependent.
fn solve_passive(
    e: ArrayView2<'_, f64>,
    f: ArrayView1<'_, f64>,
    passive: &[usize],
) -> Option<Array1<f64>> {
    let (m, _) = e.dim();
    let k = passive.len();
    if k > m {
        return None;
    }
    if k == 0 {
        return Some(Array1::zeros(0));
    }

    let mut columns = Array2::zeros((m, k));
    for (c, &j) in passive.iter().enumerate() {
        columns.column_mut(c).assign(&e.column(j));
    }
    let norms: Vec<f64> = columns
        .columns()
        .into_iter()
        .map(|c| c.dot(&c).sqrt())
        .collect();

    let qr = Qr::new(columns);
    for (i, norm) in norms.iter().enumerate() {
        if qr.r()[[i, i]].abs() <= 1e-12 * norm.max(f64::MIN_POSITIVE) {
            return None;
        }
    }

    let mut rhs = f.to_owned();
    qr.apply_qt(rhs.view_mut());
    Some(solve_upper(qr.r(), rhs.slice(s![..k])))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::array;

    use super::*;

    #[test]
    fn interior_solution_matches_least_squares() {
        let e = array![[1.0, 0.0], [0.0, 2.0], [1.0, 1.0]];
        let f = array![1.0, 2.0, 2.0];
        let mut passive = [0; 2];

        let sol = nnls(e.view(), f.view(), &mut passive).unwrap();
        assert_relative_eq!(sol.x, array![1.0, 1.0], epsilon = 1e-12);
        assert_relative_eq!(sol.residual, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn clamps_negative_coefficients_to_zero() {
        // Unconstrained least squares would give x = (2, -1).
        let e = array![[1.0, 0.0], [0.0, 1.0]];
        let f = array![2.0, -1.0];
        let mut passive = [0; 2];

        let sol = nnls(e.view(), f.view(), &mut passive).unwrap();
        assert_relative_eq!(sol.x, array![2.0, 0.0], epsilon = 1e-12);
        assert_relative_eq!(sol.residual, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn removes_variables_that_turn_negative() {
        // Entering the second column drives the first coefficient negative.
        let e = array![[1.0, 1.0], [1.0, 0.5]];
        let f = array![2.0, 0.5];
        let mut passive = [0; 2];

        let sol = nnls(e.view(), f.view(), &mut passive).unwrap();
        assert_relative_eq!(sol.x, array![0.0, 1.8], epsilon = 1e-12);
    }
}
