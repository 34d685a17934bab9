use ndarray::{Array1, ArrayView1, ArrayView2, s};

use super::{
    super::SolverCode,
    householder::{Reflector, solve_upper},
};

/// Solves the full-rank least squares problem `min ||A x - b||` with
/// column-pivoted Householder QR.
///
/// Pivots are recorded in `pivots`. A pivot of magnitude at most `tau`
/// marks the problem as rank deficient.
pub(super) fn hfti(
    a: ArrayView2<'_, f64>,
    b: ArrayView1<'_, f64>,
    tau: f64,
    pivots: &mut [usize],
) -> Result<Array1<f64>, SolverCode> {
    let (m, n) = a.dim();
    if n == 0 {
        return Ok(Array1::zeros(0));
    }
    if m < n || pivots.len() < n {
        return Err(SolverCode::RankDeficient);
    }

    let mut r = a.to_owned();
    let mut rhs = b.to_owned();
    for (k, pivot) in pivots[..n].iter_mut().enumerate() {
        *pivot = k;
    }

    for k in 0..n {
        let remaining = |j: usize| r.slice(s![k.., j]).iter().map(|v| v * v).sum::<f64>();
        let best = (k..n)
            .max_by(|&i, &j| remaining(i).total_cmp(&remaining(j)))
            .unwrap_or(k);
        if best != k {
            for i in 0..m {
                r.swap([i, k], [i, best]);
            }
            pivots.swap(k, best);
        }

        let (reflector, alpha) = Reflector::new(r.slice(s![k.., k]), k);
        for j in k + 1..n {
            reflector.apply(r.column_mut(j));
        }
        reflector.apply(rhs.view_mut());
        r[[k, k]] = alpha;
        r.slice_mut(s![k + 1.., k]).fill(0.0);

        if alpha.abs() <= tau {
            return Err(SolverCode::RankDeficient);
        }
    }

    let z = solve_upper(r.view(), rhs.slice(s![..n]));
    let mut x = Array1::zeros(n);
    for (k, &pivot) in pivots[..n].iter().enumerate() {
        x[pivot] = z[k];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::array;

    use super::*;

    #[test]
    fn solves_overdetermined_systems() {
        // Fit y = c0 + c1 t through (0, 1), (1, 3), (2, 5).
        let a = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0]];
        let b = array![1.0, 3.0, 5.0];
        let mut pivots = [0; 2];

        let x = hfti(a.view(), b.view(), 1e-8, &mut pivots).unwrap();
        assert_relative_eq!(x, array![1.0, 2.0], epsilon = 1e-12);
    }

    #[test]
    fn rejects_dependent_columns() {
        let a = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0]];
        let b = array![1.0, 2.0, 3.0];
        let mut pivots = [0; 2];

        assert_eq!(
            hfti(a.view(), b.view(), 1e-8, &mut pivots),
            Err(SolverCode::RankDeficient)
        );
    }
}
