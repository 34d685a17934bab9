use ndarray::{Array1, Array2, ArrayView1, ArrayView2, s};

use super::{super::SolverCode, nnls::nnls};

/// Solution of a least distance programming problem.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Ldp {
    pub x: Array1<f64>,
    pub multipliers: Array1<f64>,
    pub norm: f64,
}

/// Solves `min ||x||` subject to `G x >= h`.
///
/// The dual is a non-negative least squares problem in `m` variables with
/// matrix `[Gᵀ; hᵀ]` and right-hand side `e_{n+1}`. A dual residual of zero
/// means the constraints are incompatible.
///
/// `index` must have room for `min(n + 1, m)` entries.
pub(super) fn ldp(
    g: ArrayView2<'_, f64>,
    h: ArrayView1<'_, f64>,
    index: &mut [usize],
) -> Result<Ldp, SolverCode> {
    let (m, n) = g.dim();
    if m == 0 {
        return Ok(Ldp {
            x: Array1::zeros(n),
            multipliers: Array1::zeros(0),
            norm: 0.0,
        });
    }

    let mut e = Array2::zeros((n + 1, m));
    e.slice_mut(s![..n, ..]).assign(&g.t());
    e.row_mut(n).assign(&h);
    let mut f = Array1::zeros(n + 1);
    f[n] = 1.0;

    let dual = nnls(e.view(), f.view(), index)?;

    // At the dual optimum fac = 1 / (1 + ||x||²), so a vanishing fac is an
    // unbounded primal step.
    let fac = 1.0 - h.dot(&dual.x);
    if dual.residual <= 0.0 || !fac.is_finite() || fac <= 1e3 * f64::EPSILON {
        return Err(SolverCode::IncompatibleConstraints);
    }

    let x = g.t().dot(&dual.x) / fac;
    let norm = x.dot(&x).sqrt();
    Ok(Ldp {
        x,
        multipliers: dual.x / fac,
        norm,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::array;

    use super::*;

    #[test]
    fn projects_the_origin_onto_a_half_space() {
        // x0 + x1 >= 2 is closest to the origin at (1, 1).
        let g = array![[1.0, 1.0]];
        let h = array![2.0];
        let mut index = [0; 1];

        let sol = ldp(g.view(), h.view(), &mut index).unwrap();
        assert_relative_eq!(sol.x, array![1.0, 1.0], epsilon = 1e-12);
        assert_relative_eq!(sol.multipliers, array![1.0], epsilon = 1e-12);
    }

    #[test]
    fn inactive_constraints_leave_the_origin() {
        let g = array![[1.0, 0.0], [0.0, 1.0]];
        let h = array![-1.0, -3.0];
        let mut index = [0; 2];

        let sol = ldp(g.view(), h.view(), &mut index).unwrap();
        assert_relative_eq!(sol.x, array![0.0, 0.0]);
        assert_relative_eq!(sol.norm, 0.0);
    }

    #[test]
    fn detects_incompatible_constraints() {
        // x >= 1 and -x >= 0 cannot both hold.
        let g = array![[1.0], [-1.0]];
        let h = array![1.0, 0.0];
        let mut index = [0; 2];

        assert_eq!(
            ldp(g.view(), h.view(), &mut index),
            Err(SolverCode::IncompatibleConstraints)
        );
    }
}
