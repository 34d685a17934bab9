use ndarray::{Array1, ArrayView1, ArrayView2, Axis, concatenate, s};

use super::{
    super::SolverCode,
    hfti::hfti,
    householder::{Qr, solve_upper, solve_upper_transposed},
    lsi::lsi,
};

/// Solution of an equality and inequality constrained least squares problem.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Lsei {
    pub x: Array1<f64>,
    pub equality: Array1<f64>,
    pub inequality: Array1<f64>,
    pub norm: f64,
}

/// Solves `min ||E x - f||` subject to `C x = d` and `G x >= h`.
///
/// The equalities are eliminated with a QR factorization of `Cᵀ`; the
/// remaining free directions are solved by [`lsi`], or by [`hfti`] when
/// there are no inequalities.
pub(super) fn lsei(
    c: ArrayView2<'_, f64>,
    d: ArrayView1<'_, f64>,
    e: ArrayView2<'_, f64>,
    f: ArrayView1<'_, f64>,
    g: ArrayView2<'_, f64>,
    h: ArrayView1<'_, f64>,
    index: &mut [usize],
) -> Result<Lsei, SolverCode> {
    let n = e.ncols();
    let mc = c.nrows();
    let mg = g.nrows();
    if mc > n {
        return Err(SolverCode::TooManyEqualities);
    }

    let qr = Qr::new(c.t().to_owned());
    if qr.min_diagonal(mc) < f64::EPSILON {
        return Err(SolverCode::SingularC);
    }
    let rc = qr.r();

    // With x = Q y the equalities fix the leading mc entries of y.
    let y1 = solve_upper_transposed(rc, d);
    let eq = qr.right_multiply(e);
    let gq = qr.right_multiply(g);

    let f2 = &f - &eq.slice(s![.., ..mc]).dot(&y1);
    let e2 = eq.slice(s![.., mc..]);

    let (y2, inequality) = if mc == n {
        (Array1::zeros(0), Array1::zeros(mg))
    } else if mg == 0 {
        let y2 = hfti(e2, f2.view(), f64::EPSILON.sqrt(), index)?;
        (y2, Array1::zeros(0))
    } else {
        let h2 = &h - &gq.slice(s![.., ..mc]).dot(&y1);
        let sol = lsi(e2, f2.view(), gq.slice(s![.., mc..]), h2.view(), index)?;
        (sol.x, sol.multipliers)
    };

    let mut x = concatenate(Axis(0), &[y1.view(), y2.view()])
        .map_err(|_| SolverCode::SingularC)?;
    qr.apply_q(x.view_mut());

    // Equality multipliers from Cᵀ λ = Eᵀ (E x - f) - Gᵀ μ.
    let residual = e.dot(&x) - f;
    let mut b = e.t().dot(&residual) - g.t().dot(&inequality);
    qr.apply_qt(b.view_mut());
    let equality = solve_upper(rc, b.slice(s![..mc]));

    Ok(Lsei {
        x,
        equality,
        inequality,
        norm: residual.dot(&residual).sqrt(),
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::{Array2, array};

    use super::*;

    #[test]
    fn equality_constrained_projection() {
        // min ||x - (1, 2)|| with x0 + x1 = 1.
        let c = array![[1.0, 1.0]];
        let d = array![1.0];
        let e = array![[1.0, 0.0], [0.0, 1.0]];
        let f = array![1.0, 2.0];
        let g = Array2::zeros((0, 2));
        let h = Array1::zeros(0);
        let mut index = [0; 2];

        let sol = lsei(c.view(), d.view(), e.view(), f.view(), g.view(), h.view(), &mut index)
            .unwrap();
        assert_relative_eq!(sol.x, array![0.0, 1.0], epsilon = 1e-12);
        // Eᵀ(Ex - f) = (-1, -1) = Cᵀ λ
        assert_relative_eq!(sol.equality, array![-1.0], epsilon = 1e-12);
    }

    #[test]
    fn mixes_equalities_and_inequalities() {
        // min ||x - (2, 0, 0)|| with x0 = x1 and x2 >= 1.
        let c = array![[1.0, -1.0, 0.0]];
        let d = array![0.0];
        let e = Array2::eye(3);
        let f = array![2.0, 0.0, 0.0];
        let g = array![[0.0, 0.0, 1.0]];
        let h = array![1.0];
        let mut index = [0; 3];

        let sol = lsei(c.view(), d.view(), e.view(), f.view(), g.view(), h.view(), &mut index)
            .unwrap();
        assert_relative_eq!(sol.x, array![1.0, 1.0, 1.0], epsilon = 1e-12);
        assert_relative_eq!(sol.inequality, array![1.0], epsilon = 1e-12);
    }

    #[test]
    fn reports_structural_failures() {
        let e = Array2::eye(1);
        let f = array![0.0];
        let g = Array2::zeros((0, 1));
        let h = Array1::zeros(0);
        let mut index = [0; 2];

        let c = array![[1.0], [2.0]];
        let d = array![1.0, 2.0];
        assert_eq!(
            lsei(c.view(), d.view(), e.view(), f.view(), g.view(), h.view(), &mut index),
            Err(SolverCode::TooManyEqualities)
        );

        let c = array![[0.0]];
        let d = array![1.0];
        assert_eq!(
            lsei(c.view(), d.view(), e.view(), f.view(), g.view(), h.view(), &mut index),
            Err(SolverCode::SingularC)
        );
    }
}
