use ndarray::{Array1, Array2, ArrayView1, ArrayView2, s};

use super::{
    super::SolverCode,
    householder::{Qr, solve_upper, solve_upper_transposed},
    ldp::ldp,
};

/// Solution of an inequality constrained least squares problem.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Lsi {
    pub x: Array1<f64>,
    pub multipliers: Array1<f64>,
    pub norm: f64,
}

/// Solves `min ||E x - f||` subject to `G x >= h`.
///
/// `E` must have full column rank. With `E = Q R` the substitution
/// `y = R x - f1` turns the problem into a least distance program in `y`.
pub(super) fn lsi(
    e: ArrayView2<'_, f64>,
    f: ArrayView1<'_, f64>,
    g: ArrayView2<'_, f64>,
    h: ArrayView1<'_, f64>,
    index: &mut [usize],
) -> Result<Lsi, SolverCode> {
    let (me, n) = e.dim();
    if me < n {
        return Err(SolverCode::SingularE);
    }

    let qr = Qr::new(e.to_owned());
    if qr.min_diagonal(n) < f64::EPSILON {
        return Err(SolverCode::SingularE);
    }
    let r = qr.r();

    let mut ft = f.to_owned();
    qr.apply_qt(ft.view_mut());
    let f1 = ft.slice(s![..n]);
    let f2 = ft.slice(s![n..]);

    let mut gt = Array2::zeros(g.dim());
    for (i, row) in g.rows().into_iter().enumerate() {
        gt.row_mut(i).assign(&solve_upper_transposed(r, row));
    }
    let ht = &h - &gt.dot(&f1);

    let dist = ldp(gt.view(), ht.view(), index)?;
    let x = solve_upper(r, (&dist.x + &f1).view());
    let norm = (dist.norm * dist.norm + f2.dot(&f2)).sqrt();

    Ok(Lsi {
        x,
        multipliers: dist.multipliers,
        norm,
    })
}
