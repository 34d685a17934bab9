//! Householder reflections, QR factorization, and triangular solves.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, s};

/// The reflection `H = I - beta v vᵀ`, acting on entries `offset..`.
#[derive(Debug, Clone)]
pub(super) struct Reflector {
    offset: usize,
    v: Array1<f64>,
    beta: f64,
}

impl Reflector {
    /// Builds the reflector mapping `x` onto a multiple of the first unit
    /// vector, and returns it with that multiple.
    ///
    /// When `x` is already aligned the reflector is the identity.
    pub(super) fn new(x: ArrayView1<'_, f64>, offset: usize) -> (Self, f64) {
        let head = x[0];
        let tail: f64 = x.slice(s![1..]).iter().map(|v| v * v).sum();
        if tail == 0.0 {
            let identity = Self {
                offset,
                v: Array1::zeros(x.len()),
                beta: 0.0,
            };
            return (identity, head);
        }

        let norm = (head * head + tail).sqrt();
        let alpha = if head > 0.0 { -norm } else { norm };
        let mut v = x.to_owned();
        v[0] = head - alpha;
        let beta = 1.0 / (alpha * (alpha - head));
        (Self { offset, v, beta }, alpha)
    }

    pub(super) fn apply(&self, mut y: ArrayViewMut1<'_, f64>) {
        if self.beta == 0.0 {
            return;
        }
        let end = self.offset + self.v.len();
        let mut tail = y.slice_mut(s![self.offset..end]);
        let scale = self.beta * self.v.dot(&tail);
        tail.scaled_add(-scale, &self.v);
    }
}

/// A Householder QR factorization `A = Q R`.
#[derive(Debug, Clone)]
pub(super) struct Qr {
    r: Array2<f64>,
    reflectors: Vec<Reflector>,
}

impl Qr {
    pub(super) fn new(a: Array2<f64>) -> Self {
        let (m, n) = a.dim();
        let mut r = a;
        let mut reflectors = Vec::with_capacity(m.min(n));
        for k in 0..m.min(n) {
            let (reflector, alpha) = Reflector::new(r.slice(s![k.., k]), k);
            for j in k + 1..n {
                reflector.apply(r.column_mut(j));
            }
            r[[k, k]] = alpha;
            r.slice_mut(s![k + 1.., k]).fill(0.0);
            reflectors.push(reflector);
        }
        Self { r, reflectors }
    }

    /// The upper trapezoidal factor.
    pub(super) fn r(&self) -> ArrayView2<'_, f64> {
        self.r.view()
    }

    /// Returns the smallest diagonal magnitude among the first `k` entries.
    pub(super) fn min_diagonal(&self, k: usize) -> f64 {
        (0..k).map(|i| self.r[[i, i]].abs()).fold(f64::INFINITY, f64::min)
    }

    /// Overwrites `y` with `Qᵀ y`.
    pub(super) fn apply_qt(&self, mut y: ArrayViewMut1<'_, f64>) {
        for reflector in &self.reflectors {
            reflector.apply(y.view_mut());
        }
    }

    /// Overwrites `y` with `Q y`.
    pub(super) fn apply_q(&self, mut y: ArrayViewMut1<'_, f64>) {
        for reflector in self.reflectors.iter().rev() {
            reflector.apply(y.view_mut());
        }
    }

    /// Returns `A Q`, row by row, for a matrix `A` with as many columns as
    /// `Q` has rows.
    pub(super) fn right_multiply(&self, a: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut out = a.to_owned();
        for row in out.rows_mut() {
            self.apply_qt(row);
        }
        out
    }
}

/// Solves `R x = b` for the leading `b.len()` square block of `r`.
pub(super) fn solve_upper(r: ArrayView2<'_, f64>, b: ArrayView1<'_, f64>) -> Array1<f64> {
    let n = b.len();
    let mut x = b.to_owned();
    for i in (0..n).rev() {
        let sum: f64 = (i + 1..n).map(|j| r[[i, j]] * x[j]).sum();
        x[i] = (x[i] - sum) / r[[i, i]];
    }
    x
}

/// Solves `Rᵀ x = b` for the leading `b.len()` square block of `r`.
pub(super) fn solve_upper_transposed(r: ArrayView2<'_, f64>, b: ArrayView1<'_, f64>) -> Array1<f64> {
    let n = b.len();
    let mut x = b.to_owned();
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| r[[j, i]] * x[j]).sum();
        x[i] = (x[i] - sum) / r[[i, i]];
    }
    x
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::array;

    use super::*;

    #[test]
    fn qr_reproduces_the_matrix() {
        let a = array![[2.0, -1.0], [1.0, 3.0], [-2.0, 0.5]];
        let qr = Qr::new(a.clone());

        // Q R, column by column.
        for j in 0..2 {
            let mut column = qr.r().column(j).to_owned();
            qr.apply_q(column.view_mut());
            for i in 0..3 {
                assert_relative_eq!(column[i], a[[i, j]], epsilon = 1e-12);
            }
        }
        assert_relative_eq!(qr.r()[[1, 0]], 0.0);
        assert_relative_eq!(qr.r()[[0, 0]].abs(), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn transposed_product_is_orthogonal() {
        let qr = Qr::new(array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        let mut y = array![1.0, -2.0, 0.5];
        let norm = y.dot(&y);
        qr.apply_qt(y.view_mut());
        assert_relative_eq!(y.dot(&y), norm, epsilon = 1e-12);
        qr.apply_q(y.view_mut());
        assert_relative_eq!(y, array![1.0, -2.0, 0.5], epsilon = 1e-12);
    }

    #[test]
    fn triangular_solves() {
        let r = array![[2.0, 1.0], [0.0, 4.0]];
        let x = solve_upper(r.view(), array![4.0, 8.0].view());
        assert_relative_eq!(x, array![1.0, 2.0]);

        let y = solve_upper_transposed(r.view(), array![2.0, 9.0].view());
        assert_relative_eq!(y, array![1.0, 2.0]);
    }
}
