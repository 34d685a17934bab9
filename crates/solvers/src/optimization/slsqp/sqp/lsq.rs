use ndarray::{Array1, Array2, ArrayView2, s};

use super::{super::SolverCode, ldl, lsei::lsei};

/// Weight of the extra variable in the augmented subproblem.
const RHO: f64 = 100.0;

/// The quadratic subproblem at the current iterate.
///
/// Minimizes `½ dᵀ B d + gᵀ d` subject to the linearized constraints
/// `A_eq d + c_eq = 0`, `A_ineq d + c_ineq >= 0`, and `lower <= d <= upper`,
/// where `B = L D Lᵀ`. Non-finite bounds are dropped.
pub(super) struct Subproblem<'a> {
    pub l: &'a [f64],
    pub g: &'a [f64],
    pub a: ArrayView2<'a, f64>,
    pub c: &'a [f64],
    pub meq: usize,
    pub lower: &'a [f64],
    pub upper: &'a [f64],
}

/// Search direction and constraint multipliers of a solved subproblem.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Step {
    /// The direction, with the extra variable last when augmented.
    pub d: Array1<f64>,

    /// One multiplier per constraint, equalities first.
    pub multipliers: Array1<f64>,
}

impl Subproblem<'_> {
    /// Solves the subproblem.
    ///
    /// When `augmented`, an extra variable `δ ∈ [0, 1]` relaxes every
    /// constraint toward its current value so the linearization is always
    /// consistent; `δ = 1` keeps `d = 0` feasible.
    pub(super) fn solve(&self, augmented: bool, index: &mut [usize]) -> Result<Step, SolverCode> {
        let n = self.g.len();
        let m = self.c.len();
        let meq = self.meq;
        let nv = n + usize::from(augmented);

        let (e, f) = self.objective(nv)?;

        let mut c = Array2::zeros((meq, nv));
        let mut d = Array1::zeros(meq);
        for j in 0..meq {
            c.slice_mut(s![j, ..n]).assign(&self.a.row(j));
            if augmented {
                c[[j, n]] = -self.c[j];
            }
            d[j] = -self.c[j];
        }

        let mut rows: Vec<(Array1<f64>, f64)> = Vec::new();
        for j in meq..m {
            let mut row = Array1::zeros(nv);
            row.slice_mut(s![..n]).assign(&self.a.row(j));
            if augmented {
                row[n] = (-self.c[j]).max(0.0);
            }
            rows.push((row, -self.c[j]));
        }
        for i in 0..n {
            if self.lower[i].is_finite() {
                rows.push((unit(nv, i, 1.0), self.lower[i]));
            }
            if self.upper[i].is_finite() {
                rows.push((unit(nv, i, -1.0), -self.upper[i]));
            }
        }
        if augmented {
            rows.push((unit(nv, n, 1.0), 0.0));
            rows.push((unit(nv, n, -1.0), -1.0));
        }

        let mut g = Array2::zeros((rows.len(), nv));
        let mut h = Array1::zeros(rows.len());
        for (k, (row, bound)) in rows.into_iter().enumerate() {
            g.row_mut(k).assign(&row);
            h[k] = bound;
        }

        let sol = lsei(c.view(), d.view(), e.view(), f.view(), g.view(), h.view(), index)?;

        let mut multipliers = Array1::zeros(m);
        multipliers.slice_mut(s![..meq]).assign(&sol.equality);
        multipliers
            .slice_mut(s![meq..])
            .assign(&sol.inequality.slice(s![..m - meq]));

        Ok(Step {
            d: sol.x,
            multipliers,
        })
    }

    /// Builds `E = D^½ Lᵀ` and `f = -D^-½ L⁻¹ g`, so that
    /// `½ ||E d - f||² = ½ dᵀ B d + gᵀ d + const`.
    fn objective(&self, nv: usize) -> Result<(Array2<f64>, Array1<f64>), SolverCode> {
        let n = self.g.len();
        let mut z = self.g.to_vec();
        for i in 0..n {
            let sum: f64 = (0..i).map(|j| self.l[ldl::packed(n, i, j)] * z[j]).sum();
            z[i] -= sum;
        }

        let mut e = Array2::zeros((nv, nv));
        let mut f = Array1::zeros(nv);
        for i in 0..n {
            let diag = ldl::diagonal(n, self.l, i);
            if diag.is_nan() || diag <= 0.0 {
                return Err(SolverCode::SingularE);
            }
            let root = diag.sqrt();
            e[[i, i]] = root;
            for j in i + 1..n {
                e[[i, j]] = root * self.l[ldl::packed(n, j, i)];
            }
            f[i] = -z[i] / root;
        }
        if nv > n {
            e[[n, n]] = RHO.sqrt();
        }
        Ok((e, f))
    }
}

fn unit(len: usize, i: usize, value: f64) -> Array1<f64> {
    let mut row = Array1::zeros(len);
    row[i] = value;
    row
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::array;

    use super::*;

    fn identity(n: usize) -> Vec<f64> {
        let mut l = vec![0.0; n * (n + 1) / 2];
        ldl::reset(n, &mut l);
        l
    }

    #[test]
    fn unconstrained_step_is_the_newton_step() {
        let l = identity(2);
        let a = Array2::zeros((0, 2));
        let problem = Subproblem {
            l: &l,
            g: &[2.0, -4.0],
            a: a.view(),
            c: &[],
            meq: 0,
            lower: &[f64::NEG_INFINITY; 2],
            upper: &[f64::INFINITY; 2],
        };
        let mut index = [0; 8];

        let step = problem.solve(false, &mut index).unwrap();
        assert_relative_eq!(step.d, array![-2.0, 4.0], epsilon = 1e-12);
    }

    #[test]
    fn bounds_and_constraints_limit_the_step() {
        // min ½|d|² - 2 d0 - 2 d1 with d0 + d1 <= 1 and d1 <= 0.25.
        let l = identity(2);
        let a = array![[-1.0, -1.0]];
        let problem = Subproblem {
            l: &l,
            g: &[-2.0, -2.0],
            a: a.view(),
            c: &[1.0],
            meq: 0,
            lower: &[f64::NEG_INFINITY, f64::NEG_INFINITY],
            upper: &[f64::INFINITY, 0.25],
        };
        let mut index = [0; 8];

        let step = problem.solve(false, &mut index).unwrap();
        assert_relative_eq!(step.d, array![0.75, 0.25], epsilon = 1e-10);
        assert_relative_eq!(step.multipliers, array![1.25], epsilon = 1e-10);
    }

    #[test]
    fn augmentation_recovers_from_inconsistent_linearizations() {
        // d >= 1 from the constraint, d <= 0 from the bound.
        let l = identity(1);
        let a = array![[1.0]];
        let problem = Subproblem {
            l: &l,
            g: &[0.0],
            a: a.view(),
            c: &[-1.0],
            meq: 0,
            lower: &[f64::NEG_INFINITY],
            upper: &[0.0],
        };
        let mut index = [0; 8];

        assert_eq!(
            problem.solve(false, &mut index),
            Err(SolverCode::IncompatibleConstraints)
        );

        let step = problem.solve(true, &mut index).unwrap();
        assert_eq!(step.d.len(), 2);
        assert!(step.d[0] <= 1e-12);
        assert!(step.d[1] > 0.99);
    }
}
