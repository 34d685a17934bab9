//! The SLSQP iteration of Kraft (1988), in reverse-communication form.
//!
//! Each call consumes the evaluations the previous call asked for and
//! returns a raw mode: [`FUNCTION`] after moving `x` to a new trial point,
//! [`GRADIENT`] once a line search step is accepted, [`CONVERGED`], or a
//! positive [`SolverCode`]. All state that must survive between calls lives
//! in the caller's workspace.
//!
//! Constraints use the classic sign convention: `c == 0` for equalities and
//! `c >= 0` for inequalities, equalities first.

mod hfti;
mod householder;
mod ldl;
mod ldp;
mod lsei;
mod lsi;
mod lsq;
mod nnls;

use ndarray::{ArrayView2, s};

use super::{
    SolverCode,
    code::{CONVERGED, FUNCTION, GRADIENT, START},
    workspace::{Layout, Regions, Workspace, WorkspaceSize},
};
use braid_core::ConfigError;
use lsq::Subproblem;

/// Resets of the Hessian approximation tolerated before giving up on a
/// non-descent direction.
const MAX_RESETS: usize = 5;

/// Augmented subproblems tolerated before the constraints are declared
/// incompatible.
const MAX_INCONSISTENT: usize = 5;

/// Line search steps before a step is accepted regardless of decrease.
const MAX_LINE_STEPS: usize = 10;

/// Smallest line search contraction factor.
const MIN_ALPHA: f64 = 0.1;

/// Values the core reads on each call.
pub(super) struct Evaluation<'a> {
    pub f: f64,

    /// Constraint values, `m` entries.
    pub c: &'a [f64],

    /// Objective gradient; entries past `n` are ignored.
    pub df: &'a [f64],

    /// Constraint Jacobian, `la × (n + 1)`; the last column is ignored.
    pub dg: ArrayView2<'a, f64>,

    pub lower: &'a [f64],
    pub upper: &'a [f64],
}

/// Persistent state of one SLSQP run.
#[derive(Debug)]
pub(super) struct Core {
    n: usize,
    m: usize,
    meq: usize,
    accuracy: f64,
    max_iters: usize,
    layout: Layout,
    workspace: Workspace,

    iter: usize,
    resets: usize,
    inconsistent: usize,
    line: usize,
    alpha: f64,
    f0: f64,
    t0: f64,
    h3: f64,
}

impl Core {
    /// Takes ownership of a workspace sized for `n`, `m`, and `meq`.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace is too small.
    pub(super) fn new(
        n: usize,
        m: usize,
        meq: usize,
        accuracy: f64,
        max_iters: usize,
        workspace: Workspace,
    ) -> Result<Self, ConfigError> {
        workspace.check(&WorkspaceSize::new(n, m, meq))?;
        let layout = Layout::new(n, m);
        debug_assert!(layout.len() <= workspace.real.len());

        Ok(Self {
            n,
            m,
            meq,
            accuracy,
            max_iters,
            layout,
            workspace,
            iter: 0,
            resets: 0,
            inconsistent: 0,
            line: 0,
            alpha: 1.0,
            f0: 0.0,
            t0: 0.0,
            h3: 0.0,
        })
    }

    /// Major iterations started so far.
    pub(super) fn iterations(&self) -> usize {
        self.iter
    }

    /// Advances the iteration from `mode` and returns the next mode.
    pub(super) fn call(&mut self, mode: i32, x: &mut [f64], eval: &Evaluation<'_>) -> i32 {
        match mode {
            START => {
                self.start();
                self.direction(x, eval)
            }
            FUNCTION => self.line_search(x, eval),
            GRADIENT => {
                self.update_hessian(eval);
                self.direction(x, eval)
            }
            other => other,
        }
    }

    fn start(&mut self) {
        self.iter = 0;
        self.resets = 0;
        self.inconsistent = 0;
        let Regions { mu, l, .. } = self.layout.split(&mut self.workspace.real);
        mu.fill(0.0);
        ldl::reset(self.n, l);
    }

    /// Solves the QP subproblem at `x` and starts a line search along its
    /// direction.
    fn direction(&mut self, x: &mut [f64], eval: &Evaluation<'_>) -> i32 {
        let (n, m, meq) = (self.n, self.m, self.meq);
        let a = eval.dg.slice(s![..m, ..n]);
        let c = &eval.c[..m];

        let Regions {
            mu,
            l,
            x0,
            r,
            s: step,
            u,
            v,
        } = self.layout.split(&mut self.workspace.real);
        let index = &mut self.workspace.int;

        loop {
            self.iter += 1;
            if self.iter > self.max_iters {
                return SolverCode::IterationLimit.code();
            }

            for i in 0..n {
                u[i] = eval.lower[i] - x[i];
                v[i] = eval.upper[i] - x[i];
            }

            let problem = Subproblem {
                l,
                g: &eval.df[..n],
                a: a.view(),
                c,
                meq,
                lower: &u[..n],
                upper: &v[..n],
            };

            let mut h4 = 1.0;
            let solved = match problem.solve(false, index) {
                Ok(solved) => solved,
                Err(code)
                    if code == SolverCode::IncompatibleConstraints
                        || (code == SolverCode::SingularC && n == meq) =>
                {
                    self.inconsistent += 1;
                    if self.inconsistent > MAX_INCONSISTENT {
                        return SolverCode::IncompatibleConstraints.code();
                    }
                    match problem.solve(true, index) {
                        Ok(solved) => {
                            h4 = 1.0 - solved.d[n];
                            solved
                        }
                        Err(code) => return code.code(),
                    }
                }
                Err(code) => return code.code(),
            };

            step.fill(0.0);
            for (slot, &d) in step.iter_mut().zip(solved.d.iter().take(n)) {
                *slot = d;
            }
            for (slot, &multiplier) in r.iter_mut().zip(&solved.multipliers) {
                *slot = multiplier;
            }

            // Gradient of the Lagrangian, kept for the Hessian update.
            for i in 0..n {
                let sum: f64 = (0..m).map(|j| a[[j, i]] * r[j]).sum();
                v[i] = eval.df[i] - sum;
            }

            self.f0 = eval.f;
            x0.copy_from_slice(&x[..n]);

            let gs: f64 = (0..n).map(|i| eval.df[i] * step[i]).sum();
            let mut h1 = gs.abs();
            let mut violation = 0.0;
            for j in 0..m {
                violation += violation_of(j, meq, c[j]);
                let rj = r[j].abs();
                mu[j] = rj.max(0.5 * (mu[j] + rj));
                h1 += rj * c[j].abs();
            }
            if h1 < self.accuracy && violation < self.accuracy {
                return CONVERGED;
            }

            let penalty: f64 = (0..m).map(|j| mu[j] * violation_of(j, meq, c[j])).sum();
            self.t0 = eval.f + penalty;
            let h3 = gs - penalty * h4;

            if h3 >= 0.0 {
                self.resets += 1;
                if self.resets > MAX_RESETS {
                    let tol = 10.0 * self.accuracy;
                    let small_step = norm(&step[..n]) < tol;
                    return if ((eval.f - self.f0).abs() < tol || small_step) && violation < tol {
                        CONVERGED
                    } else {
                        SolverCode::PositiveDirectionalDerivative.code()
                    };
                }
                ldl::reset(n, l);
                continue;
            }

            self.h3 = h3;
            self.line = 0;
            self.alpha = 1.0;
            break;
        }

        self.trial(x, eval)
    }

    /// Moves `x` to `x0 + alpha * s`, clamped to the bounds.
    fn trial(&mut self, x: &mut [f64], eval: &Evaluation<'_>) -> i32 {
        let Regions { x0, s: step, .. } = self.layout.split(&mut self.workspace.real);

        self.line += 1;
        self.h3 *= self.alpha;
        for i in 0..self.n {
            step[i] *= self.alpha;
            x[i] = clamp(x0[i] + step[i], eval.lower[i], eval.upper[i]);
        }
        FUNCTION
    }

    /// Accepts the trial point or shrinks the step.
    fn line_search(&mut self, x: &mut [f64], eval: &Evaluation<'_>) -> i32 {
        let (m, meq) = (self.m, self.meq);
        let Regions { mu, s: step, .. } = self.layout.split(&mut self.workspace.real);

        let penalty: f64 = (0..m).map(|j| mu[j] * violation_of(j, meq, eval.c[j])).sum();
        let h1 = eval.f + penalty - self.t0;

        if h1 <= self.h3 / 10.0 || self.line > MAX_LINE_STEPS {
            let violation: f64 = (0..m).map(|j| violation_of(j, meq, eval.c[j])).sum();
            let small_change =
                (eval.f - self.f0).abs() < self.accuracy || norm(&step[..self.n]) < self.accuracy;
            return if small_change && violation < self.accuracy {
                CONVERGED
            } else {
                GRADIENT
            };
        }

        self.alpha = (self.h3 / (2.0 * (self.h3 - h1))).max(MIN_ALPHA);
        self.trial(x, eval)
    }

    /// Damped BFGS update of the packed `L D Lᵀ` factors.
    fn update_hessian(&mut self, eval: &Evaluation<'_>) {
        let (n, m) = (self.n, self.m);
        let a = eval.dg.slice(s![..m, ..n]);
        let Regions {
            l, r, s: step, u, v, ..
        } = self.layout.split(&mut self.workspace.real);

        for i in 0..n {
            let sum: f64 = (0..m).map(|j| a[[j, i]] * r[j]).sum();
            u[i] = eval.df[i] - sum - v[i];
        }
        ldl::multiply(n, l, step, v);

        let mut h1 = dot(&step[..n], &u[..n]);
        let h2 = dot(&step[..n], &v[..n]);
        let h3 = 0.2 * h2;
        if h1 < h3 {
            let theta = (h2 - h3) / (h2 - h1);
            h1 = h3;
            for i in 0..n {
                u[i] = theta * u[i] + (1.0 - theta) * v[i];
            }
        }

        if h1 == 0.0 || h2 == 0.0 {
            ldl::reset(n, l);
            return;
        }
        ldl::update(n, l, u, 1.0 / h1, v);
        ldl::update(n, l, v, -1.0 / h2, u);
    }
}

/// Violation of constraint `j`: `|c|` for equalities, `max(-c, 0)` otherwise.
fn violation_of(j: usize, meq: usize, c: f64) -> f64 {
    if j < meq { c.abs() } else { (-c).max(0.0) }
}

/// Clamps to finite bounds only.
fn clamp(value: f64, lower: f64, upper: f64) -> f64 {
    let value = if lower.is_finite() { value.max(lower) } else { value };
    if upper.is_finite() { value.min(upper) } else { value }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

