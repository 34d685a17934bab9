use braid_core::ConfigError;

/// Workspace lengths required by the SLSQP core for a given problem size.
///
/// The formulas follow the classic routine: `n1 = n + 1` accounts for the
/// extra variable of the augmented subproblem, and `mineq` counts the
/// inequality rows of that subproblem including both bounds per variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkspaceSize {
    /// Leading dimension of the constraint Jacobian, `max(m, 1)`.
    pub la: usize,

    /// Inequality rows of the augmented subproblem.
    pub mineq: usize,

    /// Share of the real workspace reserved for the LSQ setup.
    pub lsq: usize,

    /// Share reserved for the LSI solver.
    pub lsi: usize,

    /// Share reserved for the LSEI solver.
    pub lsei: usize,

    /// Share used by the main iteration.
    pub main: usize,

    /// Total real workspace length.
    pub real: usize,

    /// Total integer workspace length.
    pub int: usize,
}

impl WorkspaceSize {
    /// Computes the workspace lengths for `n` variables, `m` constraints, and
    /// `meq` equality constraints.
    #[must_use]
    pub fn new(n: usize, m: usize, meq: usize) -> Self {
        let n1 = n + 1;
        let la = m.max(1);
        let free = n1.saturating_sub(meq);
        let mineq = m.saturating_sub(meq) + 2 * n1;

        let lsq = n1 * (n1 + 1) + meq * (n1 + 1) + mineq * (n1 + 1);
        let lsi = (free + 1) * (mineq + 2) + 2 * mineq;
        let lsei = (n1 + mineq) * free + 2 * meq + n1;
        let main = n1 * (n / 2) + 2 * m + 3 * n + 3 * n1 + 1;

        Self {
            la,
            mineq,
            lsq,
            lsi,
            lsei,
            main,
            real: lsq + lsi + lsei + main + n + m,
            int: mineq.max(free),
        }
    }
}

/// Offsets of the persistent solver state inside the real workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Layout {
    n: usize,
    la: usize,
}

/// Mutable views of the persistent solver state.
pub(super) struct Regions<'w> {
    /// Merit function penalty weights, one per constraint.
    pub mu: &'w mut [f64],

    /// Packed `L D Lᵀ` factors of the Hessian approximation.
    pub l: &'w mut [f64],

    /// The iterate at the start of the line search.
    pub x0: &'w mut [f64],

    /// Lagrange multipliers of the last QP subproblem.
    pub r: &'w mut [f64],

    /// Search direction, scaled by the line search.
    pub s: &'w mut [f64],

    pub u: &'w mut [f64],
    pub v: &'w mut [f64],
}

impl Layout {
    pub(super) fn new(n: usize, m: usize) -> Self {
        Self { n, la: m.max(1) }
    }

    /// Real workspace length the persistent state occupies.
    pub(super) fn len(self) -> usize {
        let n1 = self.n + 1;
        2 * self.la + self.n * n1 / 2 + self.n + 3 * n1
    }

    pub(super) fn split(self, real: &mut [f64]) -> Regions<'_> {
        let n1 = self.n + 1;
        let (mu, rest) = real.split_at_mut(self.la);
        let (l, rest) = rest.split_at_mut(self.n * n1 / 2);
        let (x0, rest) = rest.split_at_mut(self.n);
        let (r, rest) = rest.split_at_mut(self.la);
        let (s, rest) = rest.split_at_mut(n1);
        let (u, rest) = rest.split_at_mut(n1);
        let (v, _) = rest.split_at_mut(n1);
        Regions {
            mu,
            l,
            x0,
            r,
            s,
            u,
            v,
        }
    }
}

/// Caller-provided storage for the SLSQP core.
///
/// The lengths are checked against the full classic formulas so that a
/// workspace sized for the classic routine is accepted unchanged. Only the
/// leading persistent region of `real` (penalty weights, Hessian factors,
/// multipliers, step and bound buffers) and the `int` index array are used
/// across calls. The least-squares kernels allocate their own scratch
/// matrices per subproblem, so the `lsq`, `lsi` and `lsei` shares stay
/// reserved but untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    pub(super) real: Vec<f64>,
    pub(super) int: Vec<usize>,
}

impl Workspace {
    /// Allocates exactly the storage `size` requires.
    #[must_use]
    pub fn allocate(size: &WorkspaceSize) -> Self {
        Self::with_lengths(size.real, size.int)
    }

    /// Allocates storage of arbitrary lengths.
    #[must_use]
    pub fn with_lengths(real: usize, int: usize) -> Self {
        Self {
            real: vec![0.0; real],
            int: vec![0; int],
        }
    }

    /// Checks that this workspace is large enough for `size`.
    ///
    /// # Errors
    ///
    /// Returns an error naming the short array if either is too small.
    pub fn check(&self, size: &WorkspaceSize) -> Result<(), ConfigError> {
        if self.real.len() < size.real {
            return Err(ConfigError::Invalid(format!(
                "real workspace has length {}, at least {} required",
                self.real.len(),
                size.real
            )));
        }
        if self.int.len() < size.int {
            return Err(ConfigError::Invalid(format!(
                "integer workspace has length {}, at least {} required",
                self.int.len(),
                size.int
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistent_state_fits_the_main_share() {
        for (n, m, meq) in [(1, 0, 0), (2, 1, 0), (4, 5, 2), (7, 3, 3), (10, 12, 4)] {
            let size = WorkspaceSize::new(n, m, meq);
            let layout = Layout::new(n, m);
            assert!(
                layout.len() <= size.main + n + m,
                "n = {n}, m = {m}: {} > {}",
                layout.len(),
                size.main + n + m
            );
        }
    }

    #[test]
    fn regions_do_not_overlap() {
        let layout = Layout::new(3, 2);
        let mut real = vec![0.0; layout.len()];
        let regions = layout.split(&mut real);

        assert_eq!(regions.mu.len(), 2);
        assert_eq!(regions.l.len(), 6);
        assert_eq!(regions.x0.len(), 3);
        assert_eq!(regions.r.len(), 2);
        assert_eq!((regions.s.len(), regions.u.len(), regions.v.len()), (4, 4, 4));
    }
}
