use braid_core::ConfigError;

use super::{
    SolverCode,
    code::{CONVERGED, FUNCTION, GRADIENT, START},
    sqp::{Core, Evaluation},
    workspace::Workspace,
};

/// What the core asks for after a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Request {
    /// Evaluate the objective and constraints at the updated `x`.
    Function,

    /// Evaluate gradients at the current `x`.
    Gradient,

    Converged,

    Terminated(SolverCode),

    /// A mode the core is never expected to return.
    Unrecognized(i32),
}

impl Request {
    fn from_mode(mode: i32) -> Self {
        match mode {
            FUNCTION => Self::Function,
            GRADIENT => Self::Gradient,
            CONVERGED => Self::Converged,
            other => SolverCode::from_code(other).map_or(Self::Unrecognized(other), Self::Terminated),
        }
    }
}

/// The single point of contact with the reverse-communication core.
///
/// Raw integer modes never leave this type. It also counts evaluations: the
/// initial function and gradient evaluations, made before the first call,
/// are included.
#[derive(Debug)]
pub(super) struct Boundary {
    core: Core,
    mode: i32,
    calls: usize,
    func_count: usize,
    grad_count: usize,
}

impl Boundary {
    /// Wraps a core for `n` variables and `m` constraints, `meq` of them
    /// equalities.
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
        Ok(Self {
            core: Core::new(n, m, meq, accuracy, max_iters, workspace)?,
            mode: START,
            calls: 0,
            func_count: 1,
            grad_count: 1,
        })
    }

    /// Hands the latest evaluations to the core and returns its request.
    ///
    /// `x` is updated in place when the core moves to a new trial point.
    pub(super) fn call(&mut self, x: &mut [f64], eval: &Evaluation<'_>) -> Request {
        self.calls += 1;
        self.mode = self.core.call(self.mode, x, eval);

        let request = Request::from_mode(self.mode);
        match request {
            Request::Function => self.func_count += 1,
            Request::Gradient => self.grad_count += 1,
            Request::Converged | Request::Terminated(_) | Request::Unrecognized(_) => {}
        }
        request
    }

    /// The last raw mode, for output files.
    pub(super) fn mode(&self) -> i32 {
        self.mode
    }

    pub(super) fn calls(&self) -> usize {
        self.calls
    }

    pub(super) fn iterations(&self) -> usize {
        self.core.iterations()
    }

    pub(super) fn func_count(&self) -> usize {
        self.func_count
    }

    pub(super) fn grad_count(&self) -> usize {
        self.grad_count
    }
}
