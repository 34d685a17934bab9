use braid_core::{ConfigError, ConstraintValues, Jacobian, Observer, Registry, Workflow, jacobian};
use ndarray::Array2;

use super::{
    Action, Config, Error, Event, Solution, State, Status,
    boundary::{Boundary, Request},
    sqp::Evaluation,
    report::Reporter,
    workspace::{Workspace, WorkspaceSize},
};

/// Couples a [`Workflow`] and its [`Registry`] to the SLSQP core.
///
/// The driver answers each solver request by evaluating the workflow: a
/// function request executes it and reads the objective and constraints, a
/// gradient request linearizes it and assembles the Jacobian. Constraints
/// are registered as `c <= 0`; the driver negates values and gradient rows
/// to match the solver's `c >= 0` convention.
///
/// Use [`Driver::run`] to go to completion, or [`Driver::start_iteration`]
/// and [`Driver::step`] to advance one request at a time.
#[derive(Debug)]
pub struct Driver<'w> {
    workflow: &'w mut Workflow,
    registry: &'w mut Registry,
    config: Config,
    state: State,
    run: Option<Run>,
}

/// Buffers shared with the core for one run.
#[derive(Debug)]
struct Run {
    boundary: Boundary,
    reporter: Reporter,
    n: usize,
    m: usize,
    x: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    objective: f64,
    constraints: ConstraintValues,
    /// Constraint values in solver sign, `la` entries.
    c: Vec<f64>,
    /// Objective gradient, `n + 1` entries.
    df: Vec<f64>,
    /// Constraint Jacobian in solver sign, `la × (n + 1)`.
    dg: Array2<f64>,
    /// Whether the core has been called at least once.
    primed: bool,
    reported: usize,
}

impl<'w> Driver<'w> {
    #[must_use]
    pub fn new(workflow: &'w mut Workflow, registry: &'w mut Registry, config: Config) -> Self {
        Self {
            workflow,
            registry,
            config,
            state: State::Init,
            run: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the current design vector once the run has started.
    #[must_use]
    pub fn x(&self) -> Option<&[f64]> {
        self.run.as_ref().map(|run| run.x.as_slice())
    }

    /// Returns the last evaluated objective once the run has started.
    #[must_use]
    pub fn objective(&self) -> Option<f64> {
        self.run.as_ref().map(|run| run.objective)
    }

    /// Major iterations performed so far.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.run.as_ref().map_or(0, |run| run.boundary.iterations())
    }

    /// Calls made into the solver core so far.
    #[must_use]
    pub fn solver_calls(&self) -> usize {
        self.run.as_ref().map_or(0, |run| run.boundary.calls())
    }

    /// Prepares a run with a freshly allocated workspace.
    ///
    /// # Errors
    ///
    /// See [`Driver::start_iteration_with`].
    pub fn start_iteration(&mut self) -> Result<(), Error> {
        self.start(None)
    }

    /// Prepares a run using caller-provided workspace storage.
    ///
    /// Configures the workflow if needed, freezes the registry, clamps the
    /// starting point into its bounds, and opens the output channel. The
    /// driver then waits in [`State::NeedFunction`].
    ///
    /// # Errors
    ///
    /// Returns an error if the driver has already started, the workflow
    /// cannot be configured, the registry has no design variables or no
    /// objective, a connection now drives a design variable, the workspace is too small, or the output file cannot be
    /// opened.
    pub fn start_iteration_with(&mut self, workspace: Workspace) -> Result<(), Error> {
        self.start(Some(workspace))
    }

    fn start(&mut self, workspace: Option<Workspace>) -> Result<(), Error> {
        if self.state != State::Init {
            return Err(ConfigError::Invalid("the driver has already started".into()).into());
        }
        if !self.workflow.is_configured() {
            self.workflow.configure()?;
        }
        if self.registry.is_empty() {
            return Err(ConfigError::NoDesignVariables.into());
        }
        if self.registry.objective().is_none() {
            return Err(ConfigError::MissingObjective.into());
        }
        self.registry.validate(self.workflow)?;

        let n = self.registry.len();
        let meq = self.registry.num_equality();
        let m = meq + self.registry.num_inequality();
        let size = WorkspaceSize::new(n, m, meq);
        let workspace = workspace.unwrap_or_else(|| Workspace::allocate(&size));
        let boundary = Boundary::new(
            n,
            m,
            meq,
            self.config.accuracy(),
            self.config.max_iters(),
            workspace,
        )?;

        let lower = self.registry.lower_bounds();
        let upper = self.registry.upper_bounds();
        let mut x = self.registry.current_vector();
        for (i, variable) in self.registry.variables().iter().enumerate() {
            let clamped = x[i].clamp(lower[i], upper[i]);
            if clamped != x[i] {
                log::warn!(
                    "design variable `{}` starts at {} outside [{}, {}]; clamped to {clamped}",
                    variable.name(),
                    x[i],
                    lower[i],
                    upper[i],
                );
                x[i] = clamped;
            }
        }
        self.registry.apply_vector(&x)?;

        let mut reporter = Reporter::open(&self.config)?;
        reporter.header(n, m, meq, &self.config);

        self.registry.freeze();
        log::info!("starting SLSQP: {n} variable(s), {m} constraint(s), {meq} equality");

        self.run = Some(Run {
            boundary,
            reporter,
            n,
            m,
            x,
            lower,
            upper,
            objective: f64::NAN,
            constraints: ConstraintValues::default(),
            c: vec![0.0; size.la],
            df: vec![0.0; n + 1],
            dg: Array2::zeros((size.la, n + 1)),
            primed: false,
            reported: 0,
        });
        self.state = State::NeedFunction;
        Ok(())
    }

    /// Answers one solver request and returns the new state.
    ///
    /// Terminal states are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the run has not started, a component fails, or
    /// the objective is not finite. The driver is then
    /// [`State::Aborted`] and the solver is not called again.
    pub fn step<Obs>(&mut self, observer: &mut Obs) -> Result<State, Error>
    where
        Obs: for<'a> Observer<Event<'a>, Action>,
    {
        let result = match self.state {
            State::Init => {
                return Err(
                    ConfigError::Invalid("start_iteration must be called before step".into()).into(),
                );
            }
            State::NeedFunction => self.evaluate_function(observer),
            State::NeedGradient => self.evaluate_gradient(observer),
            terminal => return Ok(terminal),
        };

        match result {
            Ok(state) => {
                self.state = state;
                Ok(state)
            }
            Err(err) => {
                self.state = State::Aborted;
                Err(err)
            }
        }
    }

    /// Runs to completion, starting the run first if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the run cannot start, a step fails, or the solver
    /// terminates with an error code.
    pub fn run<Obs>(&mut self, mut observer: Obs) -> Result<Solution, Error>
    where
        Obs: for<'a> Observer<Event<'a>, Action>,
    {
        if self.state == State::Init {
            self.start_iteration()?;
        }
        while !self.state.is_terminal() {
            self.step(&mut observer)?;
        }
        self.solution()
    }

    /// Returns the result of a finished run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Solver`] if the solver ended with an error code, or a
    /// configuration error if the run has not finished.
    pub fn solution(&self) -> Result<Solution, Error> {
        let unfinished = || ConfigError::Invalid(format!("no solution in state {:?}", self.state));
        let run = self.run.as_ref().ok_or_else(unfinished)?;

        let status = match self.state {
            State::Converged => Status::Converged,
            State::Stopped => Status::StoppedByObserver,
            State::Error(code) => {
                return Err(Error::Solver {
                    code,
                    x: run.x.clone(),
                    objective: run.objective,
                    iters: run.boundary.iterations(),
                });
            }
            _ => return Err(unfinished().into()),
        };

        Ok(Solution {
            status,
            x: run.x.clone(),
            objective: run.objective,
            constraints: run.constraints.clone(),
            iters: run.boundary.iterations(),
            func_count: run.boundary.func_count(),
            grad_count: run.boundary.grad_count(),
        })
    }

    fn evaluate_function<Obs>(&mut self, observer: &mut Obs) -> Result<State, Error>
    where
        Obs: for<'a> Observer<Event<'a>, Action>,
    {
        let Self {
            workflow,
            registry,
            run,
            ..
        } = self;
        let workflow: &mut Workflow = workflow;
        let registry: &mut Registry = registry;
        let run = run.as_mut().ok_or(ConfigError::NotConfigured)?;

        log::debug!("evaluating function at x = {:?}", run.x);
        registry.apply_vector(&run.x)?;
        registry.broadcast(workflow)?;
        workflow.execute()?;
        let objective = registry.evaluate_objective(workflow)?;
        let constraints = registry.evaluate_constraints(workflow)?;

        if !objective.is_finite() {
            log::error!("objective is {objective} at x = {:?}; aborting the run", run.x);
            return Err(Error::NonFiniteObjective {
                x: run.x.clone(),
                value: objective,
            });
        }
        log::debug!("f = {objective}, max violation = {}", constraints.max_violation());
        run.record_function(objective, constraints);

        let event = Event::FunctionEvaluated {
            iteration: run.boundary.iterations(),
            x: &run.x,
            objective,
            constraints: &run.constraints,
        };
        if let Some(Action::StopEarly) = observer.observe(&event) {
            log::info!("SLSQP stopped by observer at f = {objective}");
            return Ok(State::Stopped);
        }

        if run.primed {
            run.advance()
        } else {
            Ok(State::NeedGradient)
        }
    }

    fn evaluate_gradient<Obs>(&mut self, observer: &mut Obs) -> Result<State, Error>
    where
        Obs: for<'a> Observer<Event<'a>, Action>,
    {
        let Self {
            workflow,
            registry,
            run,
            ..
        } = self;
        let workflow: &mut Workflow = workflow;
        let registry: &Registry = registry;
        let run = run.as_mut().ok_or(ConfigError::NotConfigured)?;

        log::debug!("evaluating gradient at x = {:?}", run.x);
        let linearization = workflow.linearize_all()?;
        let jacobian = jacobian::assemble(&linearization, registry, workflow)?;
        run.record_gradient(&jacobian);

        let event = Event::GradientEvaluated {
            iteration: run.boundary.iterations(),
            x: &run.x,
            jacobian: &jacobian,
            inert: linearization.inert_components(),
        };
        if let Some(Action::StopEarly) = observer.observe(&event) {
            log::info!("SLSQP stopped by observer after a gradient evaluation");
            return Ok(State::Stopped);
        }

        run.primed = true;
        run.advance()
    }
}

impl Run {
    fn record_function(&mut self, objective: f64, constraints: ConstraintValues) {
        self.objective = objective;
        for (slot, value) in self.c.iter_mut().zip(constraints.iter()) {
            *slot = -value;
        }
        self.reporter
            .function(&self.x, objective, constraints.max_violation());
        self.constraints = constraints;
    }

    fn record_gradient(&mut self, jacobian: &Jacobian) {
        let n = self.n;
        for (slot, &value) in self.df.iter_mut().zip(jacobian.objective()) {
            *slot = value;
        }
        self.df[n] = 0.0;

        for (j, row) in jacobian.constraints().rows().into_iter().enumerate() {
            for (i, &value) in row.iter().enumerate() {
                self.dg[[j, i]] = -value;
            }
            self.dg[[j, n]] = 0.0;
        }
        self.reporter.gradient(&self.x, &self.df[..n]);
    }

    /// Passes the latest evaluations to the core and maps its request.
    fn advance(&mut self) -> Result<State, Error> {
        let eval = Evaluation {
            f: self.objective,
            c: &self.c,
            df: &self.df,
            dg: self.dg.view(),
            lower: &self.lower,
            upper: &self.upper,
        };
        let request = self.boundary.call(&mut self.x, &eval);

        let iteration = self.boundary.iterations();
        if iteration > self.reported {
            let violation = self.constraints.max_violation();
            self.reporter
                .iteration(iteration, self.boundary.func_count(), self.objective, violation);
            self.reported = iteration;
        }

        let state = match request {
            Request::Function => State::NeedFunction,
            Request::Gradient => State::NeedGradient,
            Request::Converged => {
                log::info!(
                    "SLSQP converged in {iteration} iteration(s): f = {}",
                    self.objective
                );
                self.summarize();
                State::Converged
            }
            Request::Terminated(code) => {
                log::warn!("SLSQP terminated: {}", code.message());
                self.summarize();
                State::Error(code)
            }
            Request::Unrecognized(mode) => {
                log::error!("SLSQP core returned unknown mode {mode}");
                return Err(Error::UnknownMode { mode });
            }
        };
        Ok(state)
    }

    fn summarize(&mut self) {
        self.reporter.summary(
            self.boundary.mode(),
            self.objective,
            self.boundary.iterations(),
            self.boundary.func_count(),
            self.boundary.grad_count(),
        );
    }
}
