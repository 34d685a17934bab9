//! Design variables, the objective, and constraints.
//!
//! The [`Registry`] owns the global design vector: one scalar per registered
//! [`DesignVariable`], in registration order. Objectives and constraints are
//! [linear expressions](crate::expression) over component outputs, validated
//! against the workflow when they are registered.
//!
//! Constraint values follow the raw convention used throughout this crate:
//! an equality constraint is satisfied when its value is zero, and an
//! inequality constraint is satisfied when its value is at most zero.

use crate::{
    error::ConfigError,
    expression::{LinearExpr, Relation, split_relation},
    path::Path,
    workflow::{Direction, Workflow},
};

/// An optimizable scalar that drives one or more component inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignVariable {
    name: String,
    targets: Vec<Path>,
    low: f64,
    high: f64,
    value: f64,
}

impl DesignVariable {
    /// Returns the variable name, taken from its first target.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns every input this variable is written to.
    #[must_use]
    pub fn targets(&self) -> &[Path] {
        &self.targets
    }

    #[must_use]
    pub fn low(&self) -> f64 {
        self.low
    }

    #[must_use]
    pub fn high(&self) -> f64 {
        self.high
    }

    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Whether a constraint must hold with equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Equality,
    Inequality,
}

/// A registered constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    kind: ConstraintKind,
    expression: LinearExpr,
    text: String,
}

impl Constraint {
    #[must_use]
    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }

    /// Returns the expression whose value defines satisfaction.
    #[must_use]
    pub fn expression(&self) -> &LinearExpr {
        &self.expression
    }

    /// Returns the text the constraint was registered with.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Raw constraint values, split by kind and in registration order.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize, serde::Deserialize))]
pub struct ConstraintValues {
    pub equality: Vec<f64>,
    pub inequality: Vec<f64>,
}

impl ConstraintValues {
    /// Returns equality values followed by inequality values.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.equality.iter().chain(&self.inequality).copied()
    }

    /// Returns the largest violation: `|c|` for equalities, `max(c, 0)` for inequalities.
    #[must_use]
    pub fn max_violation(&self) -> f64 {
        let equality = self.equality.iter().map(|c| c.abs());
        let inequality = self.inequality.iter().map(|c| c.max(0.0));
        equality.chain(inequality).fold(0.0, f64::max)
    }
}

/// Tracks design variables, the objective, and constraints.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    variables: Vec<DesignVariable>,
    objective: Option<(LinearExpr, String)>,
    constraints: Vec<Constraint>,
    frozen: bool,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a design variable driving one input element.
    ///
    /// The initial value is read from the target input. Infinite bounds mean
    /// the variable is unbounded on that side.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry is frozen, the bounds are invalid, or
    /// the target is not an undriven scalar input element.
    pub fn register_parameter(
        &mut self,
        workflow: &Workflow,
        path: &str,
        low: f64,
        high: f64,
    ) -> Result<usize, ConfigError> {
        self.register_parameter_group(workflow, &[path], low, high)
    }

    /// Registers one design variable broadcast to several input elements.
    ///
    /// Every target receives the same value; the initial value is read from
    /// the first.
    ///
    /// # Errors
    ///
    /// See [`Registry::register_parameter`]. Also fails if `paths` is empty.
    pub fn register_parameter_group(
        &mut self,
        workflow: &Workflow,
        paths: &[&str],
        low: f64,
        high: f64,
    ) -> Result<usize, ConfigError> {
        self.ensure_open()?;
        if low.is_nan() || high.is_nan() || low > high {
            return Err(ConfigError::InvalidBounds { low, high });
        }

        let mut targets = Vec::with_capacity(paths.len());
        for text in paths {
            let path: Path = text.parse()?;
            workflow.resolve_element(&path, Direction::Input)?;
            if workflow.is_driven(&path) {
                return Err(ConfigError::DrivenInput { path });
            }
            let taken = self
                .variables
                .iter()
                .flat_map(|var| &var.targets)
                .chain(&targets)
                .any(|existing| existing == &path);
            if taken {
                return Err(ConfigError::DuplicateTarget { path });
            }
            targets.push(path);
        }

        let first = targets.first().ok_or(ConfigError::EmptyGroup)?;
        let value = workflow.input(first)?;

        self.variables.push(DesignVariable {
            name: first.to_string(),
            targets,
            low,
            high,
            value,
        });
        Ok(self.variables.len() - 1)
    }

    /// Registers the objective to minimize.
    ///
    /// Negate the expression (e.g. `-bem.data[3]`) to maximize instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry is frozen, an objective is already
    /// registered, or the expression is invalid or references unknown outputs.
    pub fn register_objective(&mut self, workflow: &Workflow, expr: &str) -> Result<usize, ConfigError> {
        self.ensure_open()?;
        if self.objective.is_some() {
            return Err(ConfigError::DuplicateObjective);
        }

        let expression: LinearExpr = expr.parse()?;
        check_references(workflow, &expression)?;
        self.objective = Some((expression, expr.to_owned()));
        Ok(0)
    }

    /// Registers a constraint.
    ///
    /// `expr` is either a relation such as `rotor.thrust >= 50` or
    /// `a.x = b.y`, in which case `low` and `high` must be `None`, or a bare
    /// expression bounded by `low`/`high`:
    ///
    /// - equality: `expr - target`, where the target is `low` or `high`
    ///   (both must agree if given) or zero;
    /// - inequality: `expr - high` or `low - expr`, or `expr` itself when
    ///   neither bound is given. Give one bound per constraint.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry is frozen, the expression is invalid
    /// or references unknown outputs, the relation does not match `kind`, or
    /// the bounds are inconsistent.
    pub fn register_constraint(
        &mut self,
        workflow: &Workflow,
        kind: ConstraintKind,
        expr: &str,
        low: Option<f64>,
        high: Option<f64>,
    ) -> Result<usize, ConfigError> {
        self.ensure_open()?;
        let expression = constraint_expression(kind, expr, low, high)?;
        check_references(workflow, &expression)?;

        self.constraints.push(Constraint {
            kind,
            expression,
            text: expr.to_owned(),
        });
        Ok(self.constraints.len() - 1)
    }

    /// Prevents further registration.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Re-checks every registration against the current workflow.
    ///
    /// Connections added after a parameter was registered may drive its
    /// target, and components may have changed since an expression was
    /// checked.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DrivenInput`] if a connection now drives a
    /// design variable target, or a resolution error if a target or an
    /// expression term no longer names a declared slot element.
    pub fn validate(&self, workflow: &Workflow) -> Result<(), ConfigError> {
        for path in self.variables.iter().flat_map(|var| &var.targets) {
            workflow.resolve_element(path, Direction::Input)?;
            if workflow.is_driven(path) {
                return Err(ConfigError::DrivenInput { path: path.clone() });
            }
        }
        if let Some((expression, _)) = &self.objective {
            check_references(workflow, expression)?;
        }
        for constraint in &self.constraints {
            check_references(workflow, &constraint.expression)?;
        }
        Ok(())
    }

    /// Returns the design variables in vector order.
    #[must_use]
    pub fn variables(&self) -> &[DesignVariable] {
        &self.variables
    }

    /// Returns the constraints in registration order.
    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Returns the objective expression, if registered.
    #[must_use]
    pub fn objective(&self) -> Option<&LinearExpr> {
        self.objective.as_ref().map(|(expression, _)| expression)
    }

    /// Returns equality constraints in registration order.
    pub fn equality_constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints_of(ConstraintKind::Equality)
    }

    /// Returns inequality constraints in registration order.
    pub fn inequality_constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints_of(ConstraintKind::Inequality)
    }

    /// Returns the number of design variables, `n`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Returns the number of equality constraints.
    #[must_use]
    pub fn num_equality(&self) -> usize {
        self.equality_constraints().count()
    }

    /// Returns the number of inequality constraints.
    #[must_use]
    pub fn num_inequality(&self) -> usize {
        self.inequality_constraints().count()
    }

    /// Returns the current global design vector.
    #[must_use]
    pub fn current_vector(&self) -> Vec<f64> {
        self.variables.iter().map(|var| var.value).collect()
    }

    /// Overwrites the design variable values.
    ///
    /// # Errors
    ///
    /// Returns an error if `x` does not have one entry per design variable.
    pub fn apply_vector(&mut self, x: &[f64]) -> Result<(), ConfigError> {
        if x.len() != self.variables.len() {
            return Err(ConfigError::VectorLength {
                expected: self.variables.len(),
                actual: x.len(),
            });
        }
        for (var, &value) in self.variables.iter_mut().zip(x) {
            var.value = value;
        }
        Ok(())
    }

    /// Returns the lower bound of every design variable.
    #[must_use]
    pub fn lower_bounds(&self) -> Vec<f64> {
        self.variables.iter().map(|var| var.low).collect()
    }

    /// Returns the upper bound of every design variable.
    #[must_use]
    pub fn upper_bounds(&self) -> Vec<f64> {
        self.variables.iter().map(|var| var.high).collect()
    }

    /// Writes each design variable value into all of its target inputs.
    ///
    /// # Errors
    ///
    /// Returns an error if a target no longer resolves.
    pub fn broadcast(&self, workflow: &mut Workflow) -> Result<(), ConfigError> {
        for var in &self.variables {
            for target in &var.targets {
                workflow.set_input(target, var.value)?;
            }
        }
        Ok(())
    }

    /// Evaluates the objective from the workflow's current outputs.
    ///
    /// # Errors
    ///
    /// Returns an error if no objective is registered or a referenced
    /// component has not been evaluated.
    pub fn evaluate_objective(&self, workflow: &Workflow) -> Result<f64, ConfigError> {
        let expression = self.objective().ok_or(ConfigError::MissingObjective)?;
        expression.evaluate(|path| workflow.output(path))
    }

    /// Evaluates every constraint from the workflow's current outputs.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced component has not been evaluated.
    pub fn evaluate_constraints(&self, workflow: &Workflow) -> Result<ConstraintValues, ConfigError> {
        let eval = |c: &Constraint| c.expression.evaluate(|path| workflow.output(path));
        Ok(ConstraintValues {
            equality: self.equality_constraints().map(eval).collect::<Result<_, _>>()?,
            inequality: self.inequality_constraints().map(eval).collect::<Result<_, _>>()?,
        })
    }

    fn constraints_of(&self, kind: ConstraintKind) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(move |c| c.kind == kind)
    }

    fn ensure_open(&self) -> Result<(), ConfigError> {
        if self.frozen {
            Err(ConfigError::Frozen)
        } else {
            Ok(())
        }
    }
}

/// Builds the raw constraint expression from its text and bounds.
fn constraint_expression(
    kind: ConstraintKind,
    text: &str,
    low: Option<f64>,
    high: Option<f64>,
) -> Result<LinearExpr, ConfigError> {
    let (lhs, relation, rhs) = split_relation(text)?;
    let lhs: LinearExpr = lhs.parse()?;

    if let (Some(relation), Some(rhs)) = (relation, rhs) {
        if low.is_some() || high.is_some() {
            return Err(ConfigError::Constraint(format!(
                "`{text}` already has a relation; bounds must not be given"
            )));
        }
        if relation.is_equality() != (kind == ConstraintKind::Equality) {
            return Err(ConfigError::Constraint(format!(
                "`{text}` does not match a {kind:?} constraint"
            )));
        }

        let rhs: LinearExpr = rhs.parse()?;
        return Ok(match relation {
            Relation::Equal | Relation::Less | Relation::LessEqual => lhs.minus(&rhs),
            Relation::Greater | Relation::GreaterEqual => rhs.minus(&lhs),
        });
    }

    for bound in [low, high].into_iter().flatten() {
        if !bound.is_finite() {
            return Err(ConfigError::Constraint(format!(
                "constraint bound {bound} on `{text}` must be finite"
            )));
        }
    }

    match (kind, low, high) {
        (ConstraintKind::Equality, Some(low), Some(high)) if low != high => {
            Err(ConfigError::Constraint(format!(
                "equality `{text}` has different targets {low} and {high}"
            )))
        }
        (ConstraintKind::Equality, target, other) => Ok(lhs.offset(target.or(other).unwrap_or(0.0))),
        (ConstraintKind::Inequality, Some(_), Some(_)) => Err(ConfigError::Constraint(format!(
            "inequality `{text}` has both bounds; register one constraint per bound"
        ))),
        (ConstraintKind::Inequality, Some(low), None) => Ok(LinearExpr::constant(low).minus(&lhs)),
        (ConstraintKind::Inequality, None, Some(high)) => Ok(lhs.offset(high)),
        (ConstraintKind::Inequality, None, None) => Ok(lhs),
    }
}

fn check_references(workflow: &Workflow, expression: &LinearExpr) -> Result<(), ConfigError> {
    for (_, path) in expression.terms() {
        workflow.resolve_element(path, Direction::Output)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        component::Component,
        error::ComponentError,
        value::{SlotSpec, Slots},
    };

    /// out = [a + b, a * b]
    struct Pair;

    impl Component for Pair {
        fn inputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::scalar("a", 2.0), SlotSpec::scalar("b", 3.0)]
        }

        fn outputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::array("out", 2)]
        }

        fn evaluate(&mut self, inputs: &Slots) -> Result<Slots, ComponentError> {
            let (a, b) = (inputs.scalar("a")?, inputs.scalar("b")?);
            Ok(Slots::new().with("out", vec![a + b, a * b]))
        }
    }

    fn workflow() -> Workflow {
        let mut workflow = Workflow::new();
        workflow.add_component("p", Pair).unwrap();
        workflow.add_component("q", Pair).unwrap();
        workflow.connect("p.out[0]", "q.a").unwrap();
        workflow.configure().unwrap();
        workflow
    }

    #[test]
    fn vector_round_trips() {
        let workflow = workflow();
        let mut registry = Registry::new();
        assert_eq!(registry.register_parameter(&workflow, "p.a", -10.0, 10.0).unwrap(), 0);
        assert_eq!(registry.register_parameter(&workflow, "p.b", 0.0, f64::INFINITY).unwrap(), 1);

        assert_eq!(registry.current_vector(), [2.0, 3.0]);
        assert_eq!(registry.len(), 2);

        let x = [0.125, 7.5];
        registry.apply_vector(&x).unwrap();
        assert_eq!(registry.current_vector(), x);

        assert_eq!(registry.lower_bounds(), [-10.0, 0.0]);
        assert_eq!(registry.upper_bounds(), [10.0, f64::INFINITY]);
        assert!(matches!(
            registry.apply_vector(&[1.0]),
            Err(ConfigError::VectorLength { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn parameter_targets_are_validated() {
        let workflow = workflow();
        let mut registry = Registry::new();

        assert!(matches!(
            registry.register_parameter(&workflow, "q.a", 0.0, 1.0),
            Err(ConfigError::DrivenInput { .. })
        ));
        assert!(matches!(
            registry.register_parameter(&workflow, "p.out[0]", 0.0, 1.0),
            Err(ConfigError::UnknownInput { .. })
        ));
        assert!(matches!(
            registry.register_parameter(&workflow, "p.a", 1.0, 0.0),
            Err(ConfigError::InvalidBounds { .. })
        ));
        assert!(matches!(
            registry.register_parameter_group(&workflow, &[], 0.0, 1.0),
            Err(ConfigError::EmptyGroup)
        ));

        registry.register_parameter(&workflow, "p.a", 0.0, 1.0).unwrap();
        assert!(matches!(
            registry.register_parameter(&workflow, "p.a", 0.0, 1.0),
            Err(ConfigError::DuplicateTarget { .. })
        ));
    }

    #[test]
    fn groups_broadcast_one_value() {
        let mut workflow = workflow();
        let mut registry = Registry::new();
        registry
            .register_parameter_group(&workflow, &["p.b", "q.b"], 0.0, 10.0)
            .unwrap();

        registry.apply_vector(&[4.0]).unwrap();
        registry.broadcast(&mut workflow).unwrap();
        assert_eq!(workflow.input(&"p.b".parse().unwrap()).unwrap(), 4.0);
        assert_eq!(workflow.input(&"q.b".parse().unwrap()).unwrap(), 4.0);
        assert_eq!(registry.variables()[0].name(), "p.b");
        assert_eq!(registry.variables()[0].targets().len(), 2);
    }

    #[test]
    fn evaluates_objective_and_constraints() {
        let mut workflow = workflow();
        let mut registry = Registry::new();
        registry.register_objective(&workflow, "-q.out[1]").unwrap();
        registry
            .register_constraint(&workflow, ConstraintKind::Inequality, "p.out[0] <= 4", None, None)
            .unwrap();
        registry
            .register_constraint(&workflow, ConstraintKind::Equality, "q.out[0]", Some(8.0), None)
            .unwrap();
        registry
            .register_constraint(&workflow, ConstraintKind::Inequality, "p.out[1]", Some(10.0), None)
            .unwrap();

        assert!(matches!(
            registry.evaluate_objective(&workflow),
            Err(ConfigError::NotEvaluated(_))
        ));

        workflow.execute().unwrap();

        // p: a=2, b=3 -> out=[5, 6]; q: a=5, b=3 -> out=[8, 15]
        assert_relative_eq!(registry.evaluate_objective(&workflow).unwrap(), -15.0);

        let values = registry.evaluate_constraints(&workflow).unwrap();
        assert_eq!(values.equality, [0.0]);
        assert_eq!(values.inequality, [1.0, 4.0]);
        assert_relative_eq!(values.max_violation(), 4.0);
        assert_eq!(registry.num_equality(), 1);
        assert_eq!(registry.num_inequality(), 2);
    }

    #[test]
    fn constraint_forms() {
        let workflow = workflow();
        let mut registry = Registry::new();
        let ineq = ConstraintKind::Inequality;
        let eq = ConstraintKind::Equality;

        let expr = |r: &Registry, i: usize| r.constraints()[i].expression().to_string();

        registry.register_constraint(&workflow, ineq, "p.out[0] > q.out[1]", None, None).unwrap();
        assert_eq!(expr(&registry, 0), "q.out[1] - p.out[0]");

        registry.register_constraint(&workflow, ineq, "p.out[0]", None, Some(3.0)).unwrap();
        assert_eq!(expr(&registry, 1), "p.out[0] - 3");

        registry.register_constraint(&workflow, eq, "p.out[0] = 2 * q.out[0]", None, None).unwrap();
        assert_eq!(expr(&registry, 2), "p.out[0] - 2 * q.out[0]");

        let rejected = [
            (eq, "p.out[0] <= 1", None, None),
            (ineq, "p.out[0] = 1", None, None),
            (ineq, "p.out[0] <= 1", Some(0.0), None),
            (ineq, "p.out[0]", Some(0.0), Some(1.0)),
            (eq, "p.out[0]", Some(0.0), Some(1.0)),
            (ineq, "p.out[0]", None, Some(f64::NAN)),
            (ineq, "p.out", None, None),
            (ineq, "p.nope[0]", None, None),
            (ineq, "z.out[0]", None, None),
        ];
        for (kind, text, low, high) in rejected {
            assert!(
                registry.register_constraint(&workflow, kind, text, low, high).is_err(),
                "accepted `{text}`"
            );
        }
    }

    #[test]
    fn validate_catches_late_connections() {
        let mut workflow = Workflow::new();
        workflow.add_component("p", Pair).unwrap();
        workflow.add_component("q", Pair).unwrap();

        let mut registry = Registry::new();
        registry.register_parameter(&workflow, "q.a", 0.0, 10.0).unwrap();
        registry.register_objective(&workflow, "q.out[1]").unwrap();
        assert!(registry.validate(&workflow).is_ok());

        workflow.connect("p.out[0]", "q.a").unwrap();
        match registry.validate(&workflow) {
            Err(ConfigError::DrivenInput { path }) => assert_eq!(path.to_string(), "q.a"),
            other => panic!("expected a driven input error, got {other:?}"),
        }
    }

    #[test]
    fn frozen_registry_rejects_registration() {
        let workflow = workflow();
        let mut registry = Registry::new();
        registry.register_objective(&workflow, "p.out[0]").unwrap();
        assert!(matches!(
            registry.register_objective(&workflow, "p.out[1]"),
            Err(ConfigError::DuplicateObjective)
        ));

        registry.freeze();
        assert!(matches!(
            registry.register_parameter(&workflow, "p.a", 0.0, 1.0),
            Err(ConfigError::Frozen)
        ));
        assert!(matches!(
            registry.register_constraint(&workflow, ConstraintKind::Equality, "p.out[0]", None, None),
            Err(ConfigError::Frozen)
        ));
    }
}
