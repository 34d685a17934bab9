//! Assembly of the global Jacobian from per-component partials.
//!
//! Each design variable column is seeded at its target inputs and pushed
//! forward through the workflow in execution order: connections copy
//! derivatives from outputs to inputs, and each component's blocks map its
//! input derivatives to output derivatives. Objective and constraint rows are
//! then read off their linear expressions.
//!
//! Blocks a component does not report are exact zeros. The assembler never
//! infers or approximates a missing block.

use std::collections::HashMap;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, s};

use crate::{
    error::ConfigError,
    expression::LinearExpr,
    registry::Registry,
    workflow::{Direction, Linearization, Workflow},
};

/// The dense Jacobian of the objective and constraints.
///
/// Rows are `[objective, equality constraints..., inequality constraints...]`
/// in registration order; columns follow the design vector. Entries are raw
/// derivatives of the registered expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct Jacobian {
    matrix: Array2<f64>,
    num_equality: usize,
}

impl Jacobian {
    /// Returns the full matrix.
    #[must_use]
    pub fn matrix(&self) -> ArrayView2<'_, f64> {
        self.matrix.view()
    }

    /// Returns the objective gradient.
    #[must_use]
    pub fn objective(&self) -> ArrayView1<'_, f64> {
        self.matrix.row(0)
    }

    /// Returns the equality constraint rows.
    #[must_use]
    pub fn equality(&self) -> ArrayView2<'_, f64> {
        self.matrix.slice(s![1..=self.num_equality, ..])
    }

    /// Returns the inequality constraint rows.
    #[must_use]
    pub fn inequality(&self) -> ArrayView2<'_, f64> {
        self.matrix.slice(s![1 + self.num_equality.., ..])
    }

    /// Returns the constraint rows, equalities first.
    #[must_use]
    pub fn constraints(&self) -> ArrayView2<'_, f64> {
        self.matrix.slice(s![1.., ..])
    }

    #[must_use]
    pub fn into_matrix(self) -> Array2<f64> {
        self.matrix
    }
}

/// Derivatives of slot values with respect to one design variable.
type Tangents = HashMap<(usize, String), Array1<f64>>;

/// Builds the Jacobian from one linearization pass.
///
/// # Errors
///
/// Returns an error if the workflow is not configured, no objective is
/// registered, or the registry references components the workflow lacks.
pub fn assemble(
    linearization: &Linearization,
    registry: &Registry,
    workflow: &Workflow,
) -> Result<Jacobian, ConfigError> {
    let objective = registry.objective().ok_or(ConfigError::MissingObjective)?;
    let rows: Vec<&LinearExpr> = std::iter::once(objective)
        .chain(registry.equality_constraints().map(|c| c.expression()))
        .chain(registry.inequality_constraints().map(|c| c.expression()))
        .collect();

    let order = workflow.order_indices()?;
    let mut matrix = Array2::zeros((rows.len(), registry.len()));

    for (col, variable) in registry.variables().iter().enumerate() {
        let mut inputs = Tangents::new();
        for target in variable.targets() {
            let node = node_of(workflow, &target.component)?;
            let len = workflow
                .slot_len(node, Direction::Input, &target.slot)
                .unwrap_or(1);
            inputs
                .entry((node, target.slot.clone()))
                .or_insert_with(|| Array1::zeros(len))[target.offset()] = 1.0;
        }

        let outputs = propagate(linearization, workflow, order, inputs);

        for (row, expression) in rows.iter().enumerate() {
            matrix[[row, col]] = expression.terms().iter().try_fold(0.0, |acc, (coef, path)| {
                let node = node_of(workflow, &path.component)?;
                let d = outputs
                    .get(&(node, path.slot.clone()))
                    .map_or(0.0, |tangent| tangent[path.offset()]);
                Ok::<_, ConfigError>(acc + coef * d)
            })?;
        }
    }

    Ok(Jacobian {
        matrix,
        num_equality: registry.num_equality(),
    })
}

/// Pushes seeded input tangents forward, returning output tangents.
fn propagate(
    linearization: &Linearization,
    workflow: &Workflow,
    order: &[usize],
    mut inputs: Tangents,
) -> Tangents {
    let mut outputs = Tangents::new();

    for &node in order {
        for connection in workflow.incoming_of(node) {
            let Some(source) = workflow.index_of(&connection.source.component) else {
                continue;
            };
            let Some(upstream) = outputs.get(&(source, connection.source.slot.clone())) else {
                continue;
            };
            let values: Vec<f64> = match connection.source.index {
                Some(element) => vec![upstream[element]],
                None => upstream.to_vec(),
            };

            let target = &connection.target;
            let len = workflow
                .slot_len(node, Direction::Input, &target.slot)
                .unwrap_or(values.len());
            let tangent = inputs
                .entry((node, target.slot.clone()))
                .or_insert_with(|| Array1::zeros(len));
            match target.index {
                Some(element) => tangent[element] = values[0],
                None => tangent.assign(&Array1::from(values)),
            }
        }

        let Some(partials) = linearization.partials_of(workflow.name_of(node)) else {
            continue;
        };
        for (output, input, block) in partials.iter() {
            let Some(tangent) = inputs.get(&(node, input.to_owned())) else {
                continue;
            };
            let contribution = block.dot(tangent);
            outputs
                .entry((node, output.to_owned()))
                .and_modify(|existing| *existing += &contribution)
                .or_insert(contribution);
        }
    }

    outputs
}

fn node_of(workflow: &Workflow, component: &str) -> Result<usize, ConfigError> {
    workflow
        .index_of(component)
        .ok_or_else(|| ConfigError::UnknownComponent(component.to_owned()))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::array;

    use super::*;
    use crate::{
        component::Component,
        error::ComponentError,
        partials::Partials,
        registry::ConstraintKind,
        value::{SlotSpec, Slots},
    };

    /// out = [x0², x0 * x1]
    struct Square;

    impl Component for Square {
        fn inputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::array_with("x", vec![1.0, 2.0])]
        }

        fn outputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::array("out", 2)]
        }

        fn evaluate(&mut self, inputs: &Slots) -> Result<Slots, ComponentError> {
            let x = inputs.array("x")?;
            Ok(Slots::new().with("out", vec![x[0] * x[0], x[0] * x[1]]))
        }

        fn linearize(&mut self, inputs: &Slots) -> Result<Option<Partials>, ComponentError> {
            let x = inputs.array("x")?;
            let mut partials = Partials::new();
            partials.insert("out", "x", array![[2.0 * x[0], 0.0], [x[1], x[0]]]);
            Ok(Some(partials))
        }
    }

    /// y = 3 * u, with no linearization.
    struct Opaque;

    impl Component for Opaque {
        fn inputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::scalar("u", 0.0)]
        }

        fn outputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::scalar("y", 0.0)]
        }

        fn evaluate(&mut self, inputs: &Slots) -> Result<Slots, ComponentError> {
            Ok(Slots::new().with("y", 3.0 * inputs.scalar("u")?))
        }
    }

    /// y = 5 * u
    struct Linear;

    impl Component for Linear {
        fn inputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::scalar("u", 0.0)]
        }

        fn outputs(&self) -> Vec<SlotSpec> {
            vec![SlotSpec::scalar("y", 0.0)]
        }

        fn evaluate(&mut self, inputs: &Slots) -> Result<Slots, ComponentError> {
            Ok(Slots::new().with("y", 5.0 * inputs.scalar("u")?))
        }

        fn linearize(&mut self, _inputs: &Slots) -> Result<Option<Partials>, ComponentError> {
            let mut partials = Partials::new();
            partials.insert_scalar("y", "u", 5.0);
            Ok(Some(partials))
        }
    }

    #[test]
    fn chains_blocks_across_connections() {
        let mut workflow = Workflow::new();
        workflow.add_component("sq", Square).unwrap();
        workflow.add_component("lin", Linear).unwrap();
        workflow.connect("sq.out[1]", "lin.u").unwrap();
        workflow.configure().unwrap();

        let mut registry = Registry::new();
        registry.register_parameter(&workflow, "sq.x[0]", -5.0, 5.0).unwrap();
        registry.register_parameter(&workflow, "sq.x[1]", -5.0, 5.0).unwrap();
        registry.register_objective(&workflow, "lin.y + sq.out[0]").unwrap();
        registry
            .register_constraint(&workflow, ConstraintKind::Inequality, "sq.out[1]", None, Some(1.0))
            .unwrap();
        registry
            .register_constraint(&workflow, ConstraintKind::Equality, "2 * sq.out[0] = 1", None, None)
            .unwrap();

        workflow.execute().unwrap();
        let linearization = workflow.linearize_all().unwrap();
        let jacobian = assemble(&linearization, &registry, &workflow).unwrap();

        // At x = (1, 2): d(5 x0 x1 + x0²) = (5 x1 + 2 x0, 5 x0) = (12, 5)
        assert_eq!(jacobian.matrix().dim(), (3, 2));
        assert_relative_eq!(jacobian.objective()[0], 12.0);
        assert_relative_eq!(jacobian.objective()[1], 5.0);

        // Equality rows come first: d(2 x0²) = (4 x0, 0)
        assert_eq!(jacobian.equality(), array![[4.0, 0.0]]);
        // Then inequalities: d(x0 x1) = (x1, x0)
        assert_eq!(jacobian.inequality(), array![[2.0, 1.0]]);
        assert_eq!(jacobian.constraints().nrows(), 2);
    }

    #[test]
    fn inert_components_contribute_exact_zeros() {
        let mut workflow = Workflow::new();
        workflow.add_component("opaque", Opaque).unwrap();
        workflow.add_component("lin", Linear).unwrap();
        workflow.connect("opaque.y", "lin.u").unwrap();
        workflow.configure().unwrap();

        let mut registry = Registry::new();
        registry.register_parameter(&workflow, "opaque.u", 0.0, 1.0).unwrap();
        registry.register_objective(&workflow, "lin.y").unwrap();
        registry
            .register_constraint(&workflow, ConstraintKind::Inequality, "opaque.y", None, None)
            .unwrap();

        workflow.execute().unwrap();
        let linearization = workflow.linearize_all().unwrap();
        assert_eq!(linearization.inert_components(), ["opaque"]);

        let jacobian = assemble(&linearization, &registry, &workflow).unwrap();
        assert_eq!(jacobian.into_matrix(), Array2::<f64>::zeros((2, 1)));
    }

    #[test]
    fn unrelated_columns_are_zero() {
        let mut workflow = Workflow::new();
        workflow.add_component("a", Linear).unwrap();
        workflow.add_component("b", Linear).unwrap();
        workflow.configure().unwrap();

        let mut registry = Registry::new();
        registry.register_parameter(&workflow, "a.u", 0.0, 1.0).unwrap();
        registry.register_parameter(&workflow, "b.u", 0.0, 1.0).unwrap();
        registry.register_objective(&workflow, "a.y - 2 * b.y").unwrap();

        workflow.execute().unwrap();
        let linearization = workflow.linearize_all().unwrap();
        let jacobian = assemble(&linearization, &registry, &workflow).unwrap();

        assert_eq!(jacobian.objective(), array![5.0, -10.0]);
        assert_eq!(jacobian.equality().nrows(), 0);
        assert_eq!(jacobian.inequality().nrows(), 0);
    }
}
