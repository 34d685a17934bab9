use approx::assert_relative_eq;
use braid_core::{ConstraintKind, Registry, Workflow};
use braid_solvers::optimization::slsqp::{self, Action, Config, Event, Status};
use integration_tests::test_components::paraboloid::Paraboloid;

fn toy(constraint_high: Option<f64>) -> (Workflow, Registry) {
    let mut workflow = Workflow::new();
    workflow.add_component("toy", Paraboloid).unwrap();
    workflow.configure().unwrap();

    let mut registry = Registry::new();
    registry.register_parameter(&workflow, "toy.x0", -5.0, 5.0).unwrap();
    registry.register_parameter(&workflow, "toy.x1", -5.0, 5.0).unwrap();
    registry.register_objective(&workflow, "toy.f").unwrap();
    registry
        .register_constraint(&workflow, ConstraintKind::Inequality, "toy.g", None, constraint_high)
        .unwrap();
    (workflow, registry)
}

#[test]
fn toy_problem_reaches_the_constrained_minimum() {
    let (mut workflow, mut registry) = toy(None);
    let mut history = Vec::new();

    let solution = slsqp::minimize(
        &mut workflow,
        &mut registry,
        &Config::default(),
        |event: &Event<'_>| -> Option<Action> {
            if let Event::FunctionEvaluated { x, objective, .. } = event {
                history.push((x.to_vec(), *objective));
            }
            None
        },
    )
    .unwrap();

    assert_eq!(solution.status, Status::Converged);
    assert_relative_eq!(solution.x[0], 0.5, epsilon = 1e-6);
    assert_relative_eq!(solution.x[1], 0.5, epsilon = 1e-6);
    assert_relative_eq!(solution.objective, 0.5, epsilon = 1e-6);
    assert_relative_eq!(solution.constraints.inequality[0], 0.0, epsilon = 1e-6);

    // Every function evaluation was observed, starting from (1, 1).
    assert_eq!(history.len(), solution.func_count);
    assert_eq!(history[0], (vec![1.0, 1.0], 2.0));
}

#[test]
fn bounded_constraints_shift_the_minimum() {
    // g <= -0.5, so x0 + x1 >= 1.5.
    let (mut workflow, mut registry) = toy(Some(-0.5));

    let solution =
        slsqp::minimize_unobserved(&mut workflow, &mut registry, &Config::default()).unwrap();

    assert_eq!(solution.status, Status::Converged);
    assert_relative_eq!(solution.x[0], 0.75, epsilon = 1e-6);
    assert_relative_eq!(solution.x[1], 0.75, epsilon = 1e-6);
    assert_relative_eq!(solution.objective, 1.125, epsilon = 1e-6);
}

#[test]
fn solutions_record_as_json() {
    let (mut workflow, mut registry) = toy(None);
    let config = Config::default();
    let solution = slsqp::minimize_unobserved(&mut workflow, &mut registry, &config).unwrap();

    let record = serde_json::json!({ "config": config, "solution": solution });

    assert_eq!(record["solution"]["status"], "Converged");
    assert_eq!(record["config"]["max_iters"], 50);
    assert_eq!(record["solution"]["constraints"]["inequality"].as_array().unwrap().len(), 1);

    let restored: slsqp::Solution = serde_json::from_value(record["solution"].clone()).unwrap();
    assert_eq!(restored.status, solution.status);
    assert_eq!(restored.iters, solution.iters);
    assert_relative_eq!(restored.objective, solution.objective, max_relative = 1e-12);
}
