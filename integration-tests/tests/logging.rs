use std::sync::Mutex;

use braid_core::{ConstraintKind, Registry, Workflow};
use braid_solvers::optimization::slsqp::{self, Config, Status};
use integration_tests::test_components::paraboloid::Paraboloid;
use log::{Level, LevelFilter, Log, Metadata, Record};

/// Keeps every record emitted by the braid crates.
struct Capture {
    records: Mutex<Vec<(Level, String)>>,
}

impl Log for Capture {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.target().starts_with("braid")
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            if let Ok(mut records) = self.records.lock() {
                records.push((record.level(), record.args().to_string()));
            }
        }
    }

    fn flush(&self) {}
}

static CAPTURE: Capture = Capture {
    records: Mutex::new(Vec::new()),
};

#[test]
fn each_evaluation_is_logged_at_debug_level() {
    log::set_logger(&CAPTURE).unwrap();
    log::set_max_level(LevelFilter::Trace);

    let mut workflow = Workflow::new();
    workflow.add_component("toy", Paraboloid).unwrap();
    let mut registry = Registry::new();
    registry.register_parameter(&workflow, "toy.x0", -5.0, 5.0).unwrap();
    registry.register_parameter(&workflow, "toy.x1", -5.0, 5.0).unwrap();
    registry.register_objective(&workflow, "toy.f").unwrap();
    registry
        .register_constraint(&workflow, ConstraintKind::Inequality, "toy.g", None, None)
        .unwrap();

    let solution = slsqp::minimize_unobserved(&mut workflow, &mut registry, &Config::default()).unwrap();
    assert_eq!(solution.status, Status::Converged);

    let records = CAPTURE.records.lock().unwrap();
    let count = |prefix: &str| {
        records
            .iter()
            .filter(|(level, message)| *level == Level::Debug && message.starts_with(prefix))
            .count()
    };
    assert_eq!(count("evaluating function"), solution.func_count);
    assert_eq!(count("evaluating gradient"), solution.grad_count);
    assert!(
        records
            .iter()
            .any(|(level, message)| *level == Level::Info && message.starts_with("SLSQP converged"))
    );
}
