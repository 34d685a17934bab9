//! The workflow graph coordinator.
//!
//! A [`Workflow`] owns a set of named [`Component`]s and the value
//! [`Connection`]s between them. Once [`configure`](Workflow::configure)d, it
//! executes every component in dependency order, pushing each output along its
//! connections before any consumer runs.
//!
//! ```
//! use braid_core::{Component, ComponentError, SlotSpec, Slots, Workflow};
//!
//! struct Double;
//!
//! impl Component for Double {
//!     fn inputs(&self) -> Vec<SlotSpec> {
//!         vec![SlotSpec::scalar("x", 1.0)]
//!     }
//!     fn outputs(&self) -> Vec<SlotSpec> {
//!         vec![SlotSpec::scalar("y", 0.0)]
//!     }
//!     fn evaluate(&mut self, inputs: &Slots) -> Result<Slots, ComponentError> {
//!         Ok(Slots::new().with("y", 2.0 * inputs.scalar("x")?))
//!     }
//! }
//!
//! let mut workflow = Workflow::new();
//! workflow.add_component("first", Double).unwrap();
//! workflow.add_component("second", Double).unwrap();
//! workflow.connect("first.y", "second.x").unwrap();
//! workflow.configure().unwrap();
//!
//! workflow.set_input(&"first.x".parse().unwrap(), 3.0).unwrap();
//! workflow.execute().unwrap();
//! assert_eq!(workflow.output(&"second.y".parse().unwrap()).unwrap(), 12.0);
//! ```

mod graph;
mod linearization;

use std::collections::BTreeSet;

use petgraph::graph::NodeIndex;

use crate::{
    component::Component,
    error::{ConfigError, ExecutionError, Phase, WorkflowError},
    partials::PartialDeclaration,
    path::{Connection, Path, is_name},
    value::{Shape, SlotSpec, Slots},
};

pub use linearization::Linearization;

use graph::ComponentGraph;

/// Which side of a component a slot lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Input,
    Output,
}

struct Node {
    name: String,
    component: Box<dyn Component>,
    inputs: Vec<SlotSpec>,
    outputs: Vec<SlotSpec>,
    input_values: Slots,
    output_values: Option<Slots>,
    inert_warned: bool,
}

impl Node {
    fn spec(&self, direction: Direction, slot: &str) -> Option<&SlotSpec> {
        let specs = match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        };
        specs.iter().find(|spec| spec.name == slot)
    }
}

/// A directed acyclic graph of analysis components.
#[derive(Default)]
pub struct Workflow {
    graph: ComponentGraph,
    nodes: Vec<Node>,
    driven: BTreeSet<(usize, String, usize)>,
    order: Option<Vec<usize>>,
}

impl Workflow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named component.
    ///
    /// Input slots start at their declared defaults. Adding a component
    /// invalidates any previously computed execution order.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a valid identifier or is taken.
    pub fn add_component(
        &mut self,
        name: impl Into<String>,
        component: impl Component + 'static,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        if !is_name(&name) {
            return Err(ConfigError::Invalid(format!(
                "`{name}` is not a valid component name"
            )));
        }
        if self.graph.index_of(&name).is_some() {
            return Err(ConfigError::DuplicateComponent(name));
        }

        let inputs = component.inputs();
        let outputs = component.outputs();
        let input_values = inputs
            .iter()
            .map(|spec| (spec.name.clone(), spec.default.clone()))
            .collect();

        let index = self.graph.add_component(&name);
        debug_assert_eq!(index.index(), self.nodes.len());

        self.nodes.push(Node {
            name,
            component: Box::new(component),
            inputs,
            outputs,
            input_values,
            output_values: None,
            inert_warned: false,
        });
        self.order = None;
        Ok(())
    }

    /// Connects a component output to a component input.
    ///
    /// Both paths use the `component.slot[index]` syntax; the index is
    /// optional for scalars and whole-slot connections.
    ///
    /// # Errors
    ///
    /// Returns an error if either path does not parse or does not resolve,
    /// if the element counts differ, or if the target is already driven.
    pub fn connect(&mut self, source: &str, target: &str) -> Result<(), ConfigError> {
        self.add_connection(Connection {
            source: source.parse()?,
            target: target.parse()?,
        })
    }

    /// Connects using the `source -> target` syntax, e.g. `a.out[1] -> b.in`.
    ///
    /// # Errors
    ///
    /// See [`Workflow::connect`].
    pub fn connect_str(&mut self, text: &str) -> Result<(), ConfigError> {
        self.add_connection(text.parse()?)
    }

    /// Adds an already parsed connection.
    ///
    /// # Errors
    ///
    /// See [`Workflow::connect`].
    pub fn add_connection(&mut self, connection: Connection) -> Result<(), ConfigError> {
        let (source, source_shape) = self.resolve(&connection.source, Direction::Output)?;
        let (target, target_shape) = self.resolve(&connection.target, Direction::Input)?;

        let count = |path: &Path, shape: Shape| path.index.map_or(shape.len(), |_| 1);
        let (sent, received) = (
            count(&connection.source, source_shape),
            count(&connection.target, target_shape),
        );
        if sent != received {
            return Err(ConfigError::ShapeMismatch {
                from: connection.source,
                to: connection.target,
                reason: format!("{sent} element(s) cannot feed {received}"),
            });
        }

        let elements: Vec<usize> = match connection.target.index {
            Some(index) => vec![index],
            None => (0..target_shape.len()).collect(),
        };
        let slot = &connection.target.slot;
        if elements
            .iter()
            .any(|&e| self.driven.contains(&(target.index(), slot.clone(), e)))
        {
            return Err(ConfigError::MultipleSources {
                target: connection.target,
            });
        }
        for element in elements {
            self.driven.insert((target.index(), slot.clone(), element));
        }

        self.graph.connect(source, target, connection);
        self.order = None;
        Ok(())
    }

    /// Validates the graph and computes the execution order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Cycle`] if the connections form a cycle.
    pub fn configure(&mut self) -> Result<(), ConfigError> {
        let order = self.graph.call_order()?;
        self.order = Some(order.into_iter().map(NodeIndex::index).collect());
        for node in &mut self.nodes {
            node.inert_warned = false;
        }
        Ok(())
    }

    /// Returns `true` once an execution order is available.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.order.is_some()
    }

    /// Runs every component once, in topological order.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the workflow is not configured, or an
    /// execution error naming the first component that failed or returned
    /// outputs that do not match its declared slots.
    pub fn execute(&mut self) -> Result<(), WorkflowError> {
        let order = self.order.clone().ok_or(ConfigError::NotConfigured)?;

        for index in order {
            let node = &mut self.nodes[index];
            log::trace!("evaluating `{}`", node.name);

            let outputs = node
                .component
                .evaluate(&node.input_values)
                .map_err(|e| ExecutionError::new(&node.name, Phase::Evaluate, e))?;

            for spec in &node.outputs {
                let actual = outputs.get(&spec.name).map(|value| value.len());
                if actual != Some(spec.shape().len()) {
                    let reason = match actual {
                        Some(len) => format!(
                            "output `{}` has {len} element(s), expected {}",
                            spec.name,
                            spec.shape().len()
                        ),
                        None => format!("output `{}` is missing", spec.name),
                    };
                    return Err(ExecutionError::new(&node.name, Phase::Evaluate, reason).into());
                }
            }

            node.output_values = Some(outputs);
            self.propagate(index);
        }

        Ok(())
    }

    /// Runs every component's `linearize` in topological order.
    ///
    /// Must follow an [`execute`](Workflow::execute) at the same inputs.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the workflow is not configured or has
    /// not been executed, or an execution error if a component fails or
    /// reports a block whose shape does not match its slots.
    pub fn linearize_all(&mut self) -> Result<Linearization, WorkflowError> {
        let order = self.order.clone().ok_or(ConfigError::NotConfigured)?;
        let mut linearization = Linearization::default();

        for index in order {
            let node = &mut self.nodes[index];
            if node.output_values.is_none() {
                return Err(ConfigError::NotEvaluated(node.name.clone()).into());
            }

            let partials = node
                .component
                .linearize(&node.input_values)
                .map_err(|e| ExecutionError::new(&node.name, Phase::Linearize, e))?;

            let Some(partials) = partials else {
                if !node.inert_warned {
                    log::warn!(
                        "component `{}` does not support linearization; its partials are zero",
                        node.name
                    );
                    node.inert_warned = true;
                }
                linearization.mark_inert(&node.name);
                continue;
            };

            for (output, input, block) in partials.iter() {
                let rows = node.spec(Direction::Output, output).map(|s| s.shape().len());
                let cols = node.spec(Direction::Input, input).map(|s| s.shape().len());
                let (Some(rows), Some(cols)) = (rows, cols) else {
                    let reason = format!("partial d{output}/d{input} names an unknown slot");
                    return Err(ExecutionError::new(&node.name, Phase::Linearize, reason).into());
                };
                if block.dim() != (rows, cols) {
                    let reason = format!(
                        "partial d{output}/d{input} has shape {:?}, expected {:?}",
                        block.dim(),
                        (rows, cols)
                    );
                    return Err(ExecutionError::new(&node.name, Phase::Linearize, reason).into());
                }
            }

            linearization.insert(&node.name, partials);
        }

        Ok(linearization)
    }

    /// Returns the component names in execution order.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow is not configured.
    pub fn call_order(&self) -> Result<Vec<&str>, ConfigError> {
        let order = self.order.as_ref().ok_or(ConfigError::NotConfigured)?;
        Ok(order
            .iter()
            .map(|&index| self.nodes[index].name.as_str())
            .collect())
    }

    /// Returns the component names in insertion order.
    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|node| node.name.as_str())
    }

    #[must_use]
    pub fn component_count(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the connections feeding a component.
    pub fn incoming_connections(&self, component: &str) -> impl Iterator<Item = &Connection> {
        self.graph
            .index_of(component)
            .into_iter()
            .flat_map(|index| self.graph.incoming(index))
    }

    /// Returns the connections leaving a component.
    pub fn outgoing_connections(&self, component: &str) -> impl Iterator<Item = &Connection> {
        self.graph
            .index_of(component)
            .into_iter()
            .flat_map(|index| self.graph.outgoing(index))
    }

    /// Returns the derivative kinds a component declares.
    ///
    /// # Errors
    ///
    /// Returns an error if the component is unknown.
    pub fn partial_declarations(&self, component: &str) -> Result<Vec<PartialDeclaration>, ConfigError> {
        let index = self.node_index(component)?;
        Ok(self.nodes[index].component.partial_declarations())
    }

    /// Returns the current input values of a component.
    #[must_use]
    pub fn inputs_of(&self, component: &str) -> Option<&Slots> {
        let index = self.graph.index_of(component)?;
        Some(&self.nodes[index.index()].input_values)
    }

    /// Returns the most recent outputs of a component, if it has run.
    #[must_use]
    pub fn outputs_of(&self, component: &str) -> Option<&Slots> {
        let index = self.graph.index_of(component)?;
        self.nodes[index.index()].output_values.as_ref()
    }

    /// Reads a scalar input element.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not resolve to one input element.
    pub fn input(&self, path: &Path) -> Result<f64, ConfigError> {
        let (node, _) = self.resolve_element(path, Direction::Input)?;
        self.nodes[node.index()]
            .input_values
            .get(&path.slot)
            .and_then(|value| value.as_slice().get(path.offset()).copied())
            .ok_or_else(|| ConfigError::NotScalar { path: path.clone() })
    }

    /// Writes a scalar input element.
    ///
    /// Values on connection-driven inputs are overwritten by the next
    /// [`execute`](Workflow::execute).
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not resolve to one input element.
    pub fn set_input(&mut self, path: &Path, value: f64) -> Result<(), ConfigError> {
        let (node, _) = self.resolve_element(path, Direction::Input)?;
        let slot = self.nodes[node.index()]
            .input_values
            .get_mut(&path.slot)
            .and_then(|values| values.as_mut_slice().get_mut(path.offset()))
            .ok_or_else(|| ConfigError::NotScalar { path: path.clone() })?;
        *slot = value;
        Ok(())
    }

    /// Reads a scalar output element from the most recent pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not resolve to one output element or
    /// the component has not been evaluated.
    pub fn output(&self, path: &Path) -> Result<f64, ConfigError> {
        let (node, _) = self.resolve_element(path, Direction::Output)?;
        let node = &self.nodes[node.index()];
        let outputs = node
            .output_values
            .as_ref()
            .ok_or_else(|| ConfigError::NotEvaluated(node.name.clone()))?;
        outputs
            .get(&path.slot)
            .and_then(|value| value.as_slice().get(path.offset()).copied())
            .ok_or_else(|| ConfigError::NotScalar { path: path.clone() })
    }

    /// Returns `true` if any connection drives the addressed input element.
    #[must_use]
    pub fn is_driven(&self, path: &Path) -> bool {
        self.graph.index_of(&path.component).is_some_and(|node| {
            self.driven
                .contains(&(node.index(), path.slot.clone(), path.offset()))
        })
    }

    /// Resolves a path to one scalar element of a declared slot.
    pub(crate) fn resolve_element(
        &self,
        path: &Path,
        direction: Direction,
    ) -> Result<(NodeIndex, Shape), ConfigError> {
        let (node, shape) = self.resolve(path, direction)?;
        if path.index.is_none() && shape != Shape::Scalar {
            return Err(ConfigError::NotScalar { path: path.clone() });
        }
        Ok((node, shape))
    }

    /// Resolves a path to a declared slot, checking any element index.
    fn resolve(&self, path: &Path, direction: Direction) -> Result<(NodeIndex, Shape), ConfigError> {
        let node = self
            .graph
            .index_of(&path.component)
            .ok_or_else(|| ConfigError::UnknownComponent(path.component.clone()))?;

        let spec = self.nodes[node.index()]
            .spec(direction, &path.slot)
            .ok_or_else(|| match direction {
                Direction::Input => ConfigError::UnknownInput {
                    component: path.component.clone(),
                    slot: path.slot.clone(),
                },
                Direction::Output => ConfigError::UnknownOutput {
                    component: path.component.clone(),
                    slot: path.slot.clone(),
                },
            })?;

        let shape = spec.shape();
        if let Some(index) = path.index {
            if index >= shape.len() {
                return Err(ConfigError::IndexOutOfRange {
                    path: path.clone(),
                    len: shape.len(),
                });
            }
        }
        Ok((node, shape))
    }

    fn node_index(&self, component: &str) -> Result<usize, ConfigError> {
        self.graph
            .index_of(component)
            .map(NodeIndex::index)
            .ok_or_else(|| ConfigError::UnknownComponent(component.to_owned()))
    }

    /// Copies a component's fresh outputs into every connected input.
    fn propagate(&mut self, index: usize) {
        let Some(outputs) = self.nodes[index].output_values.as_ref() else {
            return;
        };

        let mut transfers = Vec::new();
        for connection in self.graph.outgoing(NodeIndex::new(index)) {
            let Some(value) = outputs.get(&connection.source.slot) else {
                continue;
            };
            let values = match connection.source.index {
                Some(element) => vec![value.as_slice()[element]],
                None => value.as_slice().to_vec(),
            };
            transfers.push((connection.target.clone(), values));
        }

        for (target, values) in transfers {
            let Some(node) = self.graph.index_of(&target.component) else {
                continue;
            };
            let Some(slot) = self.nodes[node.index()].input_values.get_mut(&target.slot) else {
                continue;
            };
            let slot = slot.as_mut_slice();
            match target.index {
                Some(element) => slot[element] = values[0],
                None => slot.copy_from_slice(&values),
            }
        }
    }

    // Accessors used by the Jacobian assembler.

    pub(crate) fn order_indices(&self) -> Result<&[usize], ConfigError> {
        self.order.as_deref().ok_or(ConfigError::NotConfigured)
    }

    pub(crate) fn name_of(&self, index: usize) -> &str {
        &self.nodes[index].name
    }

    pub(crate) fn index_of(&self, component: &str) -> Option<usize> {
        self.graph.index_of(component).map(NodeIndex::index)
    }

    pub(crate) fn incoming_of(&self, index: usize) -> impl Iterator<Item = &Connection> {
        self.graph.incoming(NodeIndex::new(index))
    }

    pub(crate) fn slot_len(&self, index: usize, direction: Direction, slot: &str) -> Option<usize> {
        self.nodes[index]
            .spec(direction, slot)
            .map(|spec| spec.shape().len())
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("components", &self.nodes.iter().map(|n| &n.name).collect::<Vec<_>>())
            .field("connections", &self.graph.edge_count())
            .field("configured", &self.order.is_some())
            .finish()
    }
}
