use std::{cmp::Reverse, collections::BinaryHeap, collections::HashMap};

use petgraph::{
    Direction,
    algo::tarjan_scc,
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};

use crate::{error::ConfigError, path::Connection};

/// A directed graph of components and the value connections between them.
///
/// Node indices follow insertion order, which is also the tie-breaker when
/// several components are ready to run at once.
#[derive(Debug, Default)]
pub(crate) struct ComponentGraph {
    graph: DiGraph<String, Connection>,
    node_map: HashMap<String, NodeIndex>,
}

impl ComponentGraph {
    /// Adds a component node, returning its index.
    pub(crate) fn add_component(&mut self, name: &str) -> NodeIndex {
        let index = self.graph.add_node(name.to_owned());
        self.node_map.insert(name.to_owned(), index);
        index
    }

    pub(crate) fn index_of(&self, name: &str) -> Option<NodeIndex> {
        self.node_map.get(name).copied()
    }

    /// Adds an edge for a connection between two known components.
    pub(crate) fn connect(&mut self, source: NodeIndex, target: NodeIndex, connection: Connection) {
        self.graph.add_edge(source, target, connection);
    }

    #[must_use]
    pub(crate) fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub(crate) fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the connections feeding a component.
    pub(crate) fn incoming(&self, index: NodeIndex) -> impl Iterator<Item = &Connection> {
        self.graph
            .edges_directed(index, Direction::Incoming)
            .map(|edge| edge.weight())
    }

    /// Returns the connections leaving a component.
    pub(crate) fn outgoing(&self, index: NodeIndex) -> impl Iterator<Item = &Connection> {
        self.graph
            .edges_directed(index, Direction::Outgoing)
            .map(|edge| edge.weight())
    }

    /// Computes a topological execution order.
    ///
    /// Uses Kahn's algorithm with a min-heap on node index, so components
    /// that become ready together run in the order they were added.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Cycle`] naming every component on a cycle.
    pub(crate) fn call_order(&self) -> Result<Vec<NodeIndex>, ConfigError> {
        let mut indegree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|node| self.graph.edges_directed(node, Direction::Incoming).count())
            .collect();

        let mut ready: BinaryHeap<Reverse<NodeIndex>> = self
            .graph
            .node_indices()
            .filter(|node| indegree[node.index()] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for edge in self.graph.edges_directed(node, Direction::Outgoing) {
                let target = edge.target();
                indegree[target.index()] -= 1;
                if indegree[target.index()] == 0 {
                    ready.push(Reverse(target));
                }
            }
        }

        if order.len() == self.graph.node_count() {
            Ok(order)
        } else {
            Err(ConfigError::Cycle(self.cycle_members()))
        }
    }

    /// Names the components that sit on a cycle, in insertion order.
    fn cycle_members(&self) -> Vec<String> {
        let mut members: Vec<NodeIndex> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .flatten()
            .collect();
        members.sort();
        members
            .into_iter()
            .map(|node| self.graph[node].clone())
            .collect()
    }
}
