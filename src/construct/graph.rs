//! Managed object dependency graph
//!
//! Nodes are managed objects, edges point from a dependent to its
//! dependency. Used by the linker to reject dependency cycles and to order
//! object loading so that every dependency is ready before its dependents.

use std::fmt;
use std::hash::Hash;

use indexmap::IndexMap;
use thiserror::Error;

/// Errors raised while building the graph
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("node {0} not found")]
    NodeNotFound(String),
}

/// A node in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode<K> {
    id: K,
    /// Display name used in cycle reports
    label: String,
    dependencies: Vec<K>,
    dependents: Vec<K>,
}

impl<K: Copy + Eq> GraphNode<K> {
    #[inline]
    pub fn new(
        id: K,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            dependencies: Vec::new(),
            dependents: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> K {
        self.id
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Nodes this node depends on
    #[inline]
    pub fn dependencies(&self) -> &[K] {
        &self.dependencies
    }

    /// Nodes that depend on this node
    #[inline]
    pub fn dependents(&self) -> &[K] {
        &self.dependents
    }

    #[inline]
    pub fn depends_on(
        &self,
        id: K,
    ) -> bool {
        self.dependencies.contains(&id)
    }

    /// Check if this node has no dependencies
    #[inline]
    pub fn is_root(&self) -> bool {
        self.dependencies.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Directed graph keyed by `K`, iterated in insertion order.
#[derive(Debug, Clone)]
pub struct DependencyGraph<K: Hash + Eq> {
    nodes: IndexMap<K, GraphNode<K>>,
}

impl<K: Copy + Hash + Eq + fmt::Debug> Default for DependencyGraph<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Hash + Eq + fmt::Debug> DependencyGraph<K> {
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
        }
    }

    /// Add a node; re-adding an id keeps the existing node
    pub fn add_node(
        &mut self,
        id: K,
        label: impl Into<String>,
    ) {
        self.nodes
            .entry(id)
            .or_insert_with(|| GraphNode::new(id, label));
    }

    /// Record that `dependent` depends on `dependency`
    pub fn add_edge(
        &mut self,
        dependent: K,
        dependency: K,
    ) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&dependency) {
            return Err(GraphError::NodeNotFound(format!("{:?}", dependency)));
        }
        let node = self
            .nodes
            .get_mut(&dependent)
            .ok_or_else(|| GraphError::NodeNotFound(format!("{:?}", dependent)))?;
        if node.depends_on(dependency) {
            return Ok(());
        }
        node.dependencies.push(dependency);
        if let Some(target) = self.nodes.get_mut(&dependency) {
            target.dependents.push(dependent);
        }
        Ok(())
    }

    #[inline]
    pub fn node(
        &self,
        id: K,
    ) -> Option<&GraphNode<K>> {
        self.nodes.get(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Find every cycle reachable in the graph.
    ///
    /// Each back edge met during a depth-first walk (started from the nodes
    /// in insertion order) yields one cycle, reported as the node path with
    /// the first node repeated at the end.
    pub fn find_cycles(&self) -> Vec<Vec<K>> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut cycles = Vec::new();
        for start in 0..self.nodes.len() {
            if marks[start] == Mark::Unvisited {
                let mut stack = Vec::new();
                self.visit(start, &mut marks, &mut stack, &mut cycles);
            }
        }
        cycles
    }

    fn visit(
        &self,
        position: usize,
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
        cycles: &mut Vec<Vec<K>>,
    ) {
        marks[position] = Mark::InProgress;
        stack.push(position);
        if let Some((_, node)) = self.nodes.get_index(position) {
            for dependency in &node.dependencies {
                let Some(next) = self.nodes.get_index_of(dependency) else {
                    continue;
                };
                match marks[next] {
                    Mark::Unvisited => self.visit(next, marks, stack, cycles),
                    Mark::InProgress => {
                        if let Some(from) = stack.iter().position(|p| *p == next) {
                            let mut cycle: Vec<K> = stack[from..]
                                .iter()
                                .filter_map(|p| self.nodes.get_index(*p).map(|(k, _)| *k))
                                .collect();
                            cycle.push(*dependency);
                            cycles.push(cycle);
                        }
                    }
                    Mark::Done => {}
                }
            }
        }
        stack.pop();
        marks[position] = Mark::Done;
    }

    /// Nodes reachable from `roots`, every dependency before its dependents.
    ///
    /// Cyclic edges are skipped, so the result is well defined even for a
    /// graph that [`Self::find_cycles`] rejects.
    pub fn load_order(
        &self,
        roots: &[K],
    ) -> Vec<K> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut order = Vec::new();
        for root in roots {
            if let Some(position) = self.nodes.get_index_of(root) {
                self.post_order(position, &mut marks, &mut order);
            }
        }
        order
    }

    fn post_order(
        &self,
        position: usize,
        marks: &mut [Mark],
        order: &mut Vec<K>,
    ) {
        if marks[position] != Mark::Unvisited {
            return;
        }
        marks[position] = Mark::InProgress;
        if let Some((_, node)) = self.nodes.get_index(position) {
            for dependency in &node.dependencies {
                if let Some(next) = self.nodes.get_index_of(dependency) {
                    self.post_order(next, marks, order);
                }
            }
            order.push(node.id);
        }
        marks[position] = Mark::Done;
    }

    /// Render a cycle as `a -> b -> a`
    pub fn describe(
        &self,
        cycle: &[K],
    ) -> String {
        cycle
            .iter()
            .map(|id| {
                self.nodes
                    .get(id)
                    .map(|n| n.label.clone())
                    .unwrap_or_else(|| format!("{:?}", id))
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
