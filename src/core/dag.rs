//! Department dependency graph and phase planning.
//!
//! The resolver turns a set of departments into a [`DependencyGraph`] by
//! consulting a [`DependencyRules`] table, rejects circular rule sets, and
//! partitions the graph into [`ExecutionPhase`]s that can each run
//! concurrently.

use std::collections::{BTreeSet, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::core::{Department, DependencyRules};
use crate::error::{Error, Result};
use crate::{alog_debug, alog_error, alog_trace};

/// A group of departments whose prerequisites all completed in earlier phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPhase {
    /// Zero-based phase number; phase 0 has no unmet prerequisites.
    pub phase: usize,
    /// Departments in this phase, without duplicates.
    pub departments: Vec<Department>,
    /// True when the phase holds more than one department.
    pub can_run_in_parallel: bool,
}

impl ExecutionPhase {
    fn new(phase: usize, departments: Vec<Department>) -> Self {
        let can_run_in_parallel = departments.len() > 1;
        Self {
            phase,
            departments,
            can_run_in_parallel,
        }
    }
}

/// Immutable dependency graph for one requested department set.
///
/// Edges point from a prerequisite to the department that needs it. A graph
/// flagged with a circular dependency never yields phases.
pub struct DependencyGraph {
    graph: DiGraph<Department, ()>,
    index: HashMap<Department, NodeIndex>,
    cycle: Option<Vec<Department>>,
    /// Prerequisites first. Empty when a cycle was found.
    order: Vec<Department>,
    phases: Vec<ExecutionPhase>,
}

impl DependencyGraph {
    /// Requested departments, in priority order.
    pub fn nodes(&self) -> Vec<Department> {
        let mut nodes: Vec<Department> = self.graph.node_weights().copied().collect();
        nodes.sort();
        nodes
    }

    pub fn contains(&self, department: Department) -> bool {
        self.index.contains_key(&department)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Prerequisites of `department` that are part of this graph.
    pub fn prerequisites(&self, department: Department) -> Vec<Department> {
        self.neighbors(department, Direction::Incoming)
    }

    /// Departments in this graph that require `department`.
    pub fn dependents(&self, department: Department) -> Vec<Department> {
        self.neighbors(department, Direction::Outgoing)
    }

    /// Every department mapped to its in-graph prerequisites.
    pub fn edges(&self) -> Vec<(Department, Vec<Department>)> {
        self.nodes()
            .into_iter()
            .map(|d| (d, self.prerequisites(d)))
            .collect()
    }

    pub fn has_circular_dependency(&self) -> bool {
        self.cycle.is_some()
    }

    /// The offending cycle, first department repeated at the end.
    pub fn cycle(&self) -> Option<&[Department]> {
        self.cycle.as_deref()
    }

    /// Phases in ascending order.
    ///
    /// # Errors
    /// Returns `CircularDependency` if the graph contains a cycle.
    pub fn phases(&self) -> Result<&[ExecutionPhase]> {
        self.ensure_acyclic()?;
        Ok(&self.phases)
    }

    fn ensure_acyclic(&self) -> Result<()> {
        match &self.cycle {
            Some(cycle) => Err(Error::CircularDependency {
                cycle: cycle.clone(),
            }),
            None => Ok(()),
        }
    }

    fn neighbors(&self, department: Department, direction: Direction) -> Vec<Department> {
        let Some(&idx) = self.index.get(&department) else {
            return Vec::new();
        };
        let mut found: Vec<Department> = self
            .graph
            .neighbors_directed(idx, direction)
            .filter_map(|n| self.graph.node_weight(n).copied())
            .collect();
        found.sort();
        found.dedup();
        found
    }

    /// Length of the longest prerequisite chain ending at each department.
    fn depths(&self) -> Result<HashMap<Department, usize>> {
        self.ensure_acyclic()?;
        Ok(self.depths_along_order())
    }

    fn depths_along_order(&self) -> HashMap<Department, usize> {
        let mut depth: HashMap<Department, usize> = HashMap::new();
        for &department in &self.order {
            let d = self
                .prerequisites(department)
                .iter()
                .filter_map(|p| depth.get(p))
                .map(|p: &usize| p + 1)
                .max()
                .unwrap_or(0);
            depth.insert(department, d);
        }
        depth
    }

    /// Length of the longest dependent chain starting at each department.
    fn heights(&self) -> Result<HashMap<Department, usize>> {
        self.ensure_acyclic()?;
        let mut height: HashMap<Department, usize> = HashMap::new();
        for &department in self.order.iter().rev() {
            let h = self
                .dependents(department)
                .iter()
                .filter_map(|p| height.get(p))
                .map(|p: &usize| p + 1)
                .max()
                .unwrap_or(0);
            height.insert(department, h);
        }
        Ok(height)
    }
}

impl std::fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("departments", &self.node_count())
            .field("dependencies", &self.edge_count())
            .field("has_circular_dependency", &self.has_circular_dependency())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Builds dependency graphs from a fixed rule table.
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver {
    rules: DependencyRules,
}

impl DependencyResolver {
    pub fn new(rules: DependencyRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &DependencyRules {
        &self.rules
    }

    /// Build the dependency graph for a department set.
    ///
    /// Only rules between requested departments become edges; a department
    /// listed as its own prerequisite contributes no edge. When the rules form
    /// a cycle the graph is flagged and phase computation is skipped.
    pub fn build_graph(
        &self,
        departments: impl IntoIterator<Item = Department>,
    ) -> DependencyGraph {
        let requested: BTreeSet<Department> = departments.into_iter().collect();

        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for &department in &requested {
            index.insert(department, graph.add_node(department));
        }

        for &department in &requested {
            for prerequisite in self.rules.prerequisites(department) {
                if prerequisite == department {
                    alog_trace!("Ignoring self-dependency on {}", department);
                    continue;
                }
                if let (Some(&from), Some(&to)) = (index.get(&prerequisite), index.get(&department))
                {
                    graph.update_edge(from, to, ());
                }
            }
        }

        let mut built = DependencyGraph {
            graph,
            index,
            cycle: None,
            order: Vec::new(),
            phases: Vec::new(),
        };

        match prerequisites_first(&built, &requested) {
            Ok(order) => built.order = order,
            Err(cycle) => {
                alog_error!(
                    "Circular dependency among {:?}: {:?}",
                    requested,
                    cycle
                );
                built.cycle = Some(cycle);
                return built;
            }
        }

        built.phases = compute_phases(&built);
        alog_debug!(
            "Built graph: {} departments, {} edges, {} phases",
            built.node_count(),
            built.edge_count(),
            built.phases.len()
        );
        built
    }

    /// Build the graph and fail fast if it contains a cycle.
    pub fn resolve(
        &self,
        departments: impl IntoIterator<Item = Department>,
    ) -> Result<DependencyGraph> {
        let graph = self.build_graph(departments);
        graph.ensure_acyclic()?;
        Ok(graph)
    }

    /// The longest prerequisite chain in the graph, earliest dependency first.
    ///
    /// Ties prefer the department earlier in the fixed priority order.
    pub fn get_critical_path(&self, graph: &DependencyGraph) -> Result<Vec<Department>> {
        let depths = graph.depths()?;

        let Some(mut current) = graph
            .nodes()
            .into_iter()
            .max_by(|a, b| depths[a].cmp(&depths[b]).then(b.cmp(a)))
        else {
            return Ok(Vec::new());
        };

        let mut path = vec![current];
        while depths[&current] > 0 {
            let previous = graph
                .prerequisites(current)
                .into_iter()
                .filter(|p| depths[p] + 1 == depths[&current])
                .min();
            match previous {
                Some(p) => {
                    path.push(p);
                    current = p;
                }
                None => break,
            }
        }
        path.reverse();
        Ok(path)
    }

    /// Phases reordered for execution under a bounded worker budget.
    ///
    /// Earliest-readiness phases already have the minimum possible count, so
    /// optimization keeps the phase boundaries and orders each phase so that
    /// departments heading the longest remaining chains come first.
    pub fn optimize_execution_order(&self, graph: &DependencyGraph) -> Result<Vec<ExecutionPhase>> {
        let heights = graph.heights()?;
        let phases = graph
            .phases()?
            .iter()
            .map(|phase| {
                let mut departments = phase.departments.clone();
                departments.sort_by(|a, b| {
                    let ha = heights.get(a).copied().unwrap_or(0);
                    let hb = heights.get(b).copied().unwrap_or(0);
                    hb.cmp(&ha).then(a.cmp(b))
                });
                ExecutionPhase::new(phase.phase, departments)
            })
            .collect();
        Ok(phases)
    }
}

/// Three-colour depth-first search following prerequisite edges.
///
/// Returns the departments in post-order, which puts every prerequisite
/// before its dependents, or the first cycle found.
fn prerequisites_first(
    graph: &DependencyGraph,
    nodes: &BTreeSet<Department>,
) -> std::result::Result<Vec<Department>, Vec<Department>> {
    let mut marks: HashMap<Department, Mark> = HashMap::new();
    let mut path = Vec::new();
    let mut order = Vec::with_capacity(nodes.len());
    for &start in nodes {
        if marks.contains_key(&start) {
            continue;
        }
        if let Some(cycle) = visit(graph, start, &mut marks, &mut path, &mut order) {
            return Err(cycle);
        }
    }
    Ok(order)
}

fn visit(
    graph: &DependencyGraph,
    department: Department,
    marks: &mut HashMap<Department, Mark>,
    path: &mut Vec<Department>,
    order: &mut Vec<Department>,
) -> Option<Vec<Department>> {
    marks.insert(department, Mark::InProgress);
    path.push(department);

    for prerequisite in graph.prerequisites(department) {
        match marks.get(&prerequisite) {
            Some(Mark::InProgress) => {
                let start = path.iter().position(|d| *d == prerequisite).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(prerequisite);
                return Some(cycle);
            }
            Some(Mark::Done) => {}
            None => {
                if let Some(cycle) = visit(graph, prerequisite, marks, path, order) {
                    return Some(cycle);
                }
            }
        }
    }

    path.pop();
    marks.insert(department, Mark::Done);
    order.push(department);
    None
}

fn compute_phases(graph: &DependencyGraph) -> Vec<ExecutionPhase> {
    if graph.node_count() == 0 {
        return vec![ExecutionPhase::new(0, Vec::new())];
    }

    let depths = graph.depths_along_order();
    let count = depths.values().copied().max().unwrap_or(0) + 1;
    let mut buckets: Vec<Vec<Department>> = vec![Vec::new(); count];
    for department in graph.nodes() {
        buckets[depths[&department]].push(department);
    }

    buckets
        .into_iter()
        .enumerate()
        .map(|(phase, departments)| ExecutionPhase::new(phase, departments))
        .collect()
}
