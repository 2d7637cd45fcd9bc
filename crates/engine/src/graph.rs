//! Rule dependency graph built on `petgraph`.
//!
//! Edges point from a dependency to its dependent, so a topological order
//! runs dependencies first.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::algo;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};

use crate::error::{EngineError, ItemKind};

/// A directed graph of the dependencies between active rules.
#[derive(Debug, Default)]
pub(crate) struct DependencyGraph {
    graph: DiGraph<String, ()>,
    index_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Build from `(rule id, dependencies)` pairs.
    ///
    /// Returns an error if a dependency is not itself one of the rules.
    /// Cycles are accepted here; see [`Self::find_cycle`].
    pub fn from_rules<'a>(
        rules: impl IntoIterator<Item = (&'a str, &'a BTreeSet<String>)> + Clone,
    ) -> Result<Self, EngineError> {
        Self::build(rules, true)
    }

    /// Like [`Self::from_rules`], but dependencies outside `rules` are
    /// dropped instead of rejected.
    pub fn from_known_rules<'a>(
        rules: impl IntoIterator<Item = (&'a str, &'a BTreeSet<String>)> + Clone,
    ) -> Self {
        // unknown ids are skipped, so construction cannot fail
        Self::build(rules, false).unwrap_or_default()
    }

    fn build<'a>(
        rules: impl IntoIterator<Item = (&'a str, &'a BTreeSet<String>)> + Clone,
        strict: bool,
    ) -> Result<Self, EngineError> {
        let mut graph = DiGraph::new();
        let mut index_map = HashMap::new();

        for (id, _) in rules.clone() {
            let idx = graph.add_node(id.to_string());
            index_map.insert(id.to_string(), idx);
        }

        for (id, dependencies) in rules {
            let to_idx = index_map[id];
            for dependency in dependencies {
                match index_map.get(dependency) {
                    Some(from_idx) => {
                        graph.add_edge(*from_idx, to_idx, ());
                    }
                    None if strict => {
                        return Err(EngineError::unknown(ItemKind::Dependency, dependency.as_str()));
                    }
                    None => {}
                }
            }
        }

        Ok(Self { graph, index_map })
    }

    /// Number of rules in the graph.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// First cycle found by a three-color DFS over the `dependencies`
    /// relation, as rule ids with the first id repeated at the end.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        fn visit(
            graph: &DiGraph<String, ()>,
            node: NodeIndex,
            colors: &mut [Color],
            stack: &mut Vec<NodeIndex>,
        ) -> Option<Vec<String>> {
            colors[node.index()] = Color::Gray;
            stack.push(node);
            let mut dependencies: Vec<_> = graph.neighbors_directed(node, Direction::Incoming).collect();
            dependencies.sort_by(|a, b| graph[*a].cmp(&graph[*b]));
            for next in dependencies {
                match colors[next.index()] {
                    Color::Gray => {
                        let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                        let mut chain: Vec<String> =
                            stack[start..].iter().map(|&n| graph[n].clone()).collect();
                        chain.push(graph[next].clone());
                        return Some(chain);
                    }
                    Color::White => {
                        if let Some(chain) = visit(graph, next, colors, stack) {
                            return Some(chain);
                        }
                    }
                    Color::Black => {}
                }
            }
            stack.pop();
            colors[node.index()] = Color::Black;
            None
        }

        let mut colors = vec![Color::White; self.graph.node_count()];
        let mut roots: Vec<_> = self.graph.node_indices().collect();
        roots.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
        let mut stack = Vec::new();
        for node in roots {
            if colors[node.index()] == Color::White {
                if let Some(chain) = visit(&self.graph, node, &mut colors, &mut stack) {
                    return Some(chain);
                }
            }
        }
        None
    }

    /// Fail with [`EngineError::CyclicDependency`] if the graph has a cycle.
    pub fn ensure_acyclic(&self) -> Result<(), EngineError> {
        match self.find_cycle() {
            Some(chain) => Err(EngineError::CyclicDependency { chain }),
            None => Ok(()),
        }
    }

    /// Depth of every rule: 0 without dependencies, otherwise one more than
    /// its deepest dependency. Sorting by depth runs dependencies first.
    pub fn ranks(&self) -> Result<HashMap<String, usize>, EngineError> {
        let sorted = algo::toposort(&self.graph, None).map_err(|cycle| {
            EngineError::CyclicDependency {
                chain: self
                    .find_cycle()
                    .unwrap_or_else(|| vec![self.graph[cycle.node_id()].clone()]),
            }
        })?;
        let mut depth = vec![0usize; self.graph.node_count()];
        for idx in &sorted {
            for next in self.graph.neighbors_directed(*idx, Direction::Outgoing) {
                depth[next.index()] = depth[next.index()].max(depth[idx.index()] + 1);
            }
        }
        Ok(sorted
            .into_iter()
            .map(|idx| (self.graph[idx].clone(), depth[idx.index()]))
            .collect())
    }

    /// Rules that list `id` as a dependency.
    pub fn dependents(&self, id: &str) -> BTreeSet<String> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &str, direction: Direction) -> BTreeSet<String> {
        let Some(&idx) = self.index_map.get(id) else {
            return BTreeSet::new();
        };
        self.graph
            .neighbors_directed(idx, direction)
            .map(|i| self.graph[i].clone())
            .collect()
    }

    /// Every rule `id` depends on, directly or transitively.
    pub fn all_dependencies(&self, id: &str) -> BTreeSet<String> {
        let Some(&idx) = self.index_map.get(id) else {
            return BTreeSet::new();
        };
        let reversed = Reversed(&self.graph);
        let mut dfs = Dfs::new(reversed, idx);
        let mut out = BTreeSet::new();
        while let Some(next) = dfs.next(reversed) {
            if next != idx {
                out.insert(self.graph[next].clone());
            }
        }
        out
    }

    /// [`Self::all_dependencies`] for every rule.
    pub fn closure(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.index_map
            .keys()
            .map(|id| (id.clone(), self.all_dependencies(id)))
            .collect()
    }
}
