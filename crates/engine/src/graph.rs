//! Flow graph construction and structural validation — run this before
//! layering or evaluating a run.
//!
//! Rules enforced:
//! 1. Node IDs must be unique within the flow.
//! 2. Every `dep_ids` entry must reference a node in the same flow.
//! 3. The dependency relation must be acyclic.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::{EngineError, NodeDef};

const WHITE: u8 = 0;
const GRAY: u8 = 1;
const BLACK: u8 = 2;

/// The dependency DAG of one flow.
///
/// Holds forward adjacency (id → dependents) and the dependency lookup
/// (id → dep_ids). Iteration order everywhere follows node definition order,
/// so layering and output snapshots are deterministic.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    /// Node ids in definition order.
    order: Vec<String>,
    /// id → dependents (nodes that list this id in their `dep_ids`).
    adjacency: HashMap<String, Vec<String>>,
    /// id → dep_ids, restricted to nodes present in this graph.
    deps: HashMap<String, Vec<String>>,
}

impl FlowGraph {
    /// Build and structurally validate the graph for a set of node
    /// definitions.
    ///
    /// # Errors
    /// - [`EngineError::DuplicateNode`] if two nodes share an ID.
    /// - [`EngineError::DanglingDependency`] if a `dep_ids` entry is
    ///   unresolvable.
    /// - [`EngineError::Cycle`] if the dependency relation is not acyclic;
    ///   the error path names exactly the nodes on the cycle.
    pub fn build(nodes: &[NodeDef]) -> Result<Self, EngineError> {
        let mut order: Vec<String> = Vec::with_capacity(nodes.len());
        let mut seen: HashSet<&str> = HashSet::with_capacity(nodes.len());

        for node in nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(EngineError::DuplicateNode {
                    flow: node.flow.clone(),
                    id: node.id.clone(),
                });
            }
            order.push(node.id.clone());
        }

        let mut adjacency: HashMap<String, Vec<String>> = HashMap::with_capacity(nodes.len());
        let mut deps: HashMap<String, Vec<String>> = HashMap::with_capacity(nodes.len());

        for node in nodes {
            adjacency.entry(node.id.clone()).or_default();
            deps.insert(node.id.clone(), node.dep_ids.clone());
        }

        for node in nodes {
            for dep in &node.dep_ids {
                if !seen.contains(dep.as_str()) {
                    return Err(EngineError::DanglingDependency {
                        node: node.id.clone(),
                        missing_dep: dep.clone(),
                    });
                }
                adjacency
                    .get_mut(dep)
                    .expect("dep existence checked above")
                    .push(node.id.clone());
            }
        }

        let graph = Self {
            order,
            adjacency,
            deps,
        };

        if let Some(path) = graph.find_cycle() {
            return Err(EngineError::Cycle { path });
        }

        Ok(graph)
    }

    /// The downstream closure of `start_id`, inclusive, with edges restricted
    /// to the reduced node set.
    ///
    /// Ancestors of `start_id` are excluded, so conditions referencing events
    /// before `start_id` are unavailable in the reduced graph — this answers
    /// "evaluate from node X onward".
    pub fn subgraph(&self, start_id: &str) -> Result<Self, EngineError> {
        if !self.deps.contains_key(start_id) {
            return Err(EngineError::UnknownStartNode {
                node: start_id.to_owned(),
            });
        }

        let mut reachable: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        reachable.insert(start_id);
        queue.push_back(start_id);

        while let Some(current) = queue.pop_front() {
            for dependent in &self.adjacency[current] {
                if reachable.insert(dependent.as_str()) {
                    queue.push_back(dependent);
                }
            }
        }

        let order: Vec<String> = self
            .order
            .iter()
            .filter(|id| reachable.contains(id.as_str()))
            .cloned()
            .collect();

        let adjacency = order
            .iter()
            .map(|id| {
                let dependents = self.adjacency[id]
                    .iter()
                    .filter(|d| reachable.contains(d.as_str()))
                    .cloned()
                    .collect();
                (id.clone(), dependents)
            })
            .collect();

        let deps = order
            .iter()
            .map(|id| {
                let restricted = self.deps[id]
                    .iter()
                    .filter(|d| reachable.contains(d.as_str()))
                    .cloned()
                    .collect();
                (id.clone(), restricted)
            })
            .collect();

        Ok(Self {
            order,
            adjacency,
            deps,
        })
    }

    /// Node ids in definition order.
    pub fn node_ids(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, id: &str) -> bool {
        self.deps.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Dependents of `id` (restricted to this graph).
    pub fn dependents(&self, id: &str) -> &[String] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Dependencies of `id` (restricted to this graph).
    pub fn dependencies(&self, id: &str) -> &[String] {
        self.deps.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Adjacency snapshot (id → dependents) for output and visualization.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<String>> {
        self.order
            .iter()
            .map(|id| (id.clone(), self.adjacency[id].clone()))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Cycle detection: iterative DFS coloring over the dependency relation,
    // so the error can name the offending path (and deep graphs cannot blow
    // the call stack). A cycle of length k yields a path of exactly k nodes.
    // -----------------------------------------------------------------------

    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut color: HashMap<&str, u8> =
            self.order.iter().map(|id| (id.as_str(), WHITE)).collect();

        for start in &self.order {
            if color[start.as_str()] != WHITE {
                continue;
            }

            // Stack of (node, index of the next dependency to visit).
            let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];
            color.insert(start.as_str(), GRAY);

            while let Some(&(node, idx)) = stack.last() {
                let deps = &self.deps[node];

                if idx < deps.len() {
                    stack.last_mut().expect("stack is non-empty").1 += 1;
                    let dep = deps[idx].as_str();

                    match color[dep] {
                        GRAY => {
                            // Back-edge: the cycle is the stack suffix
                            // starting at `dep`.
                            let pos = stack.iter().position(|(n, _)| *n == dep).unwrap_or(0);
                            return Some(
                                stack[pos..].iter().map(|(n, _)| (*n).to_owned()).collect(),
                            );
                        }
                        WHITE => {
                            color.insert(dep, GRAY);
                            stack.push((dep, 0));
                        }
                        _ => {}
                    }
                } else {
                    color.insert(node, BLACK);
                    stack.pop();
                }
            }
        }

        None
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, deps: &[&str]) -> NodeDef {
        let mut n = NodeDef::new("test", id);
        n.dep_ids = deps.iter().map(|d| (*d).to_owned()).collect();
        n
    }

    #[test]
    fn linear_graph_builds_with_forward_adjacency() {
        // a <- b <- c  (b depends on a, c depends on b)
        let nodes = vec![node("a", &[]), node("b", &["a"]), node("c", &["b"])];
        let graph = FlowGraph::build(&nodes).expect("should be valid");

        assert_eq!(graph.node_ids(), &["a", "b", "c"]);
        assert_eq!(graph.dependents("a"), &["b"]);
        assert_eq!(graph.dependents("c"), &[] as &[String]);
        assert_eq!(graph.dependencies("c"), &["b"]);
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let nodes = vec![node("a", &[]), node("a", &[])];
        assert!(matches!(
            FlowGraph::build(&nodes),
            Err(EngineError::DuplicateNode { id, .. }) if id == "a"
        ));
    }

    #[test]
    fn dangling_dependency_is_rejected() {
        let nodes = vec![node("a", &[]), node("b", &["ghost"])];
        assert!(matches!(
            FlowGraph::build(&nodes),
            Err(EngineError::DanglingDependency { node, missing_dep })
                if node == "b" && missing_dep == "ghost"
        ));
    }

    #[test]
    fn cycle_of_length_three_names_all_three_nodes() {
        let nodes = vec![node("a", &["c"]), node("b", &["a"]), node("c", &["b"])];
        match FlowGraph::build(&nodes) {
            Err(EngineError::Cycle { path }) => {
                assert_eq!(path.len(), 3);
                for id in ["a", "b", "c"] {
                    assert!(path.contains(&id.to_owned()), "missing {id} in {path:?}");
                }
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn self_loop_is_a_cycle_of_length_one() {
        let nodes = vec![node("a", &["a"])];
        match FlowGraph::build(&nodes) {
            Err(EngineError::Cycle { path }) => assert_eq!(path, vec!["a"]),
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn diamond_is_valid() {
        //   a
        //  / \
        // b   c
        //  \ /
        //   d
        let nodes = vec![
            node("a", &[]),
            node("b", &["a"]),
            node("c", &["a"]),
            node("d", &["b", "c"]),
        ];
        let graph = FlowGraph::build(&nodes).expect("diamond should be valid");
        assert_eq!(graph.dependents("a"), &["b", "c"]);
        assert_eq!(graph.dependencies("d"), &["b", "c"]);
    }

    #[test]
    fn subgraph_is_the_downstream_closure() {
        // a -> b -> d,  a -> c,  e isolated
        let nodes = vec![
            node("a", &[]),
            node("b", &["a"]),
            node("c", &["a"]),
            node("d", &["b"]),
            node("e", &[]),
        ];
        let graph = FlowGraph::build(&nodes).unwrap();
        let sub = graph.subgraph("b").unwrap();

        assert_eq!(sub.node_ids(), &["b", "d"]);
        // b's dependency on a is outside the subgraph and must be dropped.
        assert_eq!(sub.dependencies("b"), &[] as &[String]);
        assert_eq!(sub.dependents("b"), &["d"]);
        assert!(!sub.contains("a"));
        assert!(!sub.contains("e"));
    }

    #[test]
    fn subgraph_from_unknown_node_is_rejected() {
        let nodes = vec![node("a", &[])];
        let graph = FlowGraph::build(&nodes).unwrap();
        assert!(matches!(
            graph.subgraph("ghost"),
            Err(EngineError::UnknownStartNode { node }) if node == "ghost"
        ));
    }

    #[test]
    fn snapshot_lists_every_node() {
        let nodes = vec![node("a", &[]), node("b", &["a"])];
        let graph = FlowGraph::build(&nodes).unwrap();
        let snap = graph.snapshot();

        assert_eq!(snap.len(), 2);
        assert_eq!(snap["a"], vec!["b"]);
        assert!(snap["b"].is_empty());
    }
}
