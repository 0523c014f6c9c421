//! Topological layering (Kahn's algorithm).
//!
//! Layer 0 is exactly the set of nodes with no dependencies inside the
//! graph; every later layer holds the nodes whose dependencies were all
//! peeled in earlier layers. The layering drives both evaluation order and
//! external visualization, so the order within a layer is stable definition
//! order, never hash order.

use std::collections::HashMap;

use crate::{EngineError, FlowGraph};

/// Compute the topological layers of `graph`.
///
/// # Errors
/// [`EngineError::Cycle`] if nodes remain after the zero-in-degree frontier
/// drains. `FlowGraph::build` already rejects cycles, so this is a defensive
/// re-check for graphs assembled through other paths.
pub fn layers(graph: &FlowGraph) -> Result<Vec<Vec<String>>, EngineError> {
    let mut in_degree: HashMap<&str, usize> = graph
        .node_ids()
        .iter()
        .map(|id| (id.as_str(), graph.dependencies(id).len()))
        .collect();

    let mut remaining: Vec<&str> = graph.node_ids().iter().map(String::as_str).collect();
    let mut result: Vec<Vec<String>> = Vec::new();

    while !remaining.is_empty() {
        // Peel the current zero-in-degree frontier in definition order.
        let frontier: Vec<&str> = remaining
            .iter()
            .copied()
            .filter(|id| in_degree[id] == 0)
            .collect();

        if frontier.is_empty() {
            return Err(EngineError::Cycle {
                path: remaining.iter().map(|s| (*s).to_owned()).collect(),
            });
        }

        for id in &frontier {
            for dependent in graph.dependents(id) {
                if let Some(d) = in_degree.get_mut(dependent.as_str()) {
                    *d -= 1;
                }
            }
        }

        remaining.retain(|id| !frontier.contains(id));
        result.push(frontier.into_iter().map(str::to_owned).collect());
    }

    Ok(result)
}

/// The layer index of every node (node id → layer).
pub fn layer_index(layered: &[Vec<String>]) -> HashMap<&str, usize> {
    layered
        .iter()
        .enumerate()
        .flat_map(|(i, layer)| layer.iter().map(move |id| (id.as_str(), i)))
        .collect()
}
