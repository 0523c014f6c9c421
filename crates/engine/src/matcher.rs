//! Event matching — associates one run's events to the declared nodes of a
//! (sub)graph and to each node's dependencies.
//!
//! The caller has already scoped the events to `(run_id, flow)`; matching
//! within the run is by `(flow, node_id)`.

use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::warn;

use crate::{Event, FlowGraph, NodeDef};

/// How a node's anchor occurrence is chosen when several events matched.
///
/// `EarliestTs` is the documented default; the enum exists so rerun-aware
/// policies can slot in without touching the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    #[default]
    EarliestTs,
}

/// The events resolved for one node.
#[derive(Debug, Clone, Default)]
pub struct NodeMatch {
    /// All events matched to this node, ascending by `ts`.
    pub events: Vec<Event>,
    /// Per dependency edge (declaration order, restricted to the graph):
    /// the dependency's matched events, ascending by `ts`.
    pub dep_events: Vec<(String, Vec<Event>)>,
}

impl NodeMatch {
    /// The occurrence that anchors timing and context computation.
    pub fn anchor(&self) -> Option<&Event> {
        self.events.first()
    }

    /// Ids of every event matched to this node.
    pub fn ev_ids(&self) -> Vec<String> {
        self.events.iter().map(|e| e.id.clone()).collect()
    }

    /// Ids of every event matched to this node's dependencies.
    pub fn upstream_ev_ids(&self) -> Vec<String> {
        self.dep_events
            .iter()
            .flat_map(|(_, evs)| evs.iter().map(|e| e.id.clone()))
            .collect()
    }

    /// The timestamp the timeout budget counts from: the latest anchor among
    /// the dependencies' matched events — the moment the prerequisite set
    /// completed. `None` when no dependency matched (roots, or a reduced
    /// graph that cut the ancestors away), in which case no timeout applies.
    pub fn dep_anchor_ts(&self) -> Option<i64> {
        self.dep_events
            .iter()
            .filter_map(|(_, evs)| evs.first().map(|e| e.ts))
            .max()
    }

    /// The `ctx` value visible to filter/validator scripts: `deps` holds one
    /// `{flow, id, data}` entry per matched dependency event anchor, in
    /// declaration order; `data` mirrors the single entry's payload when
    /// exactly one dependency matched.
    pub fn dep_ctx(&self) -> Value {
        let deps: Vec<Value> = self
            .dep_events
            .iter()
            .filter_map(|(_, evs)| evs.first())
            .map(|e| {
                json!({
                    "flow": e.flow,
                    "id": e.node_id,
                    "data": e.data,
                })
            })
            .collect();

        let single_data = match deps.as_slice() {
            [only] => Some(only["data"].clone()),
            _ => None,
        };

        let mut ctx = json!({ "deps": deps });
        if let Some(data) = single_data {
            ctx["data"] = data;
        }
        ctx
    }
}

/// Matches for every node of a (sub)graph.
#[derive(Debug, Default)]
pub struct MatchSet {
    matches: HashMap<String, NodeMatch>,
}

impl MatchSet {
    pub fn get(&self, node_id: &str) -> Option<&NodeMatch> {
        self.matches.get(node_id)
    }
}

/// Resolve `events` against the nodes present in `graph`.
///
/// `nodes` may cover the whole flow even when `graph` is a subgraph; only
/// graph members produce matches, and dependency edges are the graph's
/// restricted ones.
pub fn match_events(
    nodes: &[NodeDef],
    graph: &FlowGraph,
    events: &[Event],
    _policy: MatchPolicy,
) -> MatchSet {
    let defs: HashMap<&str, &NodeDef> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    // Bucket events by node id, keeping ascending-ts order per bucket.
    let mut by_node: HashMap<&str, Vec<Event>> = HashMap::new();
    for event in events {
        match defs.get(event.node_id.as_str()) {
            Some(def) if def.flow == event.flow => {
                if def.node_type != event.node_type {
                    warn!(
                        node_id = %event.node_id,
                        event_id = %event.id,
                        declared = %serde_json::to_string(&def.node_type).unwrap_or_default(),
                        emitted = %serde_json::to_string(&event.node_type).unwrap_or_default(),
                        "event type disagrees with node definition; matching anyway"
                    );
                }
                by_node.entry(event.node_id.as_str()).or_default().push(event.clone());
            }
            _ => {
                warn!(
                    node_id = %event.node_id,
                    event_id = %event.id,
                    "event does not correspond to any declared node; ignoring"
                );
            }
        }
    }
    for bucket in by_node.values_mut() {
        bucket.sort_by_key(|e| e.ts);
    }

    let mut matches: HashMap<String, NodeMatch> = HashMap::with_capacity(graph.len());

    for id in graph.node_ids() {
        let events = by_node.get(id.as_str()).cloned().unwrap_or_default();

        if events.len() > 1 {
            warn!(
                node_id = %id,
                count = events.len(),
                "multiple events matched one node in a single run; anchoring on the earliest"
            );
        }

        let dep_events = graph
            .dependencies(id)
            .iter()
            .map(|dep| {
                let evs = by_node.get(dep.as_str()).cloned().unwrap_or_default();
                (dep.clone(), evs)
            })
            .collect();

        matches.insert(id.clone(), NodeMatch { events, dep_events });
    }

    MatchSet { matches }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NodeDef, NodeType};
    use serde_json::json;

    fn node(id: &str, deps: &[&str]) -> NodeDef {
        let mut n = NodeDef::new("checkout", id);
        n.dep_ids = deps.iter().map(|d| (*d).to_owned()).collect();
        n
    }

    fn event(id: &str, node_id: &str, ts: i64, data: Value) -> Event {
        Event {
            id: id.into(),
            run_id: "run_1".into(),
            flow: "checkout".into(),
            node_id: node_id.into(),
            node_type: NodeType::Generic,
            data,
            ts,
            description: None,
            additional_meta: None,
        }
    }

    #[test]
    fn matches_by_node_id_within_the_flow() {
        let nodes = vec![node("a", &[]), node("b", &["a"])];
        let graph = FlowGraph::build(&nodes).unwrap();
        let events = vec![
            event("ev_a", "a", 100, json!({})),
            event("ev_b", "b", 200, json!({})),
        ];

        let set = match_events(&nodes, &graph, &events, MatchPolicy::EarliestTs);

        assert_eq!(set.get("a").unwrap().ev_ids(), vec!["ev_a"]);
        assert_eq!(set.get("b").unwrap().ev_ids(), vec!["ev_b"]);
        assert_eq!(set.get("b").unwrap().upstream_ev_ids(), vec!["ev_a"]);
    }

    #[test]
    fn unmatched_node_has_no_events() {
        let nodes = vec![node("a", &[]), node("b", &["a"])];
        let graph = FlowGraph::build(&nodes).unwrap();
        let events = vec![event("ev_a", "a", 100, json!({}))];

        let set = match_events(&nodes, &graph, &events, MatchPolicy::EarliestTs);

        assert!(set.get("b").unwrap().anchor().is_none());
        assert!(set.get("b").unwrap().ev_ids().is_empty());
    }

    #[test]
    fn multi_match_keeps_all_ids_and_anchors_on_earliest() {
        let nodes = vec![node("a", &[])];
        let graph = FlowGraph::build(&nodes).unwrap();
        // Deliberately out of ts order.
        let events = vec![
            event("ev_late", "a", 300, json!({"n": 2})),
            event("ev_early", "a", 100, json!({"n": 1})),
        ];

        let set = match_events(&nodes, &graph, &events, MatchPolicy::EarliestTs);
        let m = set.get("a").unwrap();

        assert_eq!(m.ev_ids(), vec!["ev_early", "ev_late"]);
        assert_eq!(m.anchor().unwrap().id, "ev_early");
    }

    #[test]
    fn dep_ctx_follows_declaration_order_and_sets_convenience_data() {
        let nodes = vec![node("x", &[]), node("y", &[]), node("z", &["x", "y"])];
        let graph = FlowGraph::build(&nodes).unwrap();
        let events = vec![
            event("ev_y", "y", 50, json!({"from": "y"})),
            event("ev_x", "x", 80, json!({"from": "x"})),
            event("ev_z", "z", 100, json!({})),
        ];

        let set = match_events(&nodes, &graph, &events, MatchPolicy::EarliestTs);
        let ctx = set.get("z").unwrap().dep_ctx();

        // Declaration order x, y — not event arrival order.
        assert_eq!(ctx["deps"][0]["id"], "x");
        assert_eq!(ctx["deps"][1]["id"], "y");
        assert_eq!(ctx["deps"][0]["data"]["from"], "x");
        // Two deps matched, so no single-dep convenience field.
        assert!(ctx.get("data").is_none());
    }

    #[test]
    fn single_dep_ctx_exposes_convenience_data() {
        let nodes = vec![node("a", &[]), node("b", &["a"])];
        let graph = FlowGraph::build(&nodes).unwrap();
        let events = vec![
            event("ev_a", "a", 10, json!({"user_id": "user_123"})),
            event("ev_b", "b", 20, json!({})),
        ];

        let set = match_events(&nodes, &graph, &events, MatchPolicy::EarliestTs);
        let ctx = set.get("b").unwrap().dep_ctx();

        assert_eq!(ctx["data"]["user_id"], "user_123");
        assert_eq!(ctx["deps"][0]["data"]["user_id"], "user_123");
    }

    #[test]
    fn dep_anchor_is_the_latest_dependency_anchor() {
        let nodes = vec![node("x", &[]), node("y", &[]), node("z", &["x", "y"])];
        let graph = FlowGraph::build(&nodes).unwrap();
        let events = vec![
            event("ev_x", "x", 100, json!({})),
            event("ev_y", "y", 400, json!({})),
            event("ev_z", "z", 500, json!({})),
        ];

        let set = match_events(&nodes, &graph, &events, MatchPolicy::EarliestTs);
        assert_eq!(set.get("z").unwrap().dep_anchor_ts(), Some(400));
    }

    #[test]
    fn type_mismatch_still_matches() {
        let mut trigger = node("a", &[]);
        trigger.node_type = NodeType::Trigger;
        let nodes = vec![trigger];
        let graph = FlowGraph::build(&nodes).unwrap();
        // Event emitted as generic against a trigger definition.
        let events = vec![event("ev_a", "a", 100, json!({}))];

        let set = match_events(&nodes, &graph, &events, MatchPolicy::EarliestTs);
        assert_eq!(set.get("a").unwrap().ev_ids(), vec!["ev_a"]);
    }

    #[test]
    fn subgraph_matching_drops_out_of_graph_dependency_context() {
        let nodes = vec![node("a", &[]), node("b", &["a"]), node("c", &["b"])];
        let graph = FlowGraph::build(&nodes).unwrap();
        let sub = graph.subgraph("b").unwrap();
        let events = vec![
            event("ev_a", "a", 10, json!({})),
            event("ev_b", "b", 20, json!({})),
            event("ev_c", "c", 30, json!({})),
        ];

        let set = match_events(&nodes, &sub, &events, MatchPolicy::EarliestTs);

        // `a` is outside the reduced graph entirely.
        assert!(set.get("a").is_none());
        // `b` lost its dependency edge, so no upstream events and no anchor.
        let b = set.get("b").unwrap();
        assert!(b.upstream_ev_ids().is_empty());
        assert_eq!(b.dep_anchor_ts(), None);
    }
}
