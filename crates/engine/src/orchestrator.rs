//! The evaluation orchestrator.
//!
//! `Orchestrator` is the only component touching the storage port:
//! 1. Fetches node definitions and run events (two independent reads,
//!    issued concurrently).
//! 2. Builds and structurally validates the DAG; optionally reduces it to a
//!    start node's downstream closure.
//! 3. Computes topological layers.
//! 4. Per layer, matches events and derives each node's status; nodes within
//!    one layer are validated concurrently and stitched back in definition
//!    order.
//! 5. Aggregates the overall status and returns the full evidence trail.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use eval::Evaluator;

use crate::matcher::{self, MatchPolicy, NodeMatch};
use crate::{
    layering, validator, BaseEvalOutput, EngineError, ExecInfo, FlowGraph, NodeDef, RunStatus,
    Storage,
};

/// Wall-clock bound for a single node's expression evaluations.
pub const DEFAULT_NODE_EVAL_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Per-call knobs for an evaluation.
#[derive(Clone)]
pub struct EvalOptions {
    /// Restrict evaluation to the downstream closure of this node.
    pub start_node_id: Option<String>,
    /// Caller-supplied cancellation signal. On cancellation, in-flight node
    /// evaluations are abandoned and unresolved nodes are reported as
    /// `cancelled` — never silently dropped.
    pub cancel: CancellationToken,
    /// Per-node expression-evaluation bound (independent of any business
    /// `timeout_ms` condition).
    pub node_eval_timeout: Duration,
    /// Multi-match anchoring policy.
    pub policy: MatchPolicy,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            start_node_id: None,
            cancel: CancellationToken::new(),
            node_eval_timeout: DEFAULT_NODE_EVAL_TIMEOUT,
            policy: MatchPolicy::default(),
        }
    }
}

impl EvalOptions {
    pub fn starting_at(start_node_id: impl Into<String>) -> Self {
        Self {
            start_node_id: Some(start_node_id.into()),
            ..Self::default()
        }
    }
}

/// Composes graph construction, layering, matching, and validation into a
/// full run verdict. Stateless between calls: every evaluation is a pure
/// function of the two storage reads.
pub struct Orchestrator {
    storage: Arc<dyn Storage>,
    evaluator: Arc<Evaluator>,
}

impl Orchestrator {
    pub fn new(storage: Arc<dyn Storage>, evaluator: Arc<Evaluator>) -> Self {
        Self { storage, evaluator }
    }

    /// Evaluate one `(run_id, flow)` execution instance.
    #[instrument(skip(self, opts), fields(run_id = %run_id, flow = %flow))]
    pub async fn eval_flow_run(
        &self,
        run_id: &str,
        flow: &str,
        opts: EvalOptions,
    ) -> Result<BaseEvalOutput, EngineError> {
        let started = Instant::now();

        let (nodes, events) = tokio::try_join!(
            self.storage.get_nodes_by_flow(flow),
            self.storage.get_events_by_run(run_id, flow),
        )?;

        if nodes.is_empty() {
            return Err(EngineError::UnknownFlow { flow: flow.to_owned() });
        }

        let full_graph = FlowGraph::build(&nodes)?;
        let graph = match &opts.start_node_id {
            Some(start) => full_graph.subgraph(start)?,
            None => full_graph,
        };

        let layered = layering::layers(&graph)?;
        let matches = matcher::match_events(&nodes, &graph, &events, opts.policy);
        let defs: HashMap<&str, &NodeDef> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

        let mut statuses: HashMap<String, RunStatus> = HashMap::with_capacity(graph.len());
        let mut exec_info: Vec<ExecInfo> = Vec::with_capacity(graph.len());
        let mut cancelled = false;

        for layer in &layered {
            if cancelled || opts.cancel.is_cancelled() {
                cancelled = true;
                for id in layer {
                    exec_info.push(cancelled_info(id, &graph, &matches));
                    statuses.insert(id.clone(), RunStatus::Cancelled);
                }
                continue;
            }

            // Nodes within one layer are independent by construction, so
            // they fan out concurrently; join_all preserves definition order
            // regardless of completion order.
            let layer_futures: Vec<_> = layer
                .iter()
                .map(|id| {
                    let def = defs[id.as_str()];
                    let matched = matches.get(id).expect("every graph node has a match entry");
                    validator::validate_node(
                        def,
                        matched,
                        &graph,
                        &statuses,
                        &self.evaluator,
                        opts.node_eval_timeout,
                    )
                })
                .collect();

            let results = tokio::select! {
                results = future::join_all(layer_futures) => Some(results),
                _ = opts.cancel.cancelled() => None,
            };

            match results {
                Some(results) => {
                    for info in results {
                        statuses.insert(info.node_id.clone(), info.status);
                        exec_info.push(info);
                    }
                }
                None => {
                    cancelled = true;
                    for id in layer {
                        exec_info.push(cancelled_info(id, &graph, &matches));
                        statuses.insert(id.clone(), RunStatus::Cancelled);
                    }
                }
            }
        }

        let status = aggregate(&exec_info);
        let ev_ids = touched_event_ids(&exec_info);

        info!(
            status = %status,
            nodes = exec_info.len(),
            events = ev_ids.len(),
            "flow run evaluated"
        );

        Ok(BaseEvalOutput {
            status,
            elapsed_ns: started.elapsed().as_nanos() as i64,
            graph: graph.snapshot(),
            exec_info,
            ev_ids,
        })
    }

    /// Legacy entry point: resolve an event to its run and delegate.
    ///
    /// With `whole_graph` the full flow is evaluated; otherwise evaluation is
    /// restricted to the subgraph rooted at the event's node.
    #[instrument(skip(self), fields(event_id = %event_id))]
    pub async fn eval_event(
        &self,
        event_id: &str,
        whole_graph: bool,
    ) -> Result<BaseEvalOutput, EngineError> {
        let event = self
            .storage
            .get_event(event_id)
            .await?
            .ok_or_else(|| EngineError::EventNotFound {
                event_id: event_id.to_owned(),
            })?;

        let mut opts = EvalOptions::default();
        if !whole_graph {
            opts.start_node_id = Some(event.node_id.clone());
        }

        self.eval_flow_run(&event.run_id, &event.flow, opts).await
    }
}

fn cancelled_info(node_id: &str, graph: &FlowGraph, matches: &matcher::MatchSet) -> ExecInfo {
    let matched = matches.get(node_id).cloned().unwrap_or_else(NodeMatch::default);
    ExecInfo {
        node_id: node_id.to_owned(),
        dep_node_ids: graph.dependencies(node_id).to_vec(),
        status: RunStatus::Cancelled,
        message: Some("evaluation cancelled".into()),
        error: None,
        elapsed_ns: 0,
        ev_ids: matched.ev_ids(),
        upstream_ev_ids: matched.upstream_ev_ids(),
    }
}

/// Worst-status aggregation over the evaluated nodes:
/// failed/error/timed_out ⇒ `failed`; else cancellation wins; else anything
/// unresolved keeps the run `pending`; an entirely-skipped set is `skipped`;
/// otherwise `passed`. An empty graph stays at the wire default, `pending`.
fn aggregate(exec_info: &[ExecInfo]) -> RunStatus {
    if exec_info.is_empty() {
        return RunStatus::Pending;
    }

    let has = |s: RunStatus| exec_info.iter().any(|i| i.status == s);

    if has(RunStatus::Failed) || has(RunStatus::Error) || has(RunStatus::TimedOut) {
        RunStatus::Failed
    } else if has(RunStatus::Cancelled) {
        RunStatus::Cancelled
    } else if has(RunStatus::Pending) {
        RunStatus::Pending
    } else if exec_info.iter().all(|i| i.status == RunStatus::Skipped) {
        RunStatus::Skipped
    } else {
        RunStatus::Passed
    }
}

/// Every event id touched by the evaluation, first-touch order, deduplicated.
fn touched_event_ids(exec_info: &[ExecInfo]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for info in exec_info {
        for id in info.ev_ids.iter().chain(info.upstream_ev_ids.iter()) {
            if seen.insert(id.clone()) {
                out.push(id.clone());
            }
        }
    }
    out
}
