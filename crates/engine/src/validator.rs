//! Per-node status derivation.
//!
//! Nodes are validated strictly in layer order; a node sees the statuses of
//! every dependency before its own derivation runs. The derivation order is:
//! upstream skip propagation → unresolved (pending) → business timeout →
//! filter → validator → passed. Skipped nodes never run their
//! filter/validator/timeout checks.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;

use eval::{Evaluator, Expr};

use crate::matcher::NodeMatch;
use crate::{ExecInfo, FlowGraph, NodeDef, RunStatus};

/// Inclusive timeout boundary: an event landing exactly on the budget
/// passes; only a strictly greater elapsed time is late.
pub(crate) fn timeout_exceeded(dep_anchor_ts: i64, event_ts: i64, timeout_ms: i64) -> bool {
    let budget_ns = timeout_ms.saturating_mul(1_000_000);
    event_ts.saturating_sub(dep_anchor_ts) > budget_ns
}

/// Outcome of one bounded expression evaluation.
enum EvalOutcome {
    Verdict(bool),
    Error(String),
}

/// Evaluate `expr` with a wall-clock bound so a pathological script cannot
/// stall the run. Exceeding the bound is an evaluation *error*, never a
/// business `timed_out`.
async fn eval_bounded(
    evaluator: &Evaluator,
    expr: &Expr,
    data: &Value,
    ctx: &Value,
    limit: Duration,
) -> EvalOutcome {
    match tokio::time::timeout(limit, evaluator.evaluate(expr, data, ctx)).await {
        Ok(Ok(verdict)) => EvalOutcome::Verdict(verdict),
        Ok(Err(err)) => EvalOutcome::Error(err.to_string()),
        Err(_) => EvalOutcome::Error(format!(
            "expression evaluation exceeded the {}ms per-node limit",
            limit.as_millis()
        )),
    }
}

/// Derive the status of one node from its matched events, the statuses of
/// its (graph-restricted) dependencies, and its declared conditions.
pub async fn validate_node(
    node: &NodeDef,
    matched: &NodeMatch,
    graph: &FlowGraph,
    upstream: &HashMap<String, RunStatus>,
    evaluator: &Evaluator,
    eval_timeout: Duration,
) -> ExecInfo {
    let started = Instant::now();
    let dep_node_ids: Vec<String> = graph.dependencies(&node.id).to_vec();

    let mut info = ExecInfo {
        node_id: node.id.clone(),
        dep_node_ids,
        status: RunStatus::Pending,
        message: None,
        error: None,
        elapsed_ns: 0,
        ev_ids: matched.ev_ids(),
        upstream_ev_ids: matched.upstream_ev_ids(),
    };

    // 1. Upstream failure/skip propagates transitively; nothing else runs.
    let blocked = info
        .dep_node_ids
        .iter()
        .find(|dep| upstream.get(dep.as_str()).is_some_and(|s| s.blocks_descendants()))
        .cloned();

    if let Some(dep) = blocked {
        let status = upstream[dep.as_str()];
        info.status = RunStatus::Skipped;
        info.message = Some(format!("skipped due to upstream node '{dep}' ({status})"));
        info.elapsed_ns = started.elapsed().as_nanos() as i64;
        return info;
    }

    // 2. Unresolved: no occurrence for this node yet.
    let Some(anchor) = matched.anchor() else {
        info.message = Some("no event matched".into());
        info.elapsed_ns = started.elapsed().as_nanos() as i64;
        return info;
    };

    // 3. Business timeout, measured between independently-produced event
    //    timestamps. Without a dependency anchor (roots, reduced graphs)
    //    there is nothing to count from and the condition is vacuous.
    if let (Some(timeout_ms), Some(dep_ts)) = (node.timeout_ms(), matched.dep_anchor_ts()) {
        if timeout_exceeded(dep_ts, anchor.ts, timeout_ms) {
            let elapsed_ms = anchor.ts.saturating_sub(dep_ts) / 1_000_000;
            info.status = RunStatus::TimedOut;
            info.message = Some(format!(
                "event arrived {elapsed_ms}ms after its dependencies (budget {timeout_ms}ms)"
            ));
            info.elapsed_ns = started.elapsed().as_nanos() as i64;
            return info;
        }
    }

    let ctx = matched.dep_ctx();

    // 4. Filter: a false verdict excludes the occurrence from validation —
    //    a skip, not a failure.
    if let Some(filter) = &node.filter {
        match eval_bounded(evaluator, filter, &anchor.data, &ctx, eval_timeout).await {
            EvalOutcome::Verdict(false) => {
                info.status = RunStatus::Skipped;
                info.message = Some("filter excluded this occurrence from validation".into());
                info.elapsed_ns = started.elapsed().as_nanos() as i64;
                return info;
            }
            EvalOutcome::Error(err) => {
                info.status = RunStatus::Error;
                info.error = Some(format!("filter: {err}"));
                info.elapsed_ns = started.elapsed().as_nanos() as i64;
                return info;
            }
            EvalOutcome::Verdict(true) => {}
        }
    }

    // 5./6. Validator: a clean false is a genuine business failure; a script
    //       error (or unsupported engine) is an evaluation error.
    if let Some(validator) = &node.validator {
        match eval_bounded(evaluator, validator, &anchor.data, &ctx, eval_timeout).await {
            EvalOutcome::Verdict(false) => {
                info.status = RunStatus::Failed;
                info.message = Some("validator evaluated to false".into());
                info.elapsed_ns = started.elapsed().as_nanos() as i64;
                return info;
            }
            EvalOutcome::Error(err) => {
                info.status = RunStatus::Error;
                info.error = Some(format!("validator: {err}"));
                info.elapsed_ns = started.elapsed().as_nanos() as i64;
                return info;
            }
            EvalOutcome::Verdict(true) => {}
        }
    }

    // 7. Everything held.
    info.status = RunStatus::Passed;
    info.elapsed_ns = started.elapsed().as_nanos() as i64;
    info
}
