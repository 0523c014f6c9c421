//! End-to-end engine tests: storage port + graph + layering + matching +
//! validation, driven through the orchestrator with in-memory storage and the
//! mock expression engine — no database, no interpreter.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use engine::models::Condition;
use engine::{
    EngineError, EvalOptions, Event, MemoryStorage, NodeDef, NodeType, Orchestrator, RunStatus,
};
use eval::mock::{CallLog, MockEngine};
use eval::{Evaluator, Expr};

const SECOND_NS: i64 = 1_000_000_000;

fn node(flow: &str, id: &str, deps: &[&str]) -> NodeDef {
    let mut n = NodeDef::new(flow, id);
    n.dep_ids = deps.iter().map(|d| (*d).to_owned()).collect();
    n
}

fn with_timeout(mut n: NodeDef, timeout_ms: i64) -> NodeDef {
    n.conditions = vec![Condition {
        timeout_ms: Some(timeout_ms),
    }];
    n
}

fn event(id: &str, flow: &str, node_id: &str, run_id: &str, ts: i64, data: Value) -> Event {
    Event {
        id: id.into(),
        run_id: run_id.into(),
        flow: flow.into(),
        node_id: node_id.into(),
        node_type: NodeType::Generic,
        data,
        ts,
        description: None,
        additional_meta: None,
    }
}

/// The checkout flow used by several scenarios:
/// cart_created → payment_processed (timeout 5s) → order_completed.
fn checkout_nodes() -> Vec<NodeDef> {
    vec![
        node("checkout", "cart_created", &[]),
        with_timeout(
            node("checkout", "payment_processed", &["cart_created"]),
            5_000,
        ),
        node("checkout", "order_completed", &["payment_processed"]),
    ]
}

fn orchestrator_with(storage: MemoryStorage) -> (Orchestrator, CallLog) {
    let mock = MockEngine::new();
    let log = mock.calls();
    let evaluator = Evaluator::new().register("mock", mock);
    (
        Orchestrator::new(Arc::new(storage), Arc::new(evaluator)),
        log,
    )
}

fn statuses(output: &engine::BaseEvalOutput) -> Vec<(&str, RunStatus)> {
    output
        .exec_info
        .iter()
        .map(|i| (i.node_id.as_str(), i.status))
        .collect()
}

// ============================================================
// Scenario A: on-time events all pass
// ============================================================

#[tokio::test]
async fn checkout_run_with_on_time_events_passes() {
    let storage = MemoryStorage::new();
    storage.add_nodes(checkout_nodes());
    storage.add_events([
        event("ev_cart", "checkout", "cart_created", "run_1", 0, json!({})),
        event(
            "ev_pay",
            "checkout",
            "payment_processed",
            "run_1",
            2 * SECOND_NS,
            json!({}),
        ),
        event(
            "ev_done",
            "checkout",
            "order_completed",
            "run_1",
            4 * SECOND_NS,
            json!({}),
        ),
    ]);

    let (orch, _) = orchestrator_with(storage);
    let output = orch
        .eval_flow_run("run_1", "checkout", EvalOptions::default())
        .await
        .unwrap();

    assert_eq!(output.status, RunStatus::Passed);
    assert_eq!(
        statuses(&output),
        vec![
            ("cart_created", RunStatus::Passed),
            ("payment_processed", RunStatus::Passed),
            ("order_completed", RunStatus::Passed),
        ]
    );
    assert_eq!(output.ev_ids, vec!["ev_cart", "ev_pay", "ev_done"]);
    assert_eq!(output.graph["cart_created"], vec!["payment_processed"]);
}

// ============================================================
// Scenario B: a late payment times out and skips downstream
// ============================================================

#[tokio::test]
async fn late_payment_times_out_and_skips_descendants() {
    let storage = MemoryStorage::new();
    storage.add_nodes(checkout_nodes());
    storage.add_events([
        event("ev_cart", "checkout", "cart_created", "run_1", 0, json!({})),
        event(
            "ev_pay",
            "checkout",
            "payment_processed",
            "run_1",
            10 * SECOND_NS,
            json!({}),
        ),
        event(
            "ev_done",
            "checkout",
            "order_completed",
            "run_1",
            11 * SECOND_NS,
            json!({}),
        ),
    ]);

    let (orch, _) = orchestrator_with(storage);
    let output = orch
        .eval_flow_run("run_1", "checkout", EvalOptions::default())
        .await
        .unwrap();

    assert_eq!(output.status, RunStatus::Failed);
    assert_eq!(
        statuses(&output),
        vec![
            ("cart_created", RunStatus::Passed),
            ("payment_processed", RunStatus::TimedOut),
            ("order_completed", RunStatus::Skipped),
        ]
    );
}

// ============================================================
// Timeout boundary: exactly on budget passes (inclusive)
// ============================================================

#[tokio::test]
async fn event_exactly_on_the_timeout_budget_passes() {
    let storage = MemoryStorage::new();
    storage.add_nodes(vec![
        node("f", "a", &[]),
        with_timeout(node("f", "b", &["a"]), 5_000),
    ]);
    storage.add_events([
        event("ev_a", "f", "a", "run_1", 0, json!({})),
        // 5000ms * 1e6 = exactly the budget.
        event("ev_b", "f", "b", "run_1", 5_000 * 1_000_000, json!({})),
    ]);

    let (orch, _) = orchestrator_with(storage);
    let output = orch
        .eval_flow_run("run_1", "f", EvalOptions::default())
        .await
        .unwrap();

    assert_eq!(output.status, RunStatus::Passed);
}

#[tokio::test]
async fn event_one_nanosecond_past_the_budget_times_out() {
    let storage = MemoryStorage::new();
    storage.add_nodes(vec![
        node("f", "a", &[]),
        with_timeout(node("f", "b", &["a"]), 5_000),
    ]);
    storage.add_events([
        event("ev_a", "f", "a", "run_1", 0, json!({})),
        event("ev_b", "f", "b", "run_1", 5_000 * 1_000_000 + 1, json!({})),
    ]);

    let (orch, _) = orchestrator_with(storage);
    let output = orch
        .eval_flow_run("run_1", "f", EvalOptions::default())
        .await
        .unwrap();

    assert_eq!(output.exec_info[1].status, RunStatus::TimedOut);
    assert_eq!(output.status, RunStatus::Failed);
}

// ============================================================
// Scenario C: failing validator
// ============================================================

#[tokio::test]
async fn false_validator_fails_the_node_and_the_run() {
    let mut check = node("billing", "total_check", &["invoice"]);
    check.node_type = NodeType::Assert;
    check.validator = Some(Expr::new("mock", "false"));

    let storage = MemoryStorage::new();
    storage.add_nodes(vec![node("billing", "invoice", &[]), check]);
    storage.add_events([
        event("ev_inv", "billing", "invoice", "run_1", 0, json!({})),
        event(
            "ev_chk",
            "billing",
            "total_check",
            "run_1",
            SECOND_NS,
            json!({"total": 120}),
        ),
    ]);

    let (orch, _) = orchestrator_with(storage);
    let output = orch
        .eval_flow_run("run_1", "billing", EvalOptions::default())
        .await
        .unwrap();

    assert_eq!(output.status, RunStatus::Failed);
    assert_eq!(output.exec_info[1].status, RunStatus::Failed);
    assert_eq!(
        output.exec_info[1].message.as_deref(),
        Some("validator evaluated to false")
    );
}

// ============================================================
// Scenario D: filter-skip is not a failure and does not fail the run
// ============================================================

#[tokio::test]
async fn filter_skip_propagates_as_skip_but_run_still_passes() {
    let mut gated = node("f", "gated", &["root"]);
    gated.filter = Some(Expr::new("mock", "false"));

    let storage = MemoryStorage::new();
    storage.add_nodes(vec![
        node("f", "root", &[]),
        gated,
        node("f", "downstream", &["gated"]),
    ]);
    storage.add_events([
        event("ev_root", "f", "root", "run_1", 0, json!({})),
        event("ev_gated", "f", "gated", "run_1", SECOND_NS, json!({})),
        event("ev_down", "f", "downstream", "run_1", 2 * SECOND_NS, json!({})),
    ]);

    let (orch, _) = orchestrator_with(storage);
    let output = orch
        .eval_flow_run("run_1", "f", EvalOptions::default())
        .await
        .unwrap();

    assert_eq!(
        statuses(&output),
        vec![
            ("root", RunStatus::Passed),
            ("gated", RunStatus::Skipped),
            ("downstream", RunStatus::Skipped),
        ]
    );
    // Unlike a validation failure, a filter exclusion leaves the run green.
    assert_eq!(output.status, RunStatus::Passed);
}

// ============================================================
// Skip propagation never invokes downstream expressions
// ============================================================

#[tokio::test]
async fn skipped_descendants_never_reach_the_evaluator() {
    let mut failing = node("f", "failing", &["root"]);
    failing.validator = Some(Expr::new("mock", "false"));
    let mut downstream = node("f", "downstream", &["failing"]);
    downstream.filter = Some(Expr::new("mock", "true"));
    downstream.validator = Some(Expr::new("mock", "true"));
    let mut last = node("f", "last", &["downstream"]);
    last.validator = Some(Expr::new("mock", "true"));

    let storage = MemoryStorage::new();
    storage.add_nodes(vec![node("f", "root", &[]), failing, downstream, last]);
    storage.add_events([
        event("ev_root", "f", "root", "run_1", 0, json!({})),
        event("ev_fail", "f", "failing", "run_1", 1, json!({})),
        event("ev_down", "f", "downstream", "run_1", 2, json!({})),
        event("ev_last", "f", "last", "run_1", 3, json!({})),
    ]);

    let (orch, log) = orchestrator_with(storage);
    let output = orch
        .eval_flow_run("run_1", "f", EvalOptions::default())
        .await
        .unwrap();

    assert_eq!(
        statuses(&output),
        vec![
            ("root", RunStatus::Passed),
            ("failing", RunStatus::Failed),
            ("downstream", RunStatus::Skipped),
            ("last", RunStatus::Skipped),
        ]
    );
    // Only the failing node's validator ever ran.
    assert_eq!(log.count(), 1);
    assert_eq!(log.scripts(), vec!["false"]);
}

// ============================================================
// Pending and unknown-flow handling
// ============================================================

#[tokio::test]
async fn missing_events_leave_nodes_pending() {
    let storage = MemoryStorage::new();
    storage.add_nodes(checkout_nodes());
    storage.add_events([event(
        "ev_cart",
        "checkout",
        "cart_created",
        "run_1",
        0,
        json!({}),
    )]);

    let (orch, _) = orchestrator_with(storage);
    let output = orch
        .eval_flow_run("run_1", "checkout", EvalOptions::default())
        .await
        .unwrap();

    assert_eq!(output.status, RunStatus::Pending);
    assert_eq!(
        statuses(&output),
        vec![
            ("cart_created", RunStatus::Passed),
            ("payment_processed", RunStatus::Pending),
            ("order_completed", RunStatus::Pending),
        ]
    );
}

#[tokio::test]
async fn unknown_flow_is_an_error() {
    let (orch, _) = orchestrator_with(MemoryStorage::new());
    let err = orch
        .eval_flow_run("run_1", "nope", EvalOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownFlow { flow } if flow == "nope"));
}

// ============================================================
// Idempotence
// ============================================================

#[tokio::test]
async fn re_evaluating_an_unchanged_run_is_identical() {
    let storage = MemoryStorage::new();
    storage.add_nodes(checkout_nodes());
    storage.add_events([
        event("ev_cart", "checkout", "cart_created", "run_1", 0, json!({})),
        event(
            "ev_pay",
            "checkout",
            "payment_processed",
            "run_1",
            10 * SECOND_NS,
            json!({}),
        ),
    ]);

    let (orch, _) = orchestrator_with(storage);
    let first = orch
        .eval_flow_run("run_1", "checkout", EvalOptions::default())
        .await
        .unwrap();
    let second = orch
        .eval_flow_run("run_1", "checkout", EvalOptions::default())
        .await
        .unwrap();

    assert_eq!(first.status, second.status);
    assert_eq!(first.ev_ids, second.ev_ids);
    assert_eq!(first.graph, second.graph);
    // exec_info identical except for wall-clock measurements.
    let strip = |out: &engine::BaseEvalOutput| {
        out.exec_info
            .iter()
            .map(|i| {
                let mut i = i.clone();
                i.elapsed_ns = 0;
                i
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(strip(&first), strip(&second));
}

// ============================================================
// Subgraph evaluation
// ============================================================

#[tokio::test]
async fn subgraph_evaluation_covers_only_the_downstream_closure() {
    let storage = MemoryStorage::new();
    storage.add_nodes(checkout_nodes());
    storage.add_events([
        event("ev_cart", "checkout", "cart_created", "run_1", 0, json!({})),
        event(
            "ev_pay",
            "checkout",
            "payment_processed",
            "run_1",
            2 * SECOND_NS,
            json!({}),
        ),
        event(
            "ev_done",
            "checkout",
            "order_completed",
            "run_1",
            4 * SECOND_NS,
            json!({}),
        ),
    ]);

    let (orch, _) = orchestrator_with(storage);
    let output = orch
        .eval_flow_run(
            "run_1",
            "checkout",
            EvalOptions::starting_at("payment_processed"),
        )
        .await
        .unwrap();

    let ids: Vec<&str> = output.exec_info.iter().map(|i| i.node_id.as_str()).collect();
    assert_eq!(ids, vec!["payment_processed", "order_completed"]);
    assert!(!output.graph.contains_key("cart_created"));
    assert_eq!(output.status, RunStatus::Passed);
}

#[tokio::test]
async fn subgraph_from_unknown_start_node_is_rejected() {
    let storage = MemoryStorage::new();
    storage.add_nodes(checkout_nodes());

    let (orch, _) = orchestrator_with(storage);
    let err = orch
        .eval_flow_run("run_1", "checkout", EvalOptions::starting_at("ghost"))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::UnknownStartNode { node } if node == "ghost"));
}

// ============================================================
// Legacy single-event entry point
// ============================================================

#[tokio::test]
async fn eval_event_delegates_to_the_run_evaluation() {
    let storage = MemoryStorage::new();
    storage.add_nodes(checkout_nodes());
    storage.add_events([
        event("ev_cart", "checkout", "cart_created", "run_1", 0, json!({})),
        event(
            "ev_pay",
            "checkout",
            "payment_processed",
            "run_1",
            2 * SECOND_NS,
            json!({}),
        ),
        event(
            "ev_done",
            "checkout",
            "order_completed",
            "run_1",
            4 * SECOND_NS,
            json!({}),
        ),
    ]);

    let (orch, _) = orchestrator_with(storage);

    // Restricted to the event's downstream closure…
    let restricted = orch.eval_event("ev_pay", false).await.unwrap();
    let ids: Vec<&str> = restricted.exec_info.iter().map(|i| i.node_id.as_str()).collect();
    assert_eq!(ids, vec!["payment_processed", "order_completed"]);

    // …or the whole graph.
    let whole = orch.eval_event("ev_pay", true).await.unwrap();
    assert_eq!(whole.exec_info.len(), 3);
    assert_eq!(whole.status, RunStatus::Passed);
}

#[tokio::test]
async fn eval_event_with_unknown_id_is_an_error() {
    let storage = MemoryStorage::new();
    storage.add_nodes(checkout_nodes());

    let (orch, _) = orchestrator_with(storage);
    let err = orch.eval_event("ghost", true).await.unwrap_err();
    assert!(matches!(err, EngineError::EventNotFound { event_id } if event_id == "ghost"));
}

// ============================================================
// Cancellation
// ============================================================

#[tokio::test]
async fn pre_cancelled_token_reports_every_node_cancelled() {
    let storage = MemoryStorage::new();
    storage.add_nodes(checkout_nodes());
    storage.add_events([event(
        "ev_cart",
        "checkout",
        "cart_created",
        "run_1",
        0,
        json!({}),
    )]);

    let (orch, _) = orchestrator_with(storage);
    let opts = EvalOptions::default();
    opts.cancel.cancel();

    let output = orch.eval_flow_run("run_1", "checkout", opts).await.unwrap();

    assert_eq!(output.status, RunStatus::Cancelled);
    assert_eq!(output.exec_info.len(), 3, "no node may be silently dropped");
    assert!(output
        .exec_info
        .iter()
        .all(|i| i.status == RunStatus::Cancelled));
    // Matched evidence is still reported for cancelled nodes.
    assert_eq!(output.exec_info[0].ev_ids, vec!["ev_cart"]);
}

// ============================================================
// Per-node evaluation timeout
// ============================================================

struct StallingEngine;

#[async_trait::async_trait]
impl eval::ExprEngine for StallingEngine {
    async fn evaluate(
        &self,
        _expr: &Expr,
        _data: &Value,
        _ctx: &Value,
    ) -> Result<bool, eval::ExprError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(true)
    }
}

#[tokio::test(start_paused = true)]
async fn pathological_script_is_bounded_and_reports_error_not_timed_out() {
    let mut stuck = node("f", "stuck", &[]);
    stuck.validator = Some(Expr::new("stall", "anything"));

    let storage = MemoryStorage::new();
    storage.add_nodes(vec![stuck]);
    storage.add_events([event("ev_stuck", "f", "stuck", "run_1", 0, json!({}))]);

    let evaluator = Evaluator::new().register("stall", StallingEngine);
    let orch = Orchestrator::new(Arc::new(storage), Arc::new(evaluator));

    let output = orch
        .eval_flow_run("run_1", "f", EvalOptions::default())
        .await
        .unwrap();

    assert_eq!(output.exec_info[0].status, RunStatus::Error);
    assert!(output.exec_info[0]
        .error
        .as_deref()
        .unwrap_or("")
        .contains("per-node limit"));
    assert_eq!(output.status, RunStatus::Failed);
}
