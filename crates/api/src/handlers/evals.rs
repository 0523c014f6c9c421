//! Evaluation endpoints: run a flow audit, the legacy single-event entry,
//! and the persisted-verdict listing.

use axum::extract::{Query, State};
use axum::Json;
use uuid::Uuid;

use db::models::EvalOutputRecord;
use db::repository::{eval_outputs as out_repo, events as ev_repo};
use engine::{BaseEvalOutput, EvalOptions};

use crate::schemas::{EvalEventInput, EvalOutputListQuery, RunEvalInput};
use crate::{ApiError, AppState};

/// Evaluate one `(run_id, flow)` and persist the verdict.
pub async fn run_eval(
    State(state): State<AppState>,
    Json(body): Json<RunEvalInput>,
) -> Result<Json<BaseEvalOutput>, ApiError> {
    let opts = EvalOptions {
        start_node_id: body.start_node_id.clone(),
        ..EvalOptions::default()
    };

    let output = state
        .orchestrator
        .eval_flow_run(&body.run_id, &body.flow, opts)
        .await?;

    out_repo::insert_eval_output(
        &state.pool,
        &Uuid::new_v4().to_string(),
        &body.flow,
        None,
        &output,
    )
    .await?;

    Ok(Json(output))
}

/// Legacy entry point: evaluate the run an event belongs to, optionally
/// restricted to the event's downstream subgraph.
pub async fn eval_event(
    State(state): State<AppState>,
    Json(body): Json<EvalEventInput>,
) -> Result<Json<BaseEvalOutput>, ApiError> {
    // Resolve the flow for verdict persistence; the orchestrator re-resolves
    // the same event for its own delegation.
    let Some(event) = ev_repo::get_event(&state.pool, &body.ev_id).await? else {
        return Err(ApiError::NotFound(format!("event '{}' not found", body.ev_id)));
    };

    let output = state
        .orchestrator
        .eval_event(&body.ev_id, body.whole_graph)
        .await?;

    out_repo::insert_eval_output(
        &state.pool,
        &Uuid::new_v4().to_string(),
        &event.flow,
        Some(&body.ev_id),
        &output,
    )
    .await?;

    Ok(Json(output))
}

/// Newest-first listing of persisted verdicts.
pub async fn list_outputs(
    State(state): State<AppState>,
    Query(query): Query<EvalOutputListQuery>,
) -> Result<Json<Vec<EvalOutputRecord>>, ApiError> {
    let outputs = out_repo::list_eval_outputs(
        &state.pool,
        query.flow.as_deref(),
        query.ev_id.as_deref(),
        query.limit,
        query.offset,
    )
    .await?;

    Ok(Json(outputs))
}
