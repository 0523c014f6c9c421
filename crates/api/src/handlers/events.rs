//! Event ingest and listing.

use axum::extract::{Query, State};
use axum::Json;
use tracing::info;
use uuid::Uuid;

use db::repository::{events as ev_repo, nodes as node_repo};
use engine::{Event, NodeSource};

use crate::schemas::{EventBatchItem, EventListQuery, SuccessResponse};
use crate::{ApiError, AppState};

/// Persist a batch of producer events.
///
/// Unseen `(flow, id)` nodes auto-register as code-defined from the
/// declaration carried in each item; code-defined declarations are refreshed
/// on every batch so the stored graph tracks the instrumented source.
/// Manually-curated nodes are never overwritten by producers.
pub async fn persist_batch(
    State(state): State<AppState>,
    Json(body): Json<Vec<EventBatchItem>>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let mut events: Vec<Event> = Vec::with_capacity(body.len());

    for item in &body {
        let existing = node_repo::get_node(&state.pool, &item.flow, &item.id).await?;
        let writable = match &existing {
            None => true,
            Some(def) => def.source == NodeSource::Code,
        };
        if writable {
            node_repo::upsert_node(&state.pool, &item.as_node_def()).await?;
        }

        events.push(Event {
            id: Uuid::new_v4().to_string(),
            run_id: item.run_id.clone(),
            flow: item.flow.clone(),
            node_id: item.id.clone(),
            node_type: item.node_type,
            data: item.data.clone(),
            ts: item.ts,
            description: item.description.clone(),
            additional_meta: item.additional_meta.clone(),
        });
    }

    ev_repo::insert_events(&state.pool, &events).await?;
    info!(count = events.len(), "persisted event batch");

    Ok(Json(SuccessResponse::new("Events persisted")))
}

/// Newest-first event listing.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<EventListQuery>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let events = ev_repo::list_events(
        &state.pool,
        query.flow.as_deref(),
        query.node_id.as_deref(),
        query.limit,
        query.offset,
    )
    .await?;

    Ok(Json(events))
}
