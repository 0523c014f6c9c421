//! Manual node CRUD. Code-defined nodes are read-only through this surface,
//! and deletion is always soft.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use db::repository::nodes as node_repo;
use engine::{NodeDef, NodeSource};

use crate::schemas::{NodeCreateSchema, NodeUpdateSchema, SuccessResponse};
use crate::{ApiError, AppState};

/// All non-deleted nodes across every flow.
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<NodeDef>>, ApiError> {
    Ok(Json(node_repo::list_active_nodes(&state.pool).await?))
}

/// Create a manual node, or revive a soft-deleted one under the same
/// identity. A live duplicate is rejected.
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<NodeCreateSchema>,
) -> Result<(StatusCode, Json<NodeDef>), ApiError> {
    if let Some(existing) = node_repo::get_node(&state.pool, &body.flow, &body.id).await? {
        if existing.deleted_at.is_none() {
            return Err(ApiError::BadRequest(
                "Node with the same flow and id already exists".into(),
            ));
        }
    }

    let mut def = NodeDef::new(&body.flow, &body.id);
    def.node_type = body.node_type.into();
    def.source = NodeSource::Manual;
    def.description = body.description;
    def.dep_ids = body.dep_ids.unwrap_or_default();
    def.conditions = body.conditions.unwrap_or_default();
    def.filter = body.filter;
    def.validator = body.validator;
    def.additional_meta = body.additional_meta;

    node_repo::upsert_node(&state.pool, &def).await?;

    let stored = node_repo::get_node(&state.pool, &body.flow, &body.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("node vanished during create".into()))?;

    Ok((StatusCode::CREATED, Json(stored)))
}

/// Update a manual node; code-defined definitions are immutable here.
/// Updating a soft-deleted node revives it.
pub async fn update(
    Path((flow, id)): Path<(String, String)>,
    State(state): State<AppState>,
    Json(body): Json<NodeUpdateSchema>,
) -> Result<Json<NodeDef>, ApiError> {
    let Some(mut def) = node_repo::get_node(&state.pool, &flow, &id).await? else {
        return Err(ApiError::NotFound(format!("node '{flow}/{id}' not found")));
    };

    if def.source == NodeSource::Code {
        return Err(ApiError::BadRequest("Cannot update code-defined node".into()));
    }

    if let Some(t) = body.node_type {
        def.node_type = t.into();
    }
    if let Some(description) = body.description {
        def.description = Some(description);
    }
    if let Some(dep_ids) = body.dep_ids {
        def.dep_ids = dep_ids;
    }
    if let Some(conditions) = body.conditions {
        def.conditions = conditions;
    }
    if let Some(filter) = body.filter {
        def.filter = Some(filter);
    }
    if let Some(validator) = body.validator {
        def.validator = Some(validator);
    }
    if let Some(meta) = body.additional_meta {
        def.additional_meta = Some(meta);
    }

    node_repo::upsert_node(&state.pool, &def).await?;

    let stored = node_repo::get_node(&state.pool, &flow, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("node '{flow}/{id}' not found")))?;

    Ok(Json(stored))
}

/// Soft-delete a manual node.
pub async fn delete(
    Path((flow, id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Some(def) = node_repo::get_node(&state.pool, &flow, &id).await? else {
        return Err(ApiError::NotFound(format!("node '{flow}/{id}' not found")));
    };

    if def.source == NodeSource::Code {
        return Err(ApiError::BadRequest("Cannot delete code-defined node".into()));
    }

    node_repo::soft_delete_node(&state.pool, &flow, &id).await?;

    Ok(Json(SuccessResponse::new("Node deleted")))
}
