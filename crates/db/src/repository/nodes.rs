//! Node definition CRUD operations.

use chrono::Utc;

use engine::NodeDef;

use crate::models::{NodeParams, NodeRow};
use crate::{DbError, DbPool};

/// Insert a node definition, or refresh it in place if `(flow, id)` already
/// exists. A refresh revives soft-deleted rows (clears `deleted_at`) and
/// preserves the original `created_at`.
pub async fn upsert_node(pool: &DbPool, def: &NodeDef) -> Result<(), DbError> {
    let p = NodeParams::from_def(def);
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO nodes
            (id, flow, type, source, description, dep_ids, conditions,
             filter, validator, additional_meta, created_at, updated_at, deleted_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL)
        ON CONFLICT (flow, id) DO UPDATE SET
            type            = excluded.type,
            source          = excluded.source,
            description     = excluded.description,
            dep_ids         = excluded.dep_ids,
            conditions      = excluded.conditions,
            filter          = excluded.filter,
            validator       = excluded.validator,
            additional_meta = excluded.additional_meta,
            updated_at      = excluded.created_at,
            deleted_at      = NULL
        "#,
    )
    .bind(&def.id)
    .bind(&def.flow)
    .bind(&p.node_type)
    .bind(&p.source)
    .bind(&def.description)
    .bind(&p.dep_ids)
    .bind(&p.conditions)
    .bind(&p.filter)
    .bind(&p.validator)
    .bind(&p.additional_meta)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Every definition of one flow, soft-deleted rows included, in insertion
/// order — historical runs must stay evaluable against the graph they ran
/// under, and graph layering depends on a stable node order.
pub async fn get_nodes_by_flow(pool: &DbPool, flow: &str) -> Result<Vec<NodeDef>, DbError> {
    let rows = sqlx::query_as::<_, NodeRow>(
        r#"SELECT * FROM nodes WHERE flow = ? ORDER BY rowid"#,
    )
    .bind(flow)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(NodeRow::into_def).collect()
}

/// All non-deleted definitions across every flow (the listing API).
pub async fn list_active_nodes(pool: &DbPool) -> Result<Vec<NodeDef>, DbError> {
    let rows = sqlx::query_as::<_, NodeRow>(
        r#"SELECT * FROM nodes WHERE deleted_at IS NULL ORDER BY rowid"#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(NodeRow::into_def).collect()
}

/// Fetch a single definition by identity, soft-deleted or not.
pub async fn get_node(pool: &DbPool, flow: &str, id: &str) -> Result<Option<NodeDef>, DbError> {
    let row = sqlx::query_as::<_, NodeRow>(
        r#"SELECT * FROM nodes WHERE flow = ? AND id = ?"#,
    )
    .bind(flow)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(NodeRow::into_def).transpose()
}

/// Soft-delete a definition. Returns `DbError::NotFound` if no live row
/// matched.
pub async fn soft_delete_node(pool: &DbPool, flow: &str, id: &str) -> Result<(), DbError> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        UPDATE nodes SET deleted_at = ?, updated_at = ?
        WHERE flow = ? AND id = ? AND deleted_at IS NULL
        "#,
    )
    .bind(now)
    .bind(now)
    .bind(flow)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
