//! Persisted evaluation verdicts.

use chrono::Utc;
use sqlx::QueryBuilder;

use engine::BaseEvalOutput;

use crate::models::{EvalOutputRecord, EvalOutputRow};
use crate::{DbError, DbPool};

/// Persist one evaluation verdict.
pub async fn insert_eval_output(
    pool: &DbPool,
    id: &str,
    flow: &str,
    trigger_ev_id: Option<&str>,
    output: &BaseEvalOutput,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO eval_outputs (id, flow, trigger_ev_id, output, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(flow)
    .bind(trigger_ev_id)
    .bind(serde_json::to_string(output).unwrap_or_else(|_| "{}".into()))
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Newest-first verdict listing with optional flow / trigger-event filters.
pub async fn list_eval_outputs(
    pool: &DbPool,
    flow: Option<&str>,
    trigger_ev_id: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<EvalOutputRecord>, DbError> {
    let mut qb: QueryBuilder<sqlx::Sqlite> =
        QueryBuilder::new("SELECT * FROM eval_outputs WHERE 1 = 1");

    if let Some(flow) = flow {
        qb.push(" AND flow = ").push_bind(flow);
    }
    if let Some(ev_id) = trigger_ev_id {
        qb.push(" AND trigger_ev_id = ").push_bind(ev_id);
    }
    qb.push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows = qb.build_query_as::<EvalOutputRow>().fetch_all(pool).await?;
    rows.into_iter().map(EvalOutputRow::into_record).collect()
}
