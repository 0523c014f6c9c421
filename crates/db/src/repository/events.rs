//! Event repository functions. Events are immutable: insert and read only.

use engine::Event;
use sqlx::QueryBuilder;

use crate::models::EventRow;
use crate::{DbError, DbPool};

fn enum_str<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

/// Insert a batch of events in one transaction.
pub async fn insert_events(pool: &DbPool, events: &[Event]) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    for event in events {
        sqlx::query(
            r#"
            INSERT INTO events
                (id, run_id, flow, node_id, type, data, ts, description, additional_meta)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.run_id)
        .bind(&event.flow)
        .bind(&event.node_id)
        .bind(enum_str(&event.node_type))
        .bind(serde_json::to_string(&event.data).unwrap_or_else(|_| "{}".into()))
        .bind(event.ts)
        .bind(&event.description)
        .bind(
            event
                .additional_meta
                .as_ref()
                .and_then(|m| serde_json::to_string(m).ok()),
        )
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Every event of one `(run_id, flow)` execution instance, ascending by
/// producer timestamp.
pub async fn get_events_by_run(
    pool: &DbPool,
    run_id: &str,
    flow: &str,
) -> Result<Vec<Event>, DbError> {
    let rows = sqlx::query_as::<_, EventRow>(
        r#"SELECT * FROM events WHERE run_id = ? AND flow = ? ORDER BY ts"#,
    )
    .bind(run_id)
    .bind(flow)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(EventRow::into_event).collect()
}

/// Fetch a single event by id.
pub async fn get_event(pool: &DbPool, event_id: &str) -> Result<Option<Event>, DbError> {
    let row = sqlx::query_as::<_, EventRow>(r#"SELECT * FROM events WHERE id = ?"#)
        .bind(event_id)
        .fetch_optional(pool)
        .await?;

    row.map(EventRow::into_event).transpose()
}

/// Newest-first event listing with optional flow/node filters.
pub async fn list_events(
    pool: &DbPool,
    flow: Option<&str>,
    node_id: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Event>, DbError> {
    let mut qb: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("SELECT * FROM events WHERE 1 = 1");

    if let Some(flow) = flow {
        qb.push(" AND flow = ").push_bind(flow);
    }
    if let Some(node_id) = node_id {
        qb.push(" AND node_id = ").push_bind(node_id);
    }
    qb.push(" ORDER BY ts DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let rows = qb.build_query_as::<EventRow>().fetch_all(pool).await?;
    rows.into_iter().map(EventRow::into_event).collect()
}
