//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models — they carry no domain behaviour. Domain
//! types live in the `engine` crate; conversions between the two happen here
//! so repositories stay pure SQL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use engine::models::{BaseEvalOutput, Condition};
use engine::{Event, NodeDef};
use eval::Expr;

use crate::DbError;

fn parse_json<T: serde::de::DeserializeOwned>(column: &str, raw: &str) -> Result<T, DbError> {
    serde_json::from_str(raw).map_err(|e| DbError::Corrupt(format!("column '{column}': {e}")))
}

fn parse_enum<T: serde::de::DeserializeOwned>(column: &str, raw: &str) -> Result<T, DbError> {
    serde_json::from_value(Value::String(raw.to_owned()))
        .map_err(|e| DbError::Corrupt(format!("column '{column}': {e}")))
}

fn enum_str<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(Value::String(s)) => s,
        _ => String::new(),
    }
}

// ---------------------------------------------------------------------------
// nodes
// ---------------------------------------------------------------------------

/// A persisted node definition row.
#[derive(Debug, Clone, FromRow)]
pub struct NodeRow {
    pub id: String,
    pub flow: String,
    #[sqlx(rename = "type")]
    pub node_type: String,
    pub source: String,
    pub description: Option<String>,
    /// JSON array of node ids.
    pub dep_ids: String,
    /// JSON array of condition objects.
    pub conditions: String,
    /// JSON `Expr`, nullable.
    pub filter: Option<String>,
    pub validator: Option<String>,
    pub additional_meta: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl NodeRow {
    pub fn into_def(self) -> Result<NodeDef, DbError> {
        Ok(NodeDef {
            id: self.id,
            flow: self.flow,
            node_type: parse_enum("type", &self.node_type)?,
            source: parse_enum("source", &self.source)?,
            description: self.description,
            dep_ids: parse_json("dep_ids", &self.dep_ids)?,
            conditions: parse_json::<Vec<Condition>>("conditions", &self.conditions)?,
            filter: self.filter.as_deref().map(|s| parse_json::<Expr>("filter", s)).transpose()?,
            validator: self
                .validator
                .as_deref()
                .map(|s| parse_json::<Expr>("validator", s))
                .transpose()?,
            additional_meta: self
                .additional_meta
                .as_deref()
                .map(|s| parse_json("additional_meta", s))
                .transpose()?,
            created_at: Some(self.created_at),
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        })
    }
}

/// Column values for writing a [`NodeDef`].
pub struct NodeParams {
    pub node_type: String,
    pub source: String,
    pub dep_ids: String,
    pub conditions: String,
    pub filter: Option<String>,
    pub validator: Option<String>,
    pub additional_meta: Option<String>,
}

impl NodeParams {
    pub fn from_def(def: &NodeDef) -> Self {
        Self {
            node_type: enum_str(&def.node_type),
            source: enum_str(&def.source),
            dep_ids: serde_json::to_string(&def.dep_ids).unwrap_or_else(|_| "[]".into()),
            conditions: serde_json::to_string(&def.conditions).unwrap_or_else(|_| "[]".into()),
            filter: def.filter.as_ref().and_then(|e| serde_json::to_string(e).ok()),
            validator: def.validator.as_ref().and_then(|e| serde_json::to_string(e).ok()),
            additional_meta: def
                .additional_meta
                .as_ref()
                .and_then(|m| serde_json::to_string(m).ok()),
        }
    }
}

// ---------------------------------------------------------------------------
// events
// ---------------------------------------------------------------------------

/// A persisted event row.
#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: String,
    pub run_id: String,
    pub flow: String,
    pub node_id: String,
    #[sqlx(rename = "type")]
    pub event_type: String,
    /// JSON payload.
    pub data: String,
    pub ts: i64,
    pub description: Option<String>,
    pub additional_meta: Option<String>,
}

impl EventRow {
    pub fn into_event(self) -> Result<Event, DbError> {
        Ok(Event {
            id: self.id,
            run_id: self.run_id,
            flow: self.flow,
            node_id: self.node_id,
            node_type: parse_enum("type", &self.event_type)?,
            data: parse_json("data", &self.data)?,
            ts: self.ts,
            description: self.description,
            additional_meta: self
                .additional_meta
                .as_deref()
                .map(|s| parse_json("additional_meta", s))
                .transpose()?,
        })
    }
}

// ---------------------------------------------------------------------------
// eval_outputs
// ---------------------------------------------------------------------------

/// A persisted evaluation verdict row (raw).
#[derive(Debug, Clone, FromRow)]
pub struct EvalOutputRow {
    pub id: String,
    pub flow: String,
    pub trigger_ev_id: Option<String>,
    /// JSON `BaseEvalOutput`.
    pub output: String,
    pub created_at: DateTime<Utc>,
}

/// The decoded verdict handed to API/CLI callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalOutputRecord {
    pub id: String,
    pub flow: String,
    pub trigger_ev_id: Option<String>,
    pub output: BaseEvalOutput,
    pub created_at: DateTime<Utc>,
}

impl EvalOutputRow {
    pub fn into_record(self) -> Result<EvalOutputRecord, DbError> {
        Ok(EvalOutputRecord {
            output: parse_json("output", &self.output)?,
            id: self.id,
            flow: self.flow,
            trigger_ev_id: self.trigger_ev_id,
            created_at: self.created_at,
        })
    }
}
