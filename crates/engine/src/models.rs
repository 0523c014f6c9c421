//! Core domain models for the flow evaluation engine.
//!
//! These types are the source of truth for what a flow definition and its
//! runtime evidence look like in memory. Their serde representations are the
//! wire shapes consumed by the CLI and UI collaborators, so field names and
//! status spellings must not drift.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use eval::Expr;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The declared role of a node within its flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Trigger,
    Act,
    Assert,
    Hook,
    #[default]
    Generic,
}

/// Where a node definition came from.
///
/// Code-defined nodes are written by instrumented applications and are
/// immutable through the manual-editing APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeSource {
    Code,
    #[default]
    Manual,
}

/// Status of a node (and, aggregated, of a whole run).
///
/// `running` and `flaky` are carried for wire compatibility with the
/// surrounding tooling; no evaluation path produces them today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
    Error,
    Cancelled,
    TimedOut,
    Flaky,
}

impl RunStatus {
    /// Statuses that propagate `skipped` to every descendant.
    pub fn blocks_descendants(self) -> bool {
        matches!(
            self,
            Self::Failed | Self::Error | Self::TimedOut | Self::Skipped | Self::Cancelled
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
            Self::Flaky => "flaky",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// A per-node timing condition.
///
/// Only `timeout_ms` is understood today. Unknown fields in a condition
/// object are ignored on deserialisation, never rejected, so forward
/// condition types survive older engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<i64>,
}

// ---------------------------------------------------------------------------
// NodeDef
// ---------------------------------------------------------------------------

/// A declared step of a flow. Identity is `(flow, id)`.
///
/// Definitions are soft-deleted only (`deleted_at`), so historical runs
/// remain evaluable against the graph they ran under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDef {
    /// Unique within `flow`; referenced by other nodes' `dep_ids`.
    pub id: String,
    pub flow: String,
    #[serde(rename = "type", default)]
    pub node_type: NodeType,
    #[serde(default)]
    pub dep_ids: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub source: NodeSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_meta: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl NodeDef {
    /// Minimal constructor used by tests and seeding; everything optional is
    /// left empty.
    pub fn new(flow: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            flow: flow.into(),
            node_type: NodeType::Generic,
            dep_ids: Vec::new(),
            conditions: Vec::new(),
            filter: None,
            validator: None,
            description: None,
            source: NodeSource::Manual,
            additional_meta: None,
            created_at: None,
            updated_at: None,
            deleted_at: None,
        }
    }

    /// First declared `timeout_ms`, if any condition carries one.
    pub fn timeout_ms(&self) -> Option<i64> {
        self.conditions.iter().find_map(|c| c.timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// One occurrence of a node within a run. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Globally unique (minted by the ingest path).
    pub id: String,
    /// Groups all events of one execution instance.
    pub run_id: String,
    pub flow: String,
    /// The NodeDef this occurrence belongs to.
    pub node_id: String,
    #[serde(rename = "type", default)]
    pub node_type: NodeType,
    /// Opaque payload; visible to filter/validator scripts as `data`.
    #[serde(default)]
    pub data: Value,
    /// Nanoseconds since epoch. Producers stamp independently, so `ts` is
    /// not monotonic across sources.
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_meta: Option<Value>,
}

// ---------------------------------------------------------------------------
// Evaluation output
// ---------------------------------------------------------------------------

/// Per-node verdict and evidence trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecInfo {
    pub node_id: String,
    pub dep_node_ids: Vec<String>,
    pub status: RunStatus,
    pub message: Option<String>,
    pub error: Option<String>,
    /// Evaluator wall-clock time spent on this node's checks — distinct from
    /// the business-event timing that drives `timed_out`.
    pub elapsed_ns: i64,
    /// Events consumed for this node.
    pub ev_ids: Vec<String>,
    /// Events consumed from this node's dependencies.
    pub upstream_ev_ids: Vec<String>,
}

/// The engine's result for one `(run_id, flow)` evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BaseEvalOutput {
    pub status: RunStatus,
    pub elapsed_ns: i64,
    /// Adjacency snapshot actually used (id → dependents); restricted when a
    /// subgraph was evaluated.
    pub graph: BTreeMap<String, Vec<String>>,
    /// One entry per evaluated node, in layer order.
    pub exec_info: Vec<ExecInfo>,
    /// Every event touched by the evaluation.
    pub ev_ids: Vec<String>,
}
