//! Request/response DTOs for the REST surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use engine::models::Condition;
use engine::{NodeDef, NodeSource, NodeType};
use eval::Expr;

/// Uniform success envelope.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub code: u16,
    pub timestamp: DateTime<Utc>,
}

impl SuccessResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
            data: None,
            code: 200,
            timestamp: Utc::now(),
        }
    }
}

/// One producer event in a batch, optionally carrying the emitting node's
/// declaration so unseen nodes auto-register as code-defined.
#[derive(Debug, Deserialize)]
pub struct EventBatchItem {
    pub flow: String,
    pub id: String,
    pub run_id: String,
    #[serde(rename = "type", default)]
    pub node_type: NodeType,
    #[serde(default)]
    pub data: Value,
    pub ts: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub dep_ids: Option<Vec<String>>,
    #[serde(default)]
    pub conditions: Option<Vec<Condition>>,
    #[serde(default)]
    pub filter: Option<Expr>,
    #[serde(default)]
    pub validator: Option<Expr>,
    #[serde(default)]
    pub additional_meta: Option<Value>,
}

impl EventBatchItem {
    /// The code-defined node declaration carried by this item.
    pub fn as_node_def(&self) -> NodeDef {
        let mut def = NodeDef::new(&self.flow, &self.id);
        def.node_type = self.node_type;
        def.source = NodeSource::Code;
        def.description = self.description.clone();
        def.dep_ids = self.dep_ids.clone().unwrap_or_default();
        def.conditions = self.conditions.clone().unwrap_or_default();
        def.filter = self.filter.clone();
        def.validator = self.validator.clone();
        def.additional_meta = self.additional_meta.clone();
        def
    }
}

/// Node types creatable through the manual API — `act` and `assert` nodes
/// may only come from instrumented code.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualNodeType {
    Generic,
    Trigger,
    Hook,
}

impl From<ManualNodeType> for NodeType {
    fn from(t: ManualNodeType) -> Self {
        match t {
            ManualNodeType::Generic => NodeType::Generic,
            ManualNodeType::Trigger => NodeType::Trigger,
            ManualNodeType::Hook => NodeType::Hook,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NodeCreateSchema {
    pub flow: String,
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: ManualNodeType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub dep_ids: Option<Vec<String>>,
    #[serde(default)]
    pub conditions: Option<Vec<Condition>>,
    #[serde(default)]
    pub filter: Option<Expr>,
    #[serde(default)]
    pub validator: Option<Expr>,
    #[serde(default)]
    pub additional_meta: Option<Value>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Deserialize, Default)]
pub struct NodeUpdateSchema {
    #[serde(rename = "type", default)]
    pub node_type: Option<ManualNodeType>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub dep_ids: Option<Vec<String>>,
    #[serde(default)]
    pub conditions: Option<Vec<Condition>>,
    #[serde(default)]
    pub filter: Option<Expr>,
    #[serde(default)]
    pub validator: Option<Expr>,
    #[serde(default)]
    pub additional_meta: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RunEvalInput {
    pub run_id: String,
    pub flow: String,
    #[serde(default)]
    pub start_node_id: Option<String>,
}

/// Legacy single-event evaluation request.
#[derive(Debug, Deserialize)]
pub struct EvalEventInput {
    pub ev_id: String,
    #[serde(default)]
    pub whole_graph: bool,
}

#[derive(Debug, Deserialize)]
pub struct EventListQuery {
    #[serde(default)]
    pub flow: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct EvalOutputListQuery {
    #[serde(default)]
    pub flow: Option<String>,
    #[serde(default)]
    pub ev_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

pub(crate) fn default_limit() -> i64 {
    100
}
