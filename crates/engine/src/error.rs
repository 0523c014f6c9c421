//! Engine-level error types.
//!
//! Only structural problems (and storage failures) surface as `Err` from an
//! evaluation — everything node-scoped resolves to a status on the node's
//! `ExecInfo` instead of aborting the run.

use thiserror::Error;

use crate::storage::StorageError;

/// Errors produced by the flow evaluation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Structural errors (fatal, raised before layering) ------

    /// Two or more nodes in the flow share an ID.
    #[error("duplicate node '{id}' in flow '{flow}'")]
    DuplicateNode { flow: String, id: String },

    /// A node's `dep_ids` references an ID that does not exist in the flow.
    #[error("node '{node}' depends on unknown node '{missing_dep}'")]
    DanglingDependency { node: String, missing_dep: String },

    /// The dependency relation contains a cycle.
    #[error("dependency cycle: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    // ------ Request errors ------

    /// Subgraph evaluation was asked to start from a node the flow lacks.
    #[error("unknown start node '{node}'")]
    UnknownStartNode { node: String },

    /// No node definitions exist for the requested flow.
    #[error("no nodes defined for flow '{flow}'")]
    UnknownFlow { flow: String },

    /// The legacy entry point could not resolve its event.
    #[error("event '{event_id}' not found")]
    EventNotFound { event_id: String },

    // ------ Port errors ------

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
