//! `engine` crate — the flow evaluation engine.
//!
//! Turns a declarative node graph (a dependency DAG with per-node timing
//! conditions and optional filter/validator expressions) plus the timestamped
//! events of one run into a verdict: an overall status and a per-node
//! status/timing/evidence trail.
//!
//! The engine is a pure function of its two storage reads. It produces no
//! events, schedules nothing, and persists nothing — persistence sits behind
//! the [`Storage`] port, expression evaluation behind the `eval` crate's
//! registry.

pub mod error;
pub mod graph;
pub mod layering;
pub mod matcher;
pub mod models;
pub mod orchestrator;
pub mod storage;
pub mod validator;

pub use error::EngineError;
pub use graph::FlowGraph;
pub use models::{BaseEvalOutput, Event, ExecInfo, NodeDef, NodeSource, NodeType, RunStatus};
pub use orchestrator::{EvalOptions, Orchestrator};
pub use storage::{MemoryStorage, Storage, StorageError};
