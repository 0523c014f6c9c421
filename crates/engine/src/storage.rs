//! The storage port consumed by the orchestrator.
//!
//! The engine reads node definitions and run events through this trait and
//! nothing else — no time-range scans, no writes. `get_event` exists solely
//! so the legacy single-event entry point can resolve an id to its
//! `(run_id, flow, node_id)`; the evaluation itself uses only the two bulk
//! reads.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use crate::{Event, NodeDef};

/// Failure surfaced by a storage adapter. Adapters map their own error types
/// into this; the engine treats every variant as fatal for the request.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Every node definition of `flow`, including soft-deleted ones, so
    /// historical runs remain evaluable.
    async fn get_nodes_by_flow(&self, flow: &str) -> Result<Vec<NodeDef>, StorageError>;

    /// Every event of one `(run_id, flow)` execution instance.
    async fn get_events_by_run(&self, run_id: &str, flow: &str)
        -> Result<Vec<Event>, StorageError>;

    /// Single-event lookup for the legacy entry point.
    async fn get_event(&self, event_id: &str) -> Result<Option<Event>, StorageError>;
}

/// In-process storage used by tests and seeding.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    nodes: Vec<NodeDef>,
    events: Vec<Event>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&self, node: NodeDef) {
        self.inner.write().unwrap().nodes.push(node);
    }

    pub fn add_nodes(&self, nodes: impl IntoIterator<Item = NodeDef>) {
        self.inner.write().unwrap().nodes.extend(nodes);
    }

    pub fn add_event(&self, event: Event) {
        self.inner.write().unwrap().events.push(event);
    }

    pub fn add_events(&self, events: impl IntoIterator<Item = Event>) {
        self.inner.write().unwrap().events.extend(events);
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_nodes_by_flow(&self, flow: &str) -> Result<Vec<NodeDef>, StorageError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.nodes.iter().filter(|n| n.flow == flow).cloned().collect())
    }

    async fn get_events_by_run(
        &self,
        run_id: &str,
        flow: &str,
    ) -> Result<Vec<Event>, StorageError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .events
            .iter()
            .filter(|e| e.run_id == run_id && e.flow == flow)
            .cloned()
            .collect())
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<Event>, StorageError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.events.iter().find(|e| e.id == event_id).cloned())
    }
}
