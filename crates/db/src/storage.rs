//! `SqlStorage` — the adapter that plugs this persistence layer into the
//! engine's storage port.

use async_trait::async_trait;

use engine::{Event, NodeDef, Storage, StorageError};

use crate::{repository, DbError, DbPool};

/// SQLite-backed implementation of [`engine::Storage`].
#[derive(Clone)]
pub struct SqlStorage {
    pool: DbPool,
}

impl SqlStorage {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn port_err(err: DbError) -> StorageError {
    StorageError::Backend(err.to_string())
}

#[async_trait]
impl Storage for SqlStorage {
    async fn get_nodes_by_flow(&self, flow: &str) -> Result<Vec<NodeDef>, StorageError> {
        repository::nodes::get_nodes_by_flow(&self.pool, flow)
            .await
            .map_err(port_err)
    }

    async fn get_events_by_run(
        &self,
        run_id: &str,
        flow: &str,
    ) -> Result<Vec<Event>, StorageError> {
        repository::events::get_events_by_run(&self.pool, run_id, flow)
            .await
            .map_err(port_err)
    }

    async fn get_event(&self, event_id: &str) -> Result<Option<Event>, StorageError> {
        repository::events::get_event(&self.pool, event_id)
            .await
            .map_err(port_err)
    }
}
